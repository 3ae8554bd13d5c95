//! Merge operands and the metadata fold
//!
//! Size changes are not applied as read-modify-write. Writers enqueue small
//! operands against the record's key and the store folds them into the
//! stored value. Concurrent writers to the same file therefore need no
//! lock: every increase operand only ever grows the size.
//!
//! # Operand wire form
//!
//! ```text
//! c:<serialized record>      create
//! i:<size>,<t|f>             increase size, append flag
//! d:<size>                   decrease size (truncate)
//! ```
//!
//! Sizes are decimal ASCII.

use scatterfs_common::{Error, Metadata, Result};

const SEPARATOR: u8 = b':';
const PARAM_SEPARATOR: char = ',';
const TRUE_CHAR: &str = "t";
const FALSE_CHAR: &str = "f";

/// One queued update instruction against a metadata key
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeOperand {
    /// Install a record if the key has none
    Create(Metadata),
    /// Grow the size. With `append` the size is added to the current size,
    /// otherwise it is the end offset of a positional write.
    IncreaseSize { size: u64, append: bool },
    /// Shrink the size to at most `size`
    DecreaseSize { size: u64 },
}

impl MergeOperand {
    pub const CREATE_ID: u8 = b'c';
    pub const INCREASE_SIZE_ID: u8 = b'i';
    pub const DECREASE_SIZE_ID: u8 = b'd';

    /// Size operand for a write of `io_size` bytes at `offset`.
    ///
    /// Fails with `InvalidArgument` if the write would end past `u64::MAX`.
    pub fn for_write(io_size: u64, offset: u64, append: bool) -> Result<Self> {
        if append {
            return Ok(Self::IncreaseSize {
                size: io_size,
                append: true,
            });
        }
        let end = offset.checked_add(io_size).ok_or_else(|| {
            Error::invalid_argument(format!("write of {io_size} bytes at {offset} overflows"))
        })?;
        Ok(Self::IncreaseSize {
            size: end,
            append: false,
        })
    }

    #[must_use]
    pub const fn id(&self) -> u8 {
        match self {
            Self::Create(_) => Self::CREATE_ID,
            Self::IncreaseSize { .. } => Self::INCREASE_SIZE_ID,
            Self::DecreaseSize { .. } => Self::DECREASE_SIZE_ID,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = vec![self.id(), SEPARATOR];
        match self {
            Self::Create(md) => out.extend_from_slice(&md.serialize()?),
            Self::IncreaseSize { size, append } => {
                let flag = if *append { TRUE_CHAR } else { FALSE_CHAR };
                out.extend_from_slice(format!("{size}{PARAM_SEPARATOR}{flag}").as_bytes());
            }
            Self::DecreaseSize { size } => out.extend_from_slice(size.to_string().as_bytes()),
        }
        Ok(out)
    }

    /// Parse an operand. Anything malformed is a corrupt record.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let [id, sep, params @ ..] = bytes else {
            return Err(Error::corrupt("merge operand too short"));
        };
        if *sep != SEPARATOR {
            return Err(Error::corrupt("merge operand has no separator"));
        }

        match *id {
            Self::CREATE_ID => Ok(Self::Create(Metadata::deserialize(params)?)),
            Self::INCREASE_SIZE_ID => {
                let text = std::str::from_utf8(params)
                    .map_err(|_| Error::corrupt("increase operand is not text"))?;
                let (size, flag) = text
                    .split_once(PARAM_SEPARATOR)
                    .ok_or_else(|| Error::corrupt(format!("bad increase operand {text:?}")))?;
                let append = match flag {
                    TRUE_CHAR => true,
                    FALSE_CHAR => false,
                    _ => return Err(Error::corrupt(format!("bad append flag {flag:?}"))),
                };
                Ok(Self::IncreaseSize {
                    size: parse_size(size)?,
                    append,
                })
            }
            Self::DECREASE_SIZE_ID => {
                let text = std::str::from_utf8(params)
                    .map_err(|_| Error::corrupt("decrease operand is not text"))?;
                Ok(Self::DecreaseSize {
                    size: parse_size(text)?,
                })
            }
            other => Err(Error::corrupt(format!(
                "unknown merge operand id {:?}",
                other as char
            ))),
        }
    }
}

fn parse_size(text: &str) -> Result<u64> {
    text.parse()
        .map_err(|_| Error::corrupt(format!("bad size {text:?} in merge operand")))
}

/// Fold callback used by a key-value store for `merge`
pub trait MergeOperator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fold `operands`, in enqueue order, onto the current value of `key`
    fn full_merge(&self, key: &str, existing: Option<&[u8]>, operands: &[&[u8]]) -> Result<Vec<u8>>;
}

/// Fold for metadata records
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataMergeOperator;

impl MetadataMergeOperator {
    /// Fold already decoded operands onto an optional base record
    pub fn fold(
        key: &str,
        mut base: Option<Metadata>,
        operands: impl IntoIterator<Item = MergeOperand>,
    ) -> Result<Metadata> {
        for operand in operands {
            match operand {
                MergeOperand::Create(md) => {
                    // first creator wins
                    if base.is_none() {
                        base = Some(md);
                    }
                }
                MergeOperand::IncreaseSize { size, append } => {
                    let md = base.as_mut().ok_or_else(|| Error::not_found(key))?;
                    md.size = if append {
                        md.size.checked_add(size).ok_or_else(|| {
                            Error::invalid_argument(format!(
                                "appending {size} bytes to {key} overflows"
                            ))
                        })?
                    } else {
                        md.size.max(size)
                    };
                }
                MergeOperand::DecreaseSize { size } => {
                    let md = base.as_mut().ok_or_else(|| Error::not_found(key))?;
                    md.size = md.size.min(size);
                }
            }
        }
        base.ok_or_else(|| Error::not_found(key))
    }
}

impl MergeOperator for MetadataMergeOperator {
    fn name(&self) -> &'static str {
        "MetadataMergeOperator"
    }

    fn full_merge(&self, key: &str, existing: Option<&[u8]>, operands: &[&[u8]]) -> Result<Vec<u8>> {
        let base = existing.map(Metadata::deserialize).transpose()?;
        let operands = operands
            .iter()
            .map(|op| MergeOperand::decode(op))
            .collect::<Result<Vec<_>>>()?;
        Self::fold(key, base, operands)?.serialize()
    }
}
