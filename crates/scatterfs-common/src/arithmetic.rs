//! Block-alignment arithmetic
//!
//! Chunk sizes are always powers of two, so every helper here reduces to
//! masks and shifts. Callers use these to split an arbitrary byte range into
//! chunk-aligned sub-operations; all functions assume `block_size` is a
//! power of two (checked in debug builds only).

/// Check whether `n` is a power of two
#[must_use]
pub const fn is_power_of_2(n: u64) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// Base-2 logarithm of a power of two
#[must_use]
pub const fn log2(n: u64) -> u32 {
    debug_assert!(is_power_of_2(n));
    63 - n.leading_zeros()
}

/// Check whether `offset` sits on a block boundary
#[must_use]
pub const fn is_aligned(offset: u64, block_size: u64) -> bool {
    debug_assert!(is_power_of_2(block_size));
    offset & (block_size - 1) == 0
}

/// Closest block boundary at or below `offset`
#[must_use]
pub const fn align_down(offset: u64, block_size: u64) -> u64 {
    debug_assert!(is_power_of_2(block_size));
    offset & !(block_size - 1)
}

/// Next block boundary strictly above `offset`, or the last boundary below
/// `u64::MAX` when there is none
#[must_use]
pub const fn align_up(offset: u64, block_size: u64) -> u64 {
    align_down(offset.saturating_add(block_size), block_size)
}

/// Distance from the previous block boundary to `offset`
#[must_use]
pub const fn pad_left(offset: u64, block_size: u64) -> u64 {
    debug_assert!(is_power_of_2(block_size));
    offset & (block_size - 1)
}

/// Distance from `offset` to the next block boundary, 0 when aligned
#[must_use]
pub const fn pad_right(offset: u64, block_size: u64) -> u64 {
    debug_assert!(is_power_of_2(block_size));
    offset.wrapping_neg() & (block_size - 1)
}

/// Index of the block containing `offset`
#[must_use]
pub const fn chunk_index(offset: u64, block_size: u64) -> u64 {
    align_down(offset, block_size) >> log2(block_size)
}

/// End of `[offset, offset + length)`, or `None` if it lies past `u64::MAX`
#[must_use]
pub const fn range_end(offset: u64, length: u64) -> Option<u64> {
    offset.checked_add(length)
}

/// Number of distinct blocks touched by `[offset, offset + length)`.
///
/// A range running past `u64::MAX` is cut off there.
#[must_use]
pub const fn chunk_count(offset: u64, length: u64, block_size: u64) -> u64 {
    let length = clamp_length(offset, length);
    if length == 0 {
        return 0;
    }
    let first = chunk_index(offset, block_size);
    let last = chunk_index(offset + length - 1, block_size);
    last - first + 1
}

/// One chunk-local piece of a logical byte range
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Chunk index
    pub chunk_id: u64,
    /// Offset within the chunk
    pub offset_in_chunk: u64,
    /// Bytes covered within the chunk
    pub len: u64,
    /// Position of this piece within the caller's buffer
    pub buf_offset: u64,
}

/// Split `[offset, offset + length)` into per-chunk pieces, in chunk order.
///
/// No piece crosses a chunk boundary; the pieces are contiguous and their
/// lengths sum to `length`. A range running past `u64::MAX` is cut off
/// there, so callers check [`range_end`] first.
#[must_use]
pub fn split_range(offset: u64, length: u64, block_size: u64) -> Vec<ChunkSpan> {
    let length = clamp_length(offset, length);
    let count = chunk_count(offset, length, block_size);
    let mut spans = Vec::with_capacity(count as usize);
    let mut pos = offset;
    let end = offset + length;
    while pos < end {
        let in_chunk = pad_left(pos, block_size);
        let len = (block_size - in_chunk).min(end - pos);
        spans.push(ChunkSpan {
            chunk_id: chunk_index(pos, block_size),
            offset_in_chunk: in_chunk,
            len,
            buf_offset: pos - offset,
        });
        pos += len;
    }
    spans
}

const fn clamp_length(offset: u64, length: u64) -> u64 {
    let room = u64::MAX - offset;
    if length < room { length } else { room }
}
