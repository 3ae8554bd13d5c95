//! ScatterFS Placement - deciding which host owns what
//!
//! A distributor is a pure function from a path, or a `(path, chunk)` pair,
//! to host identifiers. There is no coordinator: every host and client runs
//! the same distributor with the same configuration and therefore agrees on
//! ownership.
//!
//! # Distributors
//!
//! ## Simple hash
//! `hash(path) mod host_count` for metadata, `hash(path ++ chunk) mod
//! host_count` for data. Stateless and uniform.
//!
//! ## Local only
//! Everything lives on the local host. Single-node and test deployments.
//!
//! ## Guided
//! An explicit `(path, chunk) -> host` override table loaded at startup,
//! falling back to the simple hash rule on a miss.
//!
//! # Example
//! ```
//! use scatterfs_placement::{Distributor, SimpleHashDistributor};
//!
//! let distributor = SimpleHashDistributor::new(0, 4).unwrap();
//! let owner = distributor.locate_data("/data/file", 7);
//! assert!(owner < 4);
//! ```

pub mod distributor;
pub mod guided;
pub mod simple;

pub use distributor::{Distributor, build_distributor};
pub use guided::{GuidedDistributor, GuidedMapping};
pub use simple::{LocalOnlyDistributor, SimpleHashDistributor};
