//! # dat-rs
//!
//! A mutable double-array trie mapping byte strings to fixed-width values.
//!
//! Nodes live in a flat array of units grouped into 256-slot blocks. A child
//! on character `c` sits at `base ^ c`, so one node's children always share a
//! block. Free slots are found with a bit-parallel search over each block's
//! empty-slot bitmap, and colliding sibling groups are relocated rather than
//! rebuilt.
//!
//! Two label layouts are available:
//!
//! - **MP-trie** (default): one node per character until a key's remaining
//!   suffix is unique, which is then stored as a single suffix label.
//! - **Patricia**: runs of single-child nodes collapse into internal labels
//!   that carry the base of the node below them.
//!
//! ## Example
//!
//! ```rust
//! use dat_rs::{Config, DaTrie};
//!
//! let mut t: DaTrie<u64> = DaTrie::with_config(Config::patricia());
//! t.insert(b"hello", 1).unwrap();
//! t.insert(b"help", 2).unwrap();
//! t.insert(b"world", 3).unwrap();
//!
//! assert_eq!(t.get(b"help"), Some(2));
//! assert_eq!(t.remove(b"hello"), Some(1));
//!
//! let keys: Vec<Vec<u8>> = t.keys().collect();
//! assert_eq!(keys, vec![b"help".to_vec(), b"world".to_vec()]);
//! ```
//!
//! The byte `0x00` terminates keys internally and cannot appear inside one.

#![deny(unsafe_op_in_unsafe_fn)]

pub mod arena;
mod block;
mod config;
mod container;
mod error;
mod finder;
mod shared;
mod trie;
mod unit;
mod value;

pub use arena::Arena;
pub use config::{Addressing, BaseSearch, Config, SiblingOrder, Variant, DEFAULT_MAX_TRIALS};
pub use error::{Error, Result};
pub use shared::SharedDict;
pub use trie::{DaTrie, Iter, TrieStats};
pub use value::Value;

#[cfg(test)]
mod proptests;
