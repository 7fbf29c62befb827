//! Binary patching and signature verification for directory trees.
//!
//! This crate implements the wharf patch/rediff protocol: build a compact
//! per-block [`signature`] of a directory tree, compute a [`patch`] from one
//! tree to another using rsync-style block matching, optionally tighten that
//! patch with the [`patch::rediff`] engine's suffix-array-backed byte diff,
//! and apply patches back onto a tree via [`Patch::apply`].
//!
//! <https://docs.itch.zone/wharf/master/index.html>

pub mod cancel;
pub mod codec;
pub mod container;
pub mod error;
pub mod hash;
pub mod hasher;
pub mod info;
pub mod patch;
pub mod pool;
pub mod progress;
pub mod signature;
pub mod url;

mod common;
mod protos;

pub use common::{BLOCK_SIZE, MAGIC_PATCH, MAGIC_SIGNATURE};
pub use error::{Error, Result};
pub use patch::{ApplyContext, DiffContext, Patch, RediffContext};
pub use pool::{FsPool, MemPool, Pool};
pub use protos::{bsdiff, pwr, tlc};
pub use signature::Signature;
