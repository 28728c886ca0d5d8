//! # LANTERN Files
//!
//! File-boundary collaborators for the LANTERN protocol.
//!
//! This crate provides:
//! - Staging a local file for streaming (bytes, MIME lookup, SHA-256 digest)
//! - SHA-256 helpers for integrity verification
//! - Safe persistence of reconstructed files (filename sanitisation,
//!   collision-free naming)
//!
//! The codec itself never touches the filesystem; everything here sits on
//! the host side of that boundary.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod hasher;
pub mod save;
pub mod stage;

pub use save::{sanitize_filename, save_to_dir};
pub use stage::{mime_for_path, StagedFile};

/// Default payload size for barcode-sized frames (bytes).
pub const DEFAULT_BLOCK_SIZE: u16 = 200;
