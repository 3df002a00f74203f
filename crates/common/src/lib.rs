//! Common types shared across the NeuroRAG crates.
//!
//! Every library crate reports failures through [`RagError`] so that the
//! HTTP layer can map them onto client or server errors in one place.

pub mod error;

pub use error::{RagError, Result};
