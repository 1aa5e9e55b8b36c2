//! # negato-core
//!
//! Core types for the negato toolbox: shared data structures used across all
//! crates.
//!
//! This crate provides:
//! - **Annotation types**: `Token`, `Cue`, `Scope`, `CharSpan`, `ScopeRole`
//! - **Rule taxonomy**: the `Group` semantic categories
//! - **Errors**: the shared `Error`/`Result` pair
//!
//! All other crates in the negato workspace depend on `negato-core` to ensure
//! type compatibility across the toolbox.

pub mod annotation;
pub mod error;

// Re-exports for convenience
pub use annotation::{CharSpan, Cue, Group, Scope, ScopeRole, SentenceAnnotation, Token};
pub use error::{Error, Result};
