//! Shared types for the DSLX toolchain core.
//!
//! This crate defines the arena-based AST, source spans, and the
//! front-end error types used by every stage.

mod error;
mod span;
pub mod ast;

pub use error::{CompileErrors, DslxError, ErrorCategory, ErrorCode, MAX_ERRORS};
pub use span::{Pos, SourceFile, Span};

/// Result type used throughout the front end.
pub type Result<T> = std::result::Result<T, DslxError>;
