use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of errors reported before fail-fast.
pub const MAX_ERRORS: usize = 20;

/// Error category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Syntax,
    Type,
    Name,
    Structure,
}

/// Numeric error code (E100–E499).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Syntax errors (E100–E199) ──
    pub const UNEXPECTED_TOKEN: Self = Self(100);
    pub const UNCLOSED_DELIMITER: Self = Self(101);
    pub const INVALID_LITERAL: Self = Self(102);
    pub const UNKNOWN_ATTRIBUTE: Self = Self(103);

    // ── Type errors (E200–E299) ──
    pub const UNKNOWN_TYPE: Self = Self(200);
    pub const TYPE_MISMATCH: Self = Self(201);
    pub const WRONG_ARG_COUNT: Self = Self(202);
    pub const LITERAL_DOES_NOT_FIT: Self = Self(203);
    pub const CANNOT_INFER: Self = Self(204);
    pub const NOT_INDEXABLE: Self = Self(205);

    // ── Name errors (E300–E399) ──
    pub const UNDEFINED_NAME: Self = Self(300);
    pub const DUPLICATE_DEFINITION: Self = Self(301);
    pub const UNKNOWN_FIELD: Self = Self(302);

    // ── Structure errors (E400–E499) ──
    pub const MALFORMED_PROC: Self = Self(400);
    pub const SPAWN_OUTSIDE_CONFIG: Self = Self(401);
    pub const RECURSION_NOT_ALLOWED: Self = Self(402);

    /// Get the category for this error code.
    pub fn category(self) -> ErrorCategory {
        match self.0 {
            100..=199 => ErrorCategory::Syntax,
            200..=299 => ErrorCategory::Type,
            300..=399 => ErrorCategory::Name,
            _ => ErrorCategory::Structure,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// A structured front-end error (lexing, parsing, or type deduction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DslxError {
    /// Source file name.
    pub file: String,
    pub code: ErrorCode,
    /// Error category (derived from code).
    pub category: ErrorCategory,
    pub message: String,
    #[serde(flatten)]
    pub span: Span,
    /// The exact source line for context.
    pub source_line: String,
}

impl DslxError {
    /// Create a new error.
    pub fn new(
        file: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
        source_line: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            code,
            category: code.category(),
            message: message.into(),
            span,
            source_line: source_line.into(),
        }
    }
}

impl fmt::Display for DslxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} [{}] {}",
            self.span.in_file(&self.file),
            self.code,
            self.category,
            self.message
        )
    }
}

impl std::error::Error for DslxError {}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax"),
            Self::Type => write!(f, "type"),
            Self::Name => write!(f, "name"),
            Self::Structure => write!(f, "structure"),
        }
    }
}

/// Errors collected over one front-end run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileErrors {
    pub errors: Vec<DslxError>,
    pub total_errors: usize,
}

impl CompileErrors {
    /// Create an empty result (no errors).
    pub fn empty() -> Self {
        Self {
            errors: Vec::new(),
            total_errors: 0,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// Add an error, respecting the MAX_ERRORS limit.
    pub fn push_error(&mut self, error: DslxError) {
        if self.errors.len() < MAX_ERRORS {
            self.errors.push(error);
        }
        self.total_errors += 1;
    }

    /// Fold another batch of errors into this one.
    pub fn extend(&mut self, other: CompileErrors) {
        // Errors beyond the cap in `other` still count.
        let dropped = other.total_errors.saturating_sub(other.errors.len());
        for e in other.errors {
            self.push_error(e);
        }
        self.total_errors += dropped;
    }
}

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for e in &self.errors {
            writeln!(f, "{e}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::UNEXPECTED_TOKEN.category(), ErrorCategory::Syntax);
        assert_eq!(ErrorCode::TYPE_MISMATCH.category(), ErrorCategory::Type);
        assert_eq!(ErrorCode::UNDEFINED_NAME.category(), ErrorCategory::Name);
        assert_eq!(ErrorCode::MALFORMED_PROC.category(), ErrorCategory::Structure);
    }

    #[test]
    fn test_error_display_includes_file_span() {
        let err = DslxError::new(
            "test.x",
            ErrorCode::TYPE_MISMATCH,
            "expected u32, got u8",
            Span::new(3, 5, 3, 12),
            "  let y: u32 = x;",
        );
        assert_eq!(
            err.to_string(),
            "test.x:3:5-3:12: E201 [type] expected u32, got u8"
        );
    }

    #[test]
    fn test_error_json_serialization() {
        let err = DslxError::new(
            "test.x",
            ErrorCode::UNDEFINED_NAME,
            "undefined name 'foo'",
            Span::new(1, 1, 1, 4),
            "foo",
        );
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"code\":300"));
        assert!(json.contains("\"source_line\":\"foo\""));
        let back: DslxError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code, err.code);
        assert_eq!(back.span, err.span);
    }

    #[test]
    fn test_compile_errors_max_limit() {
        let mut errs = CompileErrors::empty();
        for i in 0..25 {
            errs.push_error(DslxError::new(
                "test.x",
                ErrorCode::UNEXPECTED_TOKEN,
                format!("error {i}"),
                Span::point(i as u32 + 1, 1),
                "",
            ));
        }
        assert_eq!(errs.errors.len(), MAX_ERRORS);
        assert_eq!(errs.total_errors, 25);
    }
}
