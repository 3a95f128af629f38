//! Runtime failures and the evaluator's control-flow error.

use std::fmt;

use dslx_types::Span;
use serde::Serialize;
use thiserror::Error;

/// Closed set of failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A user-level check failed: `assert_eq`, `assert_lt`, `fail!`, or a
    /// test proc reporting `false` on its terminator.
    Assertion,
    /// Something upstream validation should have prevented.
    Internal,
    /// No proc instance can make progress.
    Deadlock,
    /// A recognized construct the interpreter does not implement.
    Unsupported,
    /// The scheduler's round budget ran out.
    RoundLimit,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Assertion => "assertion failure",
            FailureKind::Internal => "internal error",
            FailureKind::Deadlock => "deadlock",
            FailureKind::Unsupported => "unsupported",
            FailureKind::RoundLimit => "round limit exceeded",
        })
    }
}

/// One call site on the path a failure unwound through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BacktraceFrame {
    /// `module::function` containing the call.
    pub qualified_name: String,
    pub file: String,
    /// Span of the call's argument list.
    pub span: Span,
}

impl fmt::Display for BacktraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "via {} @ {}", self.qualified_name, self.span.in_file(&self.file))
    }
}

/// A failure raised at `span` and annotated with call-site frames,
/// innermost first, as it unwinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    pub file: String,
    pub span: Span,
    pub backtrace: Vec<BacktraceFrame>,
    /// The proc instance whose `config`/`next` raised the failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proc_instance: Option<String>,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>, file: &str, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            file: file.to_string(),
            span,
            backtrace: Vec::new(),
            proc_instance: None,
        }
    }

    pub fn internal(message: impl Into<String>, file: &str, span: Span) -> Self {
        Self::new(FailureKind::Internal, message, file, span)
    }

    pub fn push_frame(&mut self, qualified_name: impl Into<String>, file: &str, span: Span) {
        self.backtrace.push(BacktraceFrame {
            qualified_name: qualified_name.into(),
            file: file.to_string(),
            span,
        });
    }

    pub fn in_instance(mut self, instance: impl fmt::Display) -> Self {
        if self.proc_instance.is_none() {
            self.proc_instance = Some(instance.to_string());
        }
        self
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.span.in_file(&self.file), self.kind, self.message)?;
        for frame in &self.backtrace {
            write!(f, "\n  {frame}")?;
        }
        if let Some(instance) = &self.proc_instance {
            write!(f, "\n  in proc instance {instance}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Failure {}

/// What can interrupt evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("{0}")]
    Failure(Box<Failure>),
    /// A `recv` found its channel empty (or a `send` found a full
    /// ready/valid channel); the scheduler retries the tick later.
    #[error("blocked on channel {channel}")]
    Blocked { channel: u32 },
}

impl From<Failure> for EvalError {
    fn from(failure: Failure) -> Self {
        EvalError::Failure(Box::new(failure))
    }
}

impl EvalError {
    /// Convert to a surfaced failure. A stray block outside the scheduler
    /// is an internal error.
    pub fn into_failure(self, file: &str, span: Span) -> Failure {
        match self {
            EvalError::Failure(failure) => *failure,
            EvalError::Blocked { channel } => Failure::internal(
                format!("channel {channel} blocked outside a scheduled proc tick"),
                file,
                span,
            ),
        }
    }
}

/// Result alias for evaluator operations.
pub type EvalResult<T> = Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_rendering() {
        let mut failure = Failure::new(
            FailureKind::Assertion,
            "assert_eq failed: u32:14 != u32:1024",
            "test.x",
            Span::new(4, 11, 4, 33),
        );
        failure.push_frame("test::failer", "test.x", Span::new(4, 20, 4, 33));
        failure.push_frame("test::top", "test.x", Span::new(17, 13, 17, 19));
        assert_eq!(
            failure.to_string(),
            "test.x:4:11-4:33: assertion failure: assert_eq failed: u32:14 != u32:1024\n  \
             via test::failer @ test.x:4:20-4:33\n  \
             via test::top @ test.x:17:13-17:19"
        );
    }

    #[test]
    fn test_stray_block_becomes_internal() {
        let failure = EvalError::Blocked { channel: 2 }.into_failure("t.x", Span::fake());
        assert_eq!(failure.kind, FailureKind::Internal);
    }
}
