//! Interpreter configuration.

use serde::{Deserialize, Serialize};

use crate::channel::FlowControl;

/// Knobs for one [`Interpreter`](crate::Interpreter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterOptions {
    /// Scheduler rounds before a run fails with a round-limit failure.
    pub max_rounds: u64,
    /// Nested user-function calls before evaluation fails.
    pub max_call_depth: usize,
    /// Capture `trace!`/`trace_fmt!` output in the trace log.
    pub trace_enabled: bool,
    /// Policy given to every channel allocated during elaboration.
    pub flow_control: FlowControl,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            max_rounds: 100_000,
            max_call_depth: 512,
            trace_enabled: true,
            flow_control: FlowControl::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let options: InterpreterOptions =
            serde_json::from_str(r#"{ "max_rounds": 10 }"#).expect("valid options");
        assert_eq!(options.max_rounds, 10);
        assert_eq!(options.max_call_depth, 512);
        assert!(options.trace_enabled);
        assert_eq!(options.flow_control, FlowControl::None);
    }
}
