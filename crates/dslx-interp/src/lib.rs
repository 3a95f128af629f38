//! DSLX interpreter and proc-network execution engine.
//!
//! Evaluates functions of a type-checked module directly from the AST and
//! simulates networks of communicating procs.
//!
//! ```text
//! TypecheckedModule → Interpreter ─┬─ run_function ─→ Evaluator
//!                                  └─ run_test_proc ─→ Elaborator → Scheduler
//! ```

mod builtins;
pub mod channel;
pub mod effects;
pub mod elaborator;
pub mod env;
pub mod error;
pub mod evaluator;
pub mod interpreter;
pub mod options;
pub mod parametric;
pub mod proc_id;
pub mod scheduler;
pub mod test_runner;
pub mod value;

pub use channel::{ChannelTable, FlowControl};
pub use elaborator::{Elaboration, ProcInstance};
pub use error::{BacktraceFrame, EvalError, EvalResult, Failure, FailureKind};
pub use interpreter::Interpreter;
pub use options::InterpreterOptions;
pub use parametric::SymbolicBindings;
pub use proc_id::ProcId;
pub use scheduler::ProcRunSummary;
pub use test_runner::{run_tests, TestResult, TestRunSummary};
pub use value::{Bits, ConcreteType, Value};
