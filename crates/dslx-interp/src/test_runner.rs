//! DSLX test runner: executes `#[test]` functions and `#![test_proc()]`
//! procs of a module.

use serde::Serialize;
use tracing::info;

use crate::interpreter::Interpreter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    Function,
    Proc,
}

/// Result of running a single test.
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub name: String,
    pub kind: TestKind,
    pub passed: bool,
    /// The rendered failure, backtrace included.
    pub error: Option<String>,
}

impl std::fmt::Display for TestResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.passed {
            write!(f, "  ✓ {}", self.name)
        } else {
            write!(
                f,
                "  ✗ {}: {}",
                self.name,
                self.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

/// Summary of running every test in a module.
#[derive(Debug, Serialize)]
pub struct TestRunSummary {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
}

impl std::fmt::Display for TestRunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for r in &self.results {
            writeln!(f, "{r}")?;
        }
        writeln!(f, "\n{} passed, {} failed", self.passed, self.failed)
    }
}

/// Run test functions, then test procs, each in declaration order.
pub fn run_tests(interp: &mut Interpreter) -> TestRunSummary {
    let functions: Vec<String> = interp
        .module()
        .test_functions()
        .map(|f| interp.module().function(f).name.name.clone())
        .collect();
    let procs: Vec<String> = interp
        .module()
        .test_procs()
        .map(|p| interp.module().proc_decl(p).name.name.clone())
        .collect();

    let mut results = Vec::with_capacity(functions.len() + procs.len());
    for name in functions {
        let outcome = interp.run_function(&name, Vec::new()).map(|_| ());
        results.push(TestResult {
            passed: outcome.is_ok(),
            error: outcome.err().map(|e| e.to_string()),
            name,
            kind: TestKind::Function,
        });
    }
    for name in procs {
        let outcome = interp.run_test_proc(&name).map(|_| ());
        results.push(TestResult {
            passed: outcome.is_ok(),
            error: outcome.err().map(|e| e.to_string()),
            name,
            kind: TestKind::Proc,
        });
    }

    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.len() - passed;
    info!(passed, failed, "test run finished");
    TestRunSummary {
        results,
        passed,
        failed,
    }
}
