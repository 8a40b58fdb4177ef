//! Harness errors

use miette::Diagnostic;
use wv_eval::{EvalError, Value};
use wv_expand::ExpandError;

/// Error compiling or running a test unit
///
/// A failing assertion is not an error; it is reported in the
/// [`TestReport`](crate::TestReport).
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum TestkitError {
    /// Expansion or finalize failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Expand(#[from] ExpandError),

    /// The program failed outside of any test case
    #[error("runner failed: {0}")]
    #[diagnostic(code(testkit::runner))]
    Eval(#[from] EvalError),

    /// `run` returned something other than a list of case results
    #[error("runner returned {0}, expected a list of case results")]
    #[diagnostic(code(testkit::malformed_report))]
    MalformedReport(Value),
}
