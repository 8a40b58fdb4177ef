//! Assertion-based test harness built from expansion rules
//!
//! `test "description" do ... end` registers a case by accumulating it into
//! the unit's registry and defining a function for its body. Nothing can
//! list every case until the whole unit has been expanded, so the runner
//! function is generated by the unit's finalizer:
//!
//! ```text
//! (def run [] [(run_case "adds" :"test adds") ...])
//! ```
//!
//! `assert` has one rule per comparison operator. Each binds both operands
//! once, so an operand with side effects runs exactly once even though the
//! failure message reports it again.

mod error;
mod rules;
mod runner;

pub use error::TestkitError;
pub use rules::{COMPARISONS, TEST_TAG, assert_comparison, assert_truthy, finalize_runner, register, rules, test_case};
pub use runner::{CaseResult, Outcome, TestReport, compile, install, run, run_with};
