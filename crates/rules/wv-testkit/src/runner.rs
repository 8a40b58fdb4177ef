//! Compiling test units and running them

use crate::error::TestkitError;
use crate::rules::finalize_runner;
use std::fmt;
use wv_eval::{EvalError, Interpreter, Value};
use wv_expand::{ExpandError, ExpansionSession};
use wv_tree::{Name, Node};

/// How one case ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Every assertion held
    Passed,
    /// An assertion failed or the body raised an error
    Failed(String),
}

/// Result of one test case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseResult {
    /// Description given to `test`
    pub description: String,
    /// Outcome
    pub outcome: Outcome,
}

/// Results of a whole unit, in source order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestReport {
    /// One entry per case
    pub cases: Vec<CaseResult>,
}

impl TestReport {
    /// Cases that passed
    pub fn passed(&self) -> impl Iterator<Item = &CaseResult> {
        self.cases
            .iter()
            .filter(|case| case.outcome == Outcome::Passed)
    }

    /// Cases that failed
    pub fn failed(&self) -> impl Iterator<Item = &CaseResult> {
        self.cases
            .iter()
            .filter(|case| case.outcome != Outcome::Passed)
    }

    /// Whether no case failed
    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }
}

impl fmt::Display for TestReport {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failures = self.failed().count();
        write!(
            formatter,
            "{} {}, {} {}",
            self.cases.len(),
            if self.cases.len() == 1 { "test" } else { "tests" },
            failures,
            if failures == 1 { "failure" } else { "failures" }
        )
    }
}

/// Expands `trees` as one unit and appends the generated runner
///
/// The result is a single block holding every expanded tree followed by
/// the `run` definition.
///
/// # Errors
///
/// Returns the first expansion or finalize error; the unit is aborted
pub fn compile(session: &ExpansionSession, unit: &str, trees: &[Node]) -> Result<Node, ExpandError> {
    let mut unit = session.unit(unit);
    unit.set_finalizer(finalize_runner)?;

    let mut program = Vec::with_capacity(trees.len() + 1);
    for tree in trees {
        program.push(unit.expand(tree)?);
    }
    program.push(unit.finalize()?);
    Ok(Node::call(session.config().splice_forms.block.clone(), program))
}

/// Defines the `run_case` and `fail` natives
pub fn install(interp: &mut Interpreter) {
    interp.define_native("run_case", run_case);
    interp.define_native("fail", fail);
}

/// Evaluates a compiled program and runs its cases
///
/// # Errors
///
/// Returns an error if the program fails outside any case or has no runner
pub fn run(program: &Node) -> Result<TestReport, TestkitError> {
    run_with(&mut Interpreter::new(), program)
}

/// [`run`] on an interpreter the caller has prepared, e.g. with extra natives
///
/// # Errors
///
/// Returns an error if the program fails outside any case or has no runner
pub fn run_with(interp: &mut Interpreter, program: &Node) -> Result<TestReport, TestkitError> {
    install(interp);
    interp.eval(program)?;

    let results = interp.call("run", &[])?;
    let Value::List(results) = results else {
        return Err(TestkitError::MalformedReport(results));
    };
    let cases = results
        .into_iter()
        .map(|result| match result {
            Value::Pair(description, outcome) => match (*description, *outcome) {
                (Value::Text(description), Value::Atom(ok)) if ok == "ok" => Ok(CaseResult {
                    description,
                    outcome: Outcome::Passed,
                }),
                (Value::Text(description), Value::Text(message)) => Ok(CaseResult {
                    description,
                    outcome: Outcome::Failed(message),
                }),
                (description, outcome) => Err(TestkitError::MalformedReport(Value::Pair(
                    Box::new(description),
                    Box::new(outcome),
                ))),
            },
            other => Err(TestkitError::MalformedReport(other)),
        })
        .collect::<Result<_, _>>()?;
    Ok(TestReport { cases })
}

/// `(run_case "description" :function)` returns `{"description", :ok}` or
/// `{"description", "message"}`
fn run_case(interp: &mut Interpreter, args: &[Value]) -> Result<Value, EvalError> {
    let [Value::Text(description), Value::Atom(function)] = args else {
        return Err(EvalError::InvalidForm {
            form: Name::new("run_case"),
            message: "expected a description and a function atom".to_owned(),
        });
    };
    let outcome = match interp.call(function, &[]) {
        Ok(_) => Value::Atom(Name::new("ok")),
        Err(EvalError::AssertionFailed(message)) => Value::Text(message),
        Err(err) => Value::Text(err.to_string()),
    };
    Ok(Value::Pair(
        Box::new(Value::Text(description.clone())),
        Box::new(outcome),
    ))
}

/// `(fail "op" left right)` or `(fail "assert" value)`
fn fail(_interp: &mut Interpreter, args: &[Value]) -> Result<Value, EvalError> {
    let message = match args {
        [Value::Text(op), left, right] => {
            format!("assertion with {op} failed\n  left:  {left}\n  right: {right}")
        }
        [_, value] => format!("expected a truthy value, got {value}"),
        _ => "assertion failed".to_owned(),
    };
    Err(EvalError::AssertionFailed(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{TEST_TAG, rules};

    fn test_block(description: &str, body: Node) -> Node {
        Node::call(TEST_TAG, vec![Node::text(description), Node::do_block(body)])
    }

    fn assert_eq_node(left: Node, right: Node) -> Node {
        Node::call("assert", vec![Node::call("==", vec![left, right])])
    }

    #[test]
    fn test_report_of_passing_and_failing_cases() {
        let session = ExpansionSession::new(rules().unwrap());
        let program = compile(
            &session,
            "math",
            &[
                test_block("adds", assert_eq_node(Node::call("+", vec![Node::int(1), Node::int(1)]), Node::int(2))),
                test_block("subtracts", assert_eq_node(Node::call("-", vec![Node::int(3), Node::int(1)]), Node::int(1))),
            ],
        )
        .unwrap();
        let report = run(&program).unwrap();

        assert_eq!(report.to_string(), "2 tests, 1 failure");
        assert_eq!(report.passed().next().unwrap().description, "adds");
        let failure = report.failed().next().unwrap();
        assert_eq!(failure.description, "subtracts");
        assert_eq!(
            failure.outcome,
            Outcome::Failed("assertion with == failed\n  left:  2\n  right: 1".to_owned())
        );
        assert!(!report.is_success());
    }

    #[test]
    fn test_errors_inside_a_case_fail_only_that_case() {
        let session = ExpansionSession::new(rules().unwrap());
        let program = compile(
            &session,
            "errors",
            &[
                test_block("divides", Node::call("/", vec![Node::int(1), Node::int(0)])),
                test_block("truthy", Node::call("assert", vec![Node::bool(true)])),
            ],
        )
        .unwrap();
        let report = run(&program).unwrap();
        assert_eq!(
            report.cases,
            vec![
                CaseResult {
                    description: "divides".to_owned(),
                    outcome: Outcome::Failed("division by zero".to_owned()),
                },
                CaseResult {
                    description: "truthy".to_owned(),
                    outcome: Outcome::Passed,
                },
            ]
        );
    }

    #[test]
    fn test_empty_unit_has_empty_report() {
        let session = ExpansionSession::new(rules().unwrap());
        let program = compile(&session, "empty", &[]).unwrap();
        let report = run(&program).unwrap();
        assert!(report.is_success());
        assert_eq!(report.to_string(), "0 tests, 0 failures");
    }
}
