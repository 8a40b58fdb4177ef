//! `test` and `assert` rules and the runner finalizer

use rustc_hash::FxHashSet;
use tracing::debug;
use wv_expand::{Entry, ExpandError, Expansion, FinalizeContext, InvocationContext, RuleTable, Shape};
use wv_tree::{Invocation, Literal, Name, Node};

/// Registry tag of accumulated test cases
pub const TEST_TAG: &str = "test";

/// Operators `assert` has a dedicated rule for
pub const COMPARISONS: [&str; 6] = ["==", "!=", "<", ">", "<=", ">="];

/// Table holding every harness rule
///
/// # Errors
///
/// Never fails on a fresh table; see [`register`]
pub fn rules() -> Result<RuleTable, ExpandError> {
    let mut table = RuleTable::new("testkit");
    register(&mut table)?;
    Ok(table)
}

/// Adds the harness rules to `table`
///
/// # Errors
///
/// Returns `DuplicateRule` if `table` already holds one of them
pub fn register(table: &mut RuleTable) -> Result<(), ExpandError> {
    table.register(TEST_TAG, Shape::fixed(1).with_block(), test_case)?;
    table.register("assert", Shape::fixed(1), assert_truthy)?;
    for op in COMPARISONS {
        table.register("assert", Shape::fixed(1).when_first_calls(op), assert_comparison)?;
    }
    Ok(())
}

/// `test "description" do body end`
///
/// Accumulates `{:"test description", "description"}` and defines the case
/// function.
///
/// # Errors
///
/// Rejects a non-text description or a block without `do`
pub fn test_case(call: &Invocation, cx: &mut InvocationContext<'_>) -> Result<Expansion, ExpandError> {
    let description: String = call
        .args
        .first()
        .and_then(Node::decode)
        .ok_or_else(|| cx.reject("test description must be text"))?;
    let body = call
        .keyword("do")
        .cloned()
        .ok_or_else(|| cx.reject("expected a do block"))?;

    let function = Name::new(format!("test {description}"));
    cx.accumulate(Entry::new(
        TEST_TAG,
        Node::pair(Node::atom(function.clone()), Node::text(description)),
    ))?;

    Ok(Expansion::new(Node::call(
        "def",
        vec![Node::atom(function), Node::seq(Vec::new()), Node::placeholder("body")],
    ))
    .bind("body", body))
}

/// `assert (op left right)` for a comparison operator
///
/// # Errors
///
/// Rejects a comparison without exactly two operands
pub fn assert_comparison(call: &Invocation, cx: &mut InvocationContext<'_>) -> Result<Expansion, ExpandError> {
    let Some(Node::Invocation(comparison)) = call.args.first() else {
        return Err(cx.reject("expected a comparison"));
    };
    let [left, right] = comparison.args.as_slice() else {
        return Err(cx.reject(format!("`{}` needs exactly two operands", comparison.name())));
    };
    let op = comparison.name().clone();

    let check = Node::call(
        op.clone(),
        vec![Node::placeholder("left"), Node::placeholder("right")],
    );
    let failure = Node::call(
        "fail",
        vec![
            Node::text(op.as_str()),
            Node::placeholder("left"),
            Node::placeholder("right"),
        ],
    );
    Ok(Expansion::new(Node::call("if", vec![Node::call("not", vec![check]), failure]))
        .bind("left", left.clone())
        .bind("right", right.clone())
        .eager())
}

/// `assert value`
///
/// # Errors
///
/// Never fails
pub fn assert_truthy(call: &Invocation, _cx: &mut InvocationContext<'_>) -> Result<Expansion, ExpandError> {
    let failure = Node::call("fail", vec![Node::text("assert"), Node::placeholder("value")]);
    Ok(Expansion::new(Node::call(
        "if",
        vec![Node::call("not", vec![Node::placeholder("value")]), failure],
    ))
    .bind("value", call.args[0].clone())
    .eager())
}

/// Generates `(def run [] [(run_case "description" :"test description") ...])`
///
/// # Errors
///
/// Rejects two cases with the same description
pub fn finalize_runner(entries: &[Entry], cx: &mut FinalizeContext<'_>) -> Result<Expansion, ExpandError> {
    let mut seen = FxHashSet::default();
    let mut cases = Vec::new();
    for entry in entries.iter().filter(|entry| entry.tag == TEST_TAG) {
        let Node::Literal(Literal::Pair(function, description)) = &entry.value else {
            return Err(cx.reject(format!("malformed test entry {}", entry.value)));
        };
        if !seen.insert(description.clone()) {
            return Err(cx.reject(format!("test {description} is defined more than once")));
        }
        cases.push(Node::call(
            "run_case",
            vec![(**description).clone(), (**function).clone()],
        ));
    }
    debug!(unit = %cx.unit(), cases = cases.len(), "generating test runner");

    Ok(Expansion::new(Node::call(
        "def",
        vec![Node::atom("run"), Node::seq(Vec::new()), Node::seq(cases)],
    )))
}
