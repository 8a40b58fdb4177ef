//! Integration test utilities for Weave
//!
//! A [`Fixture`] bundles a session whose global table holds the harness
//! rules plus a handful of small rules written to make expansion behavior
//! observable once the output is evaluated.

use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use wv_eval::{Interpreter, Value};
use wv_expand::{
    Entry, ExpandError, Expansion, ExpansionSession, InvocationContext, RuleTable, Shape, mark_caller_scope,
};
use wv_tree::{Invocation, Literal, Node};

/// Test fixture helper
pub struct Fixture {
    /// Session over [`rules`]
    pub session: ExpansionSession,
    /// Number of `(tick)` calls evaluated so far
    ticks: Arc<AtomicUsize>,
}

impl Fixture {
    /// Creates a fixture over [`rules`]
    ///
    /// # Errors
    ///
    /// Returns an error if rule registration fails
    pub fn new() -> Result<Self> {
        Ok(Self {
            session: ExpansionSession::new(rules()?),
            ticks: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Expands `tree` in a fresh unit and finalizes it
    ///
    /// # Errors
    ///
    /// Returns the first expansion or finalize error
    pub fn expand(&self, unit: &str, tree: &Node) -> Result<Node, ExpandError> {
        let mut unit = self.session.unit(unit);
        let expanded = unit.expand(tree)?;
        unit.finalize()?;
        Ok(expanded)
    }

    /// Interpreter with the `tick` native wired to this fixture's counter
    pub fn interpreter(&self) -> Interpreter {
        let ticks = Arc::clone(&self.ticks);
        let mut interp = Interpreter::new();
        interp.define_native("tick", move |_interp, _args| {
            let count = ticks.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Value::Int(i64::try_from(count).unwrap_or(i64::MAX)))
        });
        interp
    }

    /// Expands and evaluates `tree`
    ///
    /// # Errors
    ///
    /// Returns an error if expansion or evaluation fails
    pub fn run(&self, tree: &Node) -> Result<Value> {
        let expanded = self.expand("main", tree)?;
        Ok(self.interpreter().eval(&expanded)?)
    }

    /// Number of `(tick)` calls evaluated so far
    pub fn ticks(&self) -> usize {
        self.ticks.load(Ordering::SeqCst)
    }
}

/// Harness rules plus the fixture rules
///
/// # Errors
///
/// Returns `DuplicateRule` if two rules collide
pub fn rules() -> Result<RuleTable, ExpandError> {
    let mut table = RuleTable::new("fixture");
    wv_testkit::register(&mut table)?;
    table.register("set_name", Shape::fixed(0), set_name)?;
    table.register("set_name!", Shape::fixed(0), set_name_escaped)?;
    table.register("clobber!", Shape::fixed(0), clobber)?;
    table.register("with_result", Shape::fixed(0), with_result)?;
    table.register("bump!", Shape::fixed(0), bump)?;
    table.register("triple", Shape::variadic(1), triple)?;
    table.register("simplify", Shape::fixed(1).when_first_calls("+"), simplify_sum)?;
    table.register("simplify", Shape::fixed(1).when_first_calls("*"), simplify_product)?;
    table.register("record", Shape::fixed(1), record)?;
    table.register("wrap", Shape::fixed(1), wrap)?;
    table.register("forever", Shape::fixed(0), forever)?;
    Ok(table)
}

/// `(set_name)` writes `(= name "Max")` with `name` renamed
pub fn set_name(_call: &Invocation, _cx: &mut InvocationContext<'_>) -> Result<Expansion, ExpandError> {
    Ok(Expansion::new(Node::call(
        "=",
        vec![Node::ident("name"), Node::text("Max")],
    )))
}

/// `(set_name!)` writes `(= name "Max")` into the caller's `name`
pub fn set_name_escaped(_call: &Invocation, _cx: &mut InvocationContext<'_>) -> Result<Expansion, ExpandError> {
    Ok(Expansion::new(Node::call(
        "=",
        vec![mark_caller_scope(Node::ident("name")), Node::text("Max")],
    )))
}

/// `(clobber!)` escapes a name no caller writes
pub fn clobber(_call: &Invocation, _cx: &mut InvocationContext<'_>) -> Result<Expansion, ExpandError> {
    Ok(Expansion::new(Node::call(
        "=",
        vec![mark_caller_scope(Node::ident("nowhere")), Node::int(1)],
    )))
}

/// `(with_result)` binds its own `result`, lets `bump!` change it and
/// returns it
pub fn with_result(_call: &Invocation, _cx: &mut InvocationContext<'_>) -> Result<Expansion, ExpandError> {
    Ok(Expansion::new(Node::call(
        "__block__",
        vec![
            Node::call("=", vec![Node::ident("result"), Node::int(0)]),
            Node::call("bump!", vec![]),
            Node::ident("result"),
        ],
    )))
}

/// `(bump!)` sets `result` in whatever scope invoked it
pub fn bump(_call: &Invocation, _cx: &mut InvocationContext<'_>) -> Result<Expansion, ExpandError> {
    Ok(Expansion::new(Node::call(
        "=",
        vec![mark_caller_scope(Node::ident("result")), Node::int(41)],
    )))
}

/// `(triple expr)` sums three copies of `expr`; `(triple expr [eager: true])`
/// evaluates it once
pub fn triple(call: &Invocation, _cx: &mut InvocationContext<'_>) -> Result<Expansion, ExpandError> {
    let value = Node::placeholder("value");
    let template = Node::call(
        "+",
        vec![Node::call("+", vec![value.clone(), value.clone()]), value],
    );
    let expansion = Expansion::new(template).bind("value", call.args[0].clone());
    Ok(match call.keyword("eager") {
        Some(Node::Literal(Literal::Bool(true))) => expansion.eager(),
        _ => expansion.late(),
    })
}

/// `(simplify (+ ...))`
pub fn simplify_sum(_call: &Invocation, _cx: &mut InvocationContext<'_>) -> Result<Expansion, ExpandError> {
    Ok(Expansion::new(Node::atom("sum")))
}

/// `(simplify (* ...))`
pub fn simplify_product(_call: &Invocation, _cx: &mut InvocationContext<'_>) -> Result<Expansion, ExpandError> {
    Ok(Expansion::new(Node::atom("product")))
}

/// `(record value)` accumulates `value` under the `seen` tag
pub fn record(call: &Invocation, cx: &mut InvocationContext<'_>) -> Result<Expansion, ExpandError> {
    cx.accumulate(Entry::new("seen", call.args[0].clone()))?;
    Ok(Expansion::new(Node::atom("recorded")))
}

/// `(wrap expr)` defers `expr` by one expansion step
pub fn wrap(call: &Invocation, _cx: &mut InvocationContext<'_>) -> Result<Expansion, ExpandError> {
    Ok(Expansion::new(Node::call("__block__", vec![Node::placeholder("inner")]))
        .bind("inner", call.args[0].clone()))
}

/// `(forever)` expands to itself
pub fn forever(_call: &Invocation, _cx: &mut InvocationContext<'_>) -> Result<Expansion, ExpandError> {
    Ok(Expansion::new(Node::call("forever", vec![])))
}
