//! Rule-driven tree expansion
//!
//! Rules are registered in a [`RuleTable`] keyed by name and [`Shape`]. The
//! expander rewrites every resolvable invocation in a tree until none remain,
//! renaming identifiers written by each rule into a fresh hygiene scope and
//! splicing caller subtrees into the result.
//!
//! Expansion happens inside a [`CompilationUnit`]. Rules running in a unit
//! may [`accumulate`](InvocationContext::accumulate) entries into its
//! registry; once every tree of the unit has been expanded,
//! [`CompilationUnit::finalize`] hands the sealed registry to the unit's
//! [`Finalizer`] exactly once.
//!
//! ```
//! use wv_expand::{Expansion, InvocationContext, ExpandError, RuleTable, Shape};
//! use wv_tree::{Invocation, Node};
//!
//! fn square(call: &Invocation, _cx: &mut InvocationContext<'_>) -> Result<Expansion, ExpandError> {
//!     Ok(Expansion::new(Node::call("*", vec![Node::placeholder("x"), Node::placeholder("x")]))
//!         .bind("x", call.args[0].clone())
//!         .eager())
//! }
//!
//! let mut rules = RuleTable::default();
//! rules.register("square", Shape::fixed(1), square)?;
//! let expanded = wv_expand::expand(&Node::call("square", vec![Node::int(4)]), &rules)?;
//! assert!(expanded.is_call_to("__block__"));
//! # Ok::<(), ExpandError>(())
//! ```

mod config;
mod error;
mod expand;
mod hygiene;
mod rule;
mod splice;
mod unit;

use std::sync::Arc;
use wv_tree::Node;

pub use config::{DEFAULT_MAX_DEPTH, ExpandConfig, SpliceForms};
pub use error::{ExpandError, NoMatch, UnboundPlaceholder};
pub use hygiene::{HygieneContext, Renamed, mark_caller_scope};
pub use rule::{ArgPattern, Arity, BlockArg, Expansion, Rule, RuleId, RuleTable, Shape, Transform};
pub use splice::{Bindings, SpliceEnv, SpliceMode, splice, splice_eager, splice_late};
pub use unit::{
    CompilationUnit, Entry, ExpansionSession, FinalizeContext, Finalizer, InvocationContext, Registry,
    UnitState,
};

/// Expands `tree` against `rules` in a throwaway unit
///
/// Unresolved invocations are left in place as ordinary calls.
///
/// # Errors
///
/// Returns any expansion error, including a caller-scope escape that names
/// nothing in `tree`
pub fn expand(tree: &Node, rules: &RuleTable) -> Result<Node, ExpandError> {
    let mut unit = CompilationUnit::new(
        "<expand>",
        Arc::new(rules.clone()),
        Arc::new(HygieneContext::new()),
        ExpandConfig::default(),
    );
    let expanded = unit.expand(tree)?;
    unit.finalize()?;
    Ok(expanded)
}
