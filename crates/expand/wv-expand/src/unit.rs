//! Compilation units and the accumulate/finalize protocol

use crate::config::ExpandConfig;
use crate::error::ExpandError;
use crate::expand::{Expander, PendingEscape};
use crate::hygiene::HygieneContext;
use crate::rule::{Expansion, RuleId, RuleTable, Shape, Transform};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::{debug, instrument};
use wv_span::FileSpan;
use wv_tree::{Head, Invocation, Metadata, Name, Node, ScopeId};

/// A tagged value contributed to a unit's registry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
    /// Kind of entry, chosen by the contributing rule
    pub tag: Name,
    /// Payload
    pub value: Node,
}

impl Entry {
    /// Creates an entry
    pub fn new(tag: impl Into<Name>, value: Node) -> Self {
        Self {
            tag: tag.into(),
            value,
        }
    }
}

/// Ordered, append-only collection of entries
///
/// Sealed the moment finalize begins; from then on it only hands out
/// snapshots.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<Entry>,
    sealed: bool,
}

impl Registry {
    /// Entries in insertion order
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was accumulated
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, entry: Entry) -> Result<(), Entry> {
        if self.sealed {
            return Err(entry);
        }
        self.entries.push(entry);
        Ok(())
    }

    fn seal(&mut self) -> Vec<Entry> {
        self.sealed = true;
        self.entries.clone()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Lifecycle of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitState {
    /// Accepting rules, expansions and accumulation
    Open,
    /// Finalizer running; the registry is read-only
    Finalizing,
    /// Terminal
    Closed,
}

/// What a transform sees besides its invocation
pub struct InvocationContext<'a> {
    pub(crate) rule: &'a RuleId,
    pub(crate) span: Option<FileSpan>,
    pub(crate) unit: &'a Name,
    pub(crate) registry: &'a mut Registry,
    pub(crate) hygiene: &'a HygieneContext,
}

impl InvocationContext<'_> {
    /// Rule being applied
    pub fn rule(&self) -> &RuleId {
        self.rule
    }

    /// Position of the invocation
    pub fn span(&self) -> Option<FileSpan> {
        self.span
    }

    /// Name of the unit being expanded
    pub fn unit(&self) -> &Name {
        self.unit
    }

    /// Appends `entry` to the unit's registry
    ///
    /// # Errors
    ///
    /// Returns `LateAccumulation` once finalize has begun
    pub fn accumulate(&mut self, entry: Entry) -> Result<(), ExpandError> {
        self.registry
            .push(entry)
            .map_err(|entry| ExpandError::LateAccumulation {
                unit: self.unit.clone(),
                tag: entry.tag,
                rule: Some(self.rule.clone()),
                span: self.span,
            })
    }

    /// Fresh name no caller code can contain
    pub fn gensym(&self, base: &str) -> Name {
        self.hygiene.gensym(base)
    }

    /// Error for malformed input
    pub fn reject(&self, message: impl Into<String>) -> ExpandError {
        ExpandError::Transform {
            rule: self.rule.clone(),
            message: message.into(),
            span: self.span,
        }
    }
}

/// What a finalizer sees besides the registry snapshot
pub struct FinalizeContext<'a> {
    pub(crate) unit: &'a Name,
    pub(crate) hygiene: &'a HygieneContext,
}

impl FinalizeContext<'_> {
    /// Name of the unit being finalized
    pub fn unit(&self) -> &Name {
        self.unit
    }

    /// Fresh name no caller code can contain
    pub fn gensym(&self, base: &str) -> Name {
        self.hygiene.gensym(base)
    }

    /// Error for a registry the finalizer cannot summarize
    pub fn reject(&self, message: impl Into<String>) -> ExpandError {
        ExpandError::Transform {
            rule: RuleId::finalizer(),
            message: message.into(),
            span: None,
        }
    }
}

/// Deferred code generation over the full registry
pub trait Finalizer: Send + Sync {
    /// Builds the unit's closing code from every accumulated entry
    ///
    /// # Errors
    ///
    /// Returns an error if the entries cannot be summarized
    fn finalize(
        &self,
        entries: &[Entry],
        cx: &mut FinalizeContext<'_>,
    ) -> Result<Expansion, ExpandError>;
}

impl<F> Finalizer for F
where
    F: Fn(&[Entry], &mut FinalizeContext<'_>) -> Result<Expansion, ExpandError> + Send + Sync,
{
    fn finalize(
        &self,
        entries: &[Entry],
        cx: &mut FinalizeContext<'_>,
    ) -> Result<Expansion, ExpandError> {
        self(entries, cx)
    }
}

/// Per-expansion bookkeeping for caller-scope escapes
#[derive(Debug, Default)]
pub(crate) struct EscapeLedger {
    /// Identifiers that exist in some scope of this unit
    pub(crate) known: FxHashSet<(Name, Option<ScopeId>)>,
    /// Escapes waiting to be checked at finalize
    pub(crate) pending: Vec<PendingEscape>,
}

impl EscapeLedger {
    fn record_caller_names(&mut self, tree: &Node) {
        tree.walk(&mut |node| {
            if let Some(identifier) = node.as_identifier() {
                if identifier.scope.is_none() {
                    self.known.insert((identifier.name.clone(), None));
                }
            }
        });
    }

    fn check(&self) -> Result<(), ExpandError> {
        for escape in &self.pending {
            if !self.known.contains(&(escape.name.clone(), escape.scope)) {
                return Err(ExpandError::HygieneViolation {
                    name: escape.name.clone(),
                    rule: escape.rule.clone(),
                    span: escape.span,
                });
            }
        }
        Ok(())
    }
}

/// The scope of rule registration, hygiene and accumulation
pub struct CompilationUnit {
    name: Name,
    globals: Arc<RuleTable>,
    locals: RuleTable,
    finalizer: Option<Arc<dyn Finalizer>>,
    registry: Registry,
    hygiene: Arc<HygieneContext>,
    config: ExpandConfig,
    escapes: EscapeLedger,
    state: UnitState,
    finalized: bool,
}

impl CompilationUnit {
    /// Opens a unit over read-only global rules
    pub fn new(
        name: impl Into<Name>,
        globals: Arc<RuleTable>,
        hygiene: Arc<HygieneContext>,
        config: ExpandConfig,
    ) -> Self {
        let name = name.into();
        debug!(unit = %name, "opening compilation unit");
        Self {
            locals: RuleTable::new(name.clone()),
            name,
            globals,
            finalizer: None,
            registry: Registry::default(),
            hygiene,
            config,
            escapes: EscapeLedger::default(),
            state: UnitState::Open,
            finalized: false,
        }
    }

    /// Unit name
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Current lifecycle state
    pub fn state(&self) -> UnitState {
        self.state
    }

    /// Rules registered on this unit only
    pub fn local_rules(&self) -> &RuleTable {
        &self.locals
    }

    /// Entries accumulated so far
    pub fn entries(&self) -> &[Entry] {
        self.registry.entries()
    }

    /// Registers a unit-local rule
    ///
    /// # Errors
    ///
    /// Returns `UnitClosed` on a closed unit and `DuplicateRule` if the id is
    /// taken here or globally
    pub fn register_rule<F>(&mut self, name: impl Into<Name>, shape: Shape, transform: F) -> Result<(), ExpandError>
    where
        F: Fn(&Invocation, &mut InvocationContext<'_>) -> Result<Expansion, ExpandError>
            + Send
            + Sync
            + 'static,
    {
        self.register_transform(RuleId::new(name, shape), Arc::new(transform))
    }

    /// Registers a unit-local rule under an explicit id
    ///
    /// # Errors
    ///
    /// Returns `UnitClosed` on a closed unit and `DuplicateRule` if the id is
    /// taken here or globally
    pub fn register_transform(&mut self, id: RuleId, transform: Arc<dyn Transform>) -> Result<(), ExpandError> {
        self.ensure_open()?;
        if self.globals.contains(&id) {
            return Err(ExpandError::DuplicateRule {
                rule: id,
                owner: self.globals.owner().clone(),
            });
        }
        self.locals.register_transform(id, transform)
    }

    /// Installs the unit's finalizer
    ///
    /// # Errors
    ///
    /// Returns `UnitClosed` on a closed unit and `DuplicateRule` if a
    /// finalizer is already installed
    pub fn set_finalizer<F>(&mut self, finalizer: F) -> Result<(), ExpandError>
    where
        F: Fn(&[Entry], &mut FinalizeContext<'_>) -> Result<Expansion, ExpandError>
            + Send
            + Sync
            + 'static,
    {
        self.set_finalizer_arc(Arc::new(finalizer))
    }

    /// Installs a shared finalizer
    ///
    /// # Errors
    ///
    /// Returns `UnitClosed` on a closed unit and `DuplicateRule` if a
    /// finalizer is already installed
    pub fn set_finalizer_arc(&mut self, finalizer: Arc<dyn Finalizer>) -> Result<(), ExpandError> {
        self.ensure_open()?;
        if self.finalizer.is_some() {
            return Err(ExpandError::DuplicateRule {
                rule: RuleId::finalizer(),
                owner: self.name.clone(),
            });
        }
        self.finalizer = Some(finalizer);
        Ok(())
    }

    /// Appends an entry from outside any rule
    ///
    /// # Errors
    ///
    /// Returns `UnitClosed` once finalize has begun or the unit was closed.
    /// Rules running during finalize see `LateAccumulation` instead.
    pub fn accumulate(&mut self, entry: Entry) -> Result<(), ExpandError> {
        self.ensure_open()?;
        self.registry.entries.push(entry);
        Ok(())
    }

    /// Expands `tree` to a fixed point
    ///
    /// On error the unit is aborted and nothing is returned.
    ///
    /// # Errors
    ///
    /// Returns `UnitClosed` on a closed unit, or any expansion error
    #[instrument(level = "debug", skip(self, tree), fields(unit = %self.name))]
    pub fn expand(&mut self, tree: &Node) -> Result<Node, ExpandError> {
        self.ensure_open()?;
        self.escapes.record_caller_names(tree);
        let result = self.expander().expand(tree);
        if result.is_err() {
            self.abort();
        }
        result
    }

    /// Runs the finalizer once over the sealed registry and closes the unit
    ///
    /// Without a finalizer the output is an empty block.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyFinalized` on a second call, `UnitClosed` on an
    /// aborted or closed unit, or any error from the finalizer, its
    /// expansion or the escape check
    pub fn finalize(&mut self) -> Result<Node, ExpandError> {
        if self.finalized {
            return Err(ExpandError::AlreadyFinalized {
                unit: self.name.clone(),
            });
        }
        self.ensure_open()?;

        debug!(unit = %self.name, entries = self.registry.len(), "finalizing compilation unit");
        self.state = UnitState::Finalizing;
        let snapshot = self.registry.seal();

        let result = self.run_finalizer(&snapshot);
        if result.is_ok() {
            self.finalized = true;
            self.close();
        } else {
            self.abort();
        }
        result
    }

    /// Tears the unit down without finalizing
    ///
    /// Drops local rules, the finalizer and the registry.
    pub fn close(&mut self) {
        if self.state != UnitState::Closed {
            debug!(unit = %self.name, "closing compilation unit");
        }
        self.state = UnitState::Closed;
        self.locals = RuleTable::new(self.name.clone());
        self.finalizer = None;
        self.registry.clear();
        self.escapes = EscapeLedger::default();
    }

    fn run_finalizer(&mut self, snapshot: &[Entry]) -> Result<Node, ExpandError> {
        let output = match self.finalizer.clone() {
            Some(finalizer) => {
                let mut cx = FinalizeContext {
                    unit: &self.name,
                    hygiene: &self.hygiene,
                };
                let expansion = finalizer.finalize(snapshot, &mut cx)?;
                let rule = RuleId::finalizer();
                let mut expander = self.expander();
                let instantiated = expander.instantiate(expansion, None, &rule, None)?;
                expander.expand(&instantiated)?
            }
            None => Node::Invocation(Invocation {
                head: Head::new(self.config.splice_forms.block.clone()),
                meta: Metadata::default(),
                args: Vec::new(),
            }),
        };
        self.escapes.check()?;
        Ok(output)
    }

    fn expander(&mut self) -> Expander<'_> {
        Expander {
            unit: &self.name,
            globals: &self.globals,
            locals: &self.locals,
            registry: &mut self.registry,
            hygiene: &self.hygiene,
            config: &self.config,
            escapes: &mut self.escapes,
            expansion_stack: Vec::new(),
        }
    }

    fn abort(&mut self) {
        debug!(unit = %self.name, "aborting compilation unit");
        self.close();
    }

    fn ensure_open(&self) -> Result<(), ExpandError> {
        match self.state {
            UnitState::Open => Ok(()),
            UnitState::Finalizing | UnitState::Closed => Err(ExpandError::UnitClosed {
                unit: self.name.clone(),
            }),
        }
    }
}

/// Shared state for expanding many units
///
/// Global rules are frozen on construction; units can then expand on
/// separate threads.
#[derive(Debug, Clone)]
pub struct ExpansionSession {
    globals: Arc<RuleTable>,
    hygiene: Arc<HygieneContext>,
    config: ExpandConfig,
}

impl ExpansionSession {
    /// Freezes `globals` with default configuration
    pub fn new(globals: RuleTable) -> Self {
        Self {
            globals: Arc::new(globals),
            hygiene: Arc::new(HygieneContext::new()),
            config: ExpandConfig::default(),
        }
    }

    /// Replaces the configuration
    #[must_use]
    pub fn with_config(mut self, config: ExpandConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the hygiene context
    #[must_use]
    pub fn with_hygiene(mut self, hygiene: Arc<HygieneContext>) -> Self {
        self.hygiene = hygiene;
        self
    }

    /// Global rules
    pub fn globals(&self) -> &RuleTable {
        &self.globals
    }

    /// Active configuration
    pub fn config(&self) -> &ExpandConfig {
        &self.config
    }

    /// Opens a new unit
    pub fn unit(&self, name: impl Into<Name>) -> CompilationUnit {
        CompilationUnit::new(
            name,
            Arc::clone(&self.globals),
            Arc::clone(&self.hygiene),
            self.config.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wv_tree::Literal;

    fn record(call: &Invocation, cx: &mut InvocationContext<'_>) -> Result<Expansion, ExpandError> {
        let value = call.args.first().cloned().ok_or_else(|| cx.reject("missing value"))?;
        cx.accumulate(Entry::new("seen", value))?;
        Ok(Expansion::new(Node::atom("ok")))
    }

    fn count(entries: &[Entry], _cx: &mut FinalizeContext<'_>) -> Result<Expansion, ExpandError> {
        Ok(Expansion::new(Node::call("total", vec![Node::placeholder("n")]))
            .bind("n", Node::int(entries.len() as i64)))
    }

    fn session() -> ExpansionSession {
        let mut globals = RuleTable::default();
        globals.register("record", Shape::fixed(1), record).unwrap();
        ExpansionSession::new(globals)
    }

    #[test]
    fn test_finalize_sees_entries_in_order() {
        let mut unit = session().unit("ordering");
        unit.set_finalizer(|entries: &[Entry], _cx: &mut FinalizeContext<'_>| {
            let values = entries.iter().map(|entry| entry.value.clone()).collect();
            Ok(Expansion::new(Node::seq(values)))
        })
        .unwrap();

        for tree in ["A", "B", "C"] {
            unit.expand(&Node::call("record", vec![Node::atom(tree)])).unwrap();
        }
        let summary = unit.finalize().unwrap();
        assert_eq!(
            summary,
            Node::seq(vec![Node::atom("A"), Node::atom("B"), Node::atom("C")])
        );
        assert_eq!(unit.state(), UnitState::Closed);
    }

    #[test]
    fn test_finalize_runs_once() {
        let mut unit = session().unit("once");
        unit.set_finalizer(count).unwrap();
        unit.finalize().unwrap();
        assert_eq!(
            unit.finalize().unwrap_err(),
            ExpandError::AlreadyFinalized {
                unit: Name::new("once")
            }
        );
        assert_eq!(
            unit.expand(&Node::int(1)).unwrap_err(),
            ExpandError::UnitClosed {
                unit: Name::new("once")
            }
        );
    }

    #[test]
    fn test_second_finalizer_is_a_duplicate() {
        let mut unit = session().unit("twice");
        unit.set_finalizer(count).unwrap();
        assert_eq!(
            unit.set_finalizer(count).unwrap_err(),
            ExpandError::DuplicateRule {
                rule: RuleId::finalizer(),
                owner: Name::new("twice"),
            }
        );
    }

    #[test]
    fn test_finalize_without_finalizer_is_empty_block() {
        let mut unit = session().unit("empty");
        assert_eq!(unit.finalize().unwrap(), Node::call("__block__", vec![]));
    }

    #[test]
    fn test_local_rule_cannot_shadow_global() {
        let mut unit = session().unit("shadow");
        let err = unit.register_rule("record", Shape::fixed(1), record).unwrap_err();
        assert!(matches!(err, ExpandError::DuplicateRule { .. }));
        unit.register_rule("record", Shape::fixed(2), record).unwrap();
        assert_eq!(unit.local_rules().len(), 1);
    }

    #[test]
    fn test_accumulating_during_finalize_output_is_late() {
        let mut unit = session().unit("late");
        unit.set_finalizer(|_entries: &[Entry], _cx: &mut FinalizeContext<'_>| {
            Ok(Expansion::new(Node::call("record", vec![Node::atom("D")])))
        })
        .unwrap();
        let err = unit.finalize().unwrap_err();
        assert_eq!(
            err,
            ExpandError::LateAccumulation {
                unit: Name::new("late"),
                tag: Name::new("seen"),
                rule: Some(RuleId::new("record", Shape::fixed(1))),
                span: None,
            }
        );
        assert_eq!(unit.state(), UnitState::Closed);
    }

    #[test]
    fn test_failed_expansion_aborts_the_unit() {
        let mut unit = session().unit("aborted");
        unit.register_rule("refuse", Shape::fixed(0), |_call, cx| Err(cx.reject("refused")))
            .unwrap();
        unit.expand(&Node::call("record", vec![Node::atom("A")])).unwrap();
        let err = unit.expand(&Node::call("refuse", vec![])).unwrap_err();
        assert!(matches!(err, ExpandError::Transform { .. }));
        assert_eq!(unit.state(), UnitState::Closed);
        assert!(unit.entries().is_empty());
        assert_eq!(
            unit.finalize().unwrap_err(),
            ExpandError::UnitClosed {
                unit: Name::new("aborted")
            }
        );
    }

    #[test]
    fn test_finalizer_bindings_are_spliced() {
        let mut unit = session().unit("spliced");
        unit.set_finalizer(count).unwrap();
        unit.expand(&Node::call("record", vec![Node::int(1)])).unwrap();
        let output = unit.finalize().unwrap();
        let total = output.as_invocation().unwrap();
        assert_eq!(total.args, vec![Node::Literal(Literal::Integer(1))]);
    }

    #[test]
    fn test_direct_accumulation_interleaves_with_rules() {
        let mut unit = session().unit("direct");
        unit.accumulate(Entry::new("seen", Node::atom("first"))).unwrap();
        unit.expand(&Node::call("record", vec![Node::atom("second")])).unwrap();
        unit.accumulate(Entry::new("seen", Node::atom("third"))).unwrap();

        let values: Vec<_> = unit.entries().iter().map(|entry| entry.value.clone()).collect();
        assert_eq!(
            values,
            vec![Node::atom("first"), Node::atom("second"), Node::atom("third")]
        );
    }

    #[test]
    fn test_close_drops_unit_state() {
        let mut unit = session().unit("closing");
        unit.register_rule("local", Shape::fixed(0), |_call: &Invocation, _cx: &mut InvocationContext<'_>| {
            Ok(Expansion::new(Node::int(0)))
        })
        .unwrap();
        unit.set_finalizer(count).unwrap();
        unit.accumulate(Entry::new("seen", Node::int(1))).unwrap();

        unit.close();
        assert_eq!(unit.state(), UnitState::Closed);
        assert!(unit.local_rules().is_empty());
        assert!(unit.entries().is_empty());

        let closed = ExpandError::UnitClosed {
            unit: Name::new("closing"),
        };
        assert_eq!(
            unit.accumulate(Entry::new("seen", Node::int(2))).unwrap_err(),
            closed
        );
        assert_eq!(
            unit.register_rule("other", Shape::fixed(0), |_call: &Invocation, _cx: &mut InvocationContext<'_>| {
                Ok(Expansion::new(Node::int(0)))
            })
            .unwrap_err(),
            closed
        );
        assert_eq!(unit.expand(&Node::call("local", vec![])).unwrap_err(), closed);
        assert_eq!(unit.finalize().unwrap_err(), closed);
    }
}
