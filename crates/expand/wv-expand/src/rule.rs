//! Rule identifiers, shapes and the rule table

use crate::error::{ExpandError, NoMatch};
use crate::splice::{Bindings, SpliceMode};
use crate::unit::InvocationContext;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use wv_tree::{Invocation, Name, Node};

/// How many positional arguments a rule accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    /// Exactly `n` positional arguments
    Exactly(usize),
    /// `n` or more positional arguments
    AtLeast(usize),
}

/// Whether a rule wants a trailing keyword block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockArg {
    /// Must not have a block
    Absent,
    /// Must have a block
    Present,
    /// Either
    Any,
}

/// Structural predicate on the first positional argument
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArgPattern {
    /// Anything
    Any,
    /// An invocation whose head is the given name
    Invocation(Name),
    /// An identifier
    Identifier,
    /// A literal
    Literal,
}

impl ArgPattern {
    fn matches(&self, arg: Option<&Node>) -> bool {
        match (self, arg) {
            (Self::Any, _) => true,
            (Self::Invocation(name), Some(Node::Invocation(call))) => call.head.name == *name,
            (Self::Identifier, Some(Node::Identifier(_))) | (Self::Literal, Some(Node::Literal(_))) => {
                true
            }
            _ => false,
        }
    }
}

/// The argument shape a rule fires on
///
/// Distinct shapes under one name are independent rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    /// Positional arity
    pub arity: Arity,
    /// Trailing block requirement
    pub block: BlockArg,
    /// First-argument predicate
    pub first: ArgPattern,
}

impl Shape {
    /// Exactly `arity` positional arguments and no block
    pub fn fixed(arity: usize) -> Self {
        Self {
            arity: Arity::Exactly(arity),
            block: BlockArg::Absent,
            first: ArgPattern::Any,
        }
    }

    /// At least `min` positional arguments, block optional
    pub fn variadic(min: usize) -> Self {
        Self {
            arity: Arity::AtLeast(min),
            block: BlockArg::Any,
            first: ArgPattern::Any,
        }
    }

    /// Requires a trailing keyword block
    #[must_use]
    pub fn with_block(mut self) -> Self {
        self.block = BlockArg::Present;
        self
    }

    /// Requires the first argument to be an invocation of `head`
    #[must_use]
    pub fn when_first_calls(mut self, head: impl Into<Name>) -> Self {
        self.first = ArgPattern::Invocation(head.into());
        self
    }

    /// Requires the first argument to match `pattern`
    #[must_use]
    pub fn when_first(mut self, pattern: ArgPattern) -> Self {
        self.first = pattern;
        self
    }

    /// Whether `call` has this shape
    pub fn matches(&self, call: &Invocation) -> bool {
        let positional = call.positional();
        let arity_ok = match self.arity {
            Arity::Exactly(arity) => positional.len() == arity,
            Arity::AtLeast(min) => positional.len() >= min,
        };
        let block_ok = match self.block {
            BlockArg::Absent => call.block().is_none(),
            BlockArg::Present => call.block().is_some(),
            BlockArg::Any => true,
        };
        arity_ok && block_ok && self.first.matches(positional.first())
    }

    /// Ordering key used when several shapes of one name match
    ///
    /// A first-argument predicate outranks a fixed arity, which outranks an
    /// explicit block requirement.
    pub fn specificity(&self) -> (bool, bool, bool) {
        (
            self.first != ArgPattern::Any,
            matches!(self.arity, Arity::Exactly(_)),
            self.block != BlockArg::Any,
        )
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.arity {
            Arity::Exactly(arity) => write!(formatter, "{arity}")?,
            Arity::AtLeast(min) => write!(formatter, "{min}+")?,
        }
        match &self.first {
            ArgPattern::Any => {}
            ArgPattern::Invocation(name) => write!(formatter, "[first=({name})]")?,
            ArgPattern::Identifier => write!(formatter, "[first=identifier]")?,
            ArgPattern::Literal => write!(formatter, "[first=literal]")?,
        }
        match self.block {
            BlockArg::Present => write!(formatter, "[block]"),
            BlockArg::Absent | BlockArg::Any => Ok(()),
        }
    }
}

/// Identifies a rule: name plus shape
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleId {
    /// Rule name, matched against invocation heads
    pub name: Name,
    /// Argument shape
    pub shape: Shape,
}

impl RuleId {
    /// Creates a rule id
    pub fn new(name: impl Into<Name>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }

    /// Id under which a unit's finalize rule is registered
    pub fn finalizer() -> Self {
        Self::new("<finalize>", Shape::fixed(0))
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}/{}", self.name, self.shape)
    }
}

/// What a rule returns: a template plus the values to splice into it
///
/// The expander renames identifiers written in `template`, then fills its
/// placeholders from `bindings`. Bound values are never renamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    /// Template tree, possibly containing placeholders and escapes
    pub template: Node,
    /// Placeholder bindings, in binding order
    pub bindings: Bindings,
    /// How placeholders are substituted
    pub mode: SpliceMode,
}

impl Expansion {
    /// A template with no bindings, spliced late
    pub fn new(template: Node) -> Self {
        Self {
            template,
            bindings: Bindings::default(),
            mode: SpliceMode::Late,
        }
    }

    /// Binds placeholder `name` to `value`
    #[must_use]
    pub fn bind(mut self, name: impl Into<Name>, value: Node) -> Self {
        self.bindings.insert(name.into(), value);
        self
    }

    /// Binds each placeholder once, up front
    #[must_use]
    pub fn eager(mut self) -> Self {
        self.mode = SpliceMode::Eager;
        self
    }

    /// Inlines each placeholder at every occurrence
    #[must_use]
    pub fn late(mut self) -> Self {
        self.mode = SpliceMode::Late;
        self
    }
}

/// A rewrite function
pub trait Transform: Send + Sync {
    /// Rewrites `call`, whose arguments are still unexpanded
    ///
    /// # Errors
    ///
    /// Returns an error if the rule rejects its input or accumulation fails
    fn transform(
        &self,
        call: &Invocation,
        cx: &mut InvocationContext<'_>,
    ) -> Result<Expansion, ExpandError>;
}

impl<F> Transform for F
where
    F: Fn(&Invocation, &mut InvocationContext<'_>) -> Result<Expansion, ExpandError> + Send + Sync,
{
    fn transform(
        &self,
        call: &Invocation,
        cx: &mut InvocationContext<'_>,
    ) -> Result<Expansion, ExpandError> {
        self(call, cx)
    }
}

/// A registered rule
#[derive(Clone)]
pub struct Rule {
    /// Identifier
    pub id: RuleId,
    /// Rewrite function
    pub transform: Arc<dyn Transform>,
}

impl fmt::Debug for Rule {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("Rule").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Mapping from `(name, shape)` to rules
///
/// Rules sharing a name are kept in registration order, which breaks ties
/// between equally specific shapes.
#[derive(Debug, Clone)]
pub struct RuleTable {
    owner: Name,
    rules: IndexMap<Name, Vec<Rule>>,
}

impl RuleTable {
    /// Creates an empty table; `owner` names it in duplicate-rule errors
    pub fn new(owner: impl Into<Name>) -> Self {
        Self {
            owner: owner.into(),
            rules: IndexMap::new(),
        }
    }

    /// Table owner
    pub fn owner(&self) -> &Name {
        &self.owner
    }

    /// Registers a closure rule
    ///
    /// # Errors
    ///
    /// Returns `DuplicateRule` if `(name, shape)` is already registered
    pub fn register<F>(&mut self, name: impl Into<Name>, shape: Shape, transform: F) -> Result<(), ExpandError>
    where
        F: Fn(&Invocation, &mut InvocationContext<'_>) -> Result<Expansion, ExpandError>
            + Send
            + Sync
            + 'static,
    {
        self.register_transform(RuleId::new(name, shape), Arc::new(transform))
    }

    /// Registers a rule under an explicit id
    ///
    /// # Errors
    ///
    /// Returns `DuplicateRule` if the id is already registered
    pub fn register_transform(&mut self, id: RuleId, transform: Arc<dyn Transform>) -> Result<(), ExpandError> {
        if self.contains(&id) {
            return Err(ExpandError::DuplicateRule {
                rule: id,
                owner: self.owner.clone(),
            });
        }
        self.rules
            .entry(id.name.clone())
            .or_default()
            .push(Rule { id, transform });
        Ok(())
    }

    /// Whether exactly this `(name, shape)` is registered
    pub fn contains(&self, id: &RuleId) -> bool {
        self.rules
            .get(&id.name)
            .is_some_and(|rules| rules.iter().any(|rule| rule.id.shape == id.shape))
    }

    /// Finds the most specific rule for `call`
    ///
    /// # Errors
    ///
    /// Returns `NoMatch` when no shape registered under the head name fits,
    /// meaning the invocation is an ordinary call
    pub fn lookup(&self, call: &Invocation) -> Result<&Rule, NoMatch> {
        let candidates = self.rules.get(&call.head.name).ok_or(NoMatch)?;
        let mut best: Option<&Rule> = None;
        for rule in candidates.iter().filter(|rule| rule.id.shape.matches(call)) {
            if best.is_none_or(|current| rule.id.shape.specificity() > current.id.shape.specificity()) {
                best = Some(rule);
            }
        }
        best.ok_or(NoMatch)
    }

    /// Registered rule ids, grouped by name in registration order
    pub fn rules(&self) -> impl Iterator<Item = &RuleId> {
        self.rules.values().flatten().map(|rule| &rule.id)
    }

    /// Number of registered rules
    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::new("global")
    }
}
