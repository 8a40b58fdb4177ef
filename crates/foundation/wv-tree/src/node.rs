//! Tree nodes and traversal

use crate::decode::FromNode;
use crate::literal::Literal;
use crate::name::{Name, ScopeId};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::hash::{Hash, Hasher};
use wv_span::FileSpan;

/// Head of a template placeholder: `(unquote name)`
pub const UNQUOTE: &str = "unquote";

/// Head of a caller-scope escape: `(var! node)`
pub const CALLER_SCOPE: &str = "var!";

/// A tagged tree element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Node {
    /// Self-evaluating value
    Literal(Literal),
    /// Named reference
    Identifier(Identifier),
    /// Rule invocation or ordinary call
    Invocation(Invocation),
}

/// A named reference with an optional hygiene scope
///
/// `scope` is `None` for caller-authored identifiers; the hygiene context
/// assigns a scope to identifiers written inside rule templates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    /// Textual name
    pub name: Name,
    /// Hygiene scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeId>,
}

/// What an invocation calls
///
/// The head scope records which expansion produced the invocation. It is
/// the scope that caller-scope escapes inside a rule output resolve to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Head {
    /// Rule or function name
    pub name: Name,
    /// Scope of the code that wrote this invocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeId>,
}

impl Head {
    /// Creates an unscoped head
    pub fn new(name: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            scope: None,
        }
    }
}

/// Informational data attached to an invocation
///
/// Metadata never affects semantics: it is ignored by equality and hashing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Source position of the invocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<FileSpan>,
    /// Free-form hints (import origin, generator, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
}

impl PartialEq for Metadata {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for Metadata {}

impl Hash for Metadata {
    fn hash<H: Hasher>(&self, _state: &mut H) {}
}

/// A call node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Invocation {
    /// What is being called
    pub head: Head,
    /// Informational metadata
    #[serde(default)]
    pub meta: Metadata,
    /// Ordered arguments, possibly ending in a keyword block
    #[serde(default)]
    pub args: Vec<Node>,
}

impl Invocation {
    /// Creates an invocation with empty metadata
    pub fn new(head: impl Into<Name>, args: Vec<Node>) -> Self {
        Self {
            head: Head::new(head),
            meta: Metadata::default(),
            args,
        }
    }

    /// Head name
    pub fn name(&self) -> &Name {
        &self.head.name
    }

    /// Source position, if the front-end recorded one
    pub fn span(&self) -> Option<FileSpan> {
        self.meta.span
    }

    /// The trailing keyword block, if present
    pub fn block(&self) -> Option<&Node> {
        self.args.last().filter(|arg| arg.is_keyword_block())
    }

    /// Arguments before the trailing block
    pub fn positional(&self) -> &[Node] {
        if self.block().is_some() {
            &self.args[..self.args.len() - 1]
        } else {
            &self.args
        }
    }

    /// Number of positional arguments
    pub fn arity(&self) -> usize {
        self.positional().len()
    }

    /// Looks up `key` in the trailing keyword block
    pub fn keyword(&self, key: &str) -> Option<&Node> {
        let Some(Node::Literal(Literal::Sequence(items))) = self.block() else {
            return None;
        };
        items.iter().find_map(|item| match item {
            Node::Literal(Literal::Pair(item_key, value))
                if matches!(&**item_key, Node::Literal(Literal::Atom(atom)) if atom == key) =>
            {
                Some(&**value)
            }
            _ => None,
        })
    }
}

impl Node {
    /// Integer literal
    pub fn int(value: i64) -> Self {
        Self::Literal(Literal::Integer(value))
    }

    /// Float literal
    pub fn float(value: f64) -> Self {
        Self::Literal(Literal::Float(value))
    }

    /// Boolean literal
    pub fn bool(value: bool) -> Self {
        Self::Literal(Literal::Bool(value))
    }

    /// Text literal
    pub fn text(value: impl Into<String>) -> Self {
        Self::Literal(Literal::Text(value.into()))
    }

    /// Atom literal
    pub fn atom(name: impl Into<Name>) -> Self {
        Self::Literal(Literal::Atom(name.into()))
    }

    /// Sequence literal
    pub fn seq(items: Vec<Self>) -> Self {
        Self::Literal(Literal::Sequence(items))
    }

    /// Pair literal
    pub fn pair(key: Self, value: Self) -> Self {
        Self::Literal(Literal::Pair(Box::new(key), Box::new(value)))
    }

    /// Caller-authored identifier
    pub fn ident(name: impl Into<Name>) -> Self {
        Self::Identifier(Identifier {
            name: name.into(),
            scope: None,
        })
    }

    /// Identifier in an explicit scope
    pub fn scoped_ident(name: impl Into<Name>, scope: ScopeId) -> Self {
        Self::Identifier(Identifier {
            name: name.into(),
            scope: Some(scope),
        })
    }

    /// Invocation with empty metadata
    pub fn call(head: impl Into<Name>, args: Vec<Self>) -> Self {
        Self::Invocation(Invocation::new(head, args))
    }

    /// Keyword block: `[{:key, value}, ...]`
    pub fn keywords<K: Into<Name>>(pairs: impl IntoIterator<Item = (K, Self)>) -> Self {
        Self::seq(
            pairs
                .into_iter()
                .map(|(key, value)| Self::pair(Self::atom(key), value))
                .collect(),
        )
    }

    /// `[do: body]`
    pub fn do_block(body: Self) -> Self {
        Self::keywords([("do", body)])
    }

    /// Template placeholder to be filled by splicing
    pub fn placeholder(name: impl Into<Name>) -> Self {
        Self::call(UNQUOTE, vec![Self::ident(name)])
    }

    /// Caller-scope escape around `node`
    pub fn escape(node: Self) -> Self {
        Self::call(CALLER_SCOPE, vec![node])
    }

    /// Attaches a source span, if this is an invocation
    #[must_use]
    pub fn with_span(mut self, span: FileSpan) -> Self {
        if let Self::Invocation(invocation) = &mut self {
            invocation.meta.span = Some(span);
        }
        self
    }

    /// Decodes the node into a Rust value
    pub fn decode<T: FromNode>(&self) -> Option<T> {
        T::from_node(self)
    }

    /// The invocation, if this node is one
    pub fn as_invocation(&self) -> Option<&Invocation> {
        match self {
            Self::Invocation(invocation) => Some(invocation),
            _ => None,
        }
    }

    /// The identifier, if this node is one
    pub fn as_identifier(&self) -> Option<&Identifier> {
        match self {
            Self::Identifier(identifier) => Some(identifier),
            _ => None,
        }
    }

    /// The literal, if this node is one
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Self::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    /// Whether this is an invocation whose head is `name`
    pub fn is_call_to(&self, name: &str) -> bool {
        self.as_invocation()
            .is_some_and(|invocation| invocation.head.name == name)
    }

    /// Placeholder name, if this node is `(unquote name)`
    pub fn placeholder_name(&self) -> Option<&Name> {
        let invocation = self.as_invocation()?;
        if invocation.head.name != UNQUOTE {
            return None;
        }
        match invocation.args.as_slice() {
            [Self::Identifier(identifier)] => Some(&identifier.name),
            _ => None,
        }
    }

    /// Whether this is a non-empty sequence of `{atom, node}` pairs
    pub fn is_keyword_block(&self) -> bool {
        let Self::Literal(Literal::Sequence(items)) = self else {
            return false;
        };
        !items.is_empty()
            && items.iter().all(|item| {
                matches!(
                    item,
                    Self::Literal(Literal::Pair(key, _))
                        if matches!(&**key, Self::Literal(Literal::Atom(_)))
                )
            })
    }

    /// Rebuilds the node with every direct child passed through `visit`
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `visit`
    pub fn map_children<E>(
        &self,
        mut visit: impl FnMut(&Self) -> Result<Self, E>,
    ) -> Result<Self, E> {
        Ok(match self {
            Self::Literal(Literal::Sequence(items)) => {
                Self::seq(items.iter().map(&mut visit).collect::<Result<_, _>>()?)
            }
            Self::Literal(Literal::Pair(key, value)) => Self::pair(visit(key)?, visit(value)?),
            Self::Invocation(invocation) => Self::Invocation(Invocation {
                head: invocation.head.clone(),
                meta: invocation.meta.clone(),
                args: invocation
                    .args
                    .iter()
                    .map(&mut visit)
                    .collect::<Result<_, _>>()?,
            }),
            Self::Literal(_) | Self::Identifier(_) => self.clone(),
        })
    }

    /// Top-down rewrite
    ///
    /// `visit` sees each node before its children. Returning `Some` replaces
    /// the node and skips its subtree; `None` descends into the children.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `visit`
    pub fn rewrite<E, F>(&self, visit: &mut F) -> Result<Self, E>
    where
        F: FnMut(&Self) -> Result<Option<Self>, E>,
    {
        if let Some(replacement) = visit(self)? {
            return Ok(replacement);
        }
        self.map_children(|child| child.rewrite(&mut *visit))
    }

    /// Bottom-up rebuild: children first, then `visit` on the rebuilt node
    #[must_use]
    pub fn map<F>(&self, visit: &mut F) -> Self
    where
        F: FnMut(Self) -> Self,
    {
        let rebuilt = match self.map_children(|child| Ok::<_, Infallible>(child.map(&mut *visit))) {
            Ok(node) => node,
            Err(never) => match never {},
        };
        visit(rebuilt)
    }

    /// Pre-order visit of every node
    pub fn walk<F>(&self, visit: &mut F)
    where
        F: FnMut(&Self),
    {
        visit(self);
        match self {
            Self::Literal(Literal::Sequence(items)) => {
                for item in items {
                    item.walk(visit);
                }
            }
            Self::Literal(Literal::Pair(key, value)) => {
                key.walk(visit);
                value.walk(visit);
            }
            Self::Invocation(invocation) => {
                for arg in &invocation.args {
                    arg.walk(visit);
                }
            }
            Self::Literal(_) | Self::Identifier(_) => {}
        }
    }

    /// Renumbers hygiene scopes in order of first appearance
    ///
    /// Two expansions of the same input under different scope counters are
    /// equal after canonicalization.
    #[must_use]
    pub fn canonical_scopes(&self) -> Self {
        let mut renumbered = FxHashMap::default();
        self.renumber_scopes(&mut renumbered)
    }

    fn renumber_scopes(&self, renumbered: &mut FxHashMap<ScopeId, ScopeId>) -> Self {
        match self {
            Self::Identifier(identifier) => Self::Identifier(Identifier {
                name: identifier.name.clone(),
                scope: remap_scope(renumbered, identifier.scope),
            }),
            Self::Invocation(invocation) => {
                let head = Head {
                    name: invocation.head.name.clone(),
                    scope: remap_scope(renumbered, invocation.head.scope),
                };
                let args = invocation
                    .args
                    .iter()
                    .map(|arg| arg.renumber_scopes(renumbered))
                    .collect();
                Self::Invocation(Invocation {
                    head,
                    meta: invocation.meta.clone(),
                    args,
                })
            }
            Self::Literal(_) => {
                match self.map_children(|child| Ok::<_, Infallible>(child.renumber_scopes(renumbered))) {
                    Ok(node) => node,
                    Err(never) => match never {},
                }
            }
        }
    }
}

fn remap_scope(
    renumbered: &mut FxHashMap<ScopeId, ScopeId>,
    scope: Option<ScopeId>,
) -> Option<ScopeId> {
    scope.map(|scope| {
        let next = ScopeId(renumbered.len() as u64);
        *renumbered.entry(scope).or_insert(next)
    })
}
