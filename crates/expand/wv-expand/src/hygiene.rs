//! Hygienic renaming
//!
//! Each rule invocation gets one freshly minted scope. Every identifier the
//! rule writes literally in its template (and every invocation head) is
//! stamped with that scope, so two uses of `result` inside one template
//! still refer to the same binding while never touching the caller's
//! `result`.
//!
//! `(var! node)` opts out: identifiers inside it take the caller's scope
//! instead. Spliced values are never renamed because splicing happens after
//! renaming.

use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;
use wv_tree::{CALLER_SCOPE, Head, Identifier, Invocation, Name, Node, ScopeId};

/// Source of fresh scope ids and generated names
///
/// Counters are atomic, so one context can be shared through `Arc` by
/// units expanding on different threads without ever minting the same id.
#[derive(Debug)]
pub struct HygieneContext {
    next_scope: AtomicU64,
    next_gensym: AtomicU64,
}

impl HygieneContext {
    /// Creates a context whose first scope is `#1`
    pub fn new() -> Self {
        Self {
            next_scope: AtomicU64::new(1),
            next_gensym: AtomicU64::new(1),
        }
    }

    /// Mints a new scope id
    pub fn fresh_scope(&self) -> ScopeId {
        let scope = ScopeId(self.next_scope.fetch_add(1, Ordering::Relaxed));
        trace!(%scope, "minted hygiene scope");
        scope
    }

    /// Generates a name that no caller-authored code can contain
    pub fn gensym(&self, base: &str) -> Name {
        let id = self.next_gensym.fetch_add(1, Ordering::Relaxed);
        Name::new(format!("{base}@{id}"))
    }

    /// Stamps `template` with `scope`, resolving escapes to `caller`
    ///
    /// Placeholders are left untouched for the splicer.
    pub fn rename(&self, template: &Node, scope: ScopeId, caller: Option<ScopeId>) -> Renamed {
        let mut renamed = Renamed {
            node: Node::seq(Vec::new()),
            introduced: Vec::new(),
            escapes: Vec::new(),
        };
        renamed.node = rename_node(template, scope, caller, &mut renamed);
        renamed
    }
}

impl Default for HygieneContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Output of [`HygieneContext::rename`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renamed {
    /// Renamed template
    pub node: Node,
    /// Names stamped with the minted scope
    pub introduced: Vec<Name>,
    /// Escaped identifiers and the scope they were resolved to
    pub escapes: Vec<(Name, Option<ScopeId>)>,
}

/// Marks `node` so its identifiers unify with the caller's scope
pub fn mark_caller_scope(node: Node) -> Node {
    Node::escape(node)
}

fn rename_node(node: &Node, scope: ScopeId, caller: Option<ScopeId>, out: &mut Renamed) -> Node {
    match node {
        Node::Identifier(identifier) => {
            if identifier.scope.is_some() {
                return node.clone();
            }
            out.introduced.push(identifier.name.clone());
            Node::Identifier(Identifier {
                name: identifier.name.clone(),
                scope: Some(scope),
            })
        }
        Node::Invocation(call) if node.placeholder_name().is_some() => Node::Invocation(call.clone()),
        Node::Invocation(call) if call.head.name == CALLER_SCOPE && call.args.len() == 1 => {
            escape_node(&call.args[0], caller, out)
        }
        Node::Invocation(call) => Node::Invocation(Invocation {
            head: Head {
                name: call.head.name.clone(),
                scope: call.head.scope.or(Some(scope)),
            },
            meta: call.meta.clone(),
            args: call
                .args
                .iter()
                .map(|arg| rename_node(arg, scope, caller, out))
                .collect(),
        }),
        Node::Literal(_) => match node.map_children(|child| {
            Ok::<_, Infallible>(rename_node(child, scope, caller, out))
        }) {
            Ok(rebuilt) => rebuilt,
            Err(never) => match never {},
        },
    }
}

fn escape_node(node: &Node, caller: Option<ScopeId>, out: &mut Renamed) -> Node {
    match node {
        Node::Identifier(identifier) => {
            out.escapes.push((identifier.name.clone(), caller));
            Node::Identifier(Identifier {
                name: identifier.name.clone(),
                scope: caller,
            })
        }
        Node::Invocation(call) if node.placeholder_name().is_some() => Node::Invocation(call.clone()),
        Node::Invocation(call) => Node::Invocation(Invocation {
            head: Head {
                name: call.head.name.clone(),
                scope: caller,
            },
            meta: call.meta.clone(),
            args: call
                .args
                .iter()
                .map(|arg| escape_node(arg, caller, out))
                .collect(),
        }),
        Node::Literal(_) => match node.map_children(|child| {
            Ok::<_, Infallible>(escape_node(child, caller, out))
        }) {
            Ok(rebuilt) => rebuilt,
            Err(never) => match never {},
        },
    }
}
