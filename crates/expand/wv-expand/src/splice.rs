//! Placeholder substitution
//!
//! Splicing runs after hygienic renaming, so bound values keep the scopes
//! their authors gave them.

use crate::config::SpliceForms;
use crate::error::UnboundPlaceholder;
use crate::hygiene::HygieneContext;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use tracing::warn;
use wv_tree::{Head, Identifier, Invocation, Metadata, Name, Node, ScopeId};

/// Placeholder bindings in binding order
pub type Bindings = IndexMap<Name, Node>;

/// How bound values are substituted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SpliceMode {
    /// Inline the value at every occurrence
    ///
    /// An invocation bound here runs once per occurrence.
    #[default]
    Late,
    /// Bind every value once to a fresh local, then reference the local
    Eager,
}

/// What splicing needs from the surrounding expansion
#[derive(Debug, Clone, Copy)]
pub struct SpliceEnv<'a> {
    /// Heads for generated blocks and bindings
    pub forms: &'a SpliceForms,
    /// Scope minted for the current invocation
    pub scope: ScopeId,
    /// Source of temporary names
    pub hygiene: &'a HygieneContext,
}

/// Fills the placeholders of `template`
///
/// # Errors
///
/// Returns the first placeholder with no binding
pub fn splice(
    template: &Node,
    bindings: &Bindings,
    mode: SpliceMode,
    env: &SpliceEnv<'_>,
) -> Result<Node, UnboundPlaceholder> {
    match mode {
        SpliceMode::Late => splice_late(template, bindings),
        SpliceMode::Eager => splice_eager(template, bindings, env),
    }
}

/// Replaces every placeholder occurrence with a copy of its value
///
/// # Errors
///
/// Returns the first placeholder with no binding
pub fn splice_late(template: &Node, bindings: &Bindings) -> Result<Node, UnboundPlaceholder> {
    let mut uses: FxHashMap<Name, usize> = FxHashMap::default();
    let spliced = template.rewrite(&mut |node: &Node| -> Result<Option<Node>, UnboundPlaceholder> {
        let Some(name) = node.placeholder_name() else {
            return Ok(None);
        };
        let value = bindings
            .get(name)
            .ok_or_else(|| UnboundPlaceholder(name.clone()))?;
        *uses.entry(name.clone()).or_default() += 1;
        Ok(Some(value.clone()))
    })?;

    for (name, value) in bindings {
        let count = uses.get(name).copied().unwrap_or(0);
        if count > 1 && matches!(value, Node::Invocation(_)) {
            warn!(
                placeholder = %name,
                occurrences = count,
                "late splice inlines an invocation more than once; it will be evaluated each time"
            );
        }
    }
    Ok(spliced)
}

/// Binds every value once at the top of the output
///
/// Produces `(block (bind tmp value) ... template)`, with each placeholder
/// replaced by its temporary. Bindings run in binding order.
///
/// # Errors
///
/// Returns the first placeholder with no binding
pub fn splice_eager(
    template: &Node,
    bindings: &Bindings,
    env: &SpliceEnv<'_>,
) -> Result<Node, UnboundPlaceholder> {
    let temporaries: Vec<Node> = bindings
        .keys()
        .map(|name| {
            Node::Identifier(Identifier {
                name: env.hygiene.gensym(name),
                scope: Some(env.scope),
            })
        })
        .collect();

    let body = template.rewrite(&mut |node: &Node| -> Result<Option<Node>, UnboundPlaceholder> {
        let Some(name) = node.placeholder_name() else {
            return Ok(None);
        };
        let index = bindings
            .get_index_of(name)
            .ok_or_else(|| UnboundPlaceholder(name.clone()))?;
        Ok(Some(temporaries[index].clone()))
    })?;

    let mut statements: Vec<Node> = temporaries
        .iter()
        .zip(bindings.values())
        .map(|(local, value)| generated(&env.forms.bind, env.scope, vec![local.clone(), value.clone()]))
        .collect();
    statements.push(body);
    Ok(generated(&env.forms.block, env.scope, statements))
}

fn generated(head: &Name, scope: ScopeId, args: Vec<Node>) -> Node {
    Node::Invocation(Invocation {
        head: Head {
            name: head.clone(),
            scope: Some(scope),
        },
        meta: Metadata::default(),
        args,
    })
}
