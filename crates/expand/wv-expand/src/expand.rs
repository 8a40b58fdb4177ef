//! Fixed-point expansion

use crate::config::ExpandConfig;
use crate::error::ExpandError;
use crate::hygiene::HygieneContext;
use crate::rule::{Expansion, Rule, RuleId, RuleTable};
use crate::splice::{SpliceEnv, splice};
use crate::unit::{EscapeLedger, InvocationContext, Registry};
use tracing::debug;
use wv_span::FileSpan;
use wv_tree::{Invocation, Name, Node, ScopeId};

/// A `var!` escape to be checked when the unit finalizes
#[derive(Debug, Clone)]
pub(crate) struct PendingEscape {
    pub(crate) name: Name,
    pub(crate) scope: Option<ScopeId>,
    pub(crate) rule: RuleId,
    pub(crate) span: Option<FileSpan>,
}

/// Expansion pass over one unit's tree
///
/// Walks the tree left to right, outermost first. A resolvable invocation
/// is replaced by its rule's output, which is expanded again before the
/// walk moves on; anything else has its children expanded. When expanding
/// the children changes an invocation, it is resolved again since its first
/// argument may now have a different shape.
pub(crate) struct Expander<'a> {
    pub(crate) unit: &'a Name,
    pub(crate) globals: &'a RuleTable,
    pub(crate) locals: &'a RuleTable,
    pub(crate) registry: &'a mut Registry,
    pub(crate) hygiene: &'a HygieneContext,
    pub(crate) config: &'a ExpandConfig,
    pub(crate) escapes: &'a mut EscapeLedger,
    /// Rules currently being expanded, innermost last
    pub(crate) expansion_stack: Vec<RuleId>,
}

impl Expander<'_> {
    /// Expands `node` until no resolvable invocation remains
    pub(crate) fn expand(&mut self, node: &Node) -> Result<Node, ExpandError> {
        let Node::Invocation(call) = node else {
            return node.map_children(|child| self.expand(child));
        };

        if let Some(rule) = self.resolve(call) {
            return self.apply(&rule, call);
        }

        let rebuilt = node.map_children(|child| self.expand(child))?;
        if rebuilt != *node {
            if let Node::Invocation(call) = &rebuilt {
                if let Some(rule) = self.resolve(call) {
                    return self.apply(&rule, call);
                }
            }
        }
        Ok(rebuilt)
    }

    /// Most specific matching rule across local and global tables
    ///
    /// Equally specific matches resolve to the global rule.
    fn resolve(&self, call: &Invocation) -> Option<Rule> {
        let global = self.globals.lookup(call).ok();
        let local = self.locals.lookup(call).ok();
        match (global, local) {
            (Some(global), Some(local)) => {
                if local.id.shape.specificity() > global.id.shape.specificity() {
                    Some(local.clone())
                } else {
                    Some(global.clone())
                }
            }
            (Some(rule), None) | (None, Some(rule)) => Some(rule.clone()),
            (None, None) => None,
        }
    }

    fn apply(&mut self, rule: &Rule, call: &Invocation) -> Result<Node, ExpandError> {
        // Check recursion depth
        if self.expansion_stack.len() >= self.config.max_depth {
            return Err(ExpandError::ExpansionDepthExceeded {
                rule: rule.id.clone(),
                limit: self.config.max_depth,
                span: call.span(),
            });
        }

        debug!(
            unit = %self.unit,
            rule = %rule.id,
            depth = self.expansion_stack.len(),
            "applying rule"
        );

        let expansion = {
            let mut cx = InvocationContext {
                rule: &rule.id,
                span: call.span(),
                unit: self.unit,
                registry: &mut *self.registry,
                hygiene: self.hygiene,
            };
            rule.transform.transform(call, &mut cx)?
        };
        let output = self.instantiate(expansion, call.head.scope, &rule.id, call.span())?;

        self.expansion_stack.push(rule.id.clone());
        let result = self.expand(&output);
        self.expansion_stack.pop();

        result
    }

    /// Renames and splices a rule's output
    ///
    /// `caller` is the scope `var!` escapes resolve to.
    pub(crate) fn instantiate(
        &mut self,
        expansion: Expansion,
        caller: Option<ScopeId>,
        rule: &RuleId,
        span: Option<FileSpan>,
    ) -> Result<Node, ExpandError> {
        let scope = self.hygiene.fresh_scope();
        let renamed = self.hygiene.rename(&expansion.template, scope, caller);

        for name in renamed.introduced {
            self.escapes.known.insert((name, Some(scope)));
        }
        for (name, scope) in renamed.escapes {
            self.escapes.pending.push(PendingEscape {
                name,
                scope,
                rule: rule.clone(),
                span,
            });
        }

        let env = SpliceEnv {
            forms: &self.config.splice_forms,
            scope,
            hygiene: self.hygiene,
        };
        let output = splice(&renamed.node, &expansion.bindings, expansion.mode, &env).map_err(
            |unbound| ExpandError::UnboundSplice {
                placeholder: unbound.0,
                rule: rule.clone(),
                span,
            },
        )?;

        // Generated code reports errors at the invocation it came from
        Ok(match (output, span) {
            (Node::Invocation(mut generated), Some(span)) if generated.meta.span.is_none() => {
                generated.meta.span = Some(span);
                Node::Invocation(generated)
            }
            (output, _) => output,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::rule::Shape;
    use crate::unit::{ExpansionSession, InvocationContext};
    use crate::{ExpandConfig, ExpandError, Expansion, RuleId, RuleTable};
    use expect_test::expect;
    use wv_span::{FileId, FileSpan, Span};
    use wv_tree::{Invocation, Node};

    fn double(call: &Invocation, _cx: &mut InvocationContext<'_>) -> Result<Expansion, ExpandError> {
        Ok(Expansion::new(Node::call("+", vec![Node::placeholder("x"), Node::placeholder("x")]))
            .bind("x", call.args[0].clone()))
    }

    fn forever(_call: &Invocation, _cx: &mut InvocationContext<'_>) -> Result<Expansion, ExpandError> {
        Ok(Expansion::new(Node::call("forever", vec![])))
    }

    fn unless(call: &Invocation, cx: &mut InvocationContext<'_>) -> Result<Expansion, ExpandError> {
        let body = call.keyword("do").cloned().ok_or_else(|| cx.reject("expected a do block"))?;
        Ok(Expansion::new(Node::call(
            "if",
            vec![Node::call("not", vec![Node::placeholder("cond")]), Node::placeholder("body")],
        ))
        .bind("cond", call.args[0].clone())
        .bind("body", body))
    }

    fn rules() -> RuleTable {
        let mut table = RuleTable::default();
        table.register("double", Shape::fixed(1), double).unwrap();
        table.register("forever", Shape::fixed(0), forever).unwrap();
        table.register("unless", Shape::fixed(1).with_block(), unless).unwrap();
        table
    }

    fn expand(tree: &Node) -> Result<Node, ExpandError> {
        crate::expand(tree, &rules())
    }

    #[test]
    fn test_nested_invocations_reach_a_fixed_point() {
        let tree = Node::call(
            "unless",
            vec![
                Node::ident("done"),
                Node::do_block(Node::call("double", vec![Node::call("double", vec![Node::int(1)])])),
            ],
        );
        let expanded = expand(&tree).unwrap();
        expect!["(if (not done) (+ (+ 1 1) (+ 1 1)))"].assert_eq(&expanded.to_string());
        assert_eq!(expand(&expanded).unwrap(), expanded);
    }

    #[test]
    fn test_unmatched_invocations_are_ordinary_calls() {
        let tree = Node::call("double", vec![Node::int(1), Node::int(2)]);
        assert_eq!(expand(&tree).unwrap(), tree);
    }

    #[test]
    fn test_self_reintroducing_rule_hits_depth_limit() {
        let span = FileSpan::new(FileId::new(0), Span::new(4, 13));
        let tree = Node::call("forever", vec![]).with_span(span);
        let session = crate::ExpansionSession::new(rules())
            .with_config(ExpandConfig::default().with_max_depth(8));
        let mut unit = session.unit("looping");
        let err = unit.expand(&tree).unwrap_err();
        assert_eq!(
            err,
            ExpandError::ExpansionDepthExceeded {
                rule: RuleId::new("forever", Shape::fixed(0)),
                limit: 8,
                span: Some(span),
            }
        );
    }

    #[test]
    fn test_rejection_carries_rule_and_span() {
        let span = FileSpan::new(FileId::new(2), Span::new(0, 5));
        let tree = Node::call(
            "unless",
            vec![Node::ident("done"), Node::keywords([("else", Node::int(1))])],
        )
        .with_span(span);
        let err = expand(&tree).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unless/1[block] failed: expected a do block at file 2:0..5"
        );
    }

    #[test]
    fn test_expanded_children_are_resolved_again() {
        let mut table = rules();
        table
            .register(
                "simplify",
                Shape::fixed(1).when_first_calls("+"),
                |call: &Invocation, _cx: &mut InvocationContext<'_>| {
                    Ok(Expansion::new(Node::atom("sum")).bind("unused", call.args[0].clone()))
                },
            )
            .unwrap();
        let tree = Node::call("simplify", vec![Node::call("double", vec![Node::int(3)])]);
        let expanded = crate::expand(&tree, &table).unwrap();
        assert_eq!(expanded, Node::atom("sum"));
    }

    #[test]
    fn test_unbound_placeholder_names_the_rule() {
        let mut table = RuleTable::default();
        table
            .register("broken", Shape::fixed(0), |_call: &Invocation, _cx: &mut InvocationContext<'_>| {
                Ok(Expansion::new(Node::placeholder("nothing")))
            })
            .unwrap();
        let err = crate::expand(&Node::call("broken", vec![]), &table).unwrap_err();
        assert!(matches!(
            err,
            ExpandError::UnboundSplice { ref placeholder, .. } if placeholder == "nothing"
        ));
    }

    #[test]
    fn test_sessions_share_frozen_rules() {
        let session = ExpansionSession::new(rules());
        let mut first = session.unit("first");
        let mut second = session.unit("second");
        let tree = Node::call("double", vec![Node::int(2)]);
        let left = first.expand(&tree).unwrap();
        let right = second.expand(&tree).unwrap();
        assert_eq!(left, right);
        assert_eq!(session.globals().len(), 3);
    }
}
