//! Independent units over one session

use integration_tests::{Fixture, rules};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use std::thread;
use wv_expand::{ExpandError, ExpansionSession, HygieneContext, UnitState};
use wv_tree::{Node, ScopeId};

fn scopes(node: &Node, found: &mut FxHashSet<ScopeId>) {
    match node {
        Node::Identifier(identifier) => found.extend(identifier.scope),
        Node::Invocation(call) => {
            found.extend(call.head.scope);
            for arg in &call.args {
                scopes(arg, found);
            }
        }
        Node::Literal(_) => {}
    }
}

#[test]
fn test_parallel_units_use_disjoint_scopes() {
    let fixture = Fixture::new().unwrap();
    let tree = Node::call(
        "__block__",
        vec![
            Node::call("set_name", vec![]),
            Node::call("triple", vec![Node::int(2)]),
        ],
    );

    let outputs: Vec<Node> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|index| {
                let session = fixture.session.clone();
                let tree = &tree;
                scope.spawn(move || {
                    let mut unit = session.unit(format!("worker{index}"));
                    let expanded = unit.expand(tree).unwrap();
                    unit.finalize().unwrap();
                    expanded
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    let mut seen = FxHashSet::default();
    for output in &outputs {
        let mut found = FxHashSet::default();
        scopes(output, &mut found);
        assert!(!found.is_empty());
        assert!(found.is_disjoint(&seen));
        seen.extend(found);
        assert_eq!(output.canonical_scopes(), outputs[0].canonical_scopes());
    }
}

#[test]
fn test_failed_unit_leaves_sibling_usable() {
    let fixture = Fixture::new().unwrap();
    let mut broken = fixture.session.unit("broken");
    let mut healthy = fixture.session.unit("healthy");

    healthy.expand(&Node::call("record", vec![Node::atom("a")])).unwrap();
    assert!(matches!(
        broken.expand(&Node::call("forever", vec![])).unwrap_err(),
        ExpandError::ExpansionDepthExceeded { .. }
    ));
    assert_eq!(broken.state(), UnitState::Closed);

    healthy.expand(&Node::call("record", vec![Node::atom("b")])).unwrap();
    assert_eq!(healthy.entries().len(), 2);
    healthy.finalize().unwrap();
}

#[test]
fn test_sessions_sharing_hygiene_never_collide() {
    let hygiene = Arc::new(HygieneContext::new());
    let first = ExpansionSession::new(rules().unwrap()).with_hygiene(Arc::clone(&hygiene));
    let second = ExpansionSession::new(rules().unwrap()).with_hygiene(Arc::clone(&hygiene));
    let tree = Node::call("set_name", vec![]);

    let mut left = FxHashSet::default();
    scopes(&first.unit("first").expand(&tree).unwrap(), &mut left);
    let mut right = FxHashSet::default();
    scopes(&second.unit("second").expand(&tree).unwrap(), &mut right);

    assert_eq!(left, FxHashSet::from_iter([ScopeId(1)]));
    assert_eq!(right, FxHashSet::from_iter([ScopeId(2)]));
    assert_eq!(hygiene.fresh_scope(), ScopeId(3));
}
