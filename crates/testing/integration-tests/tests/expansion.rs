//! Fixed point, shape dispatch, depth limit and determinism

use integration_tests::{Fixture, rules};
use wv_expand::{ExpandConfig, ExpandError};
use wv_span::{FileId, FileSpan, Span};
use wv_tree::Node;

#[test]
fn test_output_is_a_fixed_point() {
    let fixture = Fixture::new().unwrap();
    let tree = Node::call(
        "wrap",
        vec![Node::call(
            "simplify",
            vec![Node::call("*", vec![Node::int(2), Node::int(3)])],
        )],
    );
    let expanded = fixture.expand("fixed", &tree).unwrap();
    assert_eq!(expanded.to_string(), "(__block__ :product)");

    let again = wv_expand::expand(&expanded, &rules().unwrap()).unwrap();
    assert_eq!(again, expanded);
}

#[test]
fn test_rewritten_child_makes_parent_resolvable() {
    let fixture = Fixture::new().unwrap();
    let tree = Node::call("simplify", vec![Node::call("triple", vec![Node::int(1)])]);
    let expanded = fixture.expand("children", &tree).unwrap();
    assert_eq!(expanded.to_string(), ":sum");
}

#[test]
fn test_dispatch_on_first_argument() {
    let fixture = Fixture::new().unwrap();
    let sum = Node::call("simplify", vec![Node::call("+", vec![Node::int(1)])]);
    let product = Node::call("simplify", vec![Node::call("*", vec![Node::int(1)])]);
    let difference = Node::call("simplify", vec![Node::call("-", vec![Node::int(1)])]);

    assert_eq!(fixture.expand("sum", &sum).unwrap(), Node::atom("sum"));
    assert_eq!(fixture.expand("product", &product).unwrap(), Node::atom("product"));

    assert_eq!(fixture.expand("difference", &difference).unwrap(), difference);
}

#[test]
fn test_runaway_rule_hits_depth_limit() {
    let fixture = Fixture::new().unwrap();
    let span = FileSpan::new(FileId::new(3), Span::new(0, 9));
    let tree = Node::call("forever", vec![]).with_span(span);

    let err = fixture.expand("runaway", &tree).unwrap_err();
    assert!(matches!(
        err,
        ExpandError::ExpansionDepthExceeded { limit: 128, span: Some(at), .. } if at == span
    ));

    let session = fixture.session.clone().with_config(ExpandConfig::default().with_max_depth(4));
    let err = session.unit("shallow").expand(&tree).unwrap_err();
    assert_eq!(
        err.to_string(),
        "expansion depth limit of 4 exceeded while expanding forever/0 at file 3:0..9"
    );
}

#[test]
fn test_expansion_is_deterministic() {
    let table = rules().unwrap();
    let tree = Node::call(
        "__block__",
        vec![
            Node::call("set_name", vec![]),
            Node::call("triple", vec![Node::ident("x")]),
        ],
    );
    let first = wv_expand::expand(&tree, &table).unwrap();
    let second = wv_expand::expand(&tree, &table).unwrap();
    assert_eq!(first, second);

    let fixture = Fixture::new().unwrap();
    let left = fixture.expand("left", &tree).unwrap();
    let right = fixture.expand("right", &tree).unwrap();
    assert_ne!(left, right);
    assert_eq!(left.canonical_scopes(), right.canonical_scopes());
}
