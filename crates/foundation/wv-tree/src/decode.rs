//! Encoding Rust values into literal nodes and decoding them back
//!
//! Encoding goes through `From<T> for Node`; decoding through [`FromNode`].
//! Both directions are lossless: no numeric coercion happens, so an `i64`
//! never decodes as an `f64` or the other way round.

use crate::literal::Literal;
use crate::name::Name;
use crate::node::Node;

/// Conversion from a literal node back into a Rust value
pub trait FromNode: Sized {
    /// Decodes `node`, or `None` if it has a different shape
    fn from_node(node: &Node) -> Option<Self>;
}

impl FromNode for i64 {
    fn from_node(node: &Node) -> Option<Self> {
        match node {
            Node::Literal(Literal::Integer(value)) => Some(*value),
            _ => None,
        }
    }
}

impl FromNode for f64 {
    fn from_node(node: &Node) -> Option<Self> {
        match node {
            Node::Literal(Literal::Float(value)) => Some(*value),
            _ => None,
        }
    }
}

impl FromNode for bool {
    fn from_node(node: &Node) -> Option<Self> {
        match node {
            Node::Literal(Literal::Bool(value)) => Some(*value),
            _ => None,
        }
    }
}

impl FromNode for String {
    fn from_node(node: &Node) -> Option<Self> {
        match node {
            Node::Literal(Literal::Text(value)) => Some(value.clone()),
            _ => None,
        }
    }
}

impl FromNode for Name {
    fn from_node(node: &Node) -> Option<Self> {
        match node {
            Node::Literal(Literal::Atom(name)) => Some(name.clone()),
            _ => None,
        }
    }
}

impl FromNode for Node {
    fn from_node(node: &Node) -> Option<Self> {
        Some(node.clone())
    }
}

impl<T: FromNode> FromNode for Vec<T> {
    fn from_node(node: &Node) -> Option<Self> {
        match node {
            Node::Literal(Literal::Sequence(items)) => items.iter().map(T::from_node).collect(),
            _ => None,
        }
    }
}

impl<A: FromNode, B: FromNode> FromNode for (A, B) {
    fn from_node(node: &Node) -> Option<Self> {
        match node {
            Node::Literal(Literal::Pair(key, value)) => Some((A::from_node(key)?, B::from_node(value)?)),
            _ => None,
        }
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Self::int(value)
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Self::float(value)
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Self::bool(value)
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Self::text(value)
    }
}

impl From<Name> for Node {
    fn from(name: Name) -> Self {
        Self::atom(name)
    }
}

impl From<Literal> for Node {
    fn from(literal: Literal) -> Self {
        Self::Literal(literal)
    }
}

impl<T: Into<Node>> From<Vec<T>> for Node {
    fn from(items: Vec<T>) -> Self {
        Self::seq(items.into_iter().map(Into::into).collect())
    }
}

impl<A: Into<Node>, B: Into<Node>> From<(A, B)> for Node {
    fn from((key, value): (A, B)) -> Self {
        Self::pair(key.into(), value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_round_trip_is_bit_exact() {
        for value in [0.1_f64, -0.0, f64::MAX, f64::MIN_POSITIVE, f64::NAN] {
            let decoded: f64 = Node::from(value).decode().unwrap_or_default();
            assert_eq!(decoded.to_bits(), value.to_bits());
        }
    }

    #[test]
    fn test_no_numeric_coercion() {
        assert_eq!(Node::int(3).decode::<f64>(), None);
        assert_eq!(Node::float(3.0).decode::<i64>(), None);
    }

    #[test]
    fn test_nested_sequence_of_pairs() {
        let value = vec![(Name::new("ok"), 1_i64), (Name::new("error"), 2)];
        let node = Node::from(value.clone());
        assert_eq!(node.decode::<Vec<(Name, i64)>>(), Some(value));
    }

    #[test]
    fn test_negative_zero_differs_from_zero() {
        assert_ne!(Node::float(0.0), Node::float(-0.0));
        assert_eq!(Node::float(f64::NAN), Node::float(f64::NAN));
    }
}
