//! Self-evaluating literal values

use crate::name::Name;
use crate::node::Node;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::mem;

/// A value that evaluates to itself
///
/// Sequences and pairs hold full nodes, so a literal list may still contain
/// invocations that the expander has to visit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Literal {
    /// Integer literal
    Integer(i64),
    /// Float literal, compared and serialized by bit pattern
    Float(#[serde(with = "float_bits")] f64),
    /// Boolean literal
    Bool(bool),
    /// Text literal
    Text(String),
    /// Symbolic atom such as `:ok`
    Atom(Name),
    /// Ordered sequence of nodes
    Sequence(Vec<Node>),
    /// Two-element pair
    Pair(Box<Node>, Box<Node>),
}

impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Integer(left), Self::Integer(right)) => left == right,
            (Self::Float(left), Self::Float(right)) => left.to_bits() == right.to_bits(),
            (Self::Bool(left), Self::Bool(right)) => left == right,
            (Self::Text(left), Self::Text(right)) => left == right,
            (Self::Atom(left), Self::Atom(right)) => left == right,
            (Self::Sequence(left), Self::Sequence(right)) => left == right,
            (Self::Pair(left_key, left_value), Self::Pair(right_key, right_value)) => {
                left_key == right_key && left_value == right_value
            }
            _ => false,
        }
    }
}

impl Eq for Literal {}

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(self).hash(state);
        match self {
            Self::Integer(value) => value.hash(state),
            Self::Float(value) => value.to_bits().hash(state),
            Self::Bool(value) => value.hash(state),
            Self::Text(value) => value.hash(state),
            Self::Atom(value) => value.hash(state),
            Self::Sequence(items) => items.hash(state),
            Self::Pair(key, value) => {
                key.hash(state);
                value.hash(state);
            }
        }
    }
}

/// Floats travel as `{"bits": u64}` so that NaN payloads, infinities and
/// `-0.0` survive formats without a native representation for them
mod float_bits {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Bits {
        bits: u64,
    }

    #[allow(
        clippy::trivially_copy_pass_by_ref,
        reason = "serde `with` modules receive the field by reference"
    )]
    pub(super) fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        Bits { bits: value.to_bits() }.serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Bits::deserialize(deserializer).map(|Bits { bits }| f64::from_bits(bits))
    }
}
