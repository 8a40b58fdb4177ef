//! Runtime value representation

#![allow(
    clippy::min_ident_chars,
    reason = "Short identifiers like i, f, b, s are conventional in value implementations"
)]

use std::fmt;
use wv_tree::Name;

/// Runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Unit value
    Unit,
    /// Boolean value
    Bool(bool),
    /// Integer value (i64)
    Int(i64),
    /// Float value (f64)
    Float(f64),
    /// Text value
    Text(String),
    /// Symbolic atom
    Atom(Name),
    /// Ordered list
    List(Vec<Self>),
    /// Two-element pair
    Pair(Box<Self>, Box<Self>),
}

impl Value {
    /// Check if value is truthy (for conditionals)
    ///
    /// Only `false` and unit are falsy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Bool(false) | Self::Unit)
    }

    /// Short type name for error messages
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Atom(_) => "atom",
            Self::List(_) => "list",
            Self::Pair(..) => "pair",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit => write!(f, "()"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(fl) => write!(f, "{fl:?}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Atom(name) => write!(f, ":{name}"),
            Self::List(elements) => {
                write!(f, "[")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, "]")
            }
            Self::Pair(key, value) => write!(f, "{{{key}, {value}}}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let value = Value::List(vec![
            Value::Int(1),
            Value::Float(1.0),
            Value::Text("a".into()),
            Value::Pair(Box::new(Value::Atom(Name::new("k"))), Box::new(Value::Unit)),
        ]);
        assert_eq!(value.to_string(), r#"[1, 1.0, "a", {:k, ()}]"#);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Unit.is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::List(vec![]).is_truthy());
    }
}
