//! S-expression rendering
//!
//! `(head arg ...)` for invocations, `name#scope` for scoped identifiers,
//! `:atom`, `[a, b]` and `{a, b}` for literals.

use crate::literal::Literal;
use crate::name::Name;
use crate::node::{Identifier, Invocation, Node};
use std::fmt;

fn write_name(formatter: &mut fmt::Formatter<'_>, name: &Name) -> fmt::Result {
    if name.is_plain() {
        write!(formatter, "{name}")
    } else {
        write!(formatter, "{:?}", name.as_str())
    }
}

fn write_list(formatter: &mut fmt::Formatter<'_>, items: &[Node]) -> fmt::Result {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            write!(formatter, ", ")?;
        }
        write!(formatter, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Literal {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(formatter, "{value}"),
            Self::Float(value) => write!(formatter, "{value:?}"),
            Self::Bool(value) => write!(formatter, "{value}"),
            Self::Text(value) => write!(formatter, "{value:?}"),
            Self::Atom(name) => {
                write!(formatter, ":")?;
                write_name(formatter, name)
            }
            Self::Sequence(items) => {
                write!(formatter, "[")?;
                write_list(formatter, items)?;
                write!(formatter, "]")
            }
            Self::Pair(key, value) => write!(formatter, "{{{key}, {value}}}"),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_name(formatter, &self.name)?;
        if let Some(scope) = self.scope {
            write!(formatter, "#{scope}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "(")?;
        write_name(formatter, &self.head.name)?;
        for arg in &self.args {
            write!(formatter, " {arg}")?;
        }
        write!(formatter, ")")
    }
}

impl fmt::Display for Node {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(literal) => write!(formatter, "{literal}"),
            Self::Identifier(identifier) => write!(formatter, "{identifier}"),
            Self::Invocation(invocation) => write!(formatter, "{invocation}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::ScopeId;
    use expect_test::expect;

    #[test]
    fn test_display_test_case() {
        let node = Node::call(
            "test",
            vec![
                Node::text("adds"),
                Node::do_block(Node::call(
                    "assert",
                    vec![Node::call("==", vec![Node::int(1), Node::float(1.0)])],
                )),
            ],
        );
        expect![[r#"(test "adds" [{:do, (assert (== 1 1.0))}])"#]].assert_eq(&node.to_string());
    }

    #[test]
    fn test_display_scoped_identifiers_and_quoted_names() {
        let node = Node::call(
            "def",
            vec![
                Node::atom("test adds"),
                Node::seq(vec![]),
                Node::call("=", vec![Node::scoped_ident("x", ScopeId(4)), Node::ident("y")]),
            ],
        );
        expect![[r#"(def :"test adds" [] (= x#4 y))"#]].assert_eq(&node.to_string());
    }

    #[test]
    fn test_display_quotes_names_that_look_scoped() {
        let node = Node::seq(vec![Node::ident("x#4"), Node::scoped_ident("x", ScopeId(4))]);
        expect![[r#"["x#4", x#4]"#]].assert_eq(&node.to_string());
    }
}
