//! Tree representation for compile-time transformation
//!
//! A program enters the engine as a [`Node`] tree produced by some external
//! front-end. The tree has exactly three kinds of element:
//!
//! - [`Literal`]: self-evaluating values (numbers, text, atoms, sequences, pairs)
//! - [`Identifier`]: a name plus an optional hygiene scope
//! - [`Invocation`]: a call, which may or may not resolve to a registered rule
//!
//! Trees are immutable. Every traversal here rebuilds a new tree instead of
//! editing in place, so a rule template can be spliced at many sites without
//! any site observing another.

mod decode;
mod display;
mod literal;
mod name;
mod node;

pub use decode::FromNode;
pub use literal::Literal;
pub use name::{Name, ScopeId};
pub use node::{CALLER_SCOPE, Head, Identifier, Invocation, Metadata, Node, UNQUOTE};
