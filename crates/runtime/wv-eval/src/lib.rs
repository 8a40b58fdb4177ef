//! Reference evaluator for expanded trees
//!
//! Slow and simple. It exists so that the effects of expansion (which
//! binding an identifier refers to, how often a spliced expression runs)
//! can be observed by running the output.

pub mod interpreter;
pub mod value;

pub use interpreter::{EvalError, Interpreter, Native};
pub use value::Value;
