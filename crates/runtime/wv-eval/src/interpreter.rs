//! Tree-walking interpreter

#![allow(
    clippy::min_ident_chars,
    reason = "Short identifiers like op, l, r are conventional in operator implementations"
)]

use crate::value::Value;
use rustc_hash::FxHashMap;
use std::ops::ControlFlow;
use std::slice;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;
use wv_tree::{Identifier, Invocation, Literal, Name, Node, ScopeId};

/// Interpreter error
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Identifier with no binding in scope
    #[error("unbound variable: {0}")]
    UnboundVariable(Identifier),
    /// Call to a name that is neither a builtin, a definition nor a native
    #[error("undefined function: {0}")]
    UndefinedFunction(Name),
    /// Wrong number of arguments
    #[error("{function} expects {expected} arguments, got {got}")]
    Arity {
        /// Called function
        function: Name,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        got: usize,
    },
    /// Type mismatch
    #[error("type mismatch in {op}: expected {expected}, got {got}")]
    TypeMismatch {
        /// Operation being applied
        op: Name,
        /// Expected type
        expected: String,
        /// Got type
        got: String,
    },
    /// Division by zero
    #[error("division by zero")]
    DivisionByZero,
    /// Malformed builtin form
    #[error("invalid {form} form: {message}")]
    InvalidForm {
        /// Builtin head
        form: Name,
        /// What is wrong with it
        message: String,
    },
    /// `break` with no enclosing `loop`
    #[error("break outside of a loop")]
    BreakOutsideLoop,
    /// Raised by natives that check assertions
    #[error("assertion failed: {0}")]
    AssertionFailed(String),
}

/// Host function callable from evaluated code
pub type Native = Arc<dyn Fn(&mut Interpreter, &[Value]) -> Result<Value, EvalError> + Send + Sync>;

/// Result of evaluating one node: a value, or a `break` on its way to the
/// nearest enclosing loop
type Step = ControlFlow<Value, Value>;

/// Unwraps a `Continue` value or forwards a `Break` to the caller
macro_rules! value {
    ($step:expr) => {
        match $step? {
            ControlFlow::Continue(value) => value,
            ControlFlow::Break(value) => return Ok(ControlFlow::Break(value)),
        }
    };
}

/// Variables are keyed by name and hygiene scope
type Binding = (Name, Option<ScopeId>);

#[derive(Debug, Clone)]
struct Function {
    params: Vec<Identifier>,
    body: Node,
}

/// Interpreter state
pub struct Interpreter {
    /// Global frame first, innermost call last
    frames: Vec<FxHashMap<Binding, Value>>,
    /// Functions introduced with `def`
    functions: FxHashMap<Name, Function>,
    /// Host functions
    natives: FxHashMap<Name, Native>,
}

impl Interpreter {
    /// Create a new interpreter
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames: vec![FxHashMap::default()],
            functions: FxHashMap::default(),
            natives: FxHashMap::default(),
        }
    }

    /// Registers a host function under `name`
    pub fn define_native<F>(&mut self, name: impl Into<Name>, native: F)
    where
        F: Fn(&mut Self, &[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.natives.insert(name.into(), Arc::new(native));
    }

    /// Whether `def` has introduced `name`
    #[must_use]
    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Global binding of a caller-authored variable
    #[must_use]
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.frames
            .first()
            .and_then(|frame| frame.get(&(Name::new(name), None)))
    }

    /// Evaluates a fully expanded tree at top level
    ///
    /// # Errors
    /// Returns `EvalError` if evaluation fails
    pub fn eval(&mut self, node: &Node) -> Result<Value, EvalError> {
        match self.eval_node(node)? {
            ControlFlow::Continue(value) => Ok(value),
            ControlFlow::Break(_) => Err(EvalError::BreakOutsideLoop),
        }
    }

    /// Calls a defined function or native by name
    ///
    /// # Errors
    /// Returns `EvalError` if the function is unknown or its body fails
    pub fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        if let Some(function) = self.functions.get(name).cloned() {
            return self.call_function(name, &function, args);
        }
        if let Some(native) = self.natives.get(name).cloned() {
            trace!(native = name, "calling native");
            return native(self, args);
        }
        Err(EvalError::UndefinedFunction(Name::new(name)))
    }

    fn call_function(&mut self, name: &str, function: &Function, args: &[Value]) -> Result<Value, EvalError> {
        if function.params.len() != args.len() {
            return Err(EvalError::Arity {
                function: Name::new(name),
                expected: function.params.len(),
                got: args.len(),
            });
        }
        trace!(function = name, "calling function");

        let frame = function
            .params
            .iter()
            .zip(args)
            .map(|(param, arg)| ((param.name.clone(), param.scope), arg.clone()))
            .collect();
        self.frames.push(frame);
        let result = self.eval_node(&function.body);
        self.frames.pop();

        match result? {
            ControlFlow::Continue(value) => Ok(value),
            ControlFlow::Break(_) => Err(EvalError::BreakOutsideLoop),
        }
    }

    fn eval_node(&mut self, node: &Node) -> Result<Step, EvalError> {
        match node {
            Node::Literal(literal) => self.eval_literal(literal),
            Node::Identifier(identifier) => self
                .read(identifier)
                .map(ControlFlow::Continue)
                .ok_or_else(|| EvalError::UnboundVariable(identifier.clone())),
            Node::Invocation(call) => self.eval_invocation(call),
        }
    }

    fn eval_literal(&mut self, literal: &Literal) -> Result<Step, EvalError> {
        Ok(ControlFlow::Continue(match literal {
            Literal::Integer(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Text(s) => Value::Text(s.clone()),
            Literal::Atom(name) => Value::Atom(name.clone()),
            Literal::Sequence(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(value!(self.eval_node(item)));
                }
                Value::List(values)
            }
            Literal::Pair(key, val) => {
                let key = value!(self.eval_node(key));
                let val = value!(self.eval_node(val));
                Value::Pair(Box::new(key), Box::new(val))
            }
        }))
    }

    fn eval_invocation(&mut self, call: &Invocation) -> Result<Step, EvalError> {
        let head = call.name();
        match head.as_str() {
            "__block__" => self.eval_block(&call.args),
            "=" => self.eval_assign(call),
            "if" => self.eval_if(call),
            "def" => self.eval_def(call),
            "loop" => self.eval_loop(call),
            "break" => {
                let value = match call.args.first() {
                    Some(arg) => value!(self.eval_node(arg)),
                    None => Value::Unit,
                };
                Ok(ControlFlow::Break(value))
            }
            _ => {
                let mut args = Vec::with_capacity(call.args.len());
                for arg in &call.args {
                    args.push(value!(self.eval_node(arg)));
                }
                let value = match (head.as_str(), args.as_slice()) {
                    ("not", [value]) => Value::Bool(!value.is_truthy()),
                    ("+" | "-" | "*" | "/", [l, r]) => Self::eval_arithmetic(head, l, r)?,
                    ("==", [l, r]) => Value::Bool(Self::equals(l, r)),
                    ("!=", [l, r]) => Value::Bool(!Self::equals(l, r)),
                    ("<" | ">" | "<=" | ">=", [l, r]) => Self::eval_comparison(head, l, r)?,
                    _ => self.call(head, &args)?,
                };
                Ok(ControlFlow::Continue(value))
            }
        }
    }

    fn eval_block(&mut self, statements: &[Node]) -> Result<Step, EvalError> {
        let mut last = Value::Unit;
        for statement in statements {
            last = value!(self.eval_node(statement));
        }
        Ok(ControlFlow::Continue(last))
    }

    fn eval_assign(&mut self, call: &Invocation) -> Result<Step, EvalError> {
        let [Node::Identifier(target), value] = call.args.as_slice() else {
            return Err(invalid(call, "expected (= identifier value)"));
        };
        let value = value!(self.eval_node(value));
        self.write(target, value.clone());
        Ok(ControlFlow::Continue(value))
    }

    fn eval_if(&mut self, call: &Invocation) -> Result<Step, EvalError> {
        // (if cond [do: then, else: other]) or (if cond then other?)
        let (condition, then, otherwise) = match (call.positional(), call.block()) {
            ([condition], Some(_)) => (condition, call.keyword("do"), call.keyword("else")),
            ([condition, then], None) => (condition, Some(then), None),
            ([condition, then, otherwise], None) => (condition, Some(then), Some(otherwise)),
            _ => return Err(invalid(call, "expected a condition and one or two branches")),
        };
        let branch = if value!(self.eval_node(condition)).is_truthy() {
            then
        } else {
            otherwise
        };
        match branch {
            Some(branch) => self.eval_node(branch),
            None => Ok(ControlFlow::Continue(Value::Unit)),
        }
    }

    fn eval_def(&mut self, call: &Invocation) -> Result<Step, EvalError> {
        let [name, Node::Literal(Literal::Sequence(params)), body @ ..] = call.args.as_slice() else {
            return Err(invalid(call, "expected (def name [params] body...)"));
        };
        let name = match name {
            Node::Identifier(identifier) => identifier.name.clone(),
            Node::Literal(Literal::Atom(name)) => name.clone(),
            Node::Literal(Literal::Text(text)) => Name::new(text.as_str()),
            _ => return Err(invalid(call, "function name must be an identifier, atom or text")),
        };
        let params = params
            .iter()
            .map(|param| param.as_identifier().cloned())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| invalid(call, "parameters must be identifiers"))?;
        let body = match body {
            [single] => single.clone(),
            _ => Node::call("__block__", body.to_vec()),
        };

        self.functions.insert(name.clone(), Function { params, body });
        Ok(ControlFlow::Continue(Value::Atom(name)))
    }

    fn eval_loop(&mut self, call: &Invocation) -> Result<Step, EvalError> {
        let body = match call.block() {
            Some(_) => call
                .keyword("do")
                .map(slice::from_ref)
                .ok_or_else(|| invalid(call, "expected a do block"))?,
            None => call.args.as_slice(),
        };
        loop {
            if let ControlFlow::Break(value) = self.eval_block(body)? {
                return Ok(ControlFlow::Continue(value));
            }
        }
    }

    fn eval_arithmetic(op: &Name, left: &Value, right: &Value) -> Result<Value, EvalError> {
        match (op.as_str(), left, right) {
            ("/", Value::Int(_), Value::Int(0)) => Err(EvalError::DivisionByZero),
            ("+", Value::Int(l), Value::Int(r)) => Ok(Value::Int(l.wrapping_add(*r))),
            ("-", Value::Int(l), Value::Int(r)) => Ok(Value::Int(l.wrapping_sub(*r))),
            ("*", Value::Int(l), Value::Int(r)) => Ok(Value::Int(l.wrapping_mul(*r))),
            ("/", Value::Int(l), Value::Int(r)) => Ok(Value::Int(l.wrapping_div(*r))),
            (op, l, r) => {
                let (Some(l), Some(r)) = (as_number(l), as_number(r)) else {
                    return Err(mismatch(op, "numbers", left, right));
                };
                Ok(Value::Float(match op {
                    "+" => l + r,
                    "-" => l - r,
                    "*" => l * r,
                    _ => l / r,
                }))
            }
        }
    }

    fn eval_comparison(op: &Name, left: &Value, right: &Value) -> Result<Value, EvalError> {
        let ordering = match (left, right) {
            (Value::Int(l), Value::Int(r)) => l.partial_cmp(r),
            (Value::Text(l), Value::Text(r)) => l.partial_cmp(r),
            (l, r) => match (as_number(l), as_number(r)) {
                (Some(l), Some(r)) => l.partial_cmp(&r),
                _ => return Err(mismatch(op, "comparable values", left, right)),
            },
        };
        let Some(ordering) = ordering else {
            return Ok(Value::Bool(false));
        };
        Ok(Value::Bool(match op.as_str() {
            "<" => ordering.is_lt(),
            ">" => ordering.is_gt(),
            "<=" => ordering.is_le(),
            _ => ordering.is_ge(),
        }))
    }

    /// Structural equality where integers and floats compare numerically
    #[allow(clippy::float_cmp, reason = "Direct float comparison is intentional for interpreter semantics")]
    fn equals(left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Int(l), Value::Float(r)) | (Value::Float(r), Value::Int(l)) => (*l as f64) == *r,
            (l, r) => l == r,
        }
    }

    fn read(&self, identifier: &Identifier) -> Option<Value> {
        let key = (identifier.name.clone(), identifier.scope);
        self.frames
            .last()
            .and_then(|frame| frame.get(&key))
            .or_else(|| self.frames.first().and_then(|frame| frame.get(&key)))
            .cloned()
    }

    fn write(&mut self, identifier: &Identifier, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert((identifier.name.clone(), identifier.scope), value);
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn invalid(call: &Invocation, message: &str) -> EvalError {
    EvalError::InvalidForm {
        form: call.name().clone(),
        message: message.to_owned(),
    }
}

fn mismatch(op: &str, expected: &str, left: &Value, right: &Value) -> EvalError {
    EvalError::TypeMismatch {
        op: Name::new(op),
        expected: expected.to_owned(),
        got: format!("{} and {}", left.type_name(), right.type_name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ident(name: &str) -> Node {
        Node::ident(name)
    }

    #[test]
    fn test_scopes_never_alias() {
        let mut interp = Interpreter::new();
        let program = Node::call(
            "__block__",
            vec![
                Node::call("=", vec![ident("name"), Node::text("Chris")]),
                Node::call("=", vec![Node::scoped_ident("name", ScopeId(1)), Node::text("Max")]),
                ident("name"),
            ],
        );
        assert_eq!(interp.eval(&program).unwrap(), Value::Text("Chris".into()));
        assert_eq!(interp.global("name"), Some(&Value::Text("Chris".into())));
    }

    #[test]
    fn test_def_and_call() {
        let mut interp = Interpreter::new();
        let program = Node::call(
            "__block__",
            vec![
                Node::call(
                    "def",
                    vec![
                        Node::atom("add"),
                        Node::seq(vec![ident("a"), ident("b")]),
                        Node::call("+", vec![ident("a"), ident("b")]),
                    ],
                ),
                Node::call("add", vec![Node::int(2), Node::int(3)]),
            ],
        );
        assert_eq!(interp.eval(&program).unwrap(), Value::Int(5));
        assert!(interp.has_function("add"));
        assert_eq!(
            interp.call("add", &[Value::Int(1)]).unwrap_err(),
            EvalError::Arity {
                function: Name::new("add"),
                expected: 2,
                got: 1,
            }
        );
    }

    #[test]
    fn test_loop_stops_at_break() {
        let mut interp = Interpreter::new();
        let program = Node::call(
            "__block__",
            vec![
                Node::call("=", vec![ident("n"), Node::int(0)]),
                Node::call(
                    "loop",
                    vec![Node::do_block(Node::call(
                        "__block__",
                        vec![
                            Node::call("=", vec![ident("n"), Node::call("+", vec![ident("n"), Node::int(1)])]),
                            Node::call(
                                "if",
                                vec![
                                    Node::call("==", vec![ident("n"), Node::int(5)]),
                                    Node::call("break", vec![ident("n")]),
                                ],
                            ),
                        ],
                    ))],
                ),
            ],
        );
        assert_eq!(interp.eval(&program).unwrap(), Value::Int(5));
        assert_eq!(
            interp.eval(&Node::call("break", vec![])).unwrap_err(),
            EvalError::BreakOutsideLoop
        );
    }

    #[test]
    fn test_natives_see_evaluated_arguments() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut interp = Interpreter::new();
        interp.define_native("tick", move |_interp, _args| {
            Ok(Value::Int(counter.fetch_add(1, Ordering::SeqCst) as i64 + 1))
        });
        let program = Node::call(
            "+",
            vec![Node::call("tick", vec![]), Node::call("tick", vec![])],
        );
        assert_eq!(interp.eval(&program).unwrap(), Value::Int(3));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_mixed_numbers() {
        let mut interp = Interpreter::new();
        let eq = Node::call("==", vec![Node::int(1), Node::float(1.0)]);
        assert_eq!(interp.eval(&eq).unwrap(), Value::Bool(true));
        let div = Node::call("/", vec![Node::int(1), Node::int(0)]);
        assert_eq!(interp.eval(&div).unwrap_err(), EvalError::DivisionByZero);
        let bad = Node::call("<", vec![Node::int(1), Node::text("x")]);
        assert!(matches!(
            interp.eval(&bad).unwrap_err(),
            EvalError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_unbound_and_undefined() {
        let mut interp = Interpreter::new();
        assert!(matches!(
            interp.eval(&Node::scoped_ident("x", ScopeId(3))).unwrap_err(),
            EvalError::UnboundVariable(_)
        ));
        assert_eq!(
            interp.eval(&Node::call("nope", vec![])).unwrap_err(),
            EvalError::UndefinedFunction(Name::new("nope"))
        );
    }
}
