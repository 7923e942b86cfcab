//! Reduce handlers and the argument-shaping programs attached to productions.

use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

pub use serde_json::Value;

/// Error raised from a reduce or token handler. Aborts the in-progress parse.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

/// Signature of a reduce callback: the caller-supplied context plus the
/// reduced body's values, leftmost first.
pub type NativeFn = dyn Fn(&mut Value, Vec<Value>) -> Result<Value, HandlerError> + Send + Sync;

/// A reduce handler. Builtins are looked up in a fixed registry and survive
/// serialization; native closures do not.
#[derive(Clone)]
pub enum Handler {
    Builtin(String),
    Native(Arc<NativeFn>),
}

impl Handler {
    pub fn builtin(name: impl Into<String>) -> Self {
        Self::Builtin(name.into())
    }

    pub fn native<F>(f: F) -> Self
    where
        F: Fn(&mut Value, Vec<Value>) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        Self::Native(Arc::new(f))
    }

    pub fn invoke(&self, ctx: &mut Value, args: Vec<Value>) -> Result<Value, HandlerError> {
        match self {
            Self::Builtin(name) => {
                let f = builtin(name)
                    .ok_or_else(|| HandlerError::new(format!("unknown builtin handler `{}`", name)))?;
                f(ctx, args)
            }
            Self::Native(f) => f(ctx, args),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin(name) => f.debug_tuple("Builtin").field(name).finish(),
            Self::Native(..) => f.debug_struct("Native").finish_non_exhaustive(),
        }
    }
}

/// The fixed registry of serializable reduce handlers.
pub fn builtin(name: &str) -> Option<fn(&mut Value, Vec<Value>) -> Result<Value, HandlerError>> {
    Some(match name {
        "identity" => |_, args| Ok(Value::Array(args)),
        "first" => |_, mut args| {
            Ok(if args.is_empty() {
                Value::Null
            } else {
                args.swap_remove(0)
            })
        },
        "last" => |_, mut args| Ok(args.pop().unwrap_or(Value::Null)),
        "null" => |_, _| Ok(Value::Null),
        "concat" => |_, args| {
            let mut out = String::new();
            for arg in &args {
                match arg {
                    Value::Null => {}
                    Value::String(s) => out.push_str(s),
                    other => out.push_str(&other.to_string()),
                }
            }
            Ok(Value::String(out))
        },
        _ => return None,
    })
}

/// Reference from a production to its reduce behavior: nothing (identity), an
/// index into the handler array, or an adapter wrapping either.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerRef {
    #[default]
    None,
    Index(usize),
    Modifier(Box<HandlerModifier>),
}

/// One argument-shaping step chained in front of a handler reference. The
/// outermost modifier runs first at reduce time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerModifier {
    pub op: ShapeOp,
    pub next: HandlerRef,
}

impl HandlerRef {
    pub fn wrap(self, op: ShapeOp) -> Self {
        Self::Modifier(Box::new(HandlerModifier { op, next: self }))
    }
}

/// Transformations over the reduce's argument vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeOp {
    Identity,
    /// Insert `Value::Null` at the given slot.
    Epsilon { slot: usize },
    /// Group `count` consecutive arguments starting at `slot` into one array.
    Merge { slot: usize, count: usize },
    /// Begin an accumulator pair `(args, [])`. Terminal: yields the value.
    Collect,
    /// Extend the pair's list with the trailing arguments. Terminal.
    Append,
    /// Unpack an accumulator pair back into the argument vector, placing the
    /// collected list at `slot`.
    Apply { slot: usize },
}

/// Outcome of running a program's shaping steps.
#[derive(Debug, Clone, PartialEq)]
pub enum Shaped {
    /// Shaped argument vector, ready for the user handler.
    Args(Vec<Value>),
    /// A terminal step produced the reduce value directly.
    Value(Value),
}

/// The flat, recursion-free form of a modifier chain, frozen at build time
/// and executed on every reduce of the owning production.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReduceProgram {
    pub steps: Vec<ShapeOp>,
    pub handler: Option<usize>,
}

impl ReduceProgram {
    /// Flatten a modifier chain, dropping no-op identities.
    pub fn compile(handler: &HandlerRef) -> Self {
        let mut steps = Vec::new();
        let mut current = handler;
        loop {
            match current {
                HandlerRef::None => return Self { steps, handler: None },
                HandlerRef::Index(i) => {
                    return Self {
                        steps,
                        handler: Some(*i),
                    }
                }
                HandlerRef::Modifier(m) => {
                    if m.op != ShapeOp::Identity {
                        steps.push(m.op);
                    }
                    current = &m.next;
                }
            }
        }
    }

    pub fn run(&self, mut args: Vec<Value>) -> Result<Shaped, HandlerError> {
        for op in &self.steps {
            match *op {
                ShapeOp::Identity => {}

                ShapeOp::Epsilon { slot } => {
                    if slot > args.len() {
                        return Err(HandlerError::new(format!(
                            "epsilon slot {} out of range for {} arguments",
                            slot,
                            args.len()
                        )));
                    }
                    args.insert(slot, Value::Null);
                }

                ShapeOp::Merge { slot, count } => {
                    if slot + count > args.len() {
                        return Err(HandlerError::new(format!(
                            "merge of {} arguments at slot {} out of range for {} arguments",
                            count,
                            slot,
                            args.len()
                        )));
                    }
                    let grouped: Vec<Value> = args.drain(slot..slot + count).collect();
                    args.insert(slot, Value::Array(grouped));
                }

                ShapeOp::Collect => {
                    return Ok(Shaped::Value(Value::Array(vec![
                        Value::Array(args),
                        Value::Array(Vec::new()),
                    ])));
                }

                ShapeOp::Append => {
                    if args.is_empty() {
                        return Err(HandlerError::new("append on an empty argument vector"));
                    }
                    let mut rest = args.split_off(1);
                    let (acc, mut list) = unpack_pair(args.pop())?;
                    list.append(&mut rest);
                    return Ok(Shaped::Value(Value::Array(vec![
                        Value::Array(acc),
                        Value::Array(list),
                    ])));
                }

                ShapeOp::Apply { slot } => {
                    if args.is_empty() {
                        return Err(HandlerError::new("apply on an empty argument vector"));
                    }
                    let rest = args.split_off(1);
                    let (acc, list) = unpack_pair(args.pop())?;
                    if acc.len() != slot {
                        return Err(HandlerError::new(format!(
                            "collector arity mismatch: expected {} leading arguments, found {}",
                            slot,
                            acc.len()
                        )));
                    }
                    args = acc;
                    args.push(Value::Array(list));
                    args.extend(rest);
                }
            }
        }
        Ok(Shaped::Args(args))
    }
}

fn unpack_pair(value: Option<Value>) -> Result<(Vec<Value>, Vec<Value>), HandlerError> {
    let mismatch = || HandlerError::new("malformed collector pair");
    let Some(Value::Array(mut parts)) = value else {
        return Err(mismatch());
    };
    if parts.len() != 2 {
        return Err(mismatch());
    }
    let Some(Value::Array(list)) = parts.pop() else {
        return Err(mismatch());
    };
    let Some(Value::Array(acc)) = parts.pop() else {
        return Err(mismatch());
    };
    Ok((acc, list))
}
