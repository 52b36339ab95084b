//! Internal control-flow propagation used by the evaluator.
//!
//! Unlike [`crate::error::EngineError`] (the host-facing result of
//! [`crate::JsEngine::eval`]), `Signal::Throw` carries an arbitrary
//! thrown [`Value`] — a script may `throw` any value, not just an Error
//! object, and `catch` must bind back that exact value (spec §7:
//! "the thrown value is preserved as-is for `catch`"). `Signal` also
//! carries the non-exceptional control-flow exits (`return`, `break`,
//! `continue`) that unwind through evaluator frames the same way a throw
//! does, up to the statement that handles them.

use std::rc::Rc;

use crate::error::Position;
use crate::value::Value;

pub enum Signal {
    Throw(Value, Vec<Position>),
    Return(Value),
    Break(Option<Rc<str>>),
    Continue(Option<Rc<str>>),
}

pub type EvalResult<T> = Result<T, Signal>;

impl Signal {
    pub fn throw(value: Value, at: Position) -> Signal {
        Signal::Throw(value, vec![at])
    }

    /// Adds a frame to a throw's position stack as it unwinds past a call
    /// boundary; a non-throw signal passes through unchanged.
    pub fn push_frame(self, at: Position) -> Signal {
        match self {
            Signal::Throw(v, mut stack) => {
                stack.push(at);
                Signal::Throw(v, stack)
            }
            other => other,
        }
    }

    pub fn type_error(message: impl Into<String>, at: Position) -> Signal {
        Signal::throw(Value::make_error("TypeError", message.into()), at)
    }

    pub fn reference_error(message: impl Into<String>, at: Position) -> Signal {
        Signal::throw(Value::make_error("ReferenceError", message.into()), at)
    }

    pub fn range_error(message: impl Into<String>, at: Position) -> Signal {
        Signal::throw(Value::make_error("RangeError", message.into()), at)
    }
}
