//! Constant-expression values and evaluation.

pub mod eval;
pub mod value;

pub use eval::{EvalContext, EvalError, evaluate};
pub use value::{ElementKind, ScalarValue, Value, ValueSet, integer_value, rational_set};
