//! Infix math expression compiler and postfix evaluator.
//!
//! # Why?
//!
//! Expressions are often evaluated many times with different variable
//! values, e.g. while sampling a function or iterating a solver. We pay for
//! tokenizing and operator-precedence parsing once, producing a postfix
//! [`CompiledExpression`] that a single stack scan evaluates against each new
//! set of values.
//!
//! Evaluation is checked: division by zero, `0^0`, `ln` of a non-positive
//! value and the poles of `sec`/`csc`/`cot` are reported as [`EvalError`]s
//! instead of producing infinities or NaN.
//!
//! # Example
//!
//! ```rust
//! use postfix_expr::*;
//!
//! let mode = VariableMode::vector(2).unwrap();
//! let compiled = compile("x[0] / x[1]", mode).unwrap();
//! assert_eq!(compiled.to_string(), "VAR_0 VAR_1 DIV");
//!
//! assert_eq!(compiled.evaluate(&[1.0, 2.0]), Ok(0.5));
//! assert_eq!(compiled.evaluate(&[10.0, -20.0]), Ok(-0.5));
//! assert_eq!(compiled.evaluate(&[1.0, 0.0]), Err(EvalError::DivisionByZero));
//! ```

mod evaluate;
mod expression;
mod postfix;
mod token;
mod tokenize;


/// Uses the [`pest`] parsing expression grammar language for lexing.
///
/// ```text
#[doc = include_str!("grammar.pest")]
/// ```
pub mod grammar_doc {}

pub use evaluate::*;
pub use expression::*;
pub use postfix::*;
pub use token::*;
pub use tokenize::*;

use thiserror::Error;

/// Rejected configuration values.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    #[error("vector variables need a dimension of at least 1")]
    ZeroDimension,
    #[error("epsilon must be finite and non-negative, got {0}")]
    InvalidEpsilon(f64),
}

/// Compile `expression` under `mode`. See [`CompiledExpression::compile`].
pub fn compile(expression: &str, mode: VariableMode) -> Result<CompiledExpression, CompileError> {
    CompiledExpression::compile(expression, mode)
}
