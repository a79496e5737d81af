use std::collections::BTreeSet;
use std::fmt;

use crate::evaluate::{EvalError, Evaluator};
use crate::postfix::{to_postfix, ParseError};
use crate::token::{to_debug_string, Token, VariableId};
use crate::tokenize::{LexError, Tokenizer, VariableMode};

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// An expression in postfix order, ready to be evaluated any number of times
/// against different variable values.
///
/// Immutable once built, so it can be shared across threads for read-only
/// evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledExpression {
    postfix: Vec<Token>,
    mode: VariableMode,
}

impl CompiledExpression {
    /// Tokenize `input` under `mode` and convert it to postfix order.
    pub fn compile(input: &str, mode: VariableMode) -> Result<Self, CompileError> {
        Self::compile_with(&Tokenizer::new(mode), input)
    }

    pub fn compile_with(tokenizer: &Tokenizer, input: &str) -> Result<Self, CompileError> {
        let infix = tokenizer.tokenize(input)?;
        let postfix = to_postfix(&infix)?;
        let compiled = Self {
            postfix,
            mode: tokenizer.mode(),
        };
        log::debug!("compiled {input:?} to [{compiled}]");
        Ok(compiled)
    }

    pub fn tokens(&self) -> &[Token] {
        &self.postfix
    }

    /// The variable mode this expression was compiled under.
    pub fn mode(&self) -> VariableMode {
        self.mode
    }

    /// Indices of every variable the expression references.
    pub fn variables(&self) -> BTreeSet<VariableId> {
        self.postfix
            .iter()
            .filter_map(|token| match token {
                Token::Variable(index) => Some(*index),
                _ => None,
            })
            .collect()
    }

    /// Shortest value array that sets every referenced variable.
    pub fn required_len(&self) -> usize {
        self.variables().last().map_or(0, |index| index + 1)
    }

    /// Evaluate with the default epsilon.
    pub fn evaluate(&self, variables: &[f64]) -> Result<f64, EvalError> {
        self.evaluate_with(&Evaluator::default(), variables)
    }

    pub fn evaluate_with(
        &self,
        evaluator: &Evaluator,
        variables: &[f64],
    ) -> Result<f64, EvalError> {
        evaluator.evaluate(&self.postfix, variables)
    }

    pub fn evaluate_batch<V: AsRef<[f64]> + Sync>(
        &self,
        evaluator: &Evaluator,
        rows: &[V],
    ) -> Vec<Result<f64, EvalError>> {
        evaluator.evaluate_batch(&self.postfix, rows)
    }
}

impl fmt::Display for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_debug_string(&self.postfix))
    }
}
