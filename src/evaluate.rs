use crate::token::{Function, Token, VariableId};
use crate::ConfigError;

#[cfg(feature = "rayon")]
use rayon::prelude::{IntoParallelRefIterator, ParallelIterator};
use thiserror::Error;

/// Magnitude below which a value is treated as zero by domain checks.
pub const DEFAULT_EPSILON: f64 = 1e-10;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("division by zero while evaluating {function}")]
    ReciprocalSingularity { function: Function },
    #[error("0^0 is undefined")]
    ZeroToZero,
    #[error("ln of non-positive value {value}")]
    LogOfNonPositive { value: f64 },
    #[error("malformed expression")]
    MalformedExpression,
    #[error("variable x[{index}] is not set; was a shorter value array supplied?")]
    VariableNotSet { index: VariableId },
    #[error("commas are not supported: functions take a single argument")]
    UnsupportedComma,
}

/// Scratch space for evaluation. Can be reused across evaluations to avoid
/// reallocating the operand stack.
///
/// Each evaluation needs exclusive access, so a stack cannot be shared by two
/// evaluations running at the same time.
#[derive(Clone, Debug, Default)]
pub struct OperandStack {
    values: Vec<f64>,
}

impl OperandStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, value: f64) {
        self.values.push(value);
    }

    fn pop(&mut self) -> Result<f64, EvalError> {
        self.values.pop().ok_or(EvalError::MalformedExpression)
    }

    /// Pops `(lhs, rhs)`. The right-hand operand is on top.
    fn pop_pair(&mut self) -> Result<(f64, f64), EvalError> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        Ok((lhs, rhs))
    }

    fn clear(&mut self) {
        self.values.clear();
    }
}

/// Postfix stack machine.
///
/// Holds only the epsilon threshold, so one evaluator can be shared freely.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Evaluator {
    epsilon: f64,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl Evaluator {
    /// An evaluator with a custom zero threshold. `epsilon` must be finite and
    /// non-negative.
    pub fn new(epsilon: f64) -> Result<Self, ConfigError> {
        if !epsilon.is_finite() || epsilon < 0.0 {
            return Err(ConfigError::InvalidEpsilon(epsilon));
        }
        Ok(Self { epsilon })
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Evaluate `postfix` with `variables` supplying `x[i]` (or `x` at index 0).
    pub fn evaluate(&self, postfix: &[Token], variables: &[f64]) -> Result<f64, EvalError> {
        let mut stack = OperandStack::with_capacity(postfix.len());
        self.evaluate_with_stack(postfix, variables, &mut stack)
    }

    /// Like [`Evaluator::evaluate`], reusing `stack` as scratch space.
    pub fn evaluate_with_stack(
        &self,
        postfix: &[Token],
        variables: &[f64],
        stack: &mut OperandStack,
    ) -> Result<f64, EvalError> {
        stack.clear();
        let result = self.run(postfix, variables, stack);
        if let Err(e) = &result {
            log::debug!("evaluation failed: {e}");
        }
        result
    }

    /// Evaluate one expression against many rows of variable values.
    ///
    /// With the `rayon` feature enabled, rows are evaluated in parallel.
    pub fn evaluate_batch<V: AsRef<[f64]> + Sync>(
        &self,
        postfix: &[Token],
        rows: &[V],
    ) -> Vec<Result<f64, EvalError>> {
        #[cfg(feature = "rayon")]
        {
            rows.par_iter()
                .map(|row| self.evaluate(postfix, row.as_ref()))
                .collect()
        }
        #[cfg(not(feature = "rayon"))]
        {
            let mut stack = OperandStack::with_capacity(postfix.len());
            rows.iter()
                .map(|row| self.evaluate_with_stack(postfix, row.as_ref(), &mut stack))
                .collect()
        }
    }

    fn run(
        &self,
        postfix: &[Token],
        variables: &[f64],
        stack: &mut OperandStack,
    ) -> Result<f64, EvalError> {
        for token in postfix {
            match *token {
                Token::Number(value) => stack.push(value),
                Token::Variable(index) => {
                    let value = variables
                        .get(index)
                        .copied()
                        .ok_or(EvalError::VariableNotSet { index })?;
                    stack.push(value);
                }
                Token::Add => {
                    let (lhs, rhs) = stack.pop_pair()?;
                    stack.push(lhs + rhs);
                }
                Token::Sub => {
                    let (lhs, rhs) = stack.pop_pair()?;
                    stack.push(lhs - rhs);
                }
                Token::Mul => {
                    let (lhs, rhs) = stack.pop_pair()?;
                    stack.push(lhs * rhs);
                }
                Token::Div => {
                    let (lhs, rhs) = stack.pop_pair()?;
                    if self.is_zero(rhs) {
                        return Err(EvalError::DivisionByZero);
                    }
                    stack.push(lhs / rhs);
                }
                Token::Pow => {
                    let (base, exponent) = stack.pop_pair()?;
                    if self.is_zero(base) && self.is_zero(exponent) {
                        return Err(EvalError::ZeroToZero);
                    }
                    stack.push(base.powf(exponent));
                }
                Token::Neg => {
                    let only = stack.pop()?;
                    stack.push(-only);
                }
                // Unary plus has no numeric effect.
                Token::Pos => {}
                Token::Function(function) => {
                    let argument = stack.pop()?;
                    stack.push(self.apply(function, argument)?);
                }
                Token::Comma => return Err(EvalError::UnsupportedComma),
                Token::LeftParen | Token::RightParen => {
                    return Err(EvalError::MalformedExpression)
                }
            }
        }

        let result = stack.pop()?;
        if !stack.values.is_empty() {
            return Err(EvalError::MalformedExpression);
        }
        Ok(result)
    }

    fn apply(&self, function: Function, argument: f64) -> Result<f64, EvalError> {
        let value = match function {
            Function::Sin => argument.sin(),
            Function::Cos => argument.cos(),
            Function::Tan => argument.tan(),
            Function::Sec => self.reciprocal(function, argument.cos())?,
            Function::Csc => self.reciprocal(function, argument.sin())?,
            Function::Cot => self.reciprocal(function, argument.tan())?,
            Function::Asin => argument.asin(),
            Function::Acos => argument.acos(),
            Function::Atan => argument.atan(),
            Function::Sinh => argument.sinh(),
            Function::Cosh => argument.cosh(),
            Function::Tanh => argument.tanh(),
            Function::Ln => {
                if argument < self.epsilon {
                    return Err(EvalError::LogOfNonPositive { value: argument });
                }
                argument.ln()
            }
        };
        Ok(value)
    }

    fn reciprocal(&self, function: Function, denominator: f64) -> Result<f64, EvalError> {
        if self.is_zero(denominator) {
            return Err(EvalError::ReciprocalSingularity { function });
        }
        Ok(1.0 / denominator)
    }

    fn is_zero(&self, value: f64) -> bool {
        value.abs() < self.epsilon
    }
}

/// Evaluate `postfix` with the default epsilon.
pub fn evaluate(postfix: &[Token], variables: &[f64]) -> Result<f64, EvalError> {
    Evaluator::default().evaluate(postfix, variables)
}

#[cfg(test)]
mod tests {
    use super::*;

    use Token::{Add, Comma, Div, LeftParen, Mul, Neg, Number, Pos, Pow, Sub, Variable};

    #[test]
    fn operand_order() {
        assert_eq!(evaluate(&[Number(7.0), Number(2.0), Sub], &[]), Ok(5.0));
        assert_eq!(evaluate(&[Number(7.0), Number(2.0), Div], &[]), Ok(3.5));
        assert_eq!(evaluate(&[Number(2.0), Number(3.0), Pow], &[]), Ok(8.0));
        assert_eq!(evaluate(&[Number(2.0), Number(3.0), Add], &[]), Ok(5.0));
        assert_eq!(evaluate(&[Number(2.0), Number(3.0), Mul], &[]), Ok(6.0));
    }

    #[test]
    fn unary_sign() {
        assert_eq!(evaluate(&[Number(3.0), Neg], &[]), Ok(-3.0));
        assert_eq!(evaluate(&[Number(3.0), Pos], &[]), Ok(3.0));
        assert_eq!(evaluate(&[Neg], &[]), Err(EvalError::MalformedExpression));
    }

    #[test]
    fn variables() {
        let postfix = [Variable(0), Variable(1), Div];
        assert_eq!(evaluate(&postfix, &[1.0, 2.0]), Ok(0.5));
        assert_eq!(evaluate(&postfix, &[10.0, -20.0]), Ok(-0.5));
        assert_eq!(
            evaluate(&postfix, &[1.0]),
            Err(EvalError::VariableNotSet { index: 1 })
        );
    }

    #[test]
    fn domain_errors() {
        assert_eq!(
            evaluate(&[Number(1.0), Number(0.0), Div], &[]),
            Err(EvalError::DivisionByZero)
        );
        assert_eq!(
            evaluate(&[Number(0.0), Number(0.0), Pow], &[]),
            Err(EvalError::ZeroToZero)
        );
        assert_eq!(evaluate(&[Number(0.0), Number(2.0), Pow], &[]), Ok(0.0));
        assert_eq!(evaluate(&[Number(2.0), Number(0.0), Pow], &[]), Ok(1.0));
        assert_eq!(
            evaluate(&[Number(0.0), Token::Function(Function::Ln)], &[]),
            Err(EvalError::LogOfNonPositive { value: 0.0 })
        );
        assert_eq!(
            evaluate(&[Number(-1.0), Token::Function(Function::Ln)], &[]),
            Err(EvalError::LogOfNonPositive { value: -1.0 })
        );
        assert_eq!(
            evaluate(&[Number(0.0), Token::Function(Function::Csc)], &[]),
            Err(EvalError::ReciprocalSingularity {
                function: Function::Csc
            })
        );
        assert_eq!(
            evaluate(
                &[Number(std::f64::consts::FRAC_PI_2), Token::Function(Function::Sec)],
                &[]
            ),
            Err(EvalError::ReciprocalSingularity {
                function: Function::Sec
            })
        );
        assert_eq!(
            evaluate(
                &[Number(std::f64::consts::PI), Token::Function(Function::Cot)],
                &[]
            ),
            Err(EvalError::ReciprocalSingularity {
                function: Function::Cot
            })
        );
    }

    #[test]
    fn custom_epsilon() {
        let postfix = [Number(1.0), Number(0.000244140625), Div];
        assert_eq!(evaluate(&postfix, &[]), Ok(4096.0));
        let coarse = Evaluator::new(1e-3).unwrap();
        assert_eq!(coarse.epsilon(), 1e-3);
        assert_eq!(coarse.evaluate(&postfix, &[]), Err(EvalError::DivisionByZero));

        assert_eq!(Evaluator::new(-1.0), Err(ConfigError::InvalidEpsilon(-1.0)));
        assert!(Evaluator::new(f64::NAN).is_err());
        assert!(Evaluator::new(f64::INFINITY).is_err());
        assert_eq!(Evaluator::new(0.0).map(|e| e.epsilon()), Ok(0.0));
    }

    #[test]
    fn functions() {
        let apply = |function, argument| {
            evaluate(&[Number(argument), Token::Function(function)], &[]).unwrap()
        };
        assert_eq!(apply(Function::Sin, 0.0), 0.0);
        assert_eq!(apply(Function::Cos, 0.0), 1.0);
        assert_eq!(apply(Function::Sec, 0.0), 1.0);
        assert_eq!(apply(Function::Cosh, 0.0), 1.0);
        assert_eq!(apply(Function::Ln, 1.0), 0.0);
        assert!((apply(Function::Csc, std::f64::consts::FRAC_PI_2) - 1.0).abs() < 1e-12);
        assert!((apply(Function::Cot, std::f64::consts::FRAC_PI_4) - 1.0).abs() < 1e-12);
        assert!((apply(Function::Atan, 1.0) - std::f64::consts::FRAC_PI_4).abs() < 1e-12);
    }

    #[test]
    fn malformed() {
        assert_eq!(evaluate(&[], &[]), Err(EvalError::MalformedExpression));
        assert_eq!(
            evaluate(&[Number(1.0), Number(2.0)], &[]),
            Err(EvalError::MalformedExpression)
        );
        assert_eq!(
            evaluate(&[Number(1.0), Add], &[]),
            Err(EvalError::MalformedExpression)
        );
        assert_eq!(
            evaluate(&[Number(1.0), Comma, Number(2.0), Token::Function(Function::Sin)], &[]),
            Err(EvalError::UnsupportedComma)
        );
        assert_eq!(
            evaluate(&[LeftParen, Number(1.0)], &[]),
            Err(EvalError::MalformedExpression)
        );
    }

    #[test]
    fn stack_is_reused() {
        let evaluator = Evaluator::default();
        let mut stack = OperandStack::new();
        let malformed = [Number(1.0), Number(2.0)];
        assert!(evaluator
            .evaluate_with_stack(&malformed, &[], &mut stack)
            .is_err());
        // Leftovers from a failed run must not leak into the next one.
        assert_eq!(
            evaluator.evaluate_with_stack(&[Number(4.0)], &[], &mut stack),
            Ok(4.0)
        );
    }

    #[test]
    fn batch() {
        let postfix = [Variable(0), Variable(1), Div];
        let rows = [[1.0, 2.0], [10.0, -20.0], [1.0, 0.0]];
        let results = Evaluator::default().evaluate_batch(&postfix, &rows);
        assert_eq!(
            results,
            vec![Ok(0.5), Ok(-0.5), Err(EvalError::DivisionByZero)]
        );
    }
}
