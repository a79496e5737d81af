use std::f64::consts::{E, PI};
use std::num::NonZeroUsize;

use crate::token::{Function, Token, VariableId};
use crate::ConfigError;

use pest::error::InputLocation;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

#[derive(Parser)]
#[grammar = "grammar.pest"] // relative to project `src`
struct ExpressionLexer;

/// The only variable name an expression may use, either bare (`x`) or
/// indexed (`x[i]`).
pub const VARIABLE_NAME: &str = "x";

/// Which variable syntax, if any, an expression is allowed to use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VariableMode {
    #[default]
    NoVariables,
    /// A single bare `x`, bound to index 0.
    Scalar,
    /// `x[0]` through `x[N - 1]`.
    Vector(NonZeroUsize),
}

impl VariableMode {
    /// Vector mode with `dimension` indexed variables.
    pub fn vector(dimension: usize) -> Result<Self, ConfigError> {
        NonZeroUsize::new(dimension)
            .map(Self::Vector)
            .ok_or(ConfigError::ZeroDimension)
    }

    /// Number of variable values an expression compiled in this mode may
    /// reference.
    pub fn dimension(&self) -> usize {
        match self {
            Self::NoVariables => 0,
            Self::Scalar => 1,
            Self::Vector(dimension) => dimension.get(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("malformed number '{literal}' at position {position}: trailing decimal point")]
    TrailingDecimalPoint { literal: String, position: usize },
    #[error("malformed number '{literal}' at position {position}: more than one decimal point")]
    DuplicateDecimalPoint { literal: String, position: usize },
    #[error("illegal character '{character}' at position {position}")]
    IllegalCharacter { character: char, position: usize },
    #[error("'{name}' at position {position} is not a valid variable or function name")]
    UnknownIdentifier { name: String, position: usize },
    #[error("variable '{name}' at position {position} is not allowed in a constant expression")]
    VariablesNotAllowed { name: String, position: usize },
    #[error("indexed variable at position {position} used, but only the scalar variable x is allowed")]
    IndexInScalarMode { position: usize },
    #[error("scalar variable at position {position} used, but indexed variables x[i] are expected")]
    ScalarInVectorMode { position: usize },
    #[error("variable index {index} at position {position} is out of range 0..{dimension}")]
    IndexOutOfRange {
        index: String,
        dimension: usize,
        position: usize,
    },
    #[error("variable index '{index}' at position {position} is not a non-negative integer literal")]
    InvalidIndex { index: String, position: usize },
    #[error("variable index at position {position} is missing its closing ']'")]
    UnclosedIndex { position: usize },
    #[error("syntax error at position {position}: {message}")]
    Grammar { message: String, position: usize },
}

impl From<pest::error::Error<Rule>> for LexError {
    fn from(error: pest::error::Error<Rule>) -> Self {
        let position = match error.location {
            InputLocation::Pos(position) => position,
            InputLocation::Span((start, _)) => start,
        };
        Self::Grammar {
            message: error.variant.message().into_owned(),
            position,
        }
    }
}

/// Turns expression text into tokens in source order.
///
/// The tokenizer owns its [`VariableMode`]. Changing the mode only affects
/// later calls to [`Tokenizer::tokenize`]; tokens already produced are owned
/// by the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tokenizer {
    mode: VariableMode,
}

impl Tokenizer {
    pub fn new(mode: VariableMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> VariableMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: VariableMode) {
        self.mode = mode;
    }

    /// Tokenize `expression` after stripping whitespace and lower-casing it.
    ///
    /// Error positions are byte offsets into the normalized text.
    pub fn tokenize(&self, expression: &str) -> Result<Vec<Token>, LexError> {
        let normalized = normalize(expression);
        let pairs = ExpressionLexer::parse(Rule::expression, &normalized)?;

        let mut tokens: Vec<Token> = Vec::with_capacity(normalized.len());
        for pair in pairs.flat_map(|pair| pair.into_inner()) {
            let position = pair.as_span().start();
            let token = match pair.as_rule() {
                Rule::identifier => self.identifier(pair)?,
                Rule::number => number(pair.as_str(), position)?,
                Rule::add if is_unary_position(tokens.last()) => Token::Pos,
                Rule::add => Token::Add,
                Rule::subtract if is_unary_position(tokens.last()) => Token::Neg,
                Rule::subtract => Token::Sub,
                Rule::multiply => Token::Mul,
                Rule::divide => Token::Div,
                Rule::power => Token::Pow,
                Rule::left_paren => Token::LeftParen,
                Rule::right_paren => Token::RightParen,
                Rule::comma => Token::Comma,
                Rule::EOI => break,
                _ => return Err(illegal_character(pair.as_str(), position)),
            };
            tokens.push(token);
        }
        log::trace!("tokenized {normalized:?} into {} tokens", tokens.len());
        Ok(tokens)
    }

    /// Classify an identifier: function name, then constant, then variable.
    fn identifier(&self, pair: Pair<Rule>) -> Result<Token, LexError> {
        let position = pair.as_span().start();
        let mut name = "";
        let mut subscript = None;
        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::name => name = part.as_str(),
                Rule::subscript => subscript = Some(Subscript::new(part)),
                _ => {}
            }
        }

        if let Some(function) = Function::from_name(name) {
            return match subscript {
                Some(subscript) => Err(subscript.unexpected()),
                None => Ok(Token::Function(function)),
            };
        }
        if let Some(value) = constant(name) {
            return match subscript {
                Some(subscript) => Err(subscript.unexpected()),
                None => Ok(Token::Number(value)),
            };
        }
        if name != VARIABLE_NAME {
            return Err(LexError::UnknownIdentifier {
                name: name.to_owned(),
                position,
            });
        }

        match (self.mode, subscript) {
            (VariableMode::NoVariables, _) => Err(LexError::VariablesNotAllowed {
                name: name.to_owned(),
                position,
            }),
            (VariableMode::Scalar, None) => Ok(Token::Variable(0)),
            (VariableMode::Scalar, Some(_)) => Err(LexError::IndexInScalarMode { position }),
            (VariableMode::Vector(_), None) => Err(LexError::ScalarInVectorMode { position }),
            (VariableMode::Vector(dimension), Some(subscript)) => subscript
                .resolve(dimension.get())
                .map(Token::Variable),
        }
    }
}

/// Tokenize `expression` with a one-off [`Tokenizer`].
pub fn tokenize(expression: &str, mode: VariableMode) -> Result<Vec<Token>, LexError> {
    Tokenizer::new(mode).tokenize(expression)
}

fn normalize(expression: &str) -> String {
    expression
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// A sign is unary at the start of the expression and after an operator, an
/// opening parenthesis or a comma.
fn is_unary_position(previous: Option<&Token>) -> bool {
    match previous {
        None => true,
        Some(token) => {
            token.is_operator() || matches!(token, Token::LeftParen | Token::Comma)
        }
    }
}

fn constant(name: &str) -> Option<f64> {
    match name {
        "e" => Some(E),
        "pi" => Some(PI),
        _ => None,
    }
}

fn number(literal: &str, position: usize) -> Result<Token, LexError> {
    if literal.matches('.').count() > 1 {
        return Err(LexError::DuplicateDecimalPoint {
            literal: literal.to_owned(),
            position,
        });
    }
    if literal.ends_with('.') {
        return Err(LexError::TrailingDecimalPoint {
            literal: literal.to_owned(),
            position,
        });
    }
    literal
        .parse::<f64>()
        .map(Token::Number)
        .map_err(|e| LexError::Grammar {
            message: e.to_string(),
            position,
        })
}

fn illegal_character(text: &str, position: usize) -> LexError {
    match text.chars().next() {
        Some(character) => LexError::IllegalCharacter {
            character,
            position,
        },
        None => LexError::Grammar {
            message: "unexpected end of input".to_owned(),
            position,
        },
    }
}

/// The bracketed part of `x[...]`.
struct Subscript<'i> {
    index: &'i str,
    closed: bool,
    position: usize,
    index_position: usize,
}

impl<'i> Subscript<'i> {
    fn new(pair: Pair<'i, Rule>) -> Self {
        let position = pair.as_span().start();
        let mut subscript = Self {
            index: "",
            closed: false,
            position,
            index_position: position + 1,
        };
        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::index => {
                    subscript.index = part.as_str();
                    subscript.index_position = part.as_span().start();
                }
                Rule::close => subscript.closed = true,
                _ => {}
            }
        }
        subscript
    }

    /// A subscript attached to a function or constant name.
    fn unexpected(&self) -> LexError {
        LexError::IllegalCharacter {
            character: '[',
            position: self.position,
        }
    }

    fn resolve(&self, dimension: usize) -> Result<VariableId, LexError> {
        if !self.closed {
            return Err(LexError::UnclosedIndex {
                position: self.position,
            });
        }
        if ExpressionLexer::parse(Rule::index_literal, self.index).is_err() {
            return Err(LexError::InvalidIndex {
                index: self.index.to_owned(),
                position: self.index_position,
            });
        }
        let out_of_range = || LexError::IndexOutOfRange {
            index: self.index.to_owned(),
            dimension,
            position: self.index_position,
        };
        // All digits, so parsing can only fail on overflow.
        let index: VariableId = self.index.parse().map_err(|_| out_of_range())?;
        if index >= dimension {
            return Err(out_of_range());
        }
        Ok(index)
    }
}
