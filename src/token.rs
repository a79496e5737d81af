use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;

/// Index into the `&[f64]` variable values passed to evaluation.
pub type VariableId = usize;

/// A single lexical unit, in source order after tokenizing and in postfix
/// order after conversion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Token {
    // Operands.
    Number(f64),
    Variable(VariableId),

    // Prefix application.
    Function(Function),

    // Binary operators.
    Add,
    Sub,
    Mul,
    Div,
    Pow,

    // Unary sign.
    Neg,
    Pos,

    // Grouping.
    LeftParen,
    RightParen,
    Comma,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
}

/// Precedence level and associativity of an operator token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Binding {
    pub precedence: u8,
    pub assoc: Assoc,
}

impl Binding {
    const fn new(precedence: u8, assoc: Assoc) -> Self {
        Self { precedence, assoc }
    }
}

impl Token {
    /// The binding class of operator-like tokens.
    ///
    /// Operands and grouping tokens have none. Functions bind tighter than any
    /// operator, so a function left on the operator stack is always flushed
    /// before the next operator is pushed.
    pub fn binding(&self) -> Option<Binding> {
        use Assoc::*;

        match self {
            Self::Add | Self::Sub => Some(Binding::new(1, Left)),
            Self::Mul | Self::Div => Some(Binding::new(2, Left)),
            Self::Pow | Self::Neg | Self::Pos => Some(Binding::new(3, Right)),
            Self::Function(_) => Some(Binding::new(4, Right)),
            Self::Number(_)
            | Self::Variable(_)
            | Self::LeftParen
            | Self::RightParen
            | Self::Comma => None,
        }
    }

    /// True for the binary and unary sign operators.
    pub fn is_operator(&self) -> bool {
        matches!(
            self,
            Self::Add | Self::Sub | Self::Mul | Self::Div | Self::Pow | Self::Neg | Self::Pos
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Variable(index) => write!(f, "VAR_{index}"),
            Self::Function(function) => f.write_str(function.name()),
            Self::Add => f.write_str("ADD"),
            Self::Sub => f.write_str("SUB"),
            Self::Mul => f.write_str("MUL"),
            Self::Div => f.write_str("DIV"),
            Self::Pow => f.write_str("POW"),
            Self::Neg => f.write_str("NEG"),
            Self::Pos => f.write_str("POS"),
            Self::LeftParen => f.write_str("LPAR"),
            Self::RightParen => f.write_str("RPAR"),
            Self::Comma => f.write_str("COM"),
        }
    }
}

/// Renders tokens as space-separated symbolic names, e.g. `3 ADD 5`.
pub fn to_debug_string(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// The fixed set of single-argument functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Sec,
    Csc,
    Cot,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Ln,
}

static FUNCTIONS: Lazy<HashMap<&'static str, Function>> = Lazy::new(|| {
    Function::ALL
        .iter()
        .map(|&function| (function.name(), function))
        .collect()
});

impl Function {
    pub const ALL: [Function; 13] = [
        Self::Sin,
        Self::Cos,
        Self::Tan,
        Self::Sec,
        Self::Csc,
        Self::Cot,
        Self::Asin,
        Self::Acos,
        Self::Atan,
        Self::Sinh,
        Self::Cosh,
        Self::Tanh,
        Self::Ln,
    ];

    /// Exact lookup of a lower-case function name.
    pub fn from_name(name: &str) -> Option<Self> {
        FUNCTIONS.get(name).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Sec => "sec",
            Self::Csc => "csc",
            Self::Cot => "cot",
            Self::Asin => "asin",
            Self::Acos => "acos",
            Self::Atan => "atan",
            Self::Sinh => "sinh",
            Self::Cosh => "cosh",
            Self::Tanh => "tanh",
            Self::Ln => "ln",
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
