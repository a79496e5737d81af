use crate::token::{Assoc, Token};

use thiserror::Error;

/// Structural errors found while reordering tokens. Positions are token
/// indices in the infix sequence.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("mismatched parenthesis at token {position}")]
    MismatchedParenthesis { position: usize },
    #[error("stray comma at token {position}: commas may only separate function arguments")]
    StrayComma { position: usize },
}

/// Reorder infix `tokens` into postfix (RPN) order with the shunting-yard
/// algorithm.
///
/// A comma inside a function call is kept in the output so evaluation can
/// reject multi-argument calls. Any other comma is a [`ParseError::StrayComma`].
pub fn to_postfix(tokens: &[Token]) -> Result<Vec<Token>, ParseError> {
    let mut output = Vec::with_capacity(tokens.len());
    // Operators waiting for their right-hand side, with their infix position.
    let mut operators: Vec<(usize, Token)> = Vec::new();

    for (position, &token) in tokens.iter().enumerate() {
        match token {
            Token::Number(_) | Token::Variable(_) => output.push(token),
            Token::Function(_) | Token::LeftParen => operators.push((position, token)),
            Token::RightParen => {
                if !pop_until_left_paren(&mut operators, &mut output) {
                    return Err(ParseError::MismatchedParenthesis { position });
                }
                operators.pop();
                // Closing the argument group completes the call.
                if let Some(&(_, function @ Token::Function(_))) = operators.last() {
                    output.push(function);
                    operators.pop();
                }
            }
            Token::Comma => {
                if !pop_until_left_paren(&mut operators, &mut output) {
                    return Err(ParseError::StrayComma { position });
                }
                let in_call = operators.len() >= 2
                    && matches!(operators[operators.len() - 2], (_, Token::Function(_)));
                if !in_call {
                    return Err(ParseError::StrayComma { position });
                }
                output.push(token);
            }
            operator => {
                if let Some(incoming) = operator.binding() {
                    while let Some(top) = operators.last().and_then(|(_, top)| top.binding()) {
                        let pops = top.precedence > incoming.precedence
                            || (top.precedence == incoming.precedence
                                && incoming.assoc == Assoc::Left);
                        if !pops {
                            break;
                        }
                        if let Some((_, popped)) = operators.pop() {
                            output.push(popped);
                        }
                    }
                }
                operators.push((position, operator));
            }
        }
    }

    while let Some((position, token)) = operators.pop() {
        if token == Token::LeftParen {
            return Err(ParseError::MismatchedParenthesis { position });
        }
        output.push(token);
    }

    log::trace!(
        "converted {} infix tokens into {} postfix tokens",
        tokens.len(),
        output.len()
    );
    Ok(output)
}

/// Move operators to `output` until a `(` is on top of the stack. The `(` is
/// left in place. Returns false if the stack runs out first.
fn pop_until_left_paren(operators: &mut Vec<(usize, Token)>, output: &mut Vec<Token>) -> bool {
    while let Some(&(_, top)) = operators.last() {
        if top == Token::LeftParen {
            return true;
        }
        output.push(top);
        operators.pop();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::to_debug_string;
    use crate::tokenize::{tokenize, VariableMode};

    fn rpn(input: &str) -> String {
        let tokens = tokenize(input, VariableMode::Scalar).unwrap();
        to_debug_string(&to_postfix(&tokens).unwrap())
    }

    fn rpn_error(input: &str) -> ParseError {
        let tokens = tokenize(input, VariableMode::Scalar).unwrap();
        to_postfix(&tokens).unwrap_err()
    }

    #[test]
    fn op_precedence() {
        assert_eq!(rpn("3 + 5"), "3 5 ADD");
        assert_eq!(rpn("1 * 2 + 3 * 4"), "1 2 MUL 3 4 MUL ADD");
        assert_eq!(rpn("8 / 4 * 3"), "8 4 DIV 3 MUL");
        assert_eq!(rpn("1 - 2 - 3"), "1 2 SUB 3 SUB");
        assert_eq!(rpn("1/(1+2)"), "1 1 2 ADD DIV");
    }

    #[test]
    fn power_is_right_associative() {
        assert_eq!(rpn("2^3^2"), "2 3 2 POW POW");
        assert_eq!(rpn("(2^3)^2"), "2 3 POW 2 POW");
    }

    #[test]
    fn unary_sign() {
        assert_eq!(rpn("-3^2"), "3 2 POW NEG");
        assert_eq!(rpn("-3^-2"), "3 2 NEG POW NEG");
        assert_eq!(rpn("2*-3"), "2 3 NEG MUL");
        assert_eq!(rpn("-2*3"), "2 NEG 3 MUL");
        assert_eq!(rpn("--x"), "VAR_0 NEG NEG");
        assert_eq!(rpn("+3 - +5"), "3 POS 5 POS SUB");
    }

    #[test]
    fn functions() {
        assert_eq!(rpn("sin(x)^2"), "VAR_0 sin 2 POW");
        assert_eq!(
            rpn("sin(0)^2+cos(0)^2"),
            "0 sin 2 POW 0 cos 2 POW ADD"
        );
        assert_eq!(rpn("cos(sin(ln(5)))"), "5 ln sin cos");
        assert_eq!(rpn("-sin(x+1)*2"), "VAR_0 1 ADD sin NEG 2 MUL");
    }

    #[test]
    fn mismatched_parentheses() {
        assert_eq!(
            rpn_error("(1+2"),
            ParseError::MismatchedParenthesis { position: 0 }
        );
        assert_eq!(
            rpn_error("1+2)"),
            ParseError::MismatchedParenthesis { position: 3 }
        );
        assert_eq!(
            rpn_error("sin((x)"),
            ParseError::MismatchedParenthesis { position: 1 }
        );
    }

    #[test]
    fn commas() {
        assert_eq!(rpn("sin(1,2)"), "1 COM 2 sin");
        assert_eq!(rpn_error("1,2"), ParseError::StrayComma { position: 1 });
        assert_eq!(rpn_error("(1,2)"), ParseError::StrayComma { position: 2 });
    }

    #[test]
    fn empty() {
        assert_eq!(to_postfix(&[]), Ok(vec![]));
    }
}
