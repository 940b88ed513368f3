//! Tokenizer for the PDL concrete syntax.

use crate::error::{CompileError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A name; also covers keywords, which are recognized contextually.
    Ident(String),
    /// A parameter occurrence `?x`.
    Param(String),
    /// An enum literal `@a`, stored with its `@` prefix.
    EnumLiteral(String),
    Number(f64),

    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Prime,

    Assign,
    Equals,
    NotEquals,
    LowerEqual,
    GreaterEqual,
    Lower,
    Greater,
    Plus,
    Minus,
    Star,
    Slash,
    Tilde,
    And,
    Or,
}

#[derive(Debug, Clone)]
pub struct PosToken {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

pub fn tokenize(text: &str) -> Result<Vec<PosToken>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    let mut line = 1;
    let mut column = 1;

    macro_rules! bump {
        () => {{
            let c = chars.next();
            if c == Some('\n') {
                line += 1;
                column = 1;
            } else if c.is_some() {
                column += 1;
            }
            c
        }};
    }

    while let Some(&c) = chars.peek() {
        let (token_line, token_column) = (line, column);
        let token = match c {
            ' ' | '\t' | '\r' | '\n' => {
                bump!();
                continue;
            }
            '/' => {
                bump!();
                if chars.peek() == Some(&'/') {
                    // Line comment.
                    while let Some(&c) = chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        bump!();
                    }
                    continue;
                }
                Token::Slash
            }
            '{' => {
                bump!();
                Token::LBrace
            }
            '}' => {
                bump!();
                Token::RBrace
            }
            '(' => {
                bump!();
                Token::LParen
            }
            ')' => {
                bump!();
                Token::RParen
            }
            '[' => {
                bump!();
                Token::LBracket
            }
            ']' => {
                bump!();
                Token::RBracket
            }
            ',' => {
                bump!();
                Token::Comma
            }
            ';' => {
                bump!();
                Token::Semicolon
            }
            ':' => {
                bump!();
                Token::Colon
            }
            '\'' => {
                bump!();
                Token::Prime
            }
            '+' => {
                bump!();
                Token::Plus
            }
            '-' => {
                bump!();
                Token::Minus
            }
            '*' => {
                bump!();
                Token::Star
            }
            '^' | '&' => {
                bump!();
                Token::And
            }
            '|' => {
                bump!();
                Token::Or
            }
            '=' => {
                bump!();
                if chars.peek() == Some(&'=') {
                    bump!();
                    Token::Equals
                } else {
                    Token::Assign
                }
            }
            '~' => {
                bump!();
                if chars.peek() == Some(&'=') {
                    bump!();
                    Token::NotEquals
                } else {
                    Token::Tilde
                }
            }
            '<' => {
                bump!();
                if chars.peek() == Some(&'=') {
                    bump!();
                    Token::LowerEqual
                } else {
                    Token::Lower
                }
            }
            '>' => {
                bump!();
                if chars.peek() == Some(&'=') {
                    bump!();
                    Token::GreaterEqual
                } else {
                    Token::Greater
                }
            }
            '?' | '@' => {
                let prefix = c;
                bump!();
                let name = lex_name(&mut chars, &mut column);
                if name.is_empty() {
                    return Err(CompileError::Syntax {
                        line: token_line,
                        column: token_column,
                        message: format!("dangling '{}'", prefix),
                    });
                }
                if prefix == '?' {
                    Token::Param(name)
                } else {
                    Token::EnumLiteral(format!("@{}", name))
                }
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut literal = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        literal.push(c);
                        bump!();
                    } else {
                        break;
                    }
                }
                match literal.parse::<f64>() {
                    Ok(value) => Token::Number(value),
                    Err(_) => {
                        return Err(CompileError::Syntax {
                            line: token_line,
                            column: token_column,
                            message: format!("malformed number '{}'", literal),
                        })
                    }
                }
            }
            c if c.is_ascii_alphabetic() => {
                let name = lex_name(&mut chars, &mut column);
                Token::Ident(name)
            }
            other => {
                return Err(CompileError::Syntax {
                    line: token_line,
                    column: token_column,
                    message: format!("unexpected character '{}'", other),
                })
            }
        };
        tokens.push(PosToken {
            token,
            line: token_line,
            column: token_column,
        });
    }
    Ok(tokens)
}

/// Names may contain letters, digits, dashes and underscores. A dash is
/// only part of the name when an alphanumeric character follows, so
/// `a - b` still lexes as a subtraction.
fn lex_name(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    column: &mut usize,
) -> String {
    let mut name = String::new();
    loop {
        match chars.peek() {
            Some(&c) if c.is_ascii_alphanumeric() || c == '_' => {
                name.push(c);
                chars.next();
                *column += 1;
            }
            Some(&'-') => {
                let mut lookahead = chars.clone();
                lookahead.next();
                match lookahead.peek() {
                    Some(&c) if c.is_ascii_alphanumeric() || c == '_' => {
                        name.push('-');
                        chars.next();
                        *column += 1;
                    }
                    _ => break,
                }
            }
            _ => break,
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<Token> {
        tokenize(text).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn names_may_contain_dashes_but_subtraction_survives() {
        assert_eq!(
            kinds("max-nondef-actions = a - b"),
            vec![
                Token::Ident("max-nondef-actions".to_string()),
                Token::Assign,
                Token::Ident("a".to_string()),
                Token::Minus,
                Token::Ident("b".to_string()),
            ]
        );
    }

    #[test]
    fn parameters_and_enum_literals_keep_their_prefix_meaning() {
        assert_eq!(
            kinds("p(?x) == @high"),
            vec![
                Token::Ident("p".to_string()),
                Token::LParen,
                Token::Param("x".to_string()),
                Token::RParen,
                Token::Equals,
                Token::EnumLiteral("@high".to_string()),
            ]
        );
    }

    #[test]
    fn comments_and_positions() {
        let tokens = tokenize("a // comment\n  b").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].line, 2);
        assert_eq!(tokens[1].column, 3);
    }
}
