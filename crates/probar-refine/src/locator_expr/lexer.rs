//! Tokenizer for locator expressions.
//!
//! Accepts a JavaScript-like token set wide enough that the parser can
//! recognise (and the allowlist can name) constructs that are later
//! rejected: spreads, arrows, templates, operators.

use crate::result::{RefineError, RefineResult};

/// Token types from lexical analysis
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifier or keyword
    Ident(String),
    /// Single- or double-quoted string, unescaped
    Str(String),
    /// Backtick template
    Template {
        /// Raw template text
        text: String,
        /// Whether it contains a `${...}` substitution
        has_substitution: bool,
    },
    /// Numeric literal
    Number(f64),
    /// Regular expression literal
    Regex {
        /// Pattern between the slashes
        pattern: String,
        /// Trailing flags
        flags: String,
    },
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `.`
    Dot,
    /// `?.`
    OptionalDot,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `;`
    Semicolon,
    /// `?`
    Question,
    /// `...`
    Ellipsis,
    /// `=>`
    Arrow,
    /// `=`
    Assign,
    /// Any other operator
    Operator(String),
}

impl Token {
    /// Whether a `/` after this token starts a division rather than a regex
    const fn ends_operand(&self) -> bool {
        matches!(
            self,
            Self::Ident(_)
                | Self::Str(_)
                | Self::Template { .. }
                | Self::Number(_)
                | Self::Regex { .. }
                | Self::RightParen
                | Self::RightBracket
                | Self::RightBrace
        )
    }
}

/// A token with its byte range in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    /// Token
    pub token: Token,
    /// Start byte offset
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
}

const OPERATORS: &[&str] = &[
    "===", "!==", "**", "==", "!=", "<=", ">=", "&&", "||", "??", "++", "--", "+=", "-=", "+", "-",
    "*", "%", "<", ">", "!", "&", "|", "^", "~",
];

/// Tokenizer for converting expression strings to tokens
#[derive(Debug)]
pub struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    last: Option<Token>,
}

impl<'a> Tokenizer<'a> {
    /// Creates a new tokenizer for the given input
    #[must_use]
    pub const fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            last: None,
        }
    }

    /// Tokenizes the entire input
    pub fn tokenize(mut self) -> RefineResult<Vec<Spanned>> {
        let mut tokens = Vec::new();
        while let Some(spanned) = self.next_token()? {
            self.last = Some(spanned.token.clone());
            tokens.push(spanned);
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> RefineResult<Option<Spanned>> {
        self.skip_whitespace();
        let start = self.pos;
        let Some(ch) = self.current_char() else {
            return Ok(None);
        };

        let token = match ch {
            '\'' | '"' => self.read_string(ch)?,
            '`' => self.read_template()?,
            '0'..='9' => self.read_number()?,
            c if c == '_' || c == '$' || c.is_alphabetic() => self.read_ident(),
            '/' if !self.last.as_ref().is_some_and(Token::ends_operand) => self.read_regex()?,
            _ => self.read_punct()?,
        };

        Ok(Some(Spanned {
            token,
            start,
            end: self.pos,
        }))
    }

    fn current_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_string(&mut self, quote: char) -> RefineResult<Token> {
        let start = self.pos;
        self.advance();
        let mut out = String::new();
        while let Some(ch) = self.current_char() {
            self.advance();
            match ch {
                '\\' => {
                    let escaped = self
                        .current_char()
                        .ok_or_else(|| RefineError::syntax("unterminated escape", self.pos))?;
                    self.advance();
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                }
                c if c == quote => return Ok(Token::Str(out)),
                '\n' => break,
                c => out.push(c),
            }
        }
        Err(RefineError::syntax("unterminated string literal", start))
    }

    fn read_template(&mut self) -> RefineResult<Token> {
        let start = self.pos;
        self.advance();
        let mut text = String::new();
        let mut has_substitution = false;
        while let Some(ch) = self.current_char() {
            self.advance();
            match ch {
                '\\' => {
                    if let Some(escaped) = self.current_char() {
                        self.advance();
                        text.push(escaped);
                    }
                }
                '`' => {
                    return Ok(Token::Template {
                        text,
                        has_substitution,
                    })
                }
                '$' if self.current_char() == Some('{') => {
                    has_substitution = true;
                    text.push(ch);
                }
                c => text.push(c),
            }
        }
        Err(RefineError::syntax("unterminated template literal", start))
    }

    fn read_number(&mut self) -> RefineResult<Token> {
        let start = self.pos;
        let mut has_dot = false;
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() || ch == '_' {
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }
        let text: String = self.input[start..self.pos]
            .chars()
            .filter(|c| *c != '_')
            .collect();
        text.parse()
            .map(Token::Number)
            .map_err(|_| RefineError::syntax(format!("invalid number `{text}`"), start))
    }

    fn read_ident(&mut self) -> Token {
        let start = self.pos;
        while let Some(ch) = self.current_char() {
            if ch == '_' || ch == '$' || ch.is_alphanumeric() {
                self.advance();
            } else {
                break;
            }
        }
        Token::Ident(self.input[start..self.pos].to_string())
    }

    fn read_regex(&mut self) -> RefineResult<Token> {
        let start = self.pos;
        self.advance();
        let mut pattern = String::new();
        let mut in_class = false;
        loop {
            let ch = self
                .current_char()
                .ok_or_else(|| RefineError::syntax("unterminated regex literal", start))?;
            self.advance();
            match ch {
                '\\' => {
                    pattern.push(ch);
                    if let Some(escaped) = self.current_char() {
                        self.advance();
                        pattern.push(escaped);
                    }
                }
                '[' => {
                    in_class = true;
                    pattern.push(ch);
                }
                ']' => {
                    in_class = false;
                    pattern.push(ch);
                }
                '/' if !in_class => break,
                '\n' => return Err(RefineError::syntax("unterminated regex literal", start)),
                c => pattern.push(c),
            }
        }
        let flags_start = self.pos;
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_alphabetic() {
                self.advance();
            } else {
                break;
            }
        }
        Ok(Token::Regex {
            pattern,
            flags: self.input[flags_start..self.pos].to_string(),
        })
    }

    fn read_punct(&mut self) -> RefineResult<Token> {
        let start = self.pos;
        let rest = self.rest();
        let (token, len) = if rest.starts_with("...") {
            (Token::Ellipsis, 3)
        } else if rest.starts_with("=>") {
            (Token::Arrow, 2)
        } else if rest.starts_with("?.") && !rest[2..].starts_with(|c: char| c.is_ascii_digit()) {
            (Token::OptionalDot, 2)
        } else if let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(*op)) {
            (Token::Operator((*op).to_string()), op.len())
        } else {
            let token = match rest.chars().next() {
                Some('(') => Token::LeftParen,
                Some(')') => Token::RightParen,
                Some('{') => Token::LeftBrace,
                Some('}') => Token::RightBrace,
                Some('[') => Token::LeftBracket,
                Some(']') => Token::RightBracket,
                Some('.') => Token::Dot,
                Some(',') => Token::Comma,
                Some(':') => Token::Colon,
                Some(';') => Token::Semicolon,
                Some('?') => Token::Question,
                Some('=') => Token::Assign,
                Some('/') => Token::Operator("/".to_string()),
                Some(c) => {
                    return Err(RefineError::syntax(
                        format!("unexpected character '{c}'"),
                        start,
                    ))
                }
                None => return Err(RefineError::syntax("unexpected end of input", start)),
            };
            (token, 1)
        };
        self.pos += len;
        Ok(token)
    }
}
