//! General expression parser.
//!
//! Deliberately wider than the locator language: it builds a full AST for
//! members, calls, objects, spreads, arrows and operators so the allowlist
//! pass can name exactly which construct it refuses.

use super::lexer::{Spanned, Token, Tokenizer};
use crate::result::{RefineError, RefineResult};

/// Byte range of a node in the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Start offset
    pub start: usize,
    /// End offset (exclusive)
    pub end: usize,
}

impl Span {
    const fn join(self, other: Self) -> Self {
        Self {
            start: self.start,
            end: other.end,
        }
    }

    /// Source text covered by this span
    #[must_use]
    pub fn slice(self, source: &str) -> &str {
        source.get(self.start..self.end).unwrap_or(source)
    }
}

/// Expression node with its source span
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// Node
    pub kind: ExprKind,
    /// Source range
    pub span: Span,
}

/// Abstract syntax tree node
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Identifier reference
    Ident(String),
    /// String literal
    Str(String),
    /// Template literal
    Template {
        /// Raw text
        text: String,
        /// Contains `${...}`
        has_substitution: bool,
    },
    /// Number literal
    Number(f64),
    /// `true` / `false`
    Bool(bool),
    /// `null`
    Null,
    /// `undefined`
    Undefined,
    /// Regex literal
    Regex {
        /// Pattern
        pattern: String,
        /// Flags
        flags: String,
    },
    /// Object literal
    Object(Vec<Property>),
    /// Array literal
    Array(Vec<Expr>),
    /// `object.property` or `object?.property`
    Member {
        /// Receiver
        object: Box<Expr>,
        /// Property name
        property: String,
        /// `?.`
        optional: bool,
    },
    /// `object[property]`
    Computed {
        /// Receiver
        object: Box<Expr>,
        /// Key expression
        property: Box<Expr>,
    },
    /// Function call
    Call {
        /// Callee
        callee: Box<Expr>,
        /// Arguments
        args: Vec<Expr>,
    },
    /// `...expr`
    Spread(Box<Expr>),
    /// `target = value`
    Assign {
        /// Left-hand side
        target: Box<Expr>,
        /// Right-hand side
        value: Box<Expr>,
    },
    /// Arrow function
    Arrow {
        /// Parameters use an object or array pattern
        destructuring: bool,
    },
    /// `function (...) { ... }`
    Function,
    /// Binary operator
    Binary {
        /// Operator
        op: String,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Prefix operator
    Unary {
        /// Operator
        op: String,
        /// Operand
        operand: Box<Expr>,
    },
    /// `a ? b : c`
    Conditional,
    /// `new Callee(...)`
    New(Box<Expr>),
}

/// Object literal entry
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    /// `key: value`
    KeyValue {
        /// Key
        key: PropertyKey,
        /// Value
        value: Expr,
    },
    /// `{ name }`
    Shorthand {
        /// Identifier
        name: String,
        /// Source range
        span: Span,
    },
    /// `{ ...rest }`
    Spread(Expr),
}

/// Object literal key
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKey {
    /// Plain or quoted name
    Name(String),
    /// `[expr]`
    Computed(Box<Expr>),
}

/// Recursive descent parser for locator expressions
///
/// Grammar:
/// ```text
/// program     ::= assignment ';'?
/// assignment  ::= arrow | conditional ('=' assignment)?
/// conditional ::= binary ('?' assignment ':' assignment)?
/// binary      ::= unary (OPERATOR unary)*
/// unary       ::= ('!' | '-' | '+' | '~' | 'typeof' | 'void' | 'await') unary
///               | 'new' postfix
///               | postfix
/// postfix     ::= primary ('.' IDENT | '?.' IDENT | '[' assignment ']' | '(' args ')')*
/// args        ::= (element (',' element)* ','?)?
/// element     ::= '...' assignment | assignment
/// primary     ::= IDENT | STRING | TEMPLATE | NUMBER | REGEX
///               | '(' assignment ')' | '{' properties '}' | '[' args ']'
///               | 'function' '(' ... ')' '{' ... '}'
/// ```
#[derive(Debug)]
pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl<'a> Parser<'a> {
    /// Tokenize `source` and prepare a parser over it
    pub fn new(source: &'a str) -> RefineResult<Self> {
        let tokens = Tokenizer::new(source).tokenize()?;
        Ok(Self {
            source,
            tokens,
            pos: 0,
        })
    }

    /// Parses a complete expression; anything left over is rejected
    pub fn parse_program(source: &'a str) -> RefineResult<Expr> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(RefineError::syntax("empty locator expression", 0));
        }
        let mut parser = Self::new(source)?;
        let expr = parser.parse_assignment()?;
        if matches!(parser.peek(), Some(Token::Semicolon)) {
            parser.pos += 1;
        }
        if let Some(rest) = parser.tokens.get(parser.pos) {
            return Err(RefineError::rejected(
                "trailing text",
                source[rest.start..].trim(),
            ));
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    fn current_span(&self) -> Span {
        self.tokens.get(self.pos).map_or(
            Span {
                start: self.source.len(),
                end: self.source.len(),
            },
            |s| Span {
                start: s.start,
                end: s.end,
            },
        )
    }

    fn prev_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|p| self.tokens.get(p))
            .map_or(Span { start: 0, end: 0 }, |s| Span {
                start: s.start,
                end: s.end,
            })
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token, what: &str) -> RefineResult<Span> {
        if self.peek() == Some(expected) {
            let span = self.current_span();
            self.pos += 1;
            Ok(span)
        } else {
            Err(RefineError::syntax(
                format!("expected {what}"),
                self.current_span().start,
            ))
        }
    }

    fn parse_assignment(&mut self) -> RefineResult<Expr> {
        if self.arrow_ahead() {
            return self.parse_arrow();
        }
        let target = self.parse_conditional()?;
        if matches!(self.peek(), Some(Token::Assign)) {
            self.pos += 1;
            let value = self.parse_assignment()?;
            let span = target.span.join(value.span);
            return Ok(Expr {
                kind: ExprKind::Assign {
                    target: Box::new(target),
                    value: Box::new(value),
                },
                span,
            });
        }
        Ok(target)
    }

    fn parse_conditional(&mut self) -> RefineResult<Expr> {
        let test = self.parse_binary()?;
        if matches!(self.peek(), Some(Token::Question)) {
            self.pos += 1;
            self.parse_assignment()?;
            self.expect(&Token::Colon, "':' in conditional expression")?;
            let alternate = self.parse_assignment()?;
            return Ok(Expr {
                kind: ExprKind::Conditional,
                span: test.span.join(alternate.span),
            });
        }
        Ok(test)
    }

    fn parse_binary(&mut self) -> RefineResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Operator(op)) if !matches!(op.as_str(), "!" | "~" | "++" | "--") => {
                    op.clone()
                }
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            let span = left.span.join(right.span);
            left = Expr {
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> RefineResult<Expr> {
        let start = self.current_span();
        let op = match self.peek() {
            Some(Token::Operator(op)) if matches!(op.as_str(), "!" | "-" | "+" | "~") => {
                Some(op.clone())
            }
            Some(Token::Ident(word))
                if matches!(word.as_str(), "typeof" | "void" | "await" | "delete")
                    && self.peek_at(1).is_some_and(starts_operand) =>
            {
                Some(word.clone())
            }
            Some(Token::Ident(word)) if word == "new" => {
                self.pos += 1;
                let callee = self.parse_postfix()?;
                let span = start.join(callee.span);
                return Ok(Expr {
                    kind: ExprKind::New(Box::new(callee)),
                    span,
                });
            }
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let operand = self.parse_unary()?;
            let span = start.join(operand.span);
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> RefineResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot | Token::OptionalDot) => {
                    let optional = matches!(self.peek(), Some(Token::OptionalDot));
                    self.pos += 1;
                    let name_span = self.current_span();
                    let Some(Token::Ident(property)) = self.advance() else {
                        return Err(RefineError::syntax(
                            "expected property name after '.'",
                            name_span.start,
                        ));
                    };
                    let span = expr.span.join(name_span);
                    expr = Expr {
                        kind: ExprKind::Member {
                            object: Box::new(expr),
                            property,
                            optional,
                        },
                        span,
                    };
                }
                Some(Token::LeftBracket) => {
                    self.pos += 1;
                    let property = self.parse_assignment()?;
                    let close = self.expect(&Token::RightBracket, "']'")?;
                    let span = expr.span.join(close);
                    expr = Expr {
                        kind: ExprKind::Computed {
                            object: Box::new(expr),
                            property: Box::new(property),
                        },
                        span,
                    };
                }
                Some(Token::LeftParen) => {
                    self.pos += 1;
                    let args = self.parse_elements(&Token::RightParen)?;
                    let close = self.expect(&Token::RightParen, "')' to close call")?;
                    let span = expr.span.join(close);
                    expr = Expr {
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_elements(&mut self, close: &Token) -> RefineResult<Vec<Expr>> {
        let mut items = Vec::new();
        while self.peek() != Some(close) {
            if self.peek().is_none() {
                return Err(RefineError::syntax(
                    "unexpected end of input in argument list",
                    self.source.len(),
                ));
            }
            items.push(self.parse_element()?);
            if matches!(self.peek(), Some(Token::Comma)) {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(items)
    }

    fn parse_element(&mut self) -> RefineResult<Expr> {
        if matches!(self.peek(), Some(Token::Ellipsis)) {
            let start = self.current_span();
            self.pos += 1;
            let inner = self.parse_assignment()?;
            let span = start.join(inner.span);
            return Ok(Expr {
                kind: ExprKind::Spread(Box::new(inner)),
                span,
            });
        }
        self.parse_assignment()
    }

    fn parse_primary(&mut self) -> RefineResult<Expr> {
        let span = self.current_span();
        let token = self
            .advance()
            .ok_or_else(|| RefineError::syntax("unexpected end of expression", span.start))?;

        let kind = match token {
            Token::Ident(name) => match name.as_str() {
                "true" => ExprKind::Bool(true),
                "false" => ExprKind::Bool(false),
                "null" => ExprKind::Null,
                "undefined" => ExprKind::Undefined,
                "function" => {
                    self.skip_function()?;
                    return Ok(Expr {
                        kind: ExprKind::Function,
                        span: span.join(self.prev_span()),
                    });
                }
                _ => ExprKind::Ident(name),
            },
            Token::Str(s) => ExprKind::Str(s),
            Token::Template {
                text,
                has_substitution,
            } => ExprKind::Template {
                text,
                has_substitution,
            },
            Token::Number(n) => ExprKind::Number(n),
            Token::Regex { pattern, flags } => ExprKind::Regex { pattern, flags },
            Token::LeftParen => {
                let inner = self.parse_assignment()?;
                let close = self.expect(&Token::RightParen, "')'")?;
                return Ok(Expr {
                    kind: inner.kind,
                    span: span.join(close),
                });
            }
            Token::LeftBracket => {
                let items = self.parse_elements(&Token::RightBracket)?;
                let close = self.expect(&Token::RightBracket, "']' to close array")?;
                return Ok(Expr {
                    kind: ExprKind::Array(items),
                    span: span.join(close),
                });
            }
            Token::LeftBrace => {
                let props = self.parse_properties()?;
                let close = self.expect(&Token::RightBrace, "'}' to close object")?;
                return Ok(Expr {
                    kind: ExprKind::Object(props),
                    span: span.join(close),
                });
            }
            other => {
                return Err(RefineError::syntax(
                    format!("unexpected token {other:?}"),
                    span.start,
                ))
            }
        };
        Ok(Expr { kind, span })
    }

    fn parse_properties(&mut self) -> RefineResult<Vec<Property>> {
        let mut props = Vec::new();
        while !matches!(self.peek(), Some(Token::RightBrace) | None) {
            props.push(self.parse_property()?);
            if matches!(self.peek(), Some(Token::Comma)) {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(props)
    }

    fn parse_property(&mut self) -> RefineResult<Property> {
        let span = self.current_span();
        let key = match self.advance() {
            Some(Token::Ellipsis) => {
                let inner = self.parse_assignment()?;
                let span = span.join(inner.span);
                return Ok(Property::Spread(Expr {
                    kind: ExprKind::Spread(Box::new(inner)),
                    span,
                }));
            }
            Some(Token::Ident(name)) => {
                if !matches!(self.peek(), Some(Token::Colon)) {
                    return Ok(Property::Shorthand { name, span });
                }
                PropertyKey::Name(name)
            }
            Some(Token::Str(name)) => PropertyKey::Name(name),
            Some(Token::Number(n)) => PropertyKey::Name(n.to_string()),
            Some(Token::LeftBracket) => {
                let inner = self.parse_assignment()?;
                self.expect(&Token::RightBracket, "']' after computed key")?;
                PropertyKey::Computed(Box::new(inner))
            }
            _ => {
                return Err(RefineError::syntax(
                    "expected property name in object literal",
                    span.start,
                ))
            }
        };
        self.expect(&Token::Colon, "':' after property name")?;
        let value = self.parse_assignment()?;
        Ok(Property::KeyValue { key, value })
    }

    /// `x =>` or `( ... ) =>` starting at the current token
    fn arrow_ahead(&self) -> bool {
        match self.peek() {
            Some(Token::Ident(_)) => matches!(self.peek_at(1), Some(Token::Arrow)),
            Some(Token::LeftParen) => self
                .matching_close(self.pos)
                .is_some_and(|close| {
                    matches!(
                        self.tokens.get(close + 1).map(|s| &s.token),
                        Some(Token::Arrow)
                    )
                }),
            _ => false,
        }
    }

    fn matching_close(&self, open_index: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (i, spanned) in self.tokens.iter().enumerate().skip(open_index) {
            match spanned.token {
                Token::LeftParen | Token::LeftBrace | Token::LeftBracket => depth += 1,
                Token::RightParen | Token::RightBrace | Token::RightBracket => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn parse_arrow(&mut self) -> RefineResult<Expr> {
        let start = self.current_span();
        let mut destructuring = false;
        if matches!(self.peek(), Some(Token::LeftParen)) {
            let close = self
                .matching_close(self.pos)
                .ok_or_else(|| RefineError::syntax("unbalanced arrow parameters", start.start))?;
            destructuring = self.tokens[self.pos + 1..close]
                .iter()
                .any(|s| matches!(s.token, Token::LeftBrace | Token::LeftBracket));
            self.pos = close + 1;
        } else {
            self.pos += 1;
        }
        self.expect(&Token::Arrow, "'=>'")?;
        if matches!(self.peek(), Some(Token::LeftBrace)) {
            let close = self
                .matching_close(self.pos)
                .ok_or_else(|| RefineError::syntax("unbalanced arrow body", start.start))?;
            self.pos = close + 1;
        } else {
            self.parse_assignment()?;
        }
        Ok(Expr {
            kind: ExprKind::Arrow { destructuring },
            span: start.join(self.prev_span()),
        })
    }

    fn skip_function(&mut self) -> RefineResult<()> {
        if matches!(self.peek(), Some(Token::Ident(_))) {
            self.pos += 1;
        }
        for _ in 0..2 {
            let open = self.current_span();
            let close = self
                .matching_close(self.pos)
                .ok_or_else(|| RefineError::syntax("unbalanced function expression", open.start))?;
            self.pos = close + 1;
        }
        Ok(())
    }
}

fn starts_operand(token: &Token) -> bool {
    !matches!(
        token,
        Token::RightParen
            | Token::RightBrace
            | Token::RightBracket
            | Token::Comma
            | Token::Colon
            | Token::Semicolon
            | Token::Dot
            | Token::OptionalDot
            | Token::Arrow
            | Token::Assign
            | Token::Question
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(src: &str) -> ExprKind {
        Parser::parse_program(src).unwrap().kind
    }

    mod shape_tests {
        use super::*;

        #[test]
        fn test_member_call_chain() {
            let ExprKind::Call { callee, args } = parse("page.getByRole('button').first()")
            else {
                panic!("expected call");
            };
            assert!(args.is_empty());
            let ExprKind::Member { property, .. } = callee.kind else {
                panic!("expected member");
            };
            assert_eq!(property, "first");
        }

        #[test]
        fn test_object_argument() {
            let ExprKind::Call { args, .. } = parse("getByRole('button', { name: 'Save', exact: true })")
            else {
                panic!("expected call");
            };
            assert_eq!(args.len(), 2);
            let ExprKind::Object(props) = &args[1].kind else {
                panic!("expected object");
            };
            assert_eq!(props.len(), 2);
        }

        #[test]
        fn test_computed_member() {
            assert!(matches!(
                parse("page['getByRole']('x')"),
                ExprKind::Call { .. }
            ));
        }

        #[test]
        fn test_arrow_and_destructuring() {
            let ExprKind::Call { args, .. } = parse("filter(({ a }) => a)") else {
                panic!("expected call");
            };
            assert_eq!(args[0].kind, ExprKind::Arrow { destructuring: true });
            let ExprKind::Call { args, .. } = parse("filter(x => x.y)") else {
                panic!("expected call");
            };
            assert_eq!(args[0].kind, ExprKind::Arrow { destructuring: false });
        }

        #[test]
        fn test_spread_and_function() {
            let ExprKind::Call { args, .. } = parse("getByText(...parts)") else {
                panic!("expected call");
            };
            assert!(matches!(args[0].kind, ExprKind::Spread(_)));
            let ExprKind::Call { args, .. } = parse("filter(function (e) { return e; })") else {
                panic!("expected call");
            };
            assert_eq!(args[0].kind, ExprKind::Function);
        }

        #[test]
        fn test_negative_number_is_unary() {
            let ExprKind::Call { args, .. } = parse("nth(-1)") else {
                panic!("expected call");
            };
            assert!(matches!(args[0].kind, ExprKind::Unary { .. }));
        }

        #[test]
        fn test_span_slices_source() {
            let src = "getByText('a').nth(2)";
            let expr = Parser::parse_program(src).unwrap();
            assert_eq!(expr.span.slice(src), src);
        }
    }

    mod error_tests {
        use super::*;

        #[test]
        fn test_trailing_text_rejected() {
            let err = Parser::parse_program("getByText('a') extra").unwrap_err();
            assert!(matches!(err, RefineError::ExpressionRejected { .. }));
            assert!(err.to_string().contains("extra"));
        }

        #[test]
        fn test_single_semicolon_allowed() {
            assert!(Parser::parse_program("getByText('a');").is_ok());
            assert!(Parser::parse_program("getByText('a');;").is_err());
        }

        #[test]
        fn test_unclosed_call() {
            let err = Parser::parse_program("getByText('a'").unwrap_err();
            assert!(matches!(err, RefineError::ExpressionSyntax { .. }));
        }

        #[test]
        fn test_empty() {
            assert!(Parser::parse_program("   ").is_err());
        }
    }
}
