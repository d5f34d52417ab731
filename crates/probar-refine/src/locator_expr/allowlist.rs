//! Post-parse allowlist.
//!
//! Walks the general AST and converts it into a [`LocatorChain`], refusing
//! everything that is not a whitelisted call with literal arguments. This is
//! the only path from script text to something that touches a page, so it
//! fails closed: the first refused construct aborts validation and nothing
//! is evaluated.

use super::chain::{
    FilterOptions, Literal, LocatorCall, LocatorChain, RoleOptions, TextLookup, TextMatch,
    TextQuery,
};
use super::parser::{Expr, ExprKind, Property, PropertyKey, Span};
use crate::result::{RefineError, RefineResult};

/// Receiver identifier accepted in front of a chain
pub const PAGE_RECEIVER: &str = "page";

/// Methods that may appear anywhere in a chain
pub const ROOT_METHODS: &[&str] = &[
    "getByRole",
    "getByText",
    "getByLabel",
    "getByPlaceholder",
    "getByAltText",
    "getByTitle",
    "getByTestId",
    "locator",
    "frameLocator",
];

/// Methods that may only follow another call
pub const CHAIN_METHODS: &[&str] = &[
    "filter",
    "first",
    "last",
    "nth",
    "and",
    "or",
    "contentFrame",
    "owner",
];

struct RawCall<'e> {
    method: String,
    args: &'e [Expr],
    span: Span,
}

/// Allowlist validator over one source string
#[derive(Debug)]
pub struct Allowlist<'a> {
    source: &'a str,
}

impl<'a> Allowlist<'a> {
    /// Validator for expressions parsed from `source`
    #[must_use]
    pub const fn new(source: &'a str) -> Self {
        Self { source }
    }

    fn reject(&self, construct: impl Into<String>, span: Span) -> RefineError {
        RefineError::rejected(construct, span.slice(self.source))
    }

    /// Convert a parsed expression into a validated chain
    pub fn validate(&self, expr: &Expr) -> RefineResult<LocatorChain> {
        let mut raw = Vec::new();
        self.flatten(expr, &mut raw)?;

        let mut calls = Vec::with_capacity(raw.len());
        for (i, call) in raw.iter().enumerate() {
            let is_root = ROOT_METHODS.contains(&call.method.as_str());
            let is_chain = CHAIN_METHODS.contains(&call.method.as_str());
            if !is_root && !is_chain {
                let position = if i == 0 { "root" } else { "chained" };
                return Err(self.reject(
                    format!("non-whitelisted {position} method `{}`", call.method),
                    call.span,
                ));
            }
            if i == 0 && !is_root {
                return Err(self.reject(
                    format!("chain-only method `{}` used as root", call.method),
                    call.span,
                ));
            }
            calls.push(self.convert_call(call)?);
        }
        Ok(LocatorChain::new(calls))
    }

    fn flatten<'e>(&self, expr: &'e Expr, out: &mut Vec<RawCall<'e>>) -> RefineResult<()> {
        match &expr.kind {
            ExprKind::Call { callee, args } => match &callee.kind {
                ExprKind::Member {
                    object,
                    property,
                    optional,
                } => {
                    if *optional {
                        return Err(self.reject("optional chaining", callee.span));
                    }
                    match &object.kind {
                        ExprKind::Ident(name) if name == PAGE_RECEIVER => {}
                        ExprKind::Ident(name) => {
                            return Err(self.reject(
                                format!("non-whitelisted root `{name}`"),
                                object.span,
                            ))
                        }
                        _ => self.flatten(object, out)?,
                    }
                    out.push(RawCall {
                        method: property.clone(),
                        args,
                        span: expr.span,
                    });
                    Ok(())
                }
                ExprKind::Ident(name) => {
                    out.push(RawCall {
                        method: name.clone(),
                        args,
                        span: expr.span,
                    });
                    Ok(())
                }
                ExprKind::Computed { .. } => {
                    Err(self.reject("computed member access", callee.span))
                }
                _ => Err(self.reject(
                    format!("call on {}", describe(&callee.kind)),
                    callee.span,
                )),
            },
            ExprKind::Member { property, .. } => Err(self.reject(
                format!("property access `{property}` without a call"),
                expr.span,
            )),
            other => Err(self.reject(describe(other), expr.span)),
        }
    }

    fn literal(&self, expr: &Expr) -> RefineResult<Literal> {
        match &expr.kind {
            ExprKind::Str(s) => Ok(Literal::Str(s.clone())),
            ExprKind::Template {
                text,
                has_substitution: false,
            } => Ok(Literal::Str(text.clone())),
            ExprKind::Number(n) => Ok(Literal::Number(*n)),
            ExprKind::Unary { op, operand } if op == "-" => match operand.kind {
                ExprKind::Number(n) => Ok(Literal::Number(-n)),
                _ => Err(self.reject("unary expression", expr.span)),
            },
            ExprKind::Bool(b) => Ok(Literal::Bool(*b)),
            ExprKind::Null | ExprKind::Undefined => Ok(Literal::Null),
            ExprKind::Regex { pattern, flags } => Ok(Literal::Regex {
                pattern: pattern.clone(),
                flags: flags.clone(),
            }),
            ExprKind::Object(props) => {
                let mut entries = Vec::with_capacity(props.len());
                for prop in props {
                    match prop {
                        Property::KeyValue {
                            key: PropertyKey::Name(name),
                            value,
                        } => entries.push((name.clone(), self.literal(value)?)),
                        Property::KeyValue {
                            key: PropertyKey::Computed(inner),
                            ..
                        } => return Err(self.reject("computed property key", inner.span)),
                        Property::Shorthand { name, span } => {
                            return Err(self.reject(
                                format!("shorthand property `{name}` (identifier reference)"),
                                *span,
                            ))
                        }
                        Property::Spread(inner) => {
                            return Err(self.reject("spread syntax", inner.span))
                        }
                    }
                }
                Ok(Literal::Object(entries))
            }
            ExprKind::Array(items) => items
                .iter()
                .map(|item| self.literal(item))
                .collect::<RefineResult<Vec<_>>>()
                .map(Literal::Array),
            ExprKind::Call { .. } => self.validate(expr).map(Literal::Locator),
            other => Err(self.reject(describe(other), expr.span)),
        }
    }

    fn args(&self, call: &RawCall<'_>) -> RefineResult<Vec<Literal>> {
        call.args.iter().map(|a| self.literal(a)).collect()
    }

    fn arity(&self, call: &RawCall<'_>, min: usize, max: usize) -> RefineResult<Vec<Literal>> {
        let n = call.args.len();
        if n < min || n > max {
            let expected = if min == max {
                format!("{min}")
            } else {
                format!("{min} to {max}")
            };
            return Err(self.reject(
                format!(
                    "`{}` takes {expected} argument(s), got {n}",
                    call.method
                ),
                call.span,
            ));
        }
        self.args(call)
    }

    fn convert_call(&self, call: &RawCall<'_>) -> RefineResult<LocatorCall> {
        let method = call.method.as_str();
        if let Some(lookup) = TextLookup::from_method(method) {
            let mut args = self.arity(call, 1, 2)?.into_iter();
            let text = self.text_match(call, args.next())?;
            let exact = match args.next() {
                None => None,
                Some(Literal::Object(entries)) => {
                    let mut exact = None;
                    for (key, value) in entries {
                        match key.as_str() {
                            "exact" => exact = Some(self.boolean(call, &key, value)?),
                            other => return Err(self.unknown_option(call, other)),
                        }
                    }
                    exact
                }
                Some(other) => return Err(self.wrong_type(call, "options object", &other)),
            };
            return Ok(LocatorCall::GetBy {
                lookup,
                query: TextQuery { text, exact },
            });
        }

        match method {
            "getByRole" => {
                let mut args = self.arity(call, 1, 2)?.into_iter();
                let role = match args.next() {
                    Some(Literal::Str(role)) if !role.trim().is_empty() => role,
                    Some(other) => return Err(self.wrong_type(call, "role string", &other)),
                    None => return Err(self.reject("missing role", call.span)),
                };
                let options = match args.next() {
                    None => RoleOptions::default(),
                    Some(Literal::Object(entries)) => self.role_options(call, entries)?,
                    Some(other) => return Err(self.wrong_type(call, "options object", &other)),
                };
                Ok(LocatorCall::GetByRole { role, options })
            }
            "getByTestId" => {
                let mut args = self.arity(call, 1, 1)?.into_iter();
                Ok(LocatorCall::GetByTestId(self.text_match(call, args.next())?))
            }
            "locator" => {
                let mut args = self.arity(call, 1, 2)?.into_iter();
                let selector = self.string(call, args.next())?;
                let options = match args.next() {
                    None => FilterOptions::default(),
                    Some(Literal::Object(entries)) => self.filter_options(call, entries)?,
                    Some(other) => return Err(self.wrong_type(call, "options object", &other)),
                };
                Ok(LocatorCall::Locator { selector, options })
            }
            "frameLocator" => {
                let mut args = self.arity(call, 1, 1)?.into_iter();
                Ok(LocatorCall::FrameLocator(self.string(call, args.next())?))
            }
            "filter" => {
                let mut args = self.arity(call, 1, 1)?.into_iter();
                match args.next() {
                    Some(Literal::Object(entries)) => {
                        Ok(LocatorCall::Filter(self.filter_options(call, entries)?))
                    }
                    Some(other) => Err(self.wrong_type(call, "options object", &other)),
                    None => Err(self.reject("missing filter options", call.span)),
                }
            }
            "first" | "last" | "contentFrame" | "owner" => {
                self.arity(call, 0, 0)?;
                Ok(match method {
                    "first" => LocatorCall::First,
                    "last" => LocatorCall::Last,
                    "contentFrame" => LocatorCall::ContentFrame,
                    _ => LocatorCall::Owner,
                })
            }
            "nth" => {
                let mut args = self.arity(call, 1, 1)?.into_iter();
                match args.next() {
                    Some(Literal::Number(n)) if n.fract() == 0.0 && n.is_finite() => {
                        Ok(LocatorCall::Nth(n as i64))
                    }
                    Some(other) => Err(self.wrong_type(call, "integer index", &other)),
                    None => Err(self.reject("missing index", call.span)),
                }
            }
            "and" | "or" => {
                let mut args = self.arity(call, 1, 1)?.into_iter();
                let chain = match args.next() {
                    Some(Literal::Locator(chain)) => chain,
                    Some(other) => return Err(self.wrong_type(call, "locator", &other)),
                    None => return Err(self.reject("missing locator", call.span)),
                };
                Ok(if method == "and" {
                    LocatorCall::And(chain)
                } else {
                    LocatorCall::Or(chain)
                })
            }
            other => Err(self.reject(format!("non-whitelisted method `{other}`"), call.span)),
        }
    }

    fn role_options(
        &self,
        call: &RawCall<'_>,
        entries: Vec<(String, Literal)>,
    ) -> RefineResult<RoleOptions> {
        let mut options = RoleOptions::default();
        for (key, value) in entries {
            match key.as_str() {
                "name" => options.name = Some(self.text_match(call, Some(value))?),
                "exact" => options.exact = Some(self.boolean(call, &key, value)?),
                "checked" => options.checked = Some(self.boolean(call, &key, value)?),
                "disabled" => options.disabled = Some(self.boolean(call, &key, value)?),
                "expanded" => options.expanded = Some(self.boolean(call, &key, value)?),
                "includeHidden" => options.include_hidden = Some(self.boolean(call, &key, value)?),
                "pressed" => options.pressed = Some(self.boolean(call, &key, value)?),
                "selected" => options.selected = Some(self.boolean(call, &key, value)?),
                "level" => match value {
                    Literal::Number(n) if n.fract() == 0.0 && n >= 1.0 => {
                        options.level = Some(n as i64);
                    }
                    other => return Err(self.wrong_type(call, "heading level", &other)),
                },
                other => return Err(self.unknown_option(call, other)),
            }
        }
        Ok(options)
    }

    fn filter_options(
        &self,
        call: &RawCall<'_>,
        entries: Vec<(String, Literal)>,
    ) -> RefineResult<FilterOptions> {
        let mut options = FilterOptions::default();
        for (key, value) in entries {
            match key.as_str() {
                "hasText" => options.has_text = Some(self.text_match(call, Some(value))?),
                "hasNotText" => options.has_not_text = Some(self.text_match(call, Some(value))?),
                "has" | "hasNot" => {
                    let Literal::Locator(chain) = value else {
                        return Err(self.wrong_type(call, "locator", &value));
                    };
                    if key == "has" {
                        options.has = Some(chain);
                    } else {
                        options.has_not = Some(chain);
                    }
                }
                "visible" => options.visible = Some(self.boolean(call, &key, value)?),
                other => return Err(self.unknown_option(call, other)),
            }
        }
        Ok(options)
    }

    fn text_match(&self, call: &RawCall<'_>, value: Option<Literal>) -> RefineResult<TextMatch> {
        match value {
            Some(Literal::Str(s)) => Ok(TextMatch::Text(s)),
            Some(Literal::Regex { pattern, flags }) => Ok(TextMatch::Regex { pattern, flags }),
            Some(other) => Err(self.wrong_type(call, "string or regex", &other)),
            None => Err(self.reject("missing text argument", call.span)),
        }
    }

    fn string(&self, call: &RawCall<'_>, value: Option<Literal>) -> RefineResult<String> {
        match value {
            Some(Literal::Str(s)) if !s.trim().is_empty() => Ok(s),
            Some(other) => Err(self.wrong_type(call, "non-empty string", &other)),
            None => Err(self.reject("missing selector", call.span)),
        }
    }

    fn boolean(&self, call: &RawCall<'_>, key: &str, value: Literal) -> RefineResult<bool> {
        match value {
            Literal::Bool(b) => Ok(b),
            other => Err(self.reject(
                format!(
                    "option `{key}` of `{}` expects boolean, got {}",
                    call.method,
                    other.type_name()
                ),
                call.span,
            )),
        }
    }

    fn wrong_type(&self, call: &RawCall<'_>, expected: &str, got: &Literal) -> RefineError {
        self.reject(
            format!(
                "`{}` expects {expected}, got {}",
                call.method,
                got.type_name()
            ),
            call.span,
        )
    }

    fn unknown_option(&self, call: &RawCall<'_>, key: &str) -> RefineError {
        self.reject(
            format!("unsupported option `{key}` for `{}`", call.method),
            call.span,
        )
    }
}

fn describe(kind: &ExprKind) -> String {
    match kind {
        ExprKind::Ident(name) => format!("identifier reference `{name}`"),
        ExprKind::Str(_) => "bare string literal".to_string(),
        ExprKind::Template {
            has_substitution: true,
            ..
        } => "template substitution".to_string(),
        ExprKind::Template { .. } => "bare template literal".to_string(),
        ExprKind::Number(_)
        | ExprKind::Bool(_)
        | ExprKind::Null
        | ExprKind::Undefined
        | ExprKind::Regex { .. } => "bare literal".to_string(),
        ExprKind::Object(_) => "object literal outside argument position".to_string(),
        ExprKind::Array(_) => "array literal outside argument position".to_string(),
        ExprKind::Member { property, .. } => format!("member expression `.{property}`"),
        ExprKind::Computed { .. } => "computed member access".to_string(),
        ExprKind::Call { .. } => "call expression".to_string(),
        ExprKind::Spread(_) => "spread syntax".to_string(),
        ExprKind::Assign { target, .. } => {
            if matches!(target.kind, ExprKind::Object(_) | ExprKind::Array(_)) {
                "destructuring pattern".to_string()
            } else {
                "assignment".to_string()
            }
        }
        ExprKind::Arrow {
            destructuring: true,
        } => "destructuring pattern".to_string(),
        ExprKind::Arrow { .. } => "arrow function".to_string(),
        ExprKind::Function => "function expression".to_string(),
        ExprKind::Binary { op, .. } => format!("binary operator `{op}`"),
        ExprKind::Unary { op, .. } => format!("unary operator `{op}`"),
        ExprKind::Conditional => "conditional expression".to_string(),
        ExprKind::New(_) => "`new` expression".to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::parser::Parser;
    use super::*;

    fn validate(src: &str) -> RefineResult<LocatorChain> {
        let expr = Parser::parse_program(src)?;
        Allowlist::new(src).validate(&expr)
    }

    fn rejection(src: &str) -> String {
        match validate(src) {
            Err(RefineError::ExpressionRejected { construct, .. }) => construct,
            other => panic!("expected rejection for {src}, got {other:?}"),
        }
    }

    mod accept_tests {
        use super::*;

        #[test]
        fn test_role_with_options() {
            let chain = validate("page.getByRole('button', { name: 'Save', exact: true })").unwrap();
            assert_eq!(chain.calls.len(), 1);
            let LocatorCall::GetByRole { role, options } = &chain.calls[0] else {
                panic!("expected getByRole");
            };
            assert_eq!(role, "button");
            assert_eq!(options.exact, Some(true));
            assert_eq!(options.name, Some(TextMatch::Text("Save".to_string())));
        }

        #[test]
        fn test_full_operator_set() {
            let src = "frameLocator('#f').locator('li').filter({ hasText: /sale/i, has: getByRole('img') })\
                       .and(getByTestId('row')).or(page.getByTitle('x')).nth(-1).first().last()\
                       .contentFrame().owner()";
            let chain = validate(src).unwrap();
            let methods: Vec<_> = chain.calls.iter().map(LocatorCall::method).collect();
            assert_eq!(
                methods,
                vec![
                    "frameLocator",
                    "locator",
                    "filter",
                    "and",
                    "or",
                    "nth",
                    "first",
                    "last",
                    "contentFrame",
                    "owner"
                ]
            );
            assert_eq!(chain.calls[5], LocatorCall::Nth(-1));
        }

        #[test]
        fn test_template_without_substitution() {
            let chain = validate("getByText(`Hello`)").unwrap();
            assert_eq!(chain.to_expression(), "getByText('Hello')");
        }
    }

    mod reject_tests {
        use super::*;

        #[test]
        fn test_computed_member() {
            assert_eq!(rejection("page['getByRole']('button')"), "computed member access");
        }

        #[test]
        fn test_disallowed_root_method() {
            assert!(rejection("page.evaluate('1')").contains("non-whitelisted root method"));
            assert!(rejection("document.querySelector('#a')").contains("`document`"));
        }

        #[test]
        fn test_disallowed_chain_method() {
            assert!(rejection("getByRole('button').click()").contains("chained method `click`"));
        }

        #[test]
        fn test_chain_only_as_root() {
            assert!(rejection("first()").contains("chain-only"));
        }

        #[test]
        fn test_spread() {
            assert_eq!(rejection("getByText(...parts)"), "spread syntax");
            assert_eq!(rejection("getByRole('button', { ...opts })"), "spread syntax");
        }

        #[test]
        fn test_destructuring_and_functions() {
            assert_eq!(
                rejection("getByRole('x').filter(({ a }) => a)").as_str(),
                "destructuring pattern"
            );
            assert_eq!(rejection("getByRole('x').filter(x => x)"), "arrow function");
            assert_eq!(rejection("({ a } = b)"), "destructuring pattern");
        }

        #[test]
        fn test_non_literal_arguments() {
            assert!(rejection("getByText(label)").contains("identifier reference"));
            assert_eq!(rejection("getByText(`a${b}`)"), "template substitution");
            assert!(rejection("getByText('a' + 'b')").contains("binary operator"));
            assert_eq!(rejection("getByText(new String('a'))"), "`new` expression");
            assert!(rejection("getByRole('button', { name })").contains("shorthand"));
        }

        #[test]
        fn test_argument_shapes() {
            assert!(rejection("getByText('a').nth('2')").contains("integer index"));
            assert!(rejection("getByText('a').nth(1.5)").contains("integer index"));
            assert!(rejection("getByRole('button', { nam: 'x' })").contains("unsupported option"));
            assert!(rejection("getByText('a').first(1)").contains("takes 0"));
            assert!(rejection("getByText('a', { exact: 'yes' })").contains("expects boolean"));
        }

        #[test]
        fn test_optional_chaining_and_bare_values() {
            assert_eq!(rejection("page?.getByText('a')"), "optional chaining");
            assert!(rejection("page").contains("identifier reference"));
            assert!(rejection("getByText('a').count").contains("without a call"));
        }

        #[test]
        fn test_rejection_quotes_offending_text() {
            let err = validate("getByRole('x').click()").unwrap_err();
            assert!(err.to_string().contains("getByRole('x').click()"));
        }
    }
}
