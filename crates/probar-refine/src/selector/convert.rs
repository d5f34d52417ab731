//! Selector conversion.
//!
//! Rewrites engine selectors (`role=button[name="Save"]`, `text=Save`,
//! `internal:label="Email"i`, `a >> nth=1`) and test-id css into locator
//! chains. Used for browser-free normalization and for turning resolver
//! output into candidates.

use crate::locator_expr::{
    compile, FilterOptions, LocatorCall, LocatorChain, RoleOptions, TextLookup, TextMatch,
    TextQuery,
};
use crate::result::{RefineError, RefineResult};
use crate::step::TargetKind;

/// Convert a selector value of `kind` into a locator chain
pub fn to_locator_chain(value: &str, kind: TargetKind) -> RefineResult<LocatorChain> {
    let value = value.trim();
    match kind {
        TargetKind::LocatorExpression => compile(value),
        TargetKind::EngineSelector | TargetKind::EngineInternal => convert_engine(value),
        TargetKind::Css => test_id_from_css(value)
            .map(|id| LocatorChain::new(vec![LocatorCall::GetByTestId(TextMatch::Text(id))]))
            .ok_or_else(|| RefineError::conversion(format!("css `{value}` has no locator form"))),
        TargetKind::Xpath | TargetKind::Unknown => Err(RefineError::conversion(format!(
            "{kind} selector `{value}` has no locator form"
        ))),
    }
}

/// Convert an untyped selector value, classifying it first
pub fn convert_selector(value: &str) -> RefineResult<LocatorChain> {
    to_locator_chain(value, TargetKind::classify(value))
}

/// `[data-testid="x"]` or `[data-testid=x]` as the whole selector
#[must_use]
pub fn test_id_from_css(css: &str) -> Option<String> {
    let inner = css.trim().strip_prefix('[')?.strip_suffix(']')?;
    let (attr, value) = inner.split_once('=')?;
    if attr.trim() != "data-testid" {
        return None;
    }
    let value = value.trim();
    let id = match value.chars().next()? {
        '"' | '\'' => {
            let (text, rest) = take_quoted(value)?;
            if !rest.is_empty() {
                return None;
            }
            text
        }
        _ => value.to_string(),
    };
    (!id.is_empty()).then_some(id)
}

fn convert_engine(value: &str) -> RefineResult<LocatorChain> {
    let mut calls = Vec::new();
    for part in split_chain(value) {
        calls.push(convert_part(part.trim())?);
    }
    if calls.is_empty() {
        return Err(RefineError::conversion("empty selector"));
    }
    if !calls[0].is_root() {
        return Err(RefineError::conversion(format!(
            "selector `{value}` starts with `{}`",
            calls[0].method()
        )));
    }
    Ok(LocatorChain::new(calls))
}

/// Split on ` >> ` outside of quotes
fn split_chain(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match quote {
            Some(_) if c == '\\' => {
                i += 2;
                continue;
            }
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if bytes[i..].starts_with(b" >> ") => {
                parts.push(&value[start..i]);
                i += 4;
                start = i;
                continue;
            }
            None => {}
        }
        i += 1;
    }
    parts.push(&value[start..]);
    parts
}

fn convert_part(part: &str) -> RefineResult<LocatorCall> {
    let Some((engine, body)) = split_engine(part) else {
        return Ok(match test_id_from_css(part) {
            Some(id) => LocatorCall::GetByTestId(TextMatch::Text(id)),
            None => LocatorCall::Locator {
                selector: part.to_string(),
                options: FilterOptions::default(),
            },
        });
    };
    let internal = engine.starts_with("internal:");
    match engine.trim_start_matches("internal:") {
        "role" => convert_role(body),
        "text" => Ok(LocatorCall::GetBy {
            lookup: TextLookup::Text,
            query: text_query(body, !internal)?,
        }),
        "label" => Ok(LocatorCall::GetBy {
            lookup: TextLookup::Label,
            query: text_query(body, false)?,
        }),
        "attr" => convert_attr(body),
        "testid" => convert_testid(body),
        "data-testid" => Ok(LocatorCall::GetByTestId(TextMatch::Text(
            unquote_plain(body).to_string(),
        ))),
        "has-text" => Ok(LocatorCall::Filter(FilterOptions {
            has_text: Some(text_query(body, false)?.text),
            ..FilterOptions::default()
        })),
        "has-not-text" => Ok(LocatorCall::Filter(FilterOptions {
            has_not_text: Some(text_query(body, false)?.text),
            ..FilterOptions::default()
        })),
        "nth" => {
            let index: i64 = body
                .trim()
                .parse()
                .map_err(|_| RefineError::conversion(format!("bad nth index `{body}`")))?;
            Ok(match index {
                0 => LocatorCall::First,
                -1 => LocatorCall::Last,
                n => LocatorCall::Nth(n),
            })
        }
        "control" if body == "enter-frame" => Ok(LocatorCall::ContentFrame),
        "css" => Ok(LocatorCall::Locator {
            selector: body.to_string(),
            options: FilterOptions::default(),
        }),
        "id" => Ok(LocatorCall::Locator {
            selector: format!("#{}", unquote_plain(body)),
            options: FilterOptions::default(),
        }),
        "xpath" => Ok(LocatorCall::Locator {
            selector: format!("xpath={body}"),
            options: FilterOptions::default(),
        }),
        other => Err(RefineError::conversion(format!(
            "unsupported selector engine `{other}` in `{part}`"
        ))),
    }
}

const ENGINES: &[&str] = &["role", "text", "css", "id", "data-testid", "nth", "xpath"];

fn split_engine(part: &str) -> Option<(&str, &str)> {
    let (engine, body) = part.split_once('=')?;
    if engine.starts_with("internal:") || ENGINES.contains(&engine) {
        Some((engine, body))
    } else {
        None
    }
}

fn convert_role(body: &str) -> RefineResult<LocatorCall> {
    let role_end = body.find('[').unwrap_or(body.len());
    let role = body[..role_end].trim();
    if role.is_empty() {
        return Err(RefineError::conversion(format!("role selector `{body}` has no role")));
    }
    let mut options = RoleOptions::default();
    for (key, value) in parse_attributes(&body[role_end..])? {
        match key.as_str() {
            "name" => match value {
                Some(AttrValue::Quoted(text, suffix)) => {
                    options.name = Some(TextMatch::Text(text));
                    if suffix == Some('s') {
                        options.exact = Some(true);
                    }
                }
                Some(AttrValue::Regex(pattern, flags)) => {
                    options.name = Some(TextMatch::Regex { pattern, flags });
                }
                Some(AttrValue::Bare(text)) => options.name = Some(TextMatch::Text(text)),
                None => return Err(RefineError::conversion("[name] without value")),
            },
            "checked" => options.checked = Some(flag(&key, value.as_ref())?),
            "disabled" => options.disabled = Some(flag(&key, value.as_ref())?),
            "expanded" => options.expanded = Some(flag(&key, value.as_ref())?),
            "include-hidden" => options.include_hidden = Some(flag(&key, value.as_ref())?),
            "pressed" => options.pressed = Some(flag(&key, value.as_ref())?),
            "selected" => options.selected = Some(flag(&key, value.as_ref())?),
            "level" => match value {
                Some(AttrValue::Bare(v)) => {
                    options.level = Some(v.parse().map_err(|_| {
                        RefineError::conversion(format!("bad heading level `{v}`"))
                    })?);
                }
                _ => return Err(RefineError::conversion("[level] needs a number")),
            },
            other => {
                return Err(RefineError::conversion(format!(
                    "unsupported role attribute `{other}`"
                )))
            }
        }
    }
    Ok(LocatorCall::GetByRole {
        role: role.to_string(),
        options,
    })
}

fn flag(key: &str, value: Option<&AttrValue>) -> RefineResult<bool> {
    match value {
        None => Ok(true),
        Some(AttrValue::Bare(v)) if v == "true" => Ok(true),
        Some(AttrValue::Bare(v)) if v == "false" => Ok(false),
        _ => Err(RefineError::conversion(format!("bad value for [{key}]"))),
    }
}

fn convert_attr(body: &str) -> RefineResult<LocatorCall> {
    let attrs = parse_attributes(body)?;
    let [(key, Some(value))] = attrs.as_slice() else {
        return Err(RefineError::conversion(format!(
            "attribute selector `{body}` must name exactly one attribute"
        )));
    };
    let lookup = match key.as_str() {
        "placeholder" => TextLookup::Placeholder,
        "alt" => TextLookup::AltText,
        "title" => TextLookup::Title,
        other => {
            return Err(RefineError::conversion(format!(
                "attribute `{other}` has no locator lookup"
            )))
        }
    };
    Ok(LocatorCall::GetBy {
        lookup,
        query: value.to_query(false),
    })
}

fn convert_testid(body: &str) -> RefineResult<LocatorCall> {
    let attrs = parse_attributes(body)?;
    match attrs.as_slice() {
        [(key, Some(value))] if key.starts_with("data-") => Ok(LocatorCall::GetByTestId(
            value.to_query(false).text,
        )),
        _ => Err(RefineError::conversion(format!(
            "test id selector `{body}` is malformed"
        ))),
    }
}

fn text_query(body: &str, quoted_is_exact: bool) -> RefineResult<TextQuery> {
    let body = body.trim();
    if body.is_empty() {
        return Err(RefineError::conversion("empty text selector"));
    }
    Ok(parse_value(body)?.to_query(quoted_is_exact))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrValue {
    Quoted(String, Option<char>),
    Regex(String, String),
    Bare(String),
}

impl AttrValue {
    fn to_query(&self, quoted_is_exact: bool) -> TextQuery {
        match self {
            Self::Quoted(text, suffix) => TextQuery {
                text: TextMatch::Text(text.clone()),
                exact: match suffix {
                    Some('s') => Some(true),
                    None if quoted_is_exact => Some(true),
                    _ => None,
                },
            },
            Self::Regex(pattern, flags) => TextQuery {
                text: TextMatch::Regex {
                    pattern: pattern.clone(),
                    flags: flags.clone(),
                },
                exact: None,
            },
            Self::Bare(text) => TextQuery::text(text.clone()),
        }
    }
}

fn parse_value(s: &str) -> RefineResult<AttrValue> {
    let s = s.trim();
    if s.starts_with('"') || s.starts_with('\'') {
        let (text, rest) = take_quoted(s)
            .ok_or_else(|| RefineError::conversion(format!("unterminated quote in `{s}`")))?;
        let suffix = match rest {
            "" => None,
            "i" | "I" => Some('i'),
            "s" | "S" => Some('s'),
            other => {
                return Err(RefineError::conversion(format!(
                    "unexpected `{other}` after quoted value"
                )))
            }
        };
        return Ok(AttrValue::Quoted(text, suffix));
    }
    if let Some(inner) = s.strip_prefix('/') {
        if let Some(end) = inner.rfind('/') {
            return Ok(AttrValue::Regex(
                inner[..end].to_string(),
                inner[end + 1..].to_string(),
            ));
        }
    }
    Ok(AttrValue::Bare(s.to_string()))
}

/// Parse `[key=value][flag]...`
fn parse_attributes(s: &str) -> RefineResult<Vec<(String, Option<AttrValue>)>> {
    let mut out = Vec::new();
    let mut rest = s.trim();
    while !rest.is_empty() {
        let inner = rest
            .strip_prefix('[')
            .ok_or_else(|| RefineError::conversion(format!("expected '[' at `{rest}`")))?;
        let close = find_unquoted(inner, ']')
            .ok_or_else(|| RefineError::conversion(format!("unclosed '[' in `{s}`")))?;
        let content = &inner[..close];
        match content.split_once('=') {
            Some((key, value)) => out.push((key.trim().to_string(), Some(parse_value(value)?))),
            None => out.push((content.trim().to_string(), None)),
        }
        rest = inner[close + 1..].trim_start();
    }
    Ok(out)
}

fn find_unquoted(s: &str, target: char) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match quote {
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == target => return Some(i),
            None => {}
        }
    }
    None
}

fn take_quoted(s: &str) -> Option<(String, &str)> {
    let quote = s.chars().next()?;
    let mut out = String::new();
    let mut chars = s.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars.next()?;
                out.push(escaped);
            }
            c if c == quote => return Some((out, &s[i + 1..])),
            c => out.push(c),
        }
    }
    None
}

fn unquote_plain(s: &str) -> &str {
    let s = s.trim();
    for q in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(q).and_then(|x| x.strip_suffix(q)) {
            return inner;
        }
    }
    s
}
