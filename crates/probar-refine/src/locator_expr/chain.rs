//! Validated locator chains.
//!
//! A [`LocatorChain`] only exists after the allowlist has accepted every
//! call and argument, so anything holding one can replay it without further
//! checks. `Display` renders the canonical expression form.

use std::fmt;

use regex::Regex;

/// Literal argument value accepted by the allowlist
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// String (or substitution-free template)
    Str(String),
    /// Number
    Number(f64),
    /// Boolean
    Bool(bool),
    /// `null` / `undefined`
    Null,
    /// Regex literal
    Regex {
        /// Pattern
        pattern: String,
        /// Flags
        flags: String,
    },
    /// Object literal with plain keys
    Object(Vec<(String, Literal)>),
    /// Array literal
    Array(Vec<Literal>),
    /// Nested whitelisted chain
    Locator(LocatorChain),
}

impl Literal {
    /// Short description used in rejection messages
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Number(_) => "number",
            Self::Bool(_) => "boolean",
            Self::Null => "null",
            Self::Regex { .. } => "regex",
            Self::Object(_) => "object",
            Self::Array(_) => "array",
            Self::Locator(_) => "locator",
        }
    }
}

/// String or regex used to match text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextMatch {
    /// Plain text
    Text(String),
    /// Regex literal
    Regex {
        /// Pattern
        pattern: String,
        /// Flags
        flags: String,
    },
}

impl TextMatch {
    /// Match `candidate` the way locator lookups do: plain text is a
    /// case-insensitive substring match unless `exact`, regexes search
    #[must_use]
    pub fn matches(&self, candidate: &str, exact: bool) -> bool {
        let candidate = collapse_whitespace(candidate);
        match self {
            Self::Text(text) => {
                let text = collapse_whitespace(text);
                if exact {
                    candidate == text
                } else {
                    candidate.to_lowercase().contains(&text.to_lowercase())
                }
            }
            Self::Regex { pattern, flags } => {
                let prefix = if flags.contains('i') { "(?i)" } else { "" };
                match Regex::new(&format!("{prefix}{pattern}")) {
                    Ok(re) => re.is_match(&candidate),
                    Err(e) => {
                        tracing::trace!(pattern, error = %e, "regex not supported by matcher");
                        false
                    }
                }
            }
        }
    }

    /// Plain text, if not a regex
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Regex { .. } => None,
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl fmt::Display for TextMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(t) => write_quoted(f, t),
            Self::Regex { pattern, flags } => write!(f, "/{pattern}/{flags}"),
        }
    }
}

/// Options of `getByRole`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleOptions {
    /// Accessible name
    pub name: Option<TextMatch>,
    /// Exact name match
    pub exact: Option<bool>,
    /// Checked state
    pub checked: Option<bool>,
    /// Disabled state
    pub disabled: Option<bool>,
    /// Expanded state
    pub expanded: Option<bool>,
    /// Include hidden elements
    pub include_hidden: Option<bool>,
    /// Heading level
    pub level: Option<i64>,
    /// Pressed state
    pub pressed: Option<bool>,
    /// Selected state
    pub selected: Option<bool>,
}

impl RoleOptions {
    /// Options with only a name
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(TextMatch::Text(name.into())),
            ..Self::default()
        }
    }

    /// Whether no option is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Which text-based lookup a `getBy*` call performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextLookup {
    /// `getByText`
    Text,
    /// `getByLabel`
    Label,
    /// `getByPlaceholder`
    Placeholder,
    /// `getByAltText`
    AltText,
    /// `getByTitle`
    Title,
}

impl TextLookup {
    /// Method name
    #[must_use]
    pub const fn method(self) -> &'static str {
        match self {
            Self::Text => "getByText",
            Self::Label => "getByLabel",
            Self::Placeholder => "getByPlaceholder",
            Self::AltText => "getByAltText",
            Self::Title => "getByTitle",
        }
    }

    /// Lookup for a method name
    #[must_use]
    pub fn from_method(name: &str) -> Option<Self> {
        match name {
            "getByText" => Some(Self::Text),
            "getByLabel" => Some(Self::Label),
            "getByPlaceholder" => Some(Self::Placeholder),
            "getByAltText" => Some(Self::AltText),
            "getByTitle" => Some(Self::Title),
            _ => None,
        }
    }
}

/// Text plus the `exact` option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextQuery {
    /// Text or regex
    pub text: TextMatch,
    /// `{ exact }`
    pub exact: Option<bool>,
}

impl TextQuery {
    /// Plain, non-exact query
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: TextMatch::Text(text.into()),
            exact: None,
        }
    }
}

/// Options of `filter` and `locator`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOptions {
    /// `hasText`
    pub has_text: Option<TextMatch>,
    /// `hasNotText`
    pub has_not_text: Option<TextMatch>,
    /// `has`
    pub has: Option<LocatorChain>,
    /// `hasNot`
    pub has_not: Option<LocatorChain>,
    /// `visible`
    pub visible: Option<bool>,
}

impl FilterOptions {
    /// Whether no option is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One whitelisted call
#[derive(Debug, Clone, PartialEq)]
pub enum LocatorCall {
    /// `getByRole(role, options?)`
    GetByRole {
        /// ARIA role
        role: String,
        /// Options
        options: RoleOptions,
    },
    /// `getByText` / `getByLabel` / `getByPlaceholder` / `getByAltText` / `getByTitle`
    GetBy {
        /// Which lookup
        lookup: TextLookup,
        /// Text and exactness
        query: TextQuery,
    },
    /// `getByTestId(id)`
    GetByTestId(TextMatch),
    /// `locator(selector, options?)`
    Locator {
        /// Selector string
        selector: String,
        /// Options
        options: FilterOptions,
    },
    /// `frameLocator(selector)`
    FrameLocator(String),
    /// `filter(options)`
    Filter(FilterOptions),
    /// `first()`
    First,
    /// `last()`
    Last,
    /// `nth(index)`
    Nth(i64),
    /// `and(locator)`
    And(LocatorChain),
    /// `or(locator)`
    Or(LocatorChain),
    /// `contentFrame()`
    ContentFrame,
    /// `owner()`
    Owner,
}

impl LocatorCall {
    /// Method name
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::GetByRole { .. } => "getByRole",
            Self::GetBy { lookup, .. } => lookup.method(),
            Self::GetByTestId(_) => "getByTestId",
            Self::Locator { .. } => "locator",
            Self::FrameLocator(_) => "frameLocator",
            Self::Filter(_) => "filter",
            Self::First => "first",
            Self::Last => "last",
            Self::Nth(_) => "nth",
            Self::And(_) => "and",
            Self::Or(_) => "or",
            Self::ContentFrame => "contentFrame",
            Self::Owner => "owner",
        }
    }

    /// Whether the call may start a chain
    #[must_use]
    pub const fn is_root(&self) -> bool {
        matches!(
            self,
            Self::GetByRole { .. }
                | Self::GetBy { .. }
                | Self::GetByTestId(_)
                | Self::Locator { .. }
                | Self::FrameLocator(_)
        )
    }
}

/// A validated chain of locator calls
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocatorChain {
    /// Calls in order
    pub calls: Vec<LocatorCall>,
}

impl LocatorChain {
    /// Create a chain
    #[must_use]
    pub const fn new(calls: Vec<LocatorCall>) -> Self {
        Self { calls }
    }

    /// Append a call
    #[must_use]
    pub fn then(mut self, call: LocatorCall) -> Self {
        self.calls.push(call);
        self
    }

    /// Canonical expression text
    #[must_use]
    pub fn to_expression(&self) -> String {
        self.to_string()
    }

    /// Number of frame descents in the chain
    #[must_use]
    pub fn frame_depth(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, LocatorCall::FrameLocator(_) | LocatorCall::ContentFrame))
            .count()
    }
}

pub(crate) fn write_quoted(f: &mut impl fmt::Write, s: &str) -> fmt::Result {
    f.write_char('\'')?;
    for c in s.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '\'' => f.write_str("\\'")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('\'')
}

/// Quote a string the way canonical expressions do
#[must_use]
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    // Writing into a String cannot fail
    let _ = write_quoted(&mut out, s);
    out
}

struct Fields<'a, 'b> {
    f: &'a mut fmt::Formatter<'b>,
    any: bool,
}

impl<'a, 'b> Fields<'a, 'b> {
    fn new(f: &'a mut fmt::Formatter<'b>) -> Self {
        Self { f, any: false }
    }

    fn field(&mut self, key: &str, value: &dyn fmt::Display) -> fmt::Result {
        self.f.write_str(if self.any { ", " } else { "{ " })?;
        self.any = true;
        write!(self.f, "{key}: {value}")
    }

    fn bool(&mut self, key: &str, value: Option<bool>) -> fmt::Result {
        match value {
            Some(v) => self.field(key, &v),
            None => Ok(()),
        }
    }

    fn finish(self) -> fmt::Result {
        if self.any {
            self.f.write_str(" }")
        } else {
            self.f.write_str("{}")
        }
    }
}

impl fmt::Display for RoleOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields = Fields::new(f);
        if let Some(name) = &self.name {
            fields.field("name", name)?;
        }
        fields.bool("exact", self.exact)?;
        fields.bool("checked", self.checked)?;
        fields.bool("disabled", self.disabled)?;
        fields.bool("expanded", self.expanded)?;
        fields.bool("includeHidden", self.include_hidden)?;
        if let Some(level) = self.level {
            fields.field("level", &level)?;
        }
        fields.bool("pressed", self.pressed)?;
        fields.bool("selected", self.selected)?;
        fields.finish()
    }
}

impl fmt::Display for FilterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields = Fields::new(f);
        if let Some(text) = &self.has_text {
            fields.field("hasText", text)?;
        }
        if let Some(text) = &self.has_not_text {
            fields.field("hasNotText", text)?;
        }
        if let Some(chain) = &self.has {
            fields.field("has", chain)?;
        }
        if let Some(chain) = &self.has_not {
            fields.field("hasNot", chain)?;
        }
        fields.bool("visible", self.visible)?;
        fields.finish()
    }
}

impl fmt::Display for LocatorCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = self.method();
        match self {
            Self::GetByRole { role, options } => {
                write!(f, "{method}(")?;
                write_quoted(f, role)?;
                if !options.is_empty() {
                    write!(f, ", {options}")?;
                }
                f.write_str(")")
            }
            Self::GetBy { query, .. } => {
                write!(f, "{method}({}", query.text)?;
                if let Some(exact) = query.exact {
                    write!(f, ", {{ exact: {exact} }}")?;
                }
                f.write_str(")")
            }
            Self::GetByTestId(id) => write!(f, "{method}({id})"),
            Self::Locator { selector, options } => {
                write!(f, "{method}(")?;
                write_quoted(f, selector)?;
                if !options.is_empty() {
                    write!(f, ", {options}")?;
                }
                f.write_str(")")
            }
            Self::FrameLocator(selector) => {
                write!(f, "{method}(")?;
                write_quoted(f, selector)?;
                f.write_str(")")
            }
            Self::Filter(options) => write!(f, "{method}({options})"),
            Self::First | Self::Last | Self::ContentFrame | Self::Owner => {
                write!(f, "{method}()")
            }
            Self::Nth(index) => write!(f, "{method}({index})"),
            Self::And(chain) | Self::Or(chain) => write!(f, "{method}({chain})"),
        }
    }
}

impl fmt::Display for LocatorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, call) in self.calls.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{call}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_role_with_name() {
        let chain = LocatorChain::new(vec![LocatorCall::GetByRole {
            role: "button".to_string(),
            options: RoleOptions::named("Save"),
        }]);
        assert_eq!(chain.to_expression(), "getByRole('button', { name: 'Save' })");
    }

    #[test]
    fn test_render_chain_operators() {
        let chain = LocatorChain::new(vec![
            LocatorCall::FrameLocator("#pay".to_string()),
            LocatorCall::GetBy {
                lookup: TextLookup::Label,
                query: TextQuery {
                    text: TextMatch::Text("Card".to_string()),
                    exact: Some(true),
                },
            },
            LocatorCall::Nth(1),
        ]);
        assert_eq!(
            chain.to_expression(),
            "frameLocator('#pay').getByLabel('Card', { exact: true }).nth(1)"
        );
        assert_eq!(chain.frame_depth(), 1);
    }

    #[test]
    fn test_render_filter_with_nested_chain() {
        let inner = LocatorChain::new(vec![LocatorCall::GetBy {
            lookup: TextLookup::Text,
            query: TextQuery::text("Sale"),
        }]);
        let chain = LocatorChain::new(vec![
            LocatorCall::GetByRole {
                role: "listitem".to_string(),
                options: RoleOptions::default(),
            },
            LocatorCall::Filter(FilterOptions {
                has: Some(inner),
                ..FilterOptions::default()
            }),
        ]);
        assert_eq!(
            chain.to_expression(),
            "getByRole('listitem').filter({ has: getByText('Sale') })"
        );
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("it's"), r"'it\'s'");
        assert_eq!(quote(r"a\b"), r"'a\\b'");
    }

    #[test]
    fn test_text_match_semantics() {
        let m = TextMatch::Text("save".to_string());
        assert!(m.matches("Save changes", false));
        assert!(!m.matches("Save changes", true));
        assert!(TextMatch::Text("Save".to_string()).matches("  Save ", true));
        let re = TextMatch::Regex {
            pattern: "^sub.*total$".to_string(),
            flags: "i".to_string(),
        };
        assert!(re.matches("Subtotal", false));
        assert!(!re.matches("Total", false));
    }
}
