//! Accessibility-tree snapshots.
//!
//! A snapshot is the textual dump a page produces for its accessibility
//! tree, one indented bullet per node:
//!
//! ```text
//! - navigation "Main":
//!   - link "Home" [ref=e2]:
//!     - /url: /home
//! - heading "Welcome" [level=1] [ref=e3]
//! - button "Save" [disabled] [ref=e4]
//! - status: 3 items saved
//! ```
//!
//! Parsing fails open: a line that cannot be read is skipped and counted,
//! the rest of the snapshot is kept.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// ARIA role of a snapshot node
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AriaRole {
    Alert,
    Banner,
    Button,
    Checkbox,
    Combobox,
    Contentinfo,
    Dialog,
    Heading,
    Img,
    Link,
    List,
    Listitem,
    Main,
    Menuitem,
    Navigation,
    Option,
    Paragraph,
    Radio,
    Region,
    Searchbox,
    Slider,
    Spinbutton,
    Status,
    Switch,
    Tab,
    Tabpanel,
    Text,
    Textbox,
    /// Any role without a dedicated variant
    Other(String),
}

impl AriaRole {
    /// Parse a role name (case-insensitive)
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "alert" => Self::Alert,
            "banner" => Self::Banner,
            "button" => Self::Button,
            "checkbox" => Self::Checkbox,
            "combobox" => Self::Combobox,
            "contentinfo" => Self::Contentinfo,
            "dialog" | "alertdialog" => Self::Dialog,
            "heading" => Self::Heading,
            "img" => Self::Img,
            "link" => Self::Link,
            "list" => Self::List,
            "listitem" => Self::Listitem,
            "main" => Self::Main,
            "menuitem" => Self::Menuitem,
            "navigation" => Self::Navigation,
            "option" => Self::Option,
            "paragraph" => Self::Paragraph,
            "radio" => Self::Radio,
            "region" => Self::Region,
            "searchbox" => Self::Searchbox,
            "slider" => Self::Slider,
            "spinbutton" => Self::Spinbutton,
            "status" => Self::Status,
            "switch" => Self::Switch,
            "tab" => Self::Tab,
            "tabpanel" => Self::Tabpanel,
            "text" => Self::Text,
            "textbox" => Self::Textbox,
            other => Self::Other(other.to_string()),
        }
    }

    /// Role name as it appears in snapshots and `getByRole`
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Alert => "alert",
            Self::Banner => "banner",
            Self::Button => "button",
            Self::Checkbox => "checkbox",
            Self::Combobox => "combobox",
            Self::Contentinfo => "contentinfo",
            Self::Dialog => "dialog",
            Self::Heading => "heading",
            Self::Img => "img",
            Self::Link => "link",
            Self::List => "list",
            Self::Listitem => "listitem",
            Self::Main => "main",
            Self::Menuitem => "menuitem",
            Self::Navigation => "navigation",
            Self::Option => "option",
            Self::Paragraph => "paragraph",
            Self::Radio => "radio",
            Self::Region => "region",
            Self::Searchbox => "searchbox",
            Self::Slider => "slider",
            Self::Spinbutton => "spinbutton",
            Self::Status => "status",
            Self::Switch => "switch",
            Self::Tab => "tab",
            Self::Tabpanel => "tabpanel",
            Self::Text => "text",
            Self::Textbox => "textbox",
            Self::Other(name) => name,
        }
    }

    /// Priority among high-signal roles (lower is stronger); `None` if the
    /// role is not high-signal
    #[must_use]
    pub const fn high_signal_rank(&self) -> Option<u8> {
        match self {
            Self::Heading => Some(0),
            Self::Alert => Some(1),
            Self::Status => Some(2),
            Self::Tab => Some(3),
            Self::Link => Some(4),
            _ => None,
        }
    }

    /// Heading, alert, status, tab or link
    #[must_use]
    pub const fn is_high_signal(&self) -> bool {
        self.high_signal_rank().is_some()
    }

    /// Landmarks that rarely change between runs
    #[must_use]
    pub const fn is_stable_structural(&self) -> bool {
        matches!(
            self,
            Self::Navigation | Self::Banner | Self::Main | Self::Contentinfo
        )
    }

    /// Roles that accept user input or activation
    #[must_use]
    pub const fn is_form_control(&self) -> bool {
        matches!(
            self,
            Self::Button
                | Self::Checkbox
                | Self::Combobox
                | Self::Radio
                | Self::Searchbox
                | Self::Slider
                | Self::Spinbutton
                | Self::Switch
                | Self::Textbox
                | Self::Option
                | Self::Menuitem
        )
    }

    /// Regions whose text is announced on change
    #[must_use]
    pub const fn is_live_region(&self) -> bool {
        matches!(self, Self::Status | Self::Alert)
    }
}

impl From<String> for AriaRole {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<AriaRole> for String {
    fn from(value: AriaRole) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for AriaRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of an accessibility snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotNode {
    /// ARIA role
    pub role: AriaRole,
    /// Accessible name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Trailing text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Snapshot-local element reference, e.g. `e4`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_ref: Option<String>,
    /// Visible
    pub visible: bool,
    /// Enabled
    pub enabled: bool,
    /// Expanded state, when the node exposes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded: Option<bool>,
    /// Indentation level
    pub depth: usize,
    /// Remaining `[attr=value]` markers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl SnapshotNode {
    /// Create a visible, enabled node
    #[must_use]
    pub fn new(role: AriaRole) -> Self {
        Self {
            role,
            name: None,
            text: None,
            node_ref: None,
            visible: true,
            enabled: true,
            expanded: None,
            depth: 0,
            attributes: BTreeMap::new(),
        }
    }

    /// Set the accessible name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the text content
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Text to assert on: trailing text, else the name
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.text
            .as_deref()
            .or(self.name.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Diff identity
    #[must_use]
    pub fn key(&self) -> NodeKey {
        match &self.node_ref {
            Some(r) => NodeKey::Ref(r.clone()),
            None => NodeKey::RoleName(
                self.role.as_str().to_string(),
                normalize_name(self.name.as_deref().unwrap_or_default()),
            ),
        }
    }
}

/// Identity of a node across two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKey {
    /// Element reference
    Ref(String),
    /// Role plus normalized name
    RoleName(String, String),
}

/// Collapse whitespace and lowercase
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Result of parsing a snapshot dump
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSnapshot {
    /// Nodes in document order
    pub nodes: Vec<SnapshotNode>,
    /// Lines that could not be parsed
    pub skipped_lines: usize,
    /// Property lines such as `- /url: ...`
    pub property_lines: usize,
}

enum Line {
    Node(SnapshotNode),
    Property,
    Blank,
    Invalid,
}

/// Parse a snapshot dump
#[must_use]
pub fn parse_snapshot(text: &str) -> ParsedSnapshot {
    let mut parsed = ParsedSnapshot::default();
    for line in text.lines() {
        match parse_line(line) {
            Line::Node(node) => parsed.nodes.push(node),
            Line::Property => parsed.property_lines += 1,
            Line::Blank => {}
            Line::Invalid => {
                tracing::trace!(line, "skipping unparsable snapshot line");
                parsed.skipped_lines += 1;
            }
        }
    }
    parsed
}

fn parse_line(line: &str) -> Line {
    let body = line.trim_start();
    let indent = line.len() - body.len();
    let body = body.trim_end();
    if body.is_empty() {
        return Line::Blank;
    }
    let Some(rest) = body.strip_prefix("- ") else {
        return Line::Invalid;
    };
    let rest = rest.trim_start();
    if rest.starts_with('/') {
        return Line::Property;
    }

    let role_end = rest
        .find(|c: char| c.is_whitespace() || matches!(c, '"' | '[' | ':'))
        .unwrap_or(rest.len());
    let role = &rest[..role_end];
    if role.is_empty() || !role.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Line::Invalid;
    }

    let mut node = SnapshotNode::new(AriaRole::parse(role));
    node.depth = indent / 2;
    let mut rest = rest[role_end..].trim_start();

    if rest.starts_with('"') {
        let Some((name, after)) = take_quoted(rest) else {
            return Line::Invalid;
        };
        node.name = Some(name);
        rest = after.trim_start();
    }

    while let Some(inner) = rest.strip_prefix('[') {
        let Some(close) = inner.find(']') else {
            return Line::Invalid;
        };
        apply_attribute(&mut node, &inner[..close]);
        rest = inner[close + 1..].trim_start();
    }

    if !rest.is_empty() {
        let Some(text) = rest.strip_prefix(':') else {
            return Line::Invalid;
        };
        let text = text.trim();
        if !text.is_empty() {
            node.text = Some(unquote(text));
        }
    }
    Line::Node(node)
}

fn apply_attribute(node: &mut SnapshotNode, attr: &str) {
    let (key, value) = match attr.split_once('=') {
        Some((k, v)) => (k.trim(), Some(v.trim())),
        None => (attr.trim(), None),
    };
    match (key, value) {
        ("ref", Some(v)) => node.node_ref = Some(v.to_string()),
        ("disabled", None | Some("true")) => node.enabled = false,
        ("disabled", Some(_)) => node.enabled = true,
        ("expanded", None | Some("true")) => node.expanded = Some(true),
        ("expanded", Some(_)) => node.expanded = Some(false),
        ("hidden", None | Some("true")) => node.visible = false,
        (k, v) => {
            node.attributes
                .insert(k.to_string(), v.unwrap_or("true").to_string());
        }
    }
}

fn take_quoted(s: &str) -> Option<(String, &str)> {
    let mut out = String::new();
    let mut chars = s.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars.next()?;
                out.push(escaped);
            }
            '"' => return Some((out, &s[i + 1..])),
            _ => out.push(c),
        }
    }
    None
}

fn unquote(text: &str) -> String {
    if text.starts_with('"') {
        if let Some((inner, rest)) = take_quoted(text) {
            if rest.trim().is_empty() {
                return inner;
            }
        }
    }
    text.to_string()
}

/// A node present in both snapshots whose text or state differs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeChange {
    /// Node before the step
    pub before: SnapshotNode,
    /// Node after the step
    pub after: SnapshotNode,
    /// Text content differs
    pub text_changed: bool,
    /// Enabled state differs
    pub enabled_changed: bool,
    /// Expanded state differs
    pub expanded_changed: bool,
}

impl NodeChange {
    /// Disabled before, enabled after
    #[must_use]
    pub const fn became_enabled(&self) -> bool {
        self.enabled_changed && !self.before.enabled && self.after.enabled
    }
}

/// Difference between two snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    /// Present only after
    pub appeared: Vec<SnapshotNode>,
    /// Present only before
    pub disappeared: Vec<SnapshotNode>,
    /// Present in both with different text or state
    pub changed: Vec<NodeChange>,
    /// Present in both and identical in text and state
    pub unchanged: Vec<SnapshotNode>,
}

impl SnapshotDiff {
    /// No node appeared, disappeared or changed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.appeared.is_empty() && self.disappeared.is_empty() && self.changed.is_empty()
    }
}

fn same_content(a: &SnapshotNode, b: &SnapshotNode) -> bool {
    a.text == b.text && a.enabled == b.enabled && a.expanded == b.expanded
}

/// Diff two node lists by identity.
///
/// When a key repeats, identical siblings pair up first and only the rest
/// pair by occurrence order. A sibling inserted ahead of an existing one
/// therefore shows up as appeared, not as a text change on every later
/// sibling.
#[must_use]
pub fn diff_snapshots(before: &[SnapshotNode], after: &[SnapshotNode]) -> SnapshotDiff {
    let mut by_key: HashMap<NodeKey, Vec<usize>> = HashMap::new();
    for (i, node) in before.iter().enumerate() {
        by_key.entry(node.key()).or_default().push(i);
    }
    let after_keys: Vec<NodeKey> = after.iter().map(SnapshotNode::key).collect();
    let mut matched = vec![false; before.len()];
    let mut pairing: Vec<Option<usize>> = vec![None; after.len()];

    for (ai, node) in after.iter().enumerate() {
        let Some(candidates) = by_key.get(&after_keys[ai]) else {
            continue;
        };
        if let Some(&bi) = candidates
            .iter()
            .find(|&&bi| !matched[bi] && same_content(&before[bi], node))
        {
            matched[bi] = true;
            pairing[ai] = Some(bi);
        }
    }
    for (ai, slot) in pairing.iter_mut().enumerate() {
        if slot.is_some() {
            continue;
        }
        let Some(candidates) = by_key.get(&after_keys[ai]) else {
            continue;
        };
        if let Some(&bi) = candidates.iter().find(|&&bi| !matched[bi]) {
            matched[bi] = true;
            *slot = Some(bi);
        }
    }

    let mut diff = SnapshotDiff::default();
    for (node, slot) in after.iter().zip(&pairing) {
        let Some(bi) = *slot else {
            diff.appeared.push(node.clone());
            continue;
        };
        let old = &before[bi];
        let text_changed = old.text != node.text;
        let enabled_changed = old.enabled != node.enabled;
        let expanded_changed = old.expanded != node.expanded;
        if text_changed || enabled_changed || expanded_changed {
            diff.changed.push(NodeChange {
                before: old.clone(),
                after: node.clone(),
                text_changed,
                enabled_changed,
                expanded_changed,
            });
        } else {
            diff.unchanged.push(node.clone());
        }
    }

    diff.disappeared = before
        .iter()
        .zip(&matched)
        .filter(|(_, seen)| !**seen)
        .map(|(n, _)| n.clone())
        .collect();
    diff
}
