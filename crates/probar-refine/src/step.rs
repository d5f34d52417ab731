//! Step and target model.
//!
//! A recorded script is an ordered list of [`Step`]s. Each interaction or
//! element assertion points at a [`Target`]. The pipeline never reads or
//! writes script files; callers hand it steps and receive steps back.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::result::{RefineError, RefineResult};
use crate::signals::SignalSet;

/// How a target value is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    /// Chain of locator-builder calls, e.g. `getByRole('button', { name: 'Save' })`
    LocatorExpression,
    /// Engine selector, e.g. `role=button[name="Save"]` or `text=Save`
    EngineSelector,
    /// CSS selector
    Css,
    /// XPath expression
    Xpath,
    /// Engine-internal selector, e.g. `internal:role=button[name="Save"i]`
    EngineInternal,
    /// Anything else
    Unknown,
}

const ENGINE_PREFIXES: &[&str] = &["role=", "text=", "css=", "id=", "data-testid=", "nth="];

impl TargetKind {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocatorExpression => "locator-expression",
            Self::EngineSelector => "engine-selector",
            Self::Css => "css",
            Self::Xpath => "xpath",
            Self::EngineInternal => "engine-internal",
            Self::Unknown => "unknown",
        }
    }

    /// Guess the kind of an untyped selector value
    #[must_use]
    pub fn classify(value: &str) -> Self {
        let v = value.trim();
        if v.is_empty() {
            return Self::Unknown;
        }
        if v.starts_with("getBy")
            || v.starts_with("page.")
            || v.starts_with("locator(")
            || v.starts_with("frameLocator(")
        {
            return Self::LocatorExpression;
        }
        if v.starts_with("internal:") {
            return Self::EngineInternal;
        }
        if v.starts_with("//") || v.starts_with("(//") || v.starts_with("xpath=") {
            return Self::Xpath;
        }
        if ENGINE_PREFIXES.iter().any(|p| v.starts_with(p)) || v.contains(" >> ") {
            return Self::EngineSelector;
        }
        if looks_like_css(v) {
            return Self::Css;
        }
        Self::Unknown
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn looks_like_css(v: &str) -> bool {
    let Some(first) = v.chars().next() else {
        return false;
    };
    if matches!(first, '#' | '.' | '[' | '*' | ':') {
        return true;
    }
    // Leading lowercase tag name followed by nothing or a css token
    let tag_len = v
        .chars()
        .take_while(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .count();
    if tag_len == 0 || !first.is_ascii_lowercase() {
        return false;
    }
    match v[tag_len..].chars().next() {
        None => true,
        Some(c) => matches!(c, '#' | '.' | '[' | ':' | '>' | '+' | '~' | ' ' | ','),
    }
}

/// Where a target came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetSource {
    /// Written by a person
    Manual,
    /// Captured by a recorder
    #[default]
    Recorded,
    /// Produced by the refine pipeline
    Derived,
}

/// Description of which live element a step acts on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Selector value
    pub value: String,
    /// Resolution strategy
    pub kind: TargetKind,
    /// Provenance
    #[serde(default)]
    pub source: TargetSource,
    /// Ordered frame selectors leading to the element's frame
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frame_path: Vec<String>,
    /// Dynamic-signal tags attached to the value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_signals: Option<SignalSet>,
}

/// Identity of a target for deduplication: value, kind and frame path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetKey {
    /// Selector value
    pub value: String,
    /// Kind
    pub kind: TargetKind,
    /// Frame path
    pub frame_path: Vec<String>,
}

impl std::fmt::Display for TargetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for frame in &self.frame_path {
            write!(f, "{frame} >> ")?;
        }
        write!(f, "{} ({})", self.value, self.kind)
    }
}

impl Target {
    /// Create a recorded target
    #[must_use]
    pub fn new(value: impl Into<String>, kind: TargetKind) -> Self {
        Self {
            value: value.into(),
            kind,
            source: TargetSource::Recorded,
            frame_path: Vec::new(),
            dynamic_signals: None,
        }
    }

    /// Create a target whose kind is inferred from the value
    #[must_use]
    pub fn infer(value: impl Into<String>) -> Self {
        let value = value.into();
        let kind = TargetKind::classify(&value);
        Self::new(value, kind)
    }

    /// Create a css target
    #[must_use]
    pub fn css(value: impl Into<String>) -> Self {
        Self::new(value, TargetKind::Css)
    }

    /// Create a locator-expression target
    #[must_use]
    pub fn locator(value: impl Into<String>) -> Self {
        Self::new(value, TargetKind::LocatorExpression)
    }

    /// Set the provenance
    #[must_use]
    pub const fn with_source(mut self, source: TargetSource) -> Self {
        self.source = source;
        self
    }

    /// Set the frame path
    #[must_use]
    pub fn with_frame_path(mut self, frame_path: Vec<String>) -> Self {
        self.frame_path = frame_path;
        self
    }

    /// Attach dynamic-signal tags
    #[must_use]
    pub fn with_dynamic_signals(mut self, signals: SignalSet) -> Self {
        self.dynamic_signals = Some(signals);
        self
    }

    /// Whether the target carries any dynamic signal
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.dynamic_signals.as_ref().is_some_and(|s| !s.is_empty())
    }

    /// Dedup identity (source and signals are ignored)
    #[must_use]
    pub fn key(&self) -> TargetKey {
        TargetKey {
            value: self.value.clone(),
            kind: self.kind,
            frame_path: self.frame_path.clone(),
        }
    }

    /// Whether two targets point at the same thing for dedup purposes
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        self.value == other.value && self.kind == other.kind && self.frame_path == other.frame_path
    }
}

/// One recorded action or verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StepAction {
    /// Load a URL
    Navigate {
        /// Destination
        url: String,
    },
    /// Single click
    Click {
        /// Element
        target: Target,
    },
    /// Double click
    Dblclick {
        /// Element
        target: Target,
    },
    /// Pointer hover
    Hover {
        /// Element
        target: Target,
    },
    /// Type into an input
    Fill {
        /// Element
        target: Target,
        /// Text entered
        value: String,
    },
    /// Keyboard press on an element
    Press {
        /// Element
        target: Target,
        /// Key name
        key: String,
    },
    /// Tick a checkbox
    Check {
        /// Element
        target: Target,
    },
    /// Untick a checkbox
    Uncheck {
        /// Element
        target: Target,
    },
    /// Choose an option
    Select {
        /// Element
        target: Target,
        /// Option value
        value: String,
    },
    /// Element is visible
    AssertVisible {
        /// Element
        target: Target,
    },
    /// Element contains text
    AssertText {
        /// Element
        target: Target,
        /// Expected text
        text: String,
    },
    /// Input has value
    AssertValue {
        /// Element
        target: Target,
        /// Expected value
        value: String,
    },
    /// Checkbox state
    AssertChecked {
        /// Element
        target: Target,
        /// Expected state
        checked: bool,
    },
    /// Enabled state
    AssertEnabled {
        /// Element
        target: Target,
        /// Expected state
        enabled: bool,
    },
    /// Page URL
    AssertUrl {
        /// Expected URL
        url: String,
    },
    /// Page title
    AssertTitle {
        /// Expected title
        title: String,
    },
}

impl StepAction {
    /// Wire name of the action
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Navigate { .. } => "navigate",
            Self::Click { .. } => "click",
            Self::Dblclick { .. } => "dblclick",
            Self::Hover { .. } => "hover",
            Self::Fill { .. } => "fill",
            Self::Press { .. } => "press",
            Self::Check { .. } => "check",
            Self::Uncheck { .. } => "uncheck",
            Self::Select { .. } => "select",
            Self::AssertVisible { .. } => "assertVisible",
            Self::AssertText { .. } => "assertText",
            Self::AssertValue { .. } => "assertValue",
            Self::AssertChecked { .. } => "assertChecked",
            Self::AssertEnabled { .. } => "assertEnabled",
            Self::AssertUrl { .. } => "assertUrl",
            Self::AssertTitle { .. } => "assertTitle",
        }
    }

    /// Element the action acts on, if any
    #[must_use]
    pub const fn target(&self) -> Option<&Target> {
        match self {
            Self::Navigate { .. } | Self::AssertUrl { .. } | Self::AssertTitle { .. } => None,
            Self::Click { target }
            | Self::Dblclick { target }
            | Self::Hover { target }
            | Self::Fill { target, .. }
            | Self::Press { target, .. }
            | Self::Check { target }
            | Self::Uncheck { target }
            | Self::Select { target, .. }
            | Self::AssertVisible { target }
            | Self::AssertText { target, .. }
            | Self::AssertValue { target, .. }
            | Self::AssertChecked { target, .. }
            | Self::AssertEnabled { target, .. } => Some(target),
        }
    }

    /// Mutable access to the element the action acts on
    pub fn target_mut(&mut self) -> Option<&mut Target> {
        match self {
            Self::Navigate { .. } | Self::AssertUrl { .. } | Self::AssertTitle { .. } => None,
            Self::Click { target }
            | Self::Dblclick { target }
            | Self::Hover { target }
            | Self::Fill { target, .. }
            | Self::Press { target, .. }
            | Self::Check { target }
            | Self::Uncheck { target }
            | Self::Select { target, .. }
            | Self::AssertVisible { target }
            | Self::AssertText { target, .. }
            | Self::AssertValue { target, .. }
            | Self::AssertChecked { target, .. }
            | Self::AssertEnabled { target, .. } => Some(target),
        }
    }

    /// Whether this is a verification step
    #[must_use]
    pub const fn is_assertion(&self) -> bool {
        matches!(
            self,
            Self::AssertVisible { .. }
                | Self::AssertText { .. }
                | Self::AssertValue { .. }
                | Self::AssertChecked { .. }
                | Self::AssertEnabled { .. }
                | Self::AssertUrl { .. }
                | Self::AssertTitle { .. }
        )
    }

    /// Whether this is an explicit navigation
    #[must_use]
    pub const fn is_navigation(&self) -> bool {
        matches!(self, Self::Navigate { .. })
    }

    /// Dedup identity: the target key, or the payload for page-level steps
    #[must_use]
    pub fn subject_key(&self) -> String {
        match self {
            Self::Navigate { url } | Self::AssertUrl { url } => format!("url:{url}"),
            Self::AssertTitle { title } => format!("title:{title}"),
            other => other
                .target()
                .map(|t| t.key().to_string())
                .unwrap_or_default(),
        }
    }

    /// Whether two actions are duplicates: same action and same subject,
    /// ignoring target provenance
    #[must_use]
    pub fn duplicates(&self, other: &Self) -> bool {
        if self.name() != other.name() {
            return false;
        }
        match (self.target(), other.target()) {
            (Some(a), Some(b)) => a.same_as(b),
            (None, None) => self.subject_key() == other.subject_key(),
            _ => false,
        }
    }
}

/// A single step of a recorded script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// What to do
    pub action: StepAction,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Per-step timeout override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Step {
    /// Create a step from an action
    #[must_use]
    pub const fn new(action: StepAction) -> Self {
        Self {
            action,
            description: None,
            timeout_ms: None,
        }
    }

    /// Navigate step
    #[must_use]
    pub fn navigate(url: impl Into<String>) -> Self {
        Self::new(StepAction::Navigate { url: url.into() })
    }

    /// Click step
    #[must_use]
    pub const fn click(target: Target) -> Self {
        Self::new(StepAction::Click { target })
    }

    /// Fill step
    #[must_use]
    pub fn fill(target: Target, value: impl Into<String>) -> Self {
        Self::new(StepAction::Fill {
            target,
            value: value.into(),
        })
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the timeout override
    #[must_use]
    pub const fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    /// Timeout override as a duration
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Element the step acts on, if any
    #[must_use]
    pub const fn target(&self) -> Option<&Target> {
        self.action.target()
    }
}

/// Reject malformed step sequences before any pass work starts
pub fn validate_steps(steps: &[Step]) -> RefineResult<()> {
    for (index, step) in steps.iter().enumerate() {
        if let Some(target) = step.target() {
            if target.value.trim().is_empty() {
                return Err(RefineError::invalid_input(format!(
                    "step {index} ({}) has an empty target value",
                    step.action.name()
                )));
            }
            if target.frame_path.iter().any(|f| f.trim().is_empty()) {
                return Err(RefineError::invalid_input(format!(
                    "step {index} ({}) has an empty frame selector",
                    step.action.name()
                )));
            }
        }
        if let StepAction::Navigate { url } = &step.action {
            if url.trim().is_empty() {
                return Err(RefineError::invalid_input(format!(
                    "step {index} (navigate) has an empty url"
                )));
            }
        }
    }
    Ok(())
}

/// Outcome of [`StepSequence::insert_after`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Step was inserted at this position
    Inserted(usize),
    /// An adjacent step already does the same thing; nothing inserted
    DuplicateAdjacent(usize),
}

/// Step list that accepts insertions keyed by original index.
///
/// Original steps are never reordered. Inserting after original index `k`
/// places the new step after `k` and after anything previously inserted
/// after `k`, so later originals shift by the number of prior insertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSequence {
    steps: Vec<Step>,
    inserted_after: Vec<usize>,
}

impl StepSequence {
    /// Wrap an original step list
    #[must_use]
    pub fn new(steps: Vec<Step>) -> Self {
        let inserted_after = vec![0; steps.len()];
        Self {
            steps,
            inserted_after,
        }
    }

    /// Number of original steps
    #[must_use]
    pub fn original_len(&self) -> usize {
        self.inserted_after.len()
    }

    /// Total number of steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether there are no steps
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Current position of original step `index`
    #[must_use]
    pub fn position_of_original(&self, index: usize) -> Option<usize> {
        if index >= self.original_len() {
            return None;
        }
        Some(index + self.inserted_after[..index].iter().sum::<usize>())
    }

    /// Position the next insertion after original step `index` would take
    #[must_use]
    pub fn insertion_position(&self, index: usize) -> Option<usize> {
        self.position_of_original(index)
            .map(|pos| pos + 1 + self.inserted_after[index])
    }

    /// Whether `step` duplicates a neighbour at `position`
    #[must_use]
    pub fn duplicates_adjacent(&self, position: usize, step: &Step) -> bool {
        let before = position
            .checked_sub(1)
            .and_then(|p| self.steps.get(p))
            .is_some_and(|s| s.action.duplicates(&step.action));
        let after = self
            .steps
            .get(position)
            .is_some_and(|s| s.action.duplicates(&step.action));
        before || after
    }

    /// Insert `step` after original step `index`
    pub fn insert_after(&mut self, index: usize, step: Step) -> RefineResult<InsertOutcome> {
        let position = self.insertion_position(index).ok_or_else(|| {
            RefineError::invalid_input(format!(
                "original step index {index} out of range ({} steps)",
                self.original_len()
            ))
        })?;
        if self.duplicates_adjacent(position, &step) {
            return Ok(InsertOutcome::DuplicateAdjacent(position));
        }
        self.steps.insert(position, step);
        self.inserted_after[index] += 1;
        Ok(InsertOutcome::Inserted(position))
    }

    /// Mutable access to original step `index`
    pub fn original_mut(&mut self, index: usize) -> Option<&mut Step> {
        let pos = self.position_of_original(index)?;
        self.steps.get_mut(pos)
    }

    /// Steps in order
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Consume into the step list
    #[must_use]
    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }
}
