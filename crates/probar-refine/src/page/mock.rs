//! Scripted in-memory page for tests.
//!
//! Elements carry the accessible facts a real page would compute. Targets
//! resolve the way the browser would resolve them: css and xpath values
//! match the selectors an element is registered under, engine selectors and
//! locator expressions are replayed through [`MockLocator`]. The mock has
//! no DOM tree, so chained lookups narrow the current match set.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;

use super::{ElementFacts, PageCapabilities, PageHandle};
use crate::locator_expr::{
    evaluate, evaluate_chain, FilterOptions, LocatorRoot, RoleOptions, TextLookup, TextMatch,
    TextQuery,
};
use crate::policy::{AssertionSource, DEFAULT_PROBE_TIMEOUT_MS};
use crate::result::{RefineError, RefineResult};
use crate::selector::{test_id_from_css, to_locator_chain};
use crate::step::{Step, StepAction, Target, TargetKind};

/// One element of a [`MockPage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockElement {
    /// Css/xpath selectors this element answers to
    pub selectors: Vec<String>,
    /// ARIA role
    pub role: Option<String>,
    /// Accessible name
    pub name: Option<String>,
    /// Label text
    pub label: Option<String>,
    /// Placeholder
    pub placeholder: Option<String>,
    /// Text content
    pub text: Option<String>,
    /// Alt text
    pub alt: Option<String>,
    /// Title attribute
    pub title: Option<String>,
    /// `data-testid`
    pub test_id: Option<String>,
    /// Input value
    pub value: Option<String>,
    /// Checked state
    pub checked: Option<bool>,
    /// Visible
    pub visible: bool,
    /// Enabled
    pub enabled: bool,
    /// Frame selectors leading to the element
    pub frame_path: Vec<String>,
}

impl MockElement {
    /// Visible, enabled element answering to `selector`
    #[must_use]
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selectors: vec![selector.into()],
            role: None,
            name: None,
            label: None,
            placeholder: None,
            text: None,
            alt: None,
            title: None,
            test_id: None,
            value: None,
            checked: None,
            visible: true,
            enabled: true,
            frame_path: Vec::new(),
        }
    }

    /// Answer to another selector
    #[must_use]
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selectors.push(selector.into());
        self
    }

    /// Set role and accessible name
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>, name: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self.name = Some(name.into());
        self
    }

    /// Set text content
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set label
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set placeholder
    #[must_use]
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    /// Set test id
    #[must_use]
    pub fn with_test_id(mut self, id: impl Into<String>) -> Self {
        self.test_id = Some(id.into());
        self
    }

    /// Set title attribute
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set input value
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Set checked state
    #[must_use]
    pub const fn with_checked(mut self, checked: bool) -> Self {
        self.checked = Some(checked);
        self
    }

    /// Mark hidden
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Mark disabled
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Place inside a frame
    #[must_use]
    pub fn in_frame(mut self, frame_path: Vec<String>) -> Self {
        self.frame_path = frame_path;
        self
    }

    /// Accessible facts
    #[must_use]
    pub fn facts(&self) -> ElementFacts {
        ElementFacts {
            role: self.role.clone(),
            name: self.name.clone(),
            label: self.label.clone(),
            placeholder: self.placeholder.clone(),
            text: self.text.clone(),
            test_id: self.test_id.clone(),
            alt: self.alt.clone(),
            title: self.title.clone(),
        }
    }

    fn text_or_name(&self) -> &str {
        self.text
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or_default()
    }

    fn answers_to(&self, selector: &str) -> bool {
        self.selectors.iter().any(|s| s == selector)
            || test_id_from_css(selector).is_some_and(|id| self.test_id.as_deref() == Some(&id))
    }
}

/// Observable page state: URL, title, snapshot text and elements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageState {
    /// URL
    pub url: String,
    /// Title
    pub title: String,
    /// Accessibility snapshot text
    pub snapshot: String,
    /// Elements
    pub elements: Vec<MockElement>,
}

impl PageState {
    /// State at `url`
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the title
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the snapshot text
    #[must_use]
    pub fn with_snapshot(mut self, snapshot: impl Into<String>) -> Self {
        self.snapshot = snapshot.into();
        self
    }

    /// Add an element
    #[must_use]
    pub fn with_element(mut self, element: MockElement) -> Self {
        self.elements.push(element);
        self
    }
}

/// Mock page for unit and integration tests.
///
/// Every successfully executed non-assertion step moves the page to the
/// next queued [`PageState`], if any.
#[derive(Debug, Default)]
pub struct MockPage {
    /// Current state
    pub state: PageState,
    /// States entered by successive interaction steps
    pub queued: VecDeque<PageState>,
    /// Capability flags
    pub capabilities: PageCapabilities,
    /// Public resolution results keyed by target value
    pub public_selectors: HashMap<String, String>,
    /// Internal resolution results keyed by target value
    pub internal_selectors: HashMap<String, String>,
    /// Target values whose probes fail
    pub failing_probes: HashSet<String>,
    /// Target values whose probes time out
    pub slow_probes: HashSet<String>,
    /// Target values (or navigate URLs) whose steps fail
    pub failing_steps: HashSet<String>,
    /// Network never goes idle
    pub network_busy: bool,
    /// Page reports itself unusable
    pub unavailable: bool,
    /// URL reads never answer
    pub hanging: bool,
    /// Executed steps, `action:subject`
    pub executed: Vec<String>,
}

impl MockPage {
    /// Empty page
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current URL
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.state.url = url.into();
        self
    }

    /// Set the current title
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.state.title = title.into();
        self
    }

    /// Set the current snapshot text
    #[must_use]
    pub fn with_snapshot(mut self, snapshot: impl Into<String>) -> Self {
        self.state.snapshot = snapshot.into();
        self
    }

    /// Add an element to the current state
    #[must_use]
    pub fn with_element(mut self, element: MockElement) -> Self {
        self.state.elements.push(element);
        self
    }

    /// Replace the current state
    #[must_use]
    pub fn with_state(mut self, state: PageState) -> Self {
        self.state = state;
        self
    }

    /// Queue the state entered after the next interaction
    #[must_use]
    pub fn then_state(mut self, state: PageState) -> Self {
        self.queued.push_back(state);
        self
    }

    /// Set capabilities
    #[must_use]
    pub const fn with_capabilities(mut self, capabilities: PageCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Register a public resolution result
    #[must_use]
    pub fn with_public_selector(
        mut self,
        value: impl Into<String>,
        selector: impl Into<String>,
    ) -> Self {
        self.public_selectors.insert(value.into(), selector.into());
        self
    }

    /// Register an internal resolution result
    #[must_use]
    pub fn with_internal_selector(
        mut self,
        value: impl Into<String>,
        selector: impl Into<String>,
    ) -> Self {
        self.internal_selectors.insert(value.into(), selector.into());
        self
    }

    /// Make probes of `value` fail
    #[must_use]
    pub fn failing_probe(mut self, value: impl Into<String>) -> Self {
        self.failing_probes.insert(value.into());
        self
    }

    /// Make probes of `value` time out
    #[must_use]
    pub fn slow_probe(mut self, value: impl Into<String>) -> Self {
        self.slow_probes.insert(value.into());
        self
    }

    /// Make steps on `value` fail
    #[must_use]
    pub fn failing_step(mut self, value: impl Into<String>) -> Self {
        self.failing_steps.insert(value.into());
        self
    }

    /// Never report network idle
    #[must_use]
    pub const fn with_busy_network(mut self) -> Self {
        self.network_busy = true;
        self
    }

    /// Report the page as unusable
    #[must_use]
    pub const fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Never answer URL reads
    #[must_use]
    pub const fn hanging(mut self) -> Self {
        self.hanging = true;
        self
    }

    /// Whether a step with this `action:subject` label was executed
    #[must_use]
    pub fn was_executed(&self, label: &str) -> bool {
        self.executed.iter().any(|e| e == label)
    }

    /// Indices of the elements `target` resolves to
    pub fn resolve(&self, target: &Target) -> RefineResult<Vec<usize>> {
        let root = MockLocator::new(&self.state.elements, target.frame_path.clone());
        let located = match target.kind {
            TargetKind::LocatorExpression => evaluate(&target.value, root)?,
            TargetKind::EngineSelector | TargetKind::EngineInternal => {
                evaluate_chain(&to_locator_chain(&target.value, target.kind)?, root)?
            }
            TargetKind::Css | TargetKind::Xpath | TargetKind::Unknown => {
                root.locator(&target.value, &FilterOptions::default())?
            }
        };
        Ok(located.matches())
    }

    fn probe(&self, target: &Target) -> RefineResult<Vec<usize>> {
        if self.slow_probes.contains(&target.value) {
            return Err(RefineError::Timeout {
                ms: DEFAULT_PROBE_TIMEOUT_MS,
            });
        }
        if self.failing_probes.contains(&target.value) {
            return Err(RefineError::probe(format!(
                "probe of `{}` failed",
                target.value
            )));
        }
        self.resolve(target)
    }

    fn first_element(&self, target: &Target) -> RefineResult<Option<&MockElement>> {
        let matches = self.probe(target)?;
        Ok(matches.first().map(|&i| &self.state.elements[i]))
    }

    fn single(&self, target: &Target) -> RefineResult<usize> {
        match self.resolve(target)?.as_slice() {
            [index] => Ok(*index),
            [] => Err(RefineError::step_failed(format!(
                "`{}` matched no element",
                target.value
            ))),
            many => Err(RefineError::step_failed(format!(
                "strict mode violation: `{}` matched {} elements",
                target.value,
                many.len()
            ))),
        }
    }

    fn verify(&self, ok: bool, what: impl FnOnce() -> String) -> RefineResult<()> {
        if ok {
            Ok(())
        } else {
            Err(RefineError::step_failed(what()))
        }
    }

    fn run(&mut self, action: &StepAction) -> RefineResult<()> {
        match action {
            StepAction::Navigate { url } => {
                if self.failing_steps.contains(url) {
                    return Err(RefineError::step_failed(format!("navigation to {url} failed")));
                }
                self.state.url.clone_from(url);
            }
            StepAction::Click { target }
            | StepAction::Dblclick { target }
            | StepAction::Hover { target }
            | StepAction::Press { target, .. } => {
                let index = self.single(target)?;
                let element = &self.state.elements[index];
                self.verify(element.visible && element.enabled, || {
                    format!("`{}` is not actionable", target.value)
                })?;
            }
            StepAction::Fill { target, value } | StepAction::Select { target, value } => {
                let index = self.single(target)?;
                self.state.elements[index].value = Some(value.clone());
            }
            StepAction::Check { target } => {
                let index = self.single(target)?;
                self.state.elements[index].checked = Some(true);
            }
            StepAction::Uncheck { target } => {
                let index = self.single(target)?;
                self.state.elements[index].checked = Some(false);
            }
            StepAction::AssertVisible { target } => {
                let index = self.single(target)?;
                self.verify(self.state.elements[index].visible, || {
                    format!("`{}` is not visible", target.value)
                })?;
            }
            StepAction::AssertText { target, text } => {
                let index = self.single(target)?;
                let actual = self.state.elements[index].text_or_name();
                self.verify(TextMatch::Text(text.clone()).matches(actual, false), || {
                    format!("`{}` has text {actual:?}, expected {text:?}", target.value)
                })?;
            }
            StepAction::AssertValue { target, value } => {
                let index = self.single(target)?;
                let actual = self.state.elements[index].value.clone();
                self.verify(actual.as_deref() == Some(value.as_str()), || {
                    format!("`{}` has value {actual:?}, expected {value:?}", target.value)
                })?;
            }
            StepAction::AssertChecked { target, checked } => {
                let index = self.single(target)?;
                let actual = self.state.elements[index].checked.unwrap_or(false);
                self.verify(actual == *checked, || {
                    format!("`{}` checked is {actual}", target.value)
                })?;
            }
            StepAction::AssertEnabled { target, enabled } => {
                let index = self.single(target)?;
                let actual = self.state.elements[index].enabled;
                self.verify(actual == *enabled, || {
                    format!("`{}` enabled is {actual}", target.value)
                })?;
            }
            StepAction::AssertUrl { url } => {
                self.verify(self.state.url == *url, || {
                    format!("url is {}, expected {url}", self.state.url)
                })?;
            }
            StepAction::AssertTitle { title } => {
                self.verify(self.state.title == *title, || {
                    format!("title is {:?}, expected {title:?}", self.state.title)
                })?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PageHandle for MockPage {
    async fn current_url(&self) -> RefineResult<String> {
        if self.hanging {
            std::future::pending::<()>().await;
        }
        if self.unavailable {
            return Err(RefineError::PageUnavailable {
                message: "mock page closed".to_string(),
            });
        }
        Ok(self.state.url.clone())
    }

    async fn title(&self) -> RefineResult<String> {
        Ok(self.state.title.clone())
    }

    async fn count(&self, target: &Target) -> RefineResult<usize> {
        Ok(self.probe(target)?.len())
    }

    async fn is_visible(&self, target: &Target, nth: usize) -> RefineResult<bool> {
        let matches = self.probe(target)?;
        Ok(matches
            .get(nth)
            .is_some_and(|&i| self.state.elements[i].visible))
    }

    async fn text_content(&self, target: &Target) -> RefineResult<Option<String>> {
        Ok(self.first_element(target)?.and_then(|e| e.text.clone()))
    }

    async fn attribute(&self, target: &Target, name: &str) -> RefineResult<Option<String>> {
        let Some(element) = self.first_element(target)? else {
            return Ok(None);
        };
        Ok(match name {
            "data-testid" => element.test_id.clone(),
            "placeholder" => element.placeholder.clone(),
            "alt" => element.alt.clone(),
            "title" => element.title.clone(),
            "value" => element.value.clone(),
            "aria-label" => element.name.clone(),
            "role" => element.role.clone(),
            _ => None,
        })
    }

    async fn describe_element(&self, target: &Target) -> RefineResult<Option<ElementFacts>> {
        Ok(self.first_element(target)?.map(MockElement::facts))
    }

    async fn capture_snapshot(&self, source: AssertionSource) -> RefineResult<String> {
        if !self.capabilities.supports_snapshot(source) {
            return Err(RefineError::unsupported(format!(
                "{} snapshot capture",
                source.as_str()
            )));
        }
        Ok(self.state.snapshot.clone())
    }

    async fn wait_for_network_idle(&mut self, timeout: Duration) -> RefineResult<()> {
        if self.network_busy {
            return Err(RefineError::Timeout {
                ms: timeout.as_millis() as u64,
            });
        }
        Ok(())
    }

    async fn execute_step(&mut self, step: &Step, timeout: Duration) -> RefineResult<()> {
        let _ = timeout; // mock steps complete immediately
        self.executed.push(format!(
            "{}:{}",
            step.action.name(),
            step.action.subject_key()
        ));
        if let Some(target) = step.target() {
            if self.failing_steps.contains(&target.value) {
                return Err(RefineError::step_failed(format!(
                    "{} on `{}` failed",
                    step.action.name(),
                    target.value
                )));
            }
        }
        self.run(&step.action)?;
        if !step.action.is_assertion() {
            if let Some(next) = self.queued.pop_front() {
                self.state = next;
            }
        }
        Ok(())
    }

    fn capabilities(&self) -> PageCapabilities {
        self.capabilities
    }

    async fn public_selector(&self, target: &Target) -> RefineResult<Option<String>> {
        if !self.capabilities.public_selector_api {
            return Err(RefineError::unsupported("public selector resolution"));
        }
        Ok(self.public_selectors.get(&target.value).cloned())
    }

    async fn internal_selector(&self, target: &Target) -> RefineResult<Option<String>> {
        if !self.capabilities.internal_selector_api {
            return Err(RefineError::unsupported("internal selector resolution"));
        }
        Ok(self.internal_selectors.get(&target.value).cloned())
    }
}

/// [`LocatorRoot`] over the elements of a [`MockPage`]
#[derive(Debug, Clone)]
pub struct MockLocator<'a> {
    elements: &'a [MockElement],
    frame: Vec<String>,
    matched: Option<Vec<usize>>,
}

impl<'a> MockLocator<'a> {
    /// Root locator inside `frame`
    #[must_use]
    pub const fn new(elements: &'a [MockElement], frame: Vec<String>) -> Self {
        Self {
            elements,
            frame,
            matched: None,
        }
    }

    /// Matched element indices in document order
    #[must_use]
    pub fn matches(&self) -> Vec<usize> {
        match &self.matched {
            Some(m) => m.clone(),
            None => (0..self.elements.len())
                .filter(|&i| self.elements[i].frame_path == self.frame)
                .collect(),
        }
    }

    fn narrow(mut self, keep: impl Fn(&MockElement) -> bool) -> Self {
        let elements = self.elements;
        let kept = self
            .matches()
            .into_iter()
            .filter(|&i| keep(&elements[i]))
            .collect();
        self.matched = Some(kept);
        self
    }

    fn pick(mut self, index: Option<usize>) -> Self {
        let current = self.matches();
        self.matched = Some(index.and_then(|i| current.get(i).copied()).into_iter().collect());
        self
    }
}

fn lookup_field(element: &MockElement, lookup: TextLookup) -> Option<&str> {
    match lookup {
        TextLookup::Text => element.text.as_deref(),
        TextLookup::Label => element.label.as_deref(),
        TextLookup::Placeholder => element.placeholder.as_deref(),
        TextLookup::AltText => element.alt.as_deref(),
        TextLookup::Title => element.title.as_deref(),
    }
}

impl LocatorRoot for MockLocator<'_> {
    fn fresh(&self) -> Self {
        Self::new(self.elements, self.frame.clone())
    }

    fn get_by_role(self, role: &str, options: &RoleOptions) -> RefineResult<Self> {
        let exact = options.exact.unwrap_or(false);
        Ok(self.narrow(|e| {
            e.role.as_deref().is_some_and(|r| r.eq_ignore_ascii_case(role))
                && (e.visible || options.include_hidden == Some(true))
                && options
                    .name
                    .as_ref()
                    .map_or(true, |n| n.matches(e.name.as_deref().unwrap_or_default(), exact))
                && options
                    .checked
                    .map_or(true, |c| e.checked.unwrap_or(false) == c)
                && options.disabled.map_or(true, |d| e.enabled != d)
        }))
    }

    fn get_by(self, lookup: TextLookup, query: &TextQuery) -> RefineResult<Self> {
        let exact = query.exact.unwrap_or(false);
        Ok(self.narrow(|e| {
            lookup_field(e, lookup).is_some_and(|field| query.text.matches(field, exact))
        }))
    }

    fn get_by_test_id(self, id: &TextMatch) -> RefineResult<Self> {
        Ok(self.narrow(|e| e.test_id.as_deref().is_some_and(|t| id.matches(t, true))))
    }

    fn locator(self, selector: &str, options: &FilterOptions) -> RefineResult<Self> {
        self.narrow(|e| e.answers_to(selector)).filter(options)
    }

    fn frame_locator(self, selector: &str) -> RefineResult<Self> {
        let mut frame = self.frame;
        frame.push(selector.to_string());
        Ok(Self::new(self.elements, frame))
    }

    fn filter(self, options: &FilterOptions) -> RefineResult<Self> {
        if options.has.is_some() || options.has_not.is_some() {
            return Err(RefineError::unsupported("filter({ has }) on a mock page"));
        }
        Ok(self.narrow(|e| {
            options
                .has_text
                .as_ref()
                .map_or(true, |t| t.matches(e.text_or_name(), false))
                && options
                    .has_not_text
                    .as_ref()
                    .map_or(true, |t| !t.matches(e.text_or_name(), false))
                && options.visible.map_or(true, |v| e.visible == v)
        }))
    }

    fn first(self) -> RefineResult<Self> {
        Ok(self.pick(Some(0)))
    }

    fn last(self) -> RefineResult<Self> {
        let len = self.matches().len();
        Ok(self.pick(len.checked_sub(1)))
    }

    fn nth(self, index: i64) -> RefineResult<Self> {
        let len = self.matches().len() as i64;
        let resolved = if index < 0 { len + index } else { index };
        let index = usize::try_from(resolved).ok();
        Ok(self.pick(index))
    }

    fn and(mut self, other: Self) -> RefineResult<Self> {
        let theirs = other.matches();
        let kept = self
            .matches()
            .into_iter()
            .filter(|i| theirs.contains(i))
            .collect();
        self.matched = Some(kept);
        Ok(self)
    }

    fn or(mut self, other: Self) -> RefineResult<Self> {
        let mut union = self.matches();
        union.extend(other.matches());
        union.sort_unstable();
        union.dedup();
        self.matched = Some(union);
        Ok(self)
    }

    fn content_frame(self) -> RefineResult<Self> {
        let matches = self.matches();
        let selector = matches
            .first()
            .and_then(|&i| self.elements[i].selectors.first())
            .ok_or_else(|| RefineError::probe("contentFrame() on a locator with no frame"))?
            .clone();
        let mut frame = self.frame;
        frame.push(selector);
        Ok(Self::new(self.elements, frame))
    }

    fn owner(self) -> RefineResult<Self> {
        let mut frame = self.frame;
        let selector = frame
            .pop()
            .ok_or_else(|| RefineError::probe("owner() outside of a frame"))?;
        let outer = Self::new(self.elements, frame);
        Ok(outer.narrow(|e| e.answers_to(&selector)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn form_page() -> MockPage {
        MockPage::new()
            .with_url("https://shop.test/checkout")
            .with_title("Checkout")
            .with_element(
                MockElement::new("#submit")
                    .with_selector("button.primary")
                    .with_role("button", "Save")
                    .with_text("Save"),
            )
            .with_element(
                MockElement::new("#email")
                    .with_role("textbox", "Email")
                    .with_label("Email")
                    .with_placeholder("you@example.com"),
            )
            .with_element(MockElement::new("li.item").with_text("Apples"))
            .with_element(MockElement::new("li.item").with_text("Pears"))
            .with_element(
                MockElement::new("#card")
                    .with_role("textbox", "Card number")
                    .in_frame(vec!["iframe#pay".to_string()]),
            )
    }

    mod resolve_tests {
        use super::*;

        #[test]
        fn test_css_and_expression_resolution() {
            let page = form_page();
            assert_eq!(page.resolve(&Target::css("#submit")).unwrap(), vec![0]);
            assert_eq!(page.resolve(&Target::css("li.item")).unwrap().len(), 2);
            let by_role = Target::locator("getByRole('button', { name: 'Save' })");
            assert_eq!(page.resolve(&by_role).unwrap(), vec![0]);
            let by_label = Target::locator("page.getByLabel('Email')");
            assert_eq!(page.resolve(&by_label).unwrap(), vec![1]);
        }

        #[test]
        fn test_engine_selector_and_chain_operators() {
            let page = form_page();
            let target = Target::infer("role=button[name=\"Save\"]");
            assert_eq!(page.resolve(&target).unwrap(), vec![0]);
            let last = Target::locator("locator('li.item').last()");
            assert_eq!(page.resolve(&last).unwrap(), vec![3]);
            let filtered = Target::locator("locator('li.item').filter({ hasText: 'pear' })");
            assert_eq!(page.resolve(&filtered).unwrap(), vec![3]);
        }

        #[test]
        fn test_frames_scope_resolution() {
            let page = form_page();
            assert!(page
                .resolve(&Target::locator("getByRole('textbox', { name: 'Card number' })"))
                .unwrap()
                .is_empty());
            let framed = Target::locator("frameLocator('iframe#pay').getByRole('textbox')");
            assert_eq!(page.resolve(&framed).unwrap(), vec![4]);
            let by_path = Target::css("#card").with_frame_path(vec!["iframe#pay".to_string()]);
            assert_eq!(page.resolve(&by_path).unwrap(), vec![4]);
        }

        #[test]
        fn test_rejected_expression_is_an_error() {
            let page = form_page();
            assert!(page
                .resolve(&Target::locator("page.evaluate('1')"))
                .is_err());
        }
    }

    mod handle_tests {
        use super::*;

        #[tokio::test]
        async fn test_probe_injection() {
            let page = form_page().failing_probe("#email").slow_probe("#submit");
            assert!(matches!(
                page.count(&Target::css("#email")).await,
                Err(RefineError::Probe { .. })
            ));
            assert!(page
                .count(&Target::css("#submit"))
                .await
                .unwrap_err()
                .is_timeout());
            assert_eq!(page.count(&Target::css("li.item")).await.unwrap(), 2);
        }

        #[tokio::test]
        async fn test_fill_then_value_assertion() {
            let mut page = form_page();
            let timeout = Duration::from_secs(1);
            page.execute_step(&Step::fill(Target::css("#email"), "a@b.c"), timeout)
                .await
                .unwrap();
            let ok = Step::new(StepAction::AssertValue {
                target: Target::css("#email"),
                value: "a@b.c".to_string(),
            });
            page.execute_step(&ok, timeout).await.unwrap();
            let wrong = Step::new(StepAction::AssertValue {
                target: Target::css("#email"),
                value: "other".to_string(),
            });
            assert!(page.execute_step(&wrong, timeout).await.is_err());
            assert!(page.was_executed("fill:#email (css)"));
        }

        #[tokio::test]
        async fn test_strict_mode_and_queued_states() {
            let mut page = form_page().then_state(PageState::new("https://shop.test/done"));
            let timeout = Duration::from_secs(1);
            assert!(page
                .execute_step(&Step::click(Target::css("li.item")), timeout)
                .await
                .is_err());
            page.execute_step(&Step::click(Target::css("#submit")), timeout)
                .await
                .unwrap();
            assert_eq!(page.current_url().await.unwrap(), "https://shop.test/done");
            assert!(page.queued.is_empty());
        }

        #[tokio::test]
        async fn test_network_and_snapshot_flags() {
            let mut page = form_page().with_busy_network().with_snapshot("- main");
            assert!(page
                .wait_for_network_idle(Duration::from_millis(10))
                .await
                .unwrap_err()
                .is_timeout());
            assert_eq!(
                page.capture_snapshot(AssertionSource::SnapshotNative)
                    .await
                    .unwrap(),
                "- main"
            );
            assert!(page
                .capture_snapshot(AssertionSource::SnapshotCli)
                .await
                .is_err());
        }

        #[tokio::test]
        async fn test_describe_element() {
            let page = form_page();
            let facts = page
                .describe_element(&Target::css("#email"))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(facts.role.as_deref(), Some("textbox"));
            assert_eq!(facts.placeholder.as_deref(), Some("you@example.com"));
            assert!(page
                .describe_element(&Target::css("#missing"))
                .await
                .unwrap()
                .is_none());
        }
    }
}
