//! Live page contract.
//!
//! The pipeline drives exactly one page. Every browser interaction goes
//! through [`PageHandle`], passed as `Option<&mut dyn PageHandle>`, so two
//! probes can never run against the page at the same time.
//!
//! # Implementations
//!
//! - Browser bindings live outside this crate
//! - [`MockPage`] - scripted in-memory page for tests

mod mock;
mod resolver;

pub use mock::{MockElement, MockLocator, MockPage, PageState};
pub use resolver::{InternalResolver, PublicResolver, RepairTier, SelectorResolver};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::policy::AssertionSource;
use crate::result::{RefineError, RefineResult};
use crate::step::{Step, Target};

/// Accessible facts about one live element
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementFacts {
    /// ARIA role
    pub role: Option<String>,
    /// Accessible name
    pub name: Option<String>,
    /// Associated label text
    pub label: Option<String>,
    /// Placeholder attribute
    pub placeholder: Option<String>,
    /// Visible text content
    pub text: Option<String>,
    /// `data-testid`
    pub test_id: Option<String>,
    /// `alt` attribute
    pub alt: Option<String>,
    /// `title` attribute
    pub title: Option<String>,
}

/// Optional capabilities a page may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCapabilities {
    /// Public selector-resolution API (resolves an element to a selector)
    pub public_selector_api: bool,
    /// Lower-level resolved-selector API
    pub internal_selector_api: bool,
    /// Native accessibility snapshot
    pub native_snapshot: bool,
    /// Snapshot through the external CLI capture path
    pub cli_snapshot: bool,
}

impl Default for PageCapabilities {
    fn default() -> Self {
        Self {
            public_selector_api: false,
            internal_selector_api: false,
            native_snapshot: true,
            cli_snapshot: false,
        }
    }
}

impl PageCapabilities {
    /// Every capability available
    #[must_use]
    pub const fn full() -> Self {
        Self {
            public_selector_api: true,
            internal_selector_api: true,
            native_snapshot: true,
            cli_snapshot: true,
        }
    }

    /// Whether a snapshot can be captured from `source`
    #[must_use]
    pub const fn supports_snapshot(&self, source: AssertionSource) -> bool {
        match source {
            AssertionSource::Deterministic => false,
            AssertionSource::SnapshotNative => self.native_snapshot,
            AssertionSource::SnapshotCli => self.cli_snapshot,
        }
    }
}

/// Abstract page the pipeline probes and replays steps against.
///
/// Probes take `&self`; anything that changes page state takes `&mut self`.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Current URL
    async fn current_url(&self) -> RefineResult<String>;

    /// Document title
    async fn title(&self) -> RefineResult<String>;

    /// Number of elements the target resolves to
    async fn count(&self, target: &Target) -> RefineResult<usize>;

    /// Whether the `nth` match is visible
    async fn is_visible(&self, target: &Target, nth: usize) -> RefineResult<bool>;

    /// Text content of the first match
    async fn text_content(&self, target: &Target) -> RefineResult<Option<String>>;

    /// Attribute of the first match
    async fn attribute(&self, target: &Target, name: &str) -> RefineResult<Option<String>>;

    /// Accessible facts of the first match, `None` when nothing matches
    async fn describe_element(&self, target: &Target) -> RefineResult<Option<ElementFacts>>;

    /// Accessibility snapshot text
    async fn capture_snapshot(&self, source: AssertionSource) -> RefineResult<String>;

    /// Wait until the network has been idle
    async fn wait_for_network_idle(&mut self, timeout: Duration) -> RefineResult<()>;

    /// Execute one step
    async fn execute_step(&mut self, step: &Step, timeout: Duration) -> RefineResult<()>;

    /// Capabilities this page exposes
    fn capabilities(&self) -> PageCapabilities;

    /// Selector the public resolution API produces for the target's element
    async fn public_selector(&self, target: &Target) -> RefineResult<Option<String>> {
        let _ = target;
        Err(RefineError::unsupported("public selector resolution"))
    }

    /// Selector the internal resolution API produces for the target's element
    async fn internal_selector(&self, target: &Target) -> RefineResult<Option<String>> {
        let _ = target;
        Err(RefineError::unsupported("internal selector resolution"))
    }
}

/// Run a page operation under a timeout, folding elapsed time into
/// [`RefineError::Timeout`]
pub async fn bounded<T, F>(timeout: Duration, operation: F) -> RefineResult<T>
where
    F: std::future::Future<Output = RefineResult<T>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(RefineError::Timeout {
            ms: timeout.as_millis() as u64,
        }),
    }
}

/// Fail with [`RefineError::PageUnavailable`] unless the page answers
/// within `timeout`
pub(crate) async fn ensure_usable(page: &dyn PageHandle, timeout: Duration) -> RefineResult<()> {
    match bounded(timeout, page.current_url()).await {
        Ok(_) => Ok(()),
        Err(e @ RefineError::PageUnavailable { .. }) => Err(e),
        Err(e) => Err(RefineError::PageUnavailable {
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capabilities() {
        let caps = PageCapabilities::default();
        assert!(!caps.public_selector_api);
        assert!(caps.supports_snapshot(AssertionSource::SnapshotNative));
        assert!(!caps.supports_snapshot(AssertionSource::SnapshotCli));
        assert!(!caps.supports_snapshot(AssertionSource::Deterministic));
        assert!(PageCapabilities::full().supports_snapshot(AssertionSource::SnapshotCli));
    }

    #[tokio::test]
    async fn test_bounded_passes_through_and_times_out() {
        let ok = bounded(Duration::from_millis(50), async { Ok::<_, RefineError>(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let slow = bounded(Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, RefineError>(())
        })
        .await;
        assert!(matches!(slow, Err(RefineError::Timeout { ms: 5 })));
    }

    #[tokio::test]
    async fn test_ensure_usable_bounds_hanging_page() {
        let timeout = Duration::from_millis(20);
        assert!(ensure_usable(&MockPage::new(), timeout).await.is_ok());

        let err = ensure_usable(&MockPage::new().hanging(), timeout)
            .await
            .unwrap_err();
        assert!(matches!(err, RefineError::PageUnavailable { .. }));
        assert!(err.to_string().contains("20"));
    }
}
