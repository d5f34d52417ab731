//! Selector resolution tiers.
//!
//! Pages may expose two ways of turning a live element back into a
//! selector: a public API, and a lower-level resolved-selector API that is
//! only used when the public one comes back empty. Each tier is a
//! [`SelectorResolver`]; availability comes from [`PageCapabilities`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{PageCapabilities, PageHandle};
use crate::result::RefineResult;
use crate::step::Target;

/// Which resolution tier produced a selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepairTier {
    /// Public selector-resolution API
    Public,
    /// Internal resolved-selector API
    Internal,
}

impl RepairTier {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for RepairTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves a target's live element to a fresh selector string
#[async_trait]
pub trait SelectorResolver: Send + Sync {
    /// Tier this resolver implements
    fn tier(&self) -> RepairTier;

    /// Whether the page exposes this tier
    fn is_available(&self, capabilities: &PageCapabilities) -> bool;

    /// Resolve; `Ok(None)` means the API answered but produced nothing
    async fn resolve(&self, page: &dyn PageHandle, target: &Target)
        -> RefineResult<Option<String>>;
}

/// Resolver backed by [`PageHandle::public_selector`]
#[derive(Debug, Clone, Copy, Default)]
pub struct PublicResolver;

#[async_trait]
impl SelectorResolver for PublicResolver {
    fn tier(&self) -> RepairTier {
        RepairTier::Public
    }

    fn is_available(&self, capabilities: &PageCapabilities) -> bool {
        capabilities.public_selector_api
    }

    async fn resolve(
        &self,
        page: &dyn PageHandle,
        target: &Target,
    ) -> RefineResult<Option<String>> {
        page.public_selector(target).await
    }
}

/// Resolver backed by [`PageHandle::internal_selector`]
#[derive(Debug, Clone, Copy, Default)]
pub struct InternalResolver;

#[async_trait]
impl SelectorResolver for InternalResolver {
    fn tier(&self) -> RepairTier {
        RepairTier::Internal
    }

    fn is_available(&self, capabilities: &PageCapabilities) -> bool {
        capabilities.internal_selector_api
    }

    async fn resolve(
        &self,
        page: &dyn PageHandle,
        target: &Target,
    ) -> RefineResult<Option<String>> {
        page.internal_selector(target).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::page::{MockElement, MockPage};

    #[tokio::test]
    async fn test_tiers_follow_capabilities() {
        let caps = PageCapabilities {
            public_selector_api: true,
            ..PageCapabilities::default()
        };
        assert!(PublicResolver.is_available(&caps));
        assert!(!InternalResolver.is_available(&caps));
    }

    #[tokio::test]
    async fn test_resolvers_delegate_to_page() {
        let page = MockPage::new()
            .with_element(MockElement::new("#row-17").with_role("button", "Save"))
            .with_capabilities(PageCapabilities::full())
            .with_public_selector("#row-17", "getByRole('button', { name: 'Save' })")
            .with_internal_selector("#row-17", "internal:role=button[name=\"Save\"i]");
        let target = Target::css("#row-17");

        let public = PublicResolver.resolve(&page, &target).await.unwrap();
        assert_eq!(
            public.as_deref(),
            Some("getByRole('button', { name: 'Save' })")
        );
        let internal = InternalResolver.resolve(&page, &target).await.unwrap();
        assert!(internal.unwrap().starts_with("internal:role"));
    }

    #[tokio::test]
    async fn test_unsupported_tier_errors() {
        let page = MockPage::new();
        let err = PublicResolver
            .resolve(&page, &Target::css("#a"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::result::RefineError::Unsupported { .. }));
    }
}
