//! Runtime selector repair.
//!
//! Asks the page to resolve the target's element back into a selector and
//! converts the answer into a locator expression. The public tier is tried
//! first; the internal tier only runs when the public one produced nothing.
//! Every tier that is skipped or fails leaves a diagnostic saying why.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::convert::to_locator_chain;
use crate::diagnostics::{codes, Diagnostics};
use crate::page::{
    bounded, InternalResolver, PageHandle, PublicResolver, RepairTier, SelectorResolver,
};
use crate::policy::PassOptions;
use crate::result::RefineResult;
use crate::step::{Target, TargetKind};

/// A selector produced by one resolution tier, already converted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairedSelector {
    /// Tier that produced it
    pub tier: RepairTier,
    /// Raw resolver output
    pub resolved: String,
    /// Canonical locator expression
    pub expression: String,
}

const fn disabled_code(tier: RepairTier) -> &'static str {
    match tier {
        RepairTier::Public => codes::REPAIR_PUBLIC_DISABLED,
        RepairTier::Internal => codes::REPAIR_INTERNAL_DISABLED,
    }
}

const fn unavailable_code(tier: RepairTier) -> &'static str {
    match tier {
        RepairTier::Public => codes::REPAIR_PUBLIC_UNAVAILABLE,
        RepairTier::Internal => codes::REPAIR_INTERNAL_UNAVAILABLE,
    }
}

const fn enabled(tier: RepairTier, options: &PassOptions) -> bool {
    match tier {
        RepairTier::Public => options.public_repair_enabled,
        RepairTier::Internal => options.internal_repair_enabled,
    }
}

fn convert(resolved: &str) -> RefineResult<String> {
    let kind = TargetKind::classify(resolved);
    to_locator_chain(resolved, kind).map(|chain| chain.to_expression())
}

/// Resolve fresh selectors for a dynamic target.
///
/// Requires a page and a target that currently matches exactly one
/// element; otherwise returns nothing and records why.
pub async fn runtime_repair(
    current: &Target,
    page: Option<&dyn PageHandle>,
    options: &PassOptions,
    diagnostics: &mut Diagnostics,
) -> Vec<RepairedSelector> {
    let Some(page) = page else {
        diagnostics.info(
            codes::REPAIR_PUBLIC_UNAVAILABLE,
            format!("no live page to repair `{}`", current.value),
        );
        return Vec::new();
    };
    let timeout = options.policy.scoring.probe_timeout();

    match bounded(timeout, page.count(current)).await {
        Ok(1) => {}
        Ok(n) => {
            diagnostics.info(
                codes::REPAIR_NON_UNIQUE,
                format!(
                    "`{}` matches {n} elements; repair needs exactly one",
                    current.value
                ),
            );
            return Vec::new();
        }
        Err(e) => {
            diagnostics.warn(
                codes::RUNTIME_RESOLUTION_FAILED,
                format!("could not resolve `{}` for repair: {e}", current.value),
            );
            return Vec::new();
        }
    }

    let capabilities = page.capabilities();
    let tiers: [&dyn SelectorResolver; 2] = [&PublicResolver, &InternalResolver];
    let mut repaired = Vec::new();
    for resolver in tiers {
        let tier = resolver.tier();
        if tier == RepairTier::Internal && !repaired.is_empty() {
            diagnostics.info(
                codes::REPAIR_INTERNAL_NOT_NEEDED,
                format!("public resolution repaired `{}`", current.value),
            );
            break;
        }
        if !enabled(tier, options) {
            diagnostics.info(
                disabled_code(tier),
                format!("{tier} selector repair disabled by policy"),
            );
            continue;
        }
        if !resolver.is_available(&capabilities) {
            diagnostics.info(
                unavailable_code(tier),
                format!("page does not expose {tier} selector resolution"),
            );
            continue;
        }
        match bounded(timeout, resolver.resolve(page, current)).await {
            Ok(Some(resolved)) => match convert(&resolved) {
                Ok(expression) => {
                    debug!(%tier, %resolved, %expression, "repaired selector");
                    repaired.push(RepairedSelector {
                        tier,
                        resolved,
                        expression,
                    });
                }
                Err(e) => diagnostics.info(
                    codes::REPAIR_CONVERSION_FAILED,
                    format!("{tier} result `{resolved}` has no locator form: {e}"),
                ),
            },
            Ok(None) => diagnostics.info(
                codes::REPAIR_NO_RESULT,
                format!("{tier} resolution returned nothing for `{}`", current.value),
            ),
            Err(e) => diagnostics.warn(
                codes::REPAIR_RESOLVER_FAILED,
                format!("{tier} resolution of `{}` failed: {e}", current.value),
            ),
        }
    }
    repaired
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::page::{MockElement, MockPage, PageCapabilities};

    fn page() -> MockPage {
        MockPage::new()
            .with_element(MockElement::new("#item-42").with_role("link", "Docs"))
            .with_capabilities(PageCapabilities::full())
    }

    fn codes_of(diags: &Diagnostics) -> Vec<&str> {
        diags.entries().iter().map(|d| d.code.as_str()).collect()
    }

    #[tokio::test]
    async fn test_public_tier_wins() {
        let page = page().with_public_selector("#item-42", "role=link[name=\"Docs\"]");
        let mut diags = Diagnostics::new();
        let out = runtime_repair(
            &Target::css("#item-42"),
            Some(&page),
            &PassOptions::default(),
            &mut diags,
        )
        .await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tier, RepairTier::Public);
        assert_eq!(out[0].expression, "getByRole('link', { name: 'Docs' })");
        assert_eq!(codes_of(&diags), vec![codes::REPAIR_INTERNAL_NOT_NEEDED]);
    }

    #[tokio::test]
    async fn test_internal_fallback_when_public_empty() {
        let page = page().with_internal_selector("#item-42", "internal:role=link[name=\"Docs\"s]");
        let mut diags = Diagnostics::new();
        let out = runtime_repair(
            &Target::css("#item-42"),
            Some(&page),
            &PassOptions::default(),
            &mut diags,
        )
        .await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tier, RepairTier::Internal);
        assert_eq!(
            out[0].expression,
            "getByRole('link', { name: 'Docs', exact: true })"
        );
        assert_eq!(codes_of(&diags), vec![codes::REPAIR_NO_RESULT]);
    }

    #[tokio::test]
    async fn test_kill_switches_and_missing_capabilities() {
        let page = page()
            .with_capabilities(PageCapabilities {
                internal_selector_api: false,
                ..PageCapabilities::full()
            })
            .with_public_selector("#item-42", "getByText('Docs')");
        let options = PassOptions::default().with_public_repair(false);
        let mut diags = Diagnostics::new();
        let out = runtime_repair(&Target::css("#item-42"), Some(&page), &options, &mut diags).await;
        assert!(out.is_empty());
        assert_eq!(
            codes_of(&diags),
            vec![
                codes::REPAIR_PUBLIC_DISABLED,
                codes::REPAIR_INTERNAL_UNAVAILABLE
            ]
        );
    }

    #[tokio::test]
    async fn test_non_unique_and_conversion_failure() {
        let page = page()
            .with_element(MockElement::new("li"))
            .with_element(MockElement::new("li"))
            .with_public_selector("#item-42", "//a[@id='item-42']");
        let mut diags = Diagnostics::new();
        let options = PassOptions::default();

        let out = runtime_repair(&Target::css("li"), Some(&page), &options, &mut diags).await;
        assert!(out.is_empty());
        assert!(diags.has_code(codes::REPAIR_NON_UNIQUE));

        let out = runtime_repair(&Target::css("#item-42"), Some(&page), &options, &mut diags).await;
        assert!(out.is_empty());
        assert!(diags.has_code(codes::REPAIR_CONVERSION_FAILED));
        assert!(diags.has_code(codes::REPAIR_NO_RESULT));
    }

    #[tokio::test]
    async fn test_no_page() {
        let mut diags = Diagnostics::new();
        let out =
            runtime_repair(&Target::css("#a"), None, &PassOptions::default(), &mut diags).await;
        assert!(out.is_empty());
        assert!(diags.has_code(codes::REPAIR_PUBLIC_UNAVAILABLE));
    }
}
