//! Candidate scoring.
//!
//! Offline the score is a pure function of the target kind, its repair
//! provenance and its dynamic signals. With a page the base score is blended
//! with live uniqueness and visibility. Probe failures never escape: the
//! candidate falls back to its offline score and is marked unprobed.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::candidates::TargetCandidate;
use crate::diagnostics::{codes, Diagnostics};
use crate::page::{bounded, PageHandle};
use crate::policy::ScoringPolicy;
use crate::result::RefineResult;
use crate::signals::{DynamicSignal, SignalSet};
use crate::step::{Target, TargetKind};

/// Reason code added when probing failed and the offline score was used
pub const RUNTIME_RESOLUTION_FAILED: &str = "runtime_resolution_failed";

/// Score of one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateScore {
    /// Candidate scored
    pub candidate: TargetCandidate,
    /// Final score in `[0, 1]`
    pub score: f64,
    /// Kind-derived base score
    pub base_score: f64,
    /// 1 for a unique match, reduced for multiple, 0 for none
    pub uniqueness_score: f64,
    /// 1 when the first match is visible
    pub visibility_score: f64,
    /// Live match count, when probed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_count: Option<usize>,
    /// Whether live probing succeeded
    pub probed: bool,
    /// Candidate reasons plus scoring reasons
    pub reason_codes: Vec<String>,
}

impl CandidateScore {
    /// Whether the candidate matched exactly one element at runtime
    #[must_use]
    pub const fn is_unique(&self) -> bool {
        matches!(self.match_count, Some(1))
    }
}

/// Kind-derived base score
#[must_use]
pub const fn base_score(kind: TargetKind, policy: &ScoringPolicy) -> f64 {
    match kind {
        TargetKind::LocatorExpression => policy.base_locator_expression,
        TargetKind::EngineSelector => policy.base_engine_selector,
        TargetKind::Css => policy.base_css,
        TargetKind::Xpath => policy.base_xpath,
        TargetKind::EngineInternal => policy.base_engine_internal,
        TargetKind::Unknown => policy.base_unknown,
    }
}

/// Penalty for volatile content in a selector value.
///
/// `navigate_context` alone does not count; it describes when a value was
/// captured, not what it contains.
#[must_use]
pub fn dynamic_penalty(signals: Option<&SignalSet>, policy: &ScoringPolicy) -> f64 {
    let Some(signals) = signals else {
        return 0.0;
    };
    if signals.iter().all(|s| *s == DynamicSignal::NavigateContext) {
        return 0.0;
    }
    let mut penalty = policy.dynamic_penalty_base;
    if signals.contains(&DynamicSignal::ExactTrue) {
        penalty += policy.dynamic_penalty_exact;
    }
    if signals.contains(&DynamicSignal::ContainsHeadlineLikeText)
        || signals.contains(&DynamicSignal::ContainsWeatherOrNewsFragment)
    {
        penalty += policy.dynamic_penalty_headline;
    }
    penalty.min(policy.dynamic_penalty_cap)
}

fn repair_bonus(candidate: &TargetCandidate, policy: &ScoringPolicy) -> f64 {
    if candidate.is_runtime_repair() {
        policy.repair_bonus
    } else {
        0.0
    }
}

fn penalty_of(target: &Target, policy: &ScoringPolicy) -> f64 {
    dynamic_penalty(target.dynamic_signals.as_ref(), policy)
}

/// Score without a page
#[must_use]
pub fn score_offline(candidate: &TargetCandidate, policy: &ScoringPolicy) -> CandidateScore {
    let base = base_score(candidate.target.kind, policy);
    let score = base + repair_bonus(candidate, policy) - penalty_of(&candidate.target, policy);
    CandidateScore {
        candidate: candidate.clone(),
        score: score.clamp(0.0, 1.0),
        base_score: base,
        uniqueness_score: 0.0,
        visibility_score: 0.0,
        match_count: None,
        probed: false,
        reason_codes: candidate.reason_codes.clone(),
    }
}

async fn probe(
    page: &dyn PageHandle,
    target: &Target,
    policy: &ScoringPolicy,
) -> RefineResult<(usize, bool)> {
    let timeout = policy.probe_timeout();
    let count = bounded(timeout, page.count(target)).await?;
    let visible = if count == 0 {
        false
    } else {
        bounded(timeout, page.is_visible(target, 0)).await?
    };
    Ok((count, visible))
}

/// Score a candidate, probing the page when one is given
pub async fn score_candidate(
    candidate: &TargetCandidate,
    page: Option<&dyn PageHandle>,
    policy: &ScoringPolicy,
    diagnostics: &mut Diagnostics,
) -> CandidateScore {
    let Some(page) = page else {
        return score_offline(candidate, policy);
    };
    let target = &candidate.target;
    match probe(page, target, policy).await {
        Ok((count, visible)) => {
            let base = base_score(target.kind, policy);
            let uniqueness = match count {
                0 => 0.0,
                1 => 1.0,
                _ => policy.uniqueness_multiple,
            };
            let visibility = if visible { 1.0 } else { 0.0 };
            let mut score = policy.weight_base * base
                + policy.weight_uniqueness * uniqueness
                + policy.weight_visibility * visibility
                + repair_bonus(candidate, policy)
                - penalty_of(target, policy);
            if candidate.is_runtime_repair() && count == 1 {
                score += policy.runtime_repair_bonus;
            }
            debug!(value = %target.value, count, visible, score, "probed candidate");
            CandidateScore {
                candidate: candidate.clone(),
                score: score.clamp(0.0, 1.0),
                base_score: base,
                uniqueness_score: uniqueness,
                visibility_score: visibility,
                match_count: Some(count),
                probed: true,
                reason_codes: candidate.reason_codes.clone(),
            }
        }
        Err(e) => {
            diagnostics.warn(
                codes::RUNTIME_RESOLUTION_FAILED,
                format!("could not probe `{}`: {e}", target.value),
            );
            let base = base_score(target.kind, policy);
            let score = policy.weight_base * base + repair_bonus(candidate, policy)
                - penalty_of(target, policy);
            let mut reason_codes = candidate.reason_codes.clone();
            reason_codes.push(RUNTIME_RESOLUTION_FAILED.to_string());
            CandidateScore {
                candidate: candidate.clone(),
                score: score.clamp(0.0, 1.0),
                base_score: base,
                uniqueness_score: 0.0,
                visibility_score: 0.0,
                match_count: None,
                probed: false,
                reason_codes,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::page::{MockElement, MockPage};
    use crate::selector::candidates::{reasons, CandidateOrigin};

    fn candidate(target: Target, reason: &str) -> TargetCandidate {
        TargetCandidate::new(target, CandidateOrigin::Derived, reason)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    mod offline_tests {
        use super::*;

        #[test]
        fn test_base_scores() {
            let p = ScoringPolicy::default();
            assert!(close(base_score(TargetKind::LocatorExpression, &p), 1.0));
            assert!(close(base_score(TargetKind::Css, &p), 0.45));
            assert!(close(base_score(TargetKind::Unknown, &p), 0.1));
        }

        #[test]
        fn test_dynamic_penalty_composition() {
            let p = ScoringPolicy::default();
            assert!(close(dynamic_penalty(None, &p), 0.0));

            let nav: SignalSet = [DynamicSignal::NavigateContext].into();
            assert!(close(dynamic_penalty(Some(&nav), &p), 0.0));

            let numeric: SignalSet = [DynamicSignal::ContainsNumericFragment].into();
            assert!(close(dynamic_penalty(Some(&numeric), &p), 0.08));

            let exact: SignalSet = [DynamicSignal::ExactTrue].into();
            assert!(close(dynamic_penalty(Some(&exact), &p), 0.13));

            let all: SignalSet = [
                DynamicSignal::ExactTrue,
                DynamicSignal::ContainsHeadlineLikeText,
                DynamicSignal::ContainsWeatherOrNewsFragment,
            ]
            .into();
            assert!(close(dynamic_penalty(Some(&all), &p), 0.17));

            let capped = ScoringPolicy {
                dynamic_penalty_cap: 0.1,
                ..ScoringPolicy::default()
            };
            assert!(close(dynamic_penalty(Some(&all), &capped), 0.1));
        }

        #[test]
        fn test_offline_is_pure_in_kind_and_flags() {
            let p = ScoringPolicy::default();
            let plain = score_offline(&candidate(Target::css("#a"), reasons::CURRENT), &p);
            assert!(close(plain.score, 0.45));
            assert!(!plain.probed);

            let repaired = score_offline(
                &candidate(Target::locator("getByText('Go')"), reasons::REPAIR_PUBLIC),
                &p,
            );
            assert!(close(repaired.score, 1.0));

            let numeric: SignalSet = [DynamicSignal::ContainsNumericFragment].into();
            let dynamic = score_offline(
                &candidate(
                    Target::css("#row-17").with_dynamic_signals(numeric),
                    reasons::CURRENT,
                ),
                &p,
            );
            assert!(close(dynamic.score, 0.37));
        }
    }

    mod probe_tests {
        use super::*;

        fn page() -> MockPage {
            MockPage::new()
                .with_element(MockElement::new("#submit").with_role("button", "Save"))
                .with_element(MockElement::new("li"))
                .with_element(MockElement::new("li").hidden())
                .with_element(MockElement::new("#ghost").hidden())
        }

        #[tokio::test]
        async fn test_unique_visible_locator() {
            let p = ScoringPolicy::default();
            let mut diags = Diagnostics::new();
            let c = candidate(
                Target::locator("getByRole('button', { name: 'Save' })"),
                reasons::A11Y_ROLE_NAME,
            );
            let s = score_candidate(&c, Some(&page()), &p, &mut diags).await;
            assert!(s.probed);
            assert_eq!(s.match_count, Some(1));
            assert!(close(s.score, 1.0));
            assert!(diags.is_empty());
        }

        #[tokio::test]
        async fn test_css_current_blend() {
            let p = ScoringPolicy::default();
            let mut diags = Diagnostics::new();
            let c = candidate(Target::css("#submit"), reasons::CURRENT);
            let s = score_candidate(&c, Some(&page()), &p, &mut diags).await;
            assert!(close(s.score, 0.725));
        }

        #[tokio::test]
        async fn test_multiple_and_hidden_matches() {
            let p = ScoringPolicy::default();
            let mut diags = Diagnostics::new();
            let many = score_candidate(
                &candidate(Target::css("li"), reasons::CURRENT),
                Some(&page()),
                &p,
                &mut diags,
            )
            .await;
            assert!(close(many.uniqueness_score, 0.3));
            assert!(close(many.visibility_score, 1.0));

            let hidden = score_candidate(
                &candidate(Target::css("#ghost"), reasons::CURRENT),
                Some(&page()),
                &p,
                &mut diags,
            )
            .await;
            assert!(close(hidden.visibility_score, 0.0));

            let none = score_candidate(
                &candidate(Target::css("#missing"), reasons::CURRENT),
                Some(&page()),
                &p,
                &mut diags,
            )
            .await;
            assert_eq!(none.match_count, Some(0));
            assert!(close(none.score, 0.5 * 0.45));
        }

        #[tokio::test]
        async fn test_runtime_repair_unique_bonus() {
            let p = ScoringPolicy::default();
            let mut diags = Diagnostics::new();
            let page = page().with_element(MockElement::new("#cta").with_text("Go"));
            let c = candidate(Target::locator("getByText('Go')"), reasons::REPAIR_INTERNAL);
            let s = score_candidate(&c, Some(&page), &p, &mut diags).await;
            assert!(s.is_unique());
            assert!(close(s.score, 1.0));
        }

        #[tokio::test]
        async fn test_probe_failure_degrades() {
            let p = ScoringPolicy::default();
            let mut diags = Diagnostics::new();
            let page = page().slow_probe("#submit");
            let c = candidate(Target::css("#submit"), reasons::CURRENT);
            let s = score_candidate(&c, Some(&page), &p, &mut diags).await;
            assert!(!s.probed);
            assert!(close(s.score, 0.5 * 0.45));
            assert_eq!(s.reason_codes, vec![reasons::CURRENT, RUNTIME_RESOLUTION_FAILED]);
            assert!(diags.has_code(codes::RUNTIME_RESOLUTION_FAILED));
        }

        #[tokio::test]
        async fn test_unresolved_locator_ranks_below_matched_current() {
            let p = ScoringPolicy::default();
            let mut diags = Diagnostics::new();
            let expression = "getByRole('button', { name: 'Save' })";
            let page = page().failing_probe(expression);

            let current = candidate(Target::css("#submit"), reasons::CURRENT);
            let current = score_candidate(&current, Some(&page), &p, &mut diags).await;
            let unresolved = candidate(Target::locator(expression), reasons::A11Y_ROLE_NAME);
            let unresolved = score_candidate(&unresolved, Some(&page), &p, &mut diags).await;

            assert!(close(current.score, 0.725));
            assert!(close(unresolved.score, 0.5));
            assert_eq!(unresolved.match_count, None);
            assert!(unresolved.score < current.score);
            assert!(unresolved
                .reason_codes
                .iter()
                .any(|r| r == RUNTIME_RESOLUTION_FAILED));
        }
    }
}
