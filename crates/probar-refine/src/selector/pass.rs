//! Selector pass entry point.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::candidates::generate_candidates;
use super::scoring::{score_candidate, CandidateScore, RUNTIME_RESOLUTION_FAILED};
use super::selection::{
    rank, recommendation_status, select, Recommendation, RecommendationStatus, SelectionReason,
};
use crate::diagnostics::{codes, Diagnostics};
use crate::page::{bounded, ensure_usable, PageHandle};
use crate::policy::PassOptions;
use crate::result::RefineResult;
use crate::signals::SignalDetector;
use crate::step::{validate_steps, Step, Target};

/// Counters for one selector pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorPassCounters {
    /// Steps processed
    pub steps: usize,
    /// Steps with an element target
    pub targets: usize,
    /// Candidates generated, current targets included
    pub candidates: usize,
    /// Candidates scored against the live page
    pub probed: usize,
    /// Candidates whose probe failed
    pub probe_failures: usize,
    /// Targets carrying dynamic signals
    pub dynamic_targets: usize,
    /// Recommendations made
    pub recommended: usize,
    /// Recommendations written into the output
    pub applied: usize,
    /// Recommendations downgraded to report-only
    pub report_only: usize,
    /// Recommendations made through the runtime-repair tie rule
    pub tie_repairs: usize,
    /// Current locator expressions rejected by the allowlist
    pub rejected_expressions: usize,
    /// Steps that failed to replay
    pub step_failures: usize,
}

/// Selector analysis of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorStepReport {
    /// Original step index
    pub step_index: usize,
    /// Action name
    pub action: String,
    /// Current target, with detected signals attached
    pub current: Target,
    /// Scored candidates, best first
    pub candidates: Vec<CandidateScore>,
    /// Replacement, if one cleared selection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<Recommendation>,
}

/// Result of [`run_selector_pass`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorPassReport {
    /// Input steps with applied replacements
    pub output_steps: Vec<Step>,
    /// Per-step reports for steps with a target
    pub step_reports: Vec<SelectorStepReport>,
    /// Diagnostics in emission order
    pub diagnostics: Diagnostics,
    /// Counters
    pub counters: SelectorPassCounters,
}

impl SelectorPassReport {
    /// Pretty JSON rendering
    pub fn to_json(&self) -> RefineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn with_detected_signals(target: &Target, detector: &SignalDetector) -> Target {
    if target.dynamic_signals.is_some() {
        return target.clone();
    }
    let signals = detector.detect_selector(&target.value);
    if signals.is_empty() {
        target.clone()
    } else {
        target.clone().with_dynamic_signals(signals)
    }
}

/// Generate, score and select replacement targets for every step.
///
/// With `options.apply_selectors` a recommendation that matched exactly one
/// live element replaces the step's target in `output_steps`. When a page
/// is given each step is replayed after it has been analysed so later steps
/// see the page in the state they were recorded in.
///
/// # Errors
///
/// Only malformed steps, invalid options or an unusable page are errors;
/// everything else is reported through diagnostics.
#[instrument(skip_all, fields(steps = steps.len(), live = page.is_some()))]
pub async fn run_selector_pass(
    steps: &[Step],
    mut page: Option<&mut dyn PageHandle>,
    options: &PassOptions,
) -> RefineResult<SelectorPassReport> {
    options.validate()?;
    validate_steps(steps)?;
    let detector = SignalDetector::new(&options.policy.signals)?;
    if let Some(page) = page.as_deref() {
        ensure_usable(page, options.policy.scoring.probe_timeout()).await?;
    }

    let scoring = &options.policy.scoring;
    let mut diagnostics = Diagnostics::new();
    let mut counters = SelectorPassCounters::default();
    let mut output_steps = steps.to_vec();
    let mut step_reports = Vec::new();

    for (index, step) in steps.iter().enumerate() {
        counters.steps += 1;
        if let Some(recorded) = step.target() {
            counters.targets += 1;
            let current = with_detected_signals(recorded, &detector);
            let dynamic = current.is_dynamic();
            if dynamic {
                counters.dynamic_targets += 1;
            }

            let rejected_before = diagnostics.with_code(codes::EXPRESSION_REJECTED).count();
            let set = generate_candidates(
                &current,
                page.as_deref(),
                options,
                &detector,
                &mut diagnostics,
            )
            .await;
            counters.rejected_expressions +=
                diagnostics.with_code(codes::EXPRESSION_REJECTED).count() - rejected_before;
            counters.candidates += set.len();

            let mut scores = Vec::with_capacity(set.len());
            for candidate in set.as_slice() {
                let scored =
                    score_candidate(candidate, page.as_deref(), scoring, &mut diagnostics).await;
                if scored.probed {
                    counters.probed += 1;
                }
                if scored.reason_codes.iter().any(|r| r == RUNTIME_RESOLUTION_FAILED) {
                    counters.probe_failures += 1;
                }
                scores.push(scored);
            }

            let Some(current_score) = scores.iter().find(|s| s.candidate.is_current()).cloned()
            else {
                continue;
            };
            let ranked = rank(scores);
            let recommendation =
                select(&ranked, &current_score, dynamic, scoring).map(|(i, reason)| {
                    let chosen = &ranked[i];
                    Recommendation {
                        candidate_id: chosen.candidate.id.clone(),
                        target: chosen.candidate.target.clone(),
                        score: chosen.score,
                        current_score: current_score.score,
                        gain: chosen.score - current_score.score,
                        reason,
                        status: recommendation_status(chosen, options.apply_selectors),
                        match_count: chosen.match_count,
                    }
                });

            if let Some(rec) = &recommendation {
                counters.recommended += 1;
                diagnostics.info(
                    codes::SELECTOR_RECOMMENDED,
                    format!(
                        "step {index}: `{}` -> `{}` ({:.3} -> {:.3})",
                        current.value, rec.target.value, rec.current_score, rec.score
                    ),
                );
                if rec.reason == SelectionReason::TieRuntimeRepair {
                    counters.tie_repairs += 1;
                    diagnostics.info(
                        codes::SELECTOR_TIE_REPAIR,
                        format!(
                            "step {index}: dynamic target tied with runtime repair `{}`",
                            rec.target.value
                        ),
                    );
                }
                match rec.status {
                    RecommendationStatus::Applied => {
                        counters.applied += 1;
                        if let Some(target) = output_steps[index].action.target_mut() {
                            *target = rec.target.clone();
                        }
                        diagnostics.info(
                            codes::SELECTOR_APPLIED,
                            format!("step {index}: applied `{}`", rec.target.value),
                        );
                    }
                    RecommendationStatus::ReportOnly => {
                        counters.report_only += 1;
                        diagnostics.info(
                            codes::SELECTOR_REPORT_ONLY,
                            format!(
                                "step {index}: `{}` was not validated as unique; reporting only",
                                rec.target.value
                            ),
                        );
                    }
                    RecommendationStatus::Recommended => {}
                }
            }
            debug!(
                step = index,
                candidates = ranked.len(),
                recommended = recommendation.is_some(),
                "selector step analysed"
            );
            step_reports.push(SelectorStepReport {
                step_index: index,
                action: step.action.name().to_string(),
                current,
                candidates: ranked,
                recommendation,
            });
        }

        if let Some(page) = page.as_deref_mut() {
            let replay = &output_steps[index];
            let timeout = replay
                .timeout()
                .unwrap_or_else(|| options.policy.assertions.step_timeout());
            if let Err(e) = bounded(timeout, page.execute_step(replay, timeout)).await {
                counters.step_failures += 1;
                diagnostics.warn(
                    codes::STEP_EXECUTION_FAILED,
                    format!("step {index} ({}) failed: {e}", replay.action.name()),
                );
            }
        }
    }

    info!(
        recommended = counters.recommended,
        applied = counters.applied,
        "selector pass complete"
    );
    Ok(SelectorPassReport {
        output_steps,
        step_reports,
        diagnostics,
        counters,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::result::RefineError;
    use crate::page::{MockElement, MockPage, PageCapabilities};
    use crate::selector::candidates::reasons;
    use crate::step::{StepAction, TargetKind};

    fn save_page() -> MockPage {
        MockPage::new()
            .with_url("https://shop.test/cart")
            .with_element(MockElement::new("#submit").with_role("button", "Save"))
    }

    fn click(value: &str) -> Step {
        Step::click(Target::infer(value))
    }

    mod recommend_tests {
        use super::*;

        #[tokio::test]
        async fn test_css_recommended_not_applied() {
            let mut page = save_page();
            let report = run_selector_pass(
                &[click("#submit")],
                Some(&mut page),
                &PassOptions::default(),
            )
            .await
            .unwrap();
            let rec = report.step_reports[0].recommendation.as_ref().unwrap();
            assert_eq!(rec.target.value, "getByRole('button', { name: 'Save' })");
            assert_eq!(rec.status, RecommendationStatus::Recommended);
            assert!(rec.gain > 0.15);
            assert_eq!(report.output_steps, vec![click("#submit")]);
            assert_eq!(report.counters.recommended, 1);
            assert!(page.was_executed("click:#submit (css)"));
        }

        #[tokio::test]
        async fn test_css_applied_when_requested() {
            let mut page = save_page();
            let options = PassOptions::default().with_apply_selectors(true);
            let report = run_selector_pass(&[click("#submit")], Some(&mut page), &options)
                .await
                .unwrap();
            let target = report.output_steps[0].target().unwrap();
            assert_eq!(target.value, "getByRole('button', { name: 'Save' })");
            assert_eq!(target.kind, TargetKind::LocatorExpression);
            assert_eq!(report.counters.applied, 1);
            assert!(report.diagnostics.has_code(codes::SELECTOR_APPLIED));
            assert!(page.was_executed(
                "click:getByRole('button', { name: 'Save' }) (locator-expression)"
            ));
        }

        #[tokio::test]
        async fn test_offline_conversion_is_report_only() {
            let options = PassOptions::default().with_apply_selectors(true);
            let steps = [click("role=button[name=\"Save\"]")];
            let report = run_selector_pass(&steps, None, &options).await.unwrap();
            let rec = report.step_reports[0].recommendation.as_ref().unwrap();
            assert_eq!(rec.status, RecommendationStatus::ReportOnly);
            assert_eq!(report.output_steps, steps.to_vec());
            assert!(report.diagnostics.has_code(codes::SELECTOR_REPORT_ONLY));
        }

        #[tokio::test]
        async fn test_plain_css_offline_keeps_current() {
            let report = run_selector_pass(&[click("#submit")], None, &PassOptions::default())
                .await
                .unwrap();
            assert!(report.step_reports[0].recommendation.is_none());
            assert_eq!(report.step_reports[0].candidates.len(), 1);
        }

        #[tokio::test]
        async fn test_dynamic_target_takes_runtime_repair_tie() {
            let mut page = MockPage::new()
                .with_url("https://shop.test/orders")
                .with_element(
                    MockElement::new("#o")
                        .with_text("Order 4411")
                        .with_test_id("order-card"),
                )
                .with_capabilities(PageCapabilities::full())
                .with_public_selector("getByText('Order 4411')", "getByTestId('order-card')");
            let report = run_selector_pass(
                &[click("getByText('Order 4411')")],
                Some(&mut page),
                &PassOptions::default(),
            )
            .await
            .unwrap();
            let step = &report.step_reports[0];
            assert!(step.current.is_dynamic());
            let rec = step.recommendation.as_ref().unwrap();
            assert_eq!(rec.reason, SelectionReason::TieRuntimeRepair);
            assert_eq!(rec.target.value, "getByTestId('order-card')");
            let chosen = step
                .candidates
                .iter()
                .find(|c| c.candidate.id == rec.candidate_id)
                .unwrap();
            assert!(chosen
                .reason_codes
                .iter()
                .any(|r| r == reasons::REPAIR_PUBLIC));
            assert_eq!(report.counters.tie_repairs, 1);
            assert_eq!(report.counters.dynamic_targets, 1);
        }
    }

    mod failure_tests {
        use super::*;

        #[tokio::test]
        async fn test_step_failure_is_a_warning() {
            let mut page = save_page().failing_step("#submit");
            let report = run_selector_pass(
                &[click("#submit"), Step::navigate("https://shop.test/done")],
                Some(&mut page),
                &PassOptions::default(),
            )
            .await
            .unwrap();
            assert_eq!(report.counters.step_failures, 1);
            assert!(report.diagnostics.has_code(codes::STEP_EXECUTION_FAILED));
            assert_eq!(page.state.url, "https://shop.test/done");
        }

        #[tokio::test]
        async fn test_unusable_page_is_fatal() {
            let mut page = save_page().unavailable();
            let err = run_selector_pass(&[click("#a")], Some(&mut page), &PassOptions::default())
                .await
                .unwrap_err();
            assert!(matches!(err, RefineError::PageUnavailable { .. }));
        }

        #[tokio::test]
        async fn test_malformed_steps_are_fatal() {
            let steps = [Step::new(StepAction::Click {
                target: Target::css("  "),
            })];
            let err = run_selector_pass(&steps, None, &PassOptions::default())
                .await
                .unwrap_err();
            assert!(matches!(err, RefineError::InvalidInput { .. }));
        }

        #[tokio::test]
        async fn test_rejected_expression_counted() {
            let report = run_selector_pass(
                &[click("page.locator('#a')[0]")],
                None,
                &PassOptions::default(),
            )
            .await
            .unwrap();
            assert_eq!(report.counters.rejected_expressions, 1);
            assert!(report.step_reports[0].recommendation.is_none());
        }
    }

    mod report_tests {
        use super::*;

        #[tokio::test]
        async fn test_idempotent_report_only_runs() {
            let steps = [
                Step::navigate("https://shop.test/cart"),
                click("#submit"),
                click("text=Save"),
            ];
            let options = PassOptions::default();
            let mut first_page = save_page();
            let mut second_page = save_page();
            let first = run_selector_pass(&steps, Some(&mut first_page), &options)
                .await
                .unwrap();
            let second = run_selector_pass(&steps, Some(&mut second_page), &options)
                .await
                .unwrap();
            assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
            assert_eq!(first.output_steps, steps.to_vec());
        }
    }
}
