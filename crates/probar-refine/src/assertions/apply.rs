//! Selection, runtime validation and insertion of assertion candidates.

use tracing::debug;

use super::{ApplyStatus, AssertionCandidate};
use crate::diagnostics::{codes, Diagnostics};
use crate::page::{bounded, PageHandle};
use crate::policy::PassOptions;
use crate::result::RefineResult;
use crate::step::{InsertOutcome, StepSequence};

/// What to do with one candidate of a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Selected; validate against the page and insert
    Validate {
        /// Kept only to give the step some coverage; inserted even if
        /// validation fails
        coverage_required: bool,
    },
    /// Not selected
    Skip(ApplyStatus, String),
}

/// Decide which of one step's candidates (ranked best first) are selected.
///
/// Candidates at or above `threshold` are selected. When none are, the
/// best non-fallback candidate (or the best candidate if all are
/// fallbacks) is selected as coverage. A coverage fallback is skipped by
/// policy whenever a selected non-fallback candidate covers the step.
#[must_use]
pub fn plan_step(candidates: &[AssertionCandidate], threshold: f64) -> Vec<Decision> {
    let above: Vec<bool> = candidates
        .iter()
        .map(|c| c.stability() >= threshold)
        .collect();
    let coverage = if above.iter().any(|a| *a) {
        None
    } else {
        candidates
            .iter()
            .position(|c| !c.coverage_fallback)
            .or_else(|| (!candidates.is_empty()).then_some(0))
    };
    let selected = |i: usize| above[i] || coverage == Some(i);
    let covered = candidates
        .iter()
        .enumerate()
        .any(|(i, c)| selected(i) && !c.coverage_fallback);

    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if c.coverage_fallback && covered {
                Decision::Skip(
                    ApplyStatus::SkippedPolicy,
                    "step already covered by a stronger assertion".to_string(),
                )
            } else if selected(i) {
                Decision::Validate {
                    coverage_required: coverage == Some(i),
                }
            } else {
                Decision::Skip(
                    ApplyStatus::SkippedLowConfidence,
                    format!(
                        "stability {:.3} below threshold {threshold:.3}",
                        c.stability()
                    ),
                )
            }
        })
        .collect()
}

fn insert(
    candidate: &mut AssertionCandidate,
    sequence: &mut StepSequence,
    diagnostics: &mut Diagnostics,
    message: String,
) -> RefineResult<()> {
    match sequence.insert_after(candidate.step_index, candidate.candidate.clone())? {
        InsertOutcome::Inserted(position) => {
            diagnostics.info(
                codes::ASSERTION_APPLIED,
                format!(
                    "{} inserted at {position} after step {}",
                    candidate.candidate.action.name(),
                    candidate.step_index
                ),
            );
            candidate.finish(ApplyStatus::Applied, message);
        }
        InsertOutcome::DuplicateAdjacent(_) => {
            candidate.finish(ApplyStatus::SkippedExisting, "adjacent step already checks this");
        }
    }
    Ok(())
}

fn force(
    candidate: &mut AssertionCandidate,
    sequence: &mut StepSequence,
    diagnostics: &mut Diagnostics,
    reason: &str,
) -> RefineResult<()> {
    diagnostics.warn(
        codes::ASSERTION_FORCED,
        format!(
            "step {}: {} inserted without validation ({reason})",
            candidate.step_index,
            candidate.candidate.action.name()
        ),
    );
    insert(
        candidate,
        sequence,
        diagnostics,
        format!("{reason}; inserted to keep step coverage"),
    )?;
    candidate.forced_by_coverage = candidate.apply_status == Some(ApplyStatus::Applied);
    Ok(())
}

/// Validate a selected candidate and insert it after its step.
///
/// `network_idle_failed` means the post-step wait timed out; the page
/// state is then unknown and the candidate is not validated at all.
pub(crate) async fn apply_selected(
    candidate: &mut AssertionCandidate,
    coverage_required: bool,
    page: Option<&mut (dyn PageHandle + '_)>,
    sequence: &mut StepSequence,
    options: &PassOptions,
    network_idle_failed: bool,
    diagnostics: &mut Diagnostics,
) -> RefineResult<()> {
    if !options.apply_assertions {
        candidate.finish(ApplyStatus::NotRequested, "application not requested");
        return Ok(());
    }
    let already_present = sequence
        .insertion_position(candidate.step_index)
        .is_some_and(|pos| sequence.duplicates_adjacent(pos, &candidate.candidate));
    if already_present {
        candidate.finish(ApplyStatus::SkippedExisting, "adjacent step already checks this");
        return Ok(());
    }
    if network_idle_failed {
        candidate.finish(
            ApplyStatus::SkippedRuntimeFailure,
            "network idle wait timed out; not validated",
        );
        return Ok(());
    }

    let Some(page) = page else {
        if coverage_required {
            return force(candidate, sequence, diagnostics, "no page to validate against");
        }
        candidate.finish(
            ApplyStatus::SkippedRuntimeFailure,
            "no page to validate against",
        );
        return Ok(());
    };

    let timeout = options.policy.assertions.validation_timeout();
    match bounded(timeout, page.execute_step(&candidate.candidate, timeout)).await {
        Ok(()) => {
            debug!(
                step = candidate.step_index,
                action = candidate.candidate.action.name(),
                "assertion validated"
            );
            insert(candidate, sequence, diagnostics, "validated".to_string())
        }
        Err(e) if coverage_required => {
            force(candidate, sequence, diagnostics, &format!("validation failed: {e}"))
        }
        Err(e) => {
            diagnostics.warn(
                codes::ASSERTION_RUNTIME_FAILED,
                format!(
                    "step {}: {} failed validation: {e}",
                    candidate.step_index,
                    candidate.candidate.action.name()
                ),
            );
            candidate.finish(
                ApplyStatus::SkippedRuntimeFailure,
                format!("validation failed: {e}"),
            );
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::page::{MockElement, MockPage};
    use crate::policy::AssertionSource;
    use crate::step::{Step, StepAction, Target};

    fn visible(value: &str, stability: f64, fallback: bool) -> AssertionCandidate {
        let mut c = AssertionCandidate::new(
            0,
            &Step::click(Target::css("#go")),
            Step::new(StepAction::AssertVisible {
                target: Target::css(value),
            }),
            stability,
            "t",
            AssertionSource::Deterministic,
        );
        c.coverage_fallback = fallback;
        c.stability_score = Some(stability);
        c
    }

    mod plan_tests {
        use super::*;

        #[test]
        fn test_fallback_with_stronger_sibling_is_policy_skipped() {
            let plan = plan_step(
                &[visible("#heading", 0.9, false), visible("#go", 0.56, true)],
                0.75,
            );
            assert_eq!(
                plan[0],
                Decision::Validate {
                    coverage_required: false
                }
            );
            assert!(matches!(plan[1], Decision::Skip(ApplyStatus::SkippedPolicy, _)));
        }

        #[test]
        fn test_lone_fallback_is_coverage() {
            let plan = plan_step(&[visible("#go", 0.56, true)], 0.75);
            assert_eq!(
                plan[0],
                Decision::Validate {
                    coverage_required: true
                }
            );
        }

        #[test]
        fn test_coverage_prefers_non_fallback() {
            let plan = plan_step(
                &[visible("#go", 0.56, true), visible("#panel", 0.5, false)],
                0.75,
            );
            assert!(matches!(plan[0], Decision::Skip(ApplyStatus::SkippedPolicy, _)));
            assert_eq!(
                plan[1],
                Decision::Validate {
                    coverage_required: true
                }
            );
        }

        #[test]
        fn test_low_confidence_beside_selected() {
            let plan = plan_step(
                &[visible("#a", 0.8, false), visible("#b", 0.6, false)],
                0.75,
            );
            assert!(matches!(
                &plan[1],
                Decision::Skip(ApplyStatus::SkippedLowConfidence, m) if m.contains("0.600")
            ));
        }
    }

    mod apply_tests {
        use super::*;

        fn sequence() -> StepSequence {
            StepSequence::new(vec![
                Step::click(Target::css("#go")),
                Step::navigate("https://a.test/next"),
            ])
        }

        #[tokio::test]
        async fn test_validated_and_inserted() {
            let mut page = MockPage::new().with_element(MockElement::new("#panel"));
            let mut seq = sequence();
            let mut diags = Diagnostics::new();
            let options = PassOptions::default().with_apply_assertions(true);
            let mut c = visible("#panel", 0.9, false);
            apply_selected(&mut c, false, Some(&mut page), &mut seq, &options, false, &mut diags)
                .await
                .unwrap();
            assert_eq!(c.apply_status, Some(ApplyStatus::Applied));
            assert_eq!(seq.len(), 3);
            assert!(seq.steps()[1].action.is_assertion());
            assert!(diags.has_code(codes::ASSERTION_APPLIED));
        }

        #[tokio::test]
        async fn test_failed_validation() {
            let mut page = MockPage::new();
            let options = PassOptions::default().with_apply_assertions(true);
            let mut diags = Diagnostics::new();

            let mut seq = sequence();
            let mut c = visible("#missing", 0.9, false);
            apply_selected(&mut c, false, Some(&mut page), &mut seq, &options, false, &mut diags)
                .await
                .unwrap();
            assert_eq!(c.apply_status, Some(ApplyStatus::SkippedRuntimeFailure));
            assert_eq!(seq.len(), 2);

            let mut c = visible("#missing", 0.56, true);
            apply_selected(&mut c, true, Some(&mut page), &mut seq, &options, false, &mut diags)
                .await
                .unwrap();
            assert_eq!(c.apply_status, Some(ApplyStatus::Applied));
            assert!(c.forced_by_coverage);
            assert_eq!(seq.len(), 3);
        }

        #[tokio::test]
        async fn test_network_idle_timeout_skips_even_coverage() {
            let mut page = MockPage::new().with_element(MockElement::new("#panel"));
            let options = PassOptions::default().with_apply_assertions(true);
            let mut diags = Diagnostics::new();
            let mut seq = sequence();
            let mut c = visible("#panel", 0.56, true);
            apply_selected(&mut c, true, Some(&mut page), &mut seq, &options, true, &mut diags)
                .await
                .unwrap();
            assert_eq!(c.apply_status, Some(ApplyStatus::SkippedRuntimeFailure));
            assert!(!c.forced_by_coverage);
            assert!(page.executed.is_empty());
        }

        #[tokio::test]
        async fn test_duplicate_and_not_requested() {
            let mut seq = StepSequence::new(vec![
                Step::click(Target::css("#go")),
                Step::new(StepAction::AssertVisible {
                    target: Target::css("#panel"),
                }),
            ]);
            let mut diags = Diagnostics::new();
            let options = PassOptions::default().with_apply_assertions(true);
            let mut c = visible("#panel", 0.9, false);
            apply_selected(&mut c, false, None, &mut seq, &options, false, &mut diags)
                .await
                .unwrap();
            assert_eq!(c.apply_status, Some(ApplyStatus::SkippedExisting));

            let mut c = visible("#other", 0.9, false);
            let options = PassOptions::default();
            apply_selected(&mut c, false, None, &mut seq, &options, false, &mut diags)
                .await
                .unwrap();
            assert_eq!(c.apply_status, Some(ApplyStatus::NotRequested));
            assert_eq!(seq.len(), 2);
        }

        #[tokio::test]
        async fn test_no_page() {
            let options = PassOptions::default().with_apply_assertions(true);
            let mut diags = Diagnostics::new();
            let mut seq = sequence();
            let mut plain = visible("#a", 0.9, false);
            apply_selected(&mut plain, false, None, &mut seq, &options, false, &mut diags)
                .await
                .unwrap();
            assert_eq!(plain.apply_status, Some(ApplyStatus::SkippedRuntimeFailure));

            let mut coverage = visible("#go", 0.56, true);
            apply_selected(&mut coverage, true, None, &mut seq, &options, false, &mut diags)
                .await
                .unwrap();
            assert!(coverage.forced_by_coverage);
            assert!(diags.has_code(codes::ASSERTION_FORCED));
        }
    }
}
