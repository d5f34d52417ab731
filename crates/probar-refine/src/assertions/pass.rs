//! Assertion pass entry point.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::apply::{apply_selected, plan_step, Decision};
use super::builder::{
    dedup_candidates, deterministic_candidates, is_navigation_like, snapshot_candidates,
    Observation,
};
use super::stability::{assess, cap_step, hard_filter_signal};
use super::{ApplyStatus, AssertionCandidate};
use crate::diagnostics::{codes, Diagnostics};
use crate::page::{bounded, ensure_usable, ElementFacts, PageHandle};
use crate::policy::{AssertionMode, AssertionSource, PassOptions};
use crate::result::RefineResult;
use crate::signals::SignalDetector;
use crate::snapshot::parse_snapshot;
use crate::step::{validate_steps, Step, StepSequence};

/// Counters for one assertion pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionPassCounters {
    /// Steps processed
    pub steps: usize,
    /// Candidates left after dedup
    pub generated: usize,
    /// Candidates dropped for dynamic content
    pub filtered: usize,
    /// Candidates dropped by volume caps
    pub capped: usize,
    /// Candidates selected for validation
    pub selected: usize,
    /// Candidates inserted, forced ones included
    pub applied: usize,
    /// Candidates inserted without passing validation
    pub forced: usize,
    /// `skipped_low_confidence`
    pub skipped_low_confidence: usize,
    /// `skipped_policy`
    pub skipped_policy: usize,
    /// `skipped_runtime_failure`
    pub skipped_runtime_failure: usize,
    /// `skipped_existing`
    pub skipped_existing: usize,
    /// `not_requested`
    pub not_requested: usize,
    /// Post-step network idle waits that timed out
    pub network_idle_timeouts: usize,
    /// Steps that failed to replay
    pub step_failures: usize,
    /// Snapshot captures that failed
    pub snapshot_failures: usize,
}

impl AssertionPassCounters {
    fn record(&mut self, candidate: &AssertionCandidate) {
        match candidate.apply_status {
            Some(ApplyStatus::Applied) => {
                self.applied += 1;
                if candidate.forced_by_coverage {
                    self.forced += 1;
                }
            }
            Some(ApplyStatus::SkippedLowConfidence) => self.skipped_low_confidence += 1,
            Some(ApplyStatus::SkippedPolicy) => self.skipped_policy += 1,
            Some(ApplyStatus::SkippedRuntimeFailure) => self.skipped_runtime_failure += 1,
            Some(ApplyStatus::SkippedExisting) => self.skipped_existing += 1,
            Some(ApplyStatus::NotRequested) => self.not_requested += 1,
            None => {}
        }
    }
}

/// Result of [`run_assertion_pass`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionPassReport {
    /// Input steps with applied assertions inserted
    pub output_steps: Vec<Step>,
    /// Every surviving candidate with its disposition, in step order
    pub assertion_candidates: Vec<AssertionCandidate>,
    /// Diagnostics in emission order
    pub diagnostics: Diagnostics,
    /// Counters
    pub counters: AssertionPassCounters,
}

impl AssertionPassReport {
    /// Pretty JSON rendering
    pub fn to_json(&self) -> RefineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Candidates with the given disposition
    pub fn with_status(&self, status: ApplyStatus) -> impl Iterator<Item = &AssertionCandidate> {
        self.assertion_candidates
            .iter()
            .filter(move |c| c.apply_status == Some(status))
    }
}

async fn observe(
    page: Option<&dyn PageHandle>,
    snapshot: Option<AssertionSource>,
    options: &PassOptions,
    diagnostics: &mut Diagnostics,
    counters: &mut AssertionPassCounters,
) -> Observation {
    let Some(page) = page else {
        return Observation::default();
    };
    let probe = options.policy.scoring.probe_timeout();
    let url = bounded(probe, page.current_url()).await.unwrap_or_else(|e| {
        debug!(error = %e, "url read failed");
        String::new()
    });
    let title = bounded(probe, page.title()).await.unwrap_or_else(|e| {
        debug!(error = %e, "title read failed");
        String::new()
    });

    let nodes = match snapshot {
        None => None,
        Some(source) => {
            let timeout = options.policy.assertions.validation_timeout();
            match bounded(timeout, page.capture_snapshot(source)).await {
                Ok(text) => {
                    let parsed = parse_snapshot(&text);
                    if parsed.skipped_lines > 0 {
                        diagnostics.info(
                            codes::SNAPSHOT_LINES_SKIPPED,
                            format!("{} unparseable snapshot lines skipped", parsed.skipped_lines),
                        );
                    }
                    Some(parsed.nodes)
                }
                Err(e) => {
                    counters.snapshot_failures += 1;
                    diagnostics.warn(
                        codes::SNAPSHOT_CAPTURE_FAILED,
                        format!("{} snapshot capture failed: {e}", source.as_str()),
                    );
                    None
                }
            }
        }
    };
    Observation { url, title, nodes }
}

async fn element_facts(
    page: Option<&dyn PageHandle>,
    step: &Step,
    options: &PassOptions,
) -> Option<ElementFacts> {
    let (page, target) = (page?, step.target()?);
    let probe = options.policy.scoring.probe_timeout();
    match bounded(probe, page.describe_element(target)).await {
        Ok(facts) => facts,
        Err(e) => {
            debug!(target = %target.value, error = %e, "describe_element failed");
            None
        }
    }
}

/// Infer, rate, select and optionally insert assertions for every step.
///
/// Each step is replayed exactly once. The page is observed before and
/// after the step (and after a bounded network idle wait); candidates are
/// built from the action itself and, for snapshot sources, from the
/// difference between the two snapshots.
///
/// # Errors
///
/// Only malformed steps, invalid options or an unusable page are errors;
/// everything else is reported through diagnostics.
#[instrument(skip_all, fields(steps = steps.len(), live = page.is_some()))]
pub async fn run_assertion_pass(
    steps: &[Step],
    mut page: Option<&mut dyn PageHandle>,
    options: &PassOptions,
) -> RefineResult<AssertionPassReport> {
    options.validate()?;
    validate_steps(steps)?;
    let detector = SignalDetector::new(&options.policy.signals)?;
    let mut diagnostics = Diagnostics::new();
    let mut counters = AssertionPassCounters::default();

    if options.assertion_mode == AssertionMode::None {
        debug!("assertion mode none; steps returned unchanged");
        return Ok(AssertionPassReport {
            output_steps: steps.to_vec(),
            assertion_candidates: Vec::new(),
            diagnostics,
            counters,
        });
    }
    if let Some(page) = page.as_deref() {
        ensure_usable(page, options.policy.scoring.probe_timeout()).await?;
    }

    let requested = options.assertion_source;
    let snapshot = match page.as_deref() {
        Some(p) if requested.is_snapshot() && !p.capabilities().supports_snapshot(requested) => {
            warn!(source = requested.as_str(), "snapshot source unsupported by page");
            diagnostics.warn(
                codes::SNAPSHOT_CAPTURE_FAILED,
                format!(
                    "{} snapshots unsupported by this page; using deterministic candidates only",
                    requested.as_str()
                ),
            );
            None
        }
        Some(_) if requested.is_snapshot() => Some(requested),
        _ => None,
    };
    if page.is_none() && options.apply_assertions {
        diagnostics.info(
            codes::ASSERTION_NO_PAGE,
            "no page given; selected assertions cannot be validated",
        );
    }

    let assertions = &options.policy.assertions;
    let mut sequence = StepSequence::new(steps.to_vec());
    let mut all_candidates = Vec::new();
    let mut previous: Option<Observation> = None;

    for (index, step) in steps.iter().enumerate() {
        counters.steps += 1;
        let before = match previous.take() {
            Some(observation) => observation,
            None => {
                observe(
                    page.as_deref(),
                    snapshot,
                    options,
                    &mut diagnostics,
                    &mut counters,
                )
                .await
            }
        };
        let facts = element_facts(page.as_deref(), step, options).await;

        let mut idle_failed = false;
        if let Some(page) = page.as_deref_mut() {
            let timeout = step.timeout().unwrap_or_else(|| assertions.step_timeout());
            if let Err(e) = bounded(timeout, page.execute_step(step, timeout)).await {
                counters.step_failures += 1;
                diagnostics.warn(
                    codes::STEP_EXECUTION_FAILED,
                    format!("step {index} ({}) failed: {e}", step.action.name()),
                );
            }
            let idle = assertions.network_idle_timeout();
            if let Err(e) = bounded(idle, page.wait_for_network_idle(idle)).await {
                idle_failed = true;
                counters.network_idle_timeouts += 1;
                diagnostics.warn(
                    codes::NETWORK_IDLE_TIMEOUT,
                    format!("step {index}: network idle wait failed: {e}"),
                );
            }
        }
        let after = observe(
            page.as_deref(),
            snapshot,
            options,
            &mut diagnostics,
            &mut counters,
        )
        .await;

        let after_navigation = step.action.is_navigation()
            || (!after.url.is_empty() && !before.url.is_empty() && before.url != after.url);
        let navigation_like = step
            .target()
            .is_some_and(|t| is_navigation_like(t, facts.as_ref(), &detector));

        let mut generated =
            deterministic_candidates(index, step, navigation_like, after_navigation, assertions);
        if let Some(source) = snapshot {
            generated.extend(snapshot_candidates(
                index,
                step,
                &before,
                &after,
                after_navigation,
                source,
                &detector,
                assertions,
            ));
        }
        let mut generated = dedup_candidates(generated);
        counters.generated += generated.len();
        for candidate in &mut generated {
            assess(candidate, assertions, &detector);
        }

        let mut kept = Vec::with_capacity(generated.len());
        for candidate in generated {
            match hard_filter_signal(&candidate) {
                Some(signal) => {
                    counters.filtered += 1;
                    diagnostics.info(
                        codes::ASSERTION_FILTERED_DYNAMIC,
                        format!(
                            "step {index}: {} dropped for {signal} content",
                            candidate.candidate.action.name()
                        ),
                    );
                }
                None => kept.push(candidate),
            }
        }

        let outcome = cap_step(kept, &options.volume_caps, after_navigation);
        for capped in &outcome.capped {
            counters.capped += 1;
            diagnostics.info(
                codes::ASSERTION_CAPPED,
                format!(
                    "step {index}: {} on {} dropped by volume cap",
                    capped.candidate.action.name(),
                    capped.candidate.action.subject_key()
                ),
            );
        }

        let mut ranked = outcome.kept;
        let decisions = plan_step(&ranked, options.confidence_threshold);
        for (candidate, decision) in ranked.iter_mut().zip(decisions) {
            match decision {
                Decision::Skip(status, message) => candidate.finish(status, message),
                Decision::Validate { coverage_required } => {
                    counters.selected += 1;
                    apply_selected(
                        candidate,
                        coverage_required,
                        page.as_deref_mut(),
                        &mut sequence,
                        options,
                        idle_failed,
                        &mut diagnostics,
                    )
                    .await?;
                }
            }
            counters.record(candidate);
        }
        debug!(
            step = index,
            candidates = ranked.len(),
            after_navigation,
            "assertion step analysed"
        );
        all_candidates.extend(ranked);
        previous = Some(after);
    }

    info!(
        generated = counters.generated,
        applied = counters.applied,
        forced = counters.forced,
        "assertion pass complete"
    );
    Ok(AssertionPassReport {
        output_steps: sequence.into_steps(),
        assertion_candidates: all_candidates,
        diagnostics,
        counters,
    })
}
