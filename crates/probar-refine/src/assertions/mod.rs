//! Assertion inference.
//!
//! Each interaction is replayed once. Around it the pass observes the page
//! (URL, title and, for snapshot sources, an accessibility snapshot), turns
//! what it saw into proposed verification steps, rates them for
//! flakiness and merges the survivors back into the script.
//!
//! ```text
//! observe ─► step ─► network idle ─► observe
//!                                      │
//!   builder ─► dedup ─► stability (filter, rank, cap) ─► apply (validate, insert)
//! ```

mod apply;
mod builder;
mod pass;
mod stability;

pub use apply::{plan_step, Decision};
pub use builder::{
    dedup_candidates, deterministic_candidates, is_navigation_like, role_target,
    snapshot_candidates, Observation,
};
pub use pass::{run_assertion_pass, AssertionPassCounters, AssertionPassReport};
pub use stability::{assess, cap_step, hard_filter_signal, CapOutcome, VolumeKind};

use serde::{Deserialize, Serialize};

use crate::policy::AssertionSource;
use crate::signals::{DynamicSignal, SignalSet};
use crate::snapshot::AriaRole;
use crate::step::Step;

/// Final disposition of an assertion candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStatus {
    /// Inserted into the output steps
    Applied,
    /// Stability below the confidence threshold
    SkippedLowConfidence,
    /// Coverage fallback made redundant by a stronger candidate
    SkippedPolicy,
    /// Runtime validation or the network idle wait failed
    SkippedRuntimeFailure,
    /// An adjacent step already performs the same check
    SkippedExisting,
    /// Selected, but application was not requested
    NotRequested,
}

impl ApplyStatus {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::SkippedLowConfidence => "skipped_low_confidence",
            Self::SkippedPolicy => "skipped_policy",
            Self::SkippedRuntimeFailure => "skipped_runtime_failure",
            Self::SkippedExisting => "skipped_existing",
            Self::NotRequested => "not_requested",
        }
    }
}

impl std::fmt::Display for ApplyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proposed verification step to insert after an interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionCandidate {
    /// Original index of the step it follows
    pub step_index: usize,
    /// Action name of that step
    pub after_action: String,
    /// The assertion itself
    pub candidate: Step,
    /// Generation confidence
    pub confidence: f64,
    /// Why it was proposed
    pub rationale: String,
    /// Which source produced it
    pub candidate_source: AssertionSource,
    /// Confidence after stability adjustments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability_score: Option<f64>,
    /// Tags found in the asserted text, plus navigation context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_signals: Option<SignalSet>,
    /// Visibility of a landmark that was present before and after
    #[serde(default)]
    pub stable_structural: bool,
    /// Generic post-action visibility check
    #[serde(default)]
    pub coverage_fallback: bool,
    /// Role of the asserted element, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_role: Option<AriaRole>,
    /// Final disposition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_status: Option<ApplyStatus>,
    /// Detail for the disposition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_message: Option<String>,
    /// Inserted despite failing validation, to keep step coverage
    #[serde(default)]
    pub forced_by_coverage: bool,
}

impl AssertionCandidate {
    /// New, unassessed candidate
    #[must_use]
    pub fn new(
        step_index: usize,
        after: &Step,
        candidate: Step,
        confidence: f64,
        rationale: impl Into<String>,
        source: AssertionSource,
    ) -> Self {
        Self {
            step_index,
            after_action: after.action.name().to_string(),
            candidate,
            confidence,
            rationale: rationale.into(),
            candidate_source: source,
            stability_score: None,
            dynamic_signals: None,
            stable_structural: false,
            coverage_fallback: false,
            target_role: None,
            apply_status: None,
            apply_message: None,
            forced_by_coverage: false,
        }
    }

    /// Attach signal tags; empty sets are dropped
    #[must_use]
    pub fn with_signals(mut self, signals: SignalSet) -> Self {
        self.dynamic_signals = (!signals.is_empty()).then_some(signals);
        self
    }

    /// Mark as a landmark visibility check
    #[must_use]
    pub const fn structural(mut self) -> Self {
        self.stable_structural = true;
        self
    }

    /// Mark as the generic coverage check
    #[must_use]
    pub const fn fallback(mut self) -> Self {
        self.coverage_fallback = true;
        self
    }

    /// Record the asserted element's role
    #[must_use]
    pub fn with_role(mut self, role: AriaRole) -> Self {
        self.target_role = Some(role);
        self
    }

    /// Whether the candidate was produced right after a navigation
    #[must_use]
    pub fn after_navigation(&self) -> bool {
        self.has_signal(DynamicSignal::NavigateContext)
    }

    /// Whether `signal` is attached
    #[must_use]
    pub fn has_signal(&self, signal: DynamicSignal) -> bool {
        self.dynamic_signals
            .as_ref()
            .is_some_and(|s| s.contains(&signal))
    }

    /// Stability, falling back to confidence before assessment
    #[must_use]
    pub fn stability(&self) -> f64 {
        self.stability_score.unwrap_or(self.confidence)
    }

    /// Dedup identity: step, action and subject
    #[must_use]
    pub fn dedup_key(&self) -> (usize, &'static str, String) {
        (
            self.step_index,
            self.candidate.action.name(),
            self.candidate.action.subject_key(),
        )
    }

    pub(crate) fn finish(&mut self, status: ApplyStatus, message: impl Into<String>) {
        self.apply_status = Some(status);
        self.apply_message = Some(message.into());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::step::{StepAction, Target};

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&ApplyStatus::SkippedRuntimeFailure).unwrap(),
            "\"skipped_runtime_failure\""
        );
        assert_eq!(ApplyStatus::NotRequested.to_string(), "not_requested");
    }

    #[test]
    fn test_candidate_serializes_camel_case() {
        let after = Step::click(Target::css("#go"));
        let check = Step::new(StepAction::AssertVisible {
            target: Target::css("#go"),
        });
        let c = AssertionCandidate::new(
            0,
            &after,
            check,
            0.62,
            "fallback",
            AssertionSource::Deterministic,
        )
        .fallback()
        .with_signals(SignalSet::new());
        assert!(c.dynamic_signals.is_none());
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["afterAction"], "click");
        assert_eq!(json["coverageFallback"], true);
        assert_eq!(json["candidateSource"], "deterministic");
        assert!(json.get("applyStatus").is_none());
    }
}
