//! Stability scoring, hard filtering and per-step volume caps.

use super::AssertionCandidate;
use crate::policy::{AssertionPolicy, SignalPenalties, VolumeCaps};
use crate::signals::{DynamicSignal, SignalDetector};
use crate::snapshot::AriaRole;
use crate::step::StepAction;

/// Volume bucket an assertion counts against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeKind {
    /// `assertText`
    Text,
    /// `assertVisible`
    Visible,
    /// `assertValue`, `assertChecked`, `assertEnabled`
    State,
    /// `assertUrl`, `assertTitle`; not capped
    Page,
}

impl VolumeKind {
    /// Bucket of an assertion action
    #[must_use]
    pub const fn of(action: &StepAction) -> Self {
        match action {
            StepAction::AssertText { .. } => Self::Text,
            StepAction::AssertVisible { .. } => Self::Visible,
            StepAction::AssertValue { .. }
            | StepAction::AssertChecked { .. }
            | StepAction::AssertEnabled { .. } => Self::State,
            _ => Self::Page,
        }
    }

    const fn cap(self, caps: &VolumeCaps) -> Option<usize> {
        match self {
            Self::Text => Some(caps.text),
            Self::Visible => Some(caps.visible),
            Self::State => Some(caps.state),
            Self::Page => None,
        }
    }
}

const fn signal_penalty(signal: DynamicSignal, penalties: &SignalPenalties) -> f64 {
    match signal {
        DynamicSignal::NavigateContext => 0.0,
        DynamicSignal::LongText => penalties.long_text,
        DynamicSignal::ExactTrue => penalties.exact_true,
        DynamicSignal::ContainsNumericFragment => penalties.numeric,
        DynamicSignal::ContainsDateOrTimeFragment => penalties.date_or_time,
        DynamicSignal::ContainsWeatherOrNewsFragment => penalties.weather_or_news,
        DynamicSignal::ContainsHeadlineLikeText => penalties.headline,
        DynamicSignal::ContainsPipeSeparator => penalties.pipe,
    }
}

/// Compute and store the stability score of `candidate`
pub fn assess(
    candidate: &mut AssertionCandidate,
    policy: &AssertionPolicy,
    detector: &SignalDetector,
) {
    let mut score = candidate.confidence;
    if candidate.after_navigation() {
        score -= policy.after_navigation_penalty;
    }
    if candidate.candidate_source.is_snapshot() {
        score -= policy.snapshot_penalty;
    }

    match &candidate.candidate.action {
        StepAction::AssertValue { .. } | StepAction::AssertChecked { .. } => {
            score += policy.value_checked_bonus;
        }
        StepAction::AssertEnabled { .. } => score += policy.enabled_bonus,
        StepAction::AssertUrl { .. } | StepAction::AssertTitle { .. } => {
            score += policy.url_title_bonus;
        }
        StepAction::AssertText { text, .. } => {
            let len = text.trim().chars().count();
            if (policy.text_length_min..=policy.text_length_max).contains(&len) {
                score += policy.text_length_bonus;
            }
            if detector.is_long(text) {
                score -= policy.long_text_penalty;
                candidate
                    .dynamic_signals
                    .get_or_insert_with(Default::default)
                    .insert(DynamicSignal::LongText);
            }
        }
        StepAction::AssertVisible { .. } => {
            if candidate.stable_structural {
                score += policy.structural_adjustment;
            } else {
                score -= policy.structural_adjustment;
            }
        }
        _ => {}
    }

    if candidate
        .target_role
        .as_ref()
        .is_some_and(AriaRole::is_high_signal)
    {
        score += policy.high_signal_role_bonus;
    }

    let penalties = &policy.signal_penalties;
    let signal_total: f64 = candidate
        .dynamic_signals
        .iter()
        .flatten()
        .map(|s| signal_penalty(*s, penalties))
        .sum();
    score -= signal_total.min(penalties.cap);

    candidate.stability_score = Some(score.clamp(0.0, 1.0));
}

/// The tag that disqualifies a snapshot-sourced text assertion, if any
#[must_use]
pub fn hard_filter_signal(candidate: &AssertionCandidate) -> Option<DynamicSignal> {
    if !candidate.candidate_source.is_snapshot()
        || !matches!(candidate.candidate.action, StepAction::AssertText { .. })
    {
        return None;
    }
    candidate
        .dynamic_signals
        .iter()
        .flatten()
        .copied()
        .find(|s| s.hard_filters_snapshot_text())
}

/// Result of [`cap_step`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapOutcome {
    /// Survivors, best first
    pub kept: Vec<AssertionCandidate>,
    /// Dropped by a cap, best first
    pub capped: Vec<AssertionCandidate>,
}

/// Rank one step's candidates by stability and apply the volume caps.
///
/// Snapshot-sourced candidates are limited first (fewer after a
/// navigation); per-kind caps then count only candidates that survived.
#[must_use]
pub fn cap_step(
    mut candidates: Vec<AssertionCandidate>,
    caps: &VolumeCaps,
    after_navigation: bool,
) -> CapOutcome {
    candidates.sort_by(|a, b| b.stability().total_cmp(&a.stability()));
    let snapshot_cap = if after_navigation {
        caps.snapshot_after_navigation
    } else {
        caps.snapshot_default
    };
    let mut snapshot_used = 0;
    let mut used = [0usize; 3];
    let mut outcome = CapOutcome::default();
    for candidate in candidates {
        let snapshot = candidate.candidate_source.is_snapshot();
        if snapshot && snapshot_used >= snapshot_cap {
            outcome.capped.push(candidate);
            continue;
        }
        let kind = VolumeKind::of(&candidate.candidate.action);
        let slot = match kind {
            VolumeKind::Text => Some(0),
            VolumeKind::Visible => Some(1),
            VolumeKind::State => Some(2),
            VolumeKind::Page => None,
        };
        if let (Some(slot), Some(cap)) = (slot, kind.cap(caps)) {
            if used[slot] >= cap {
                outcome.capped.push(candidate);
                continue;
            }
            used[slot] += 1;
        }
        if snapshot {
            snapshot_used += 1;
        }
        outcome.kept.push(candidate);
    }
    outcome
}
