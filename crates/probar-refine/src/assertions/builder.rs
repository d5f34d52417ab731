//! Assertion candidate generation.
//!
//! Deterministic rules key off the action alone. Snapshot rules read the
//! diff between the page before and after the action.

use std::cmp::Ordering;
use std::collections::HashMap;

use super::AssertionCandidate;
use crate::locator_expr::{LocatorCall, LocatorChain, RoleOptions, TextMatch};
use crate::page::ElementFacts;
use crate::policy::{AssertionPolicy, AssertionSource};
use crate::selector::to_locator_chain;
use crate::signals::{with_navigation_context, SignalDetector, SignalSet};
use crate::snapshot::{diff_snapshots, AriaRole, SnapshotNode};
use crate::step::{Step, StepAction, Target, TargetKind, TargetSource};

/// What the pass saw of the page at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    /// URL
    pub url: String,
    /// Title
    pub title: String,
    /// Snapshot nodes; `None` when no snapshot was captured
    pub nodes: Option<Vec<SnapshotNode>>,
}

/// Derived `getByRole` target for a snapshot node
#[must_use]
pub fn role_target(role: &AriaRole, name: Option<&str>) -> Target {
    let options = name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map_or_else(RoleOptions::default, RoleOptions::named);
    let chain = LocatorChain::new(vec![LocatorCall::GetByRole {
        role: role.as_str().to_string(),
        options,
    }]);
    Target::new(chain.to_expression(), TargetKind::LocatorExpression)
        .with_source(TargetSource::Derived)
}

fn link_name(target: &Target) -> Option<String> {
    let chain = to_locator_chain(&target.value, target.kind).ok()?;
    chain.calls.iter().find_map(|call| match call {
        LocatorCall::GetByRole { role, options } if role.eq_ignore_ascii_case("link") => {
            options.name.as_ref().and_then(TextMatch::as_text).map(str::to_string)
        }
        _ => None,
    })
}

/// Whether activating the target is expected to navigate away, so the
/// element itself will not be there to assert on afterwards.
///
/// True for links whose name reads like a headline, news item, date or
/// long text, and for anything whose text matches a content-card pattern.
#[must_use]
pub fn is_navigation_like(
    target: &Target,
    facts: Option<&ElementFacts>,
    detector: &SignalDetector,
) -> bool {
    if link_name(target).is_some_and(|name| detector.is_navigation_like_link_name(&name)) {
        return true;
    }
    let Some(facts) = facts else {
        return false;
    };
    let is_link = facts
        .role
        .as_deref()
        .is_some_and(|r| r.eq_ignore_ascii_case("link"));
    if is_link
        && facts
            .name
            .as_deref()
            .is_some_and(|n| detector.is_navigation_like_link_name(n))
    {
        return true;
    }
    [&facts.text, &facts.name]
        .into_iter()
        .flatten()
        .any(|t| detector.is_content_card(t))
}

fn step(action: StepAction) -> Step {
    Step::new(action)
}

/// Action-keyed candidates for one step
#[must_use]
pub fn deterministic_candidates(
    step_index: usize,
    after: &Step,
    navigation_like: bool,
    after_navigation: bool,
    policy: &AssertionPolicy,
) -> Vec<AssertionCandidate> {
    let source = AssertionSource::Deterministic;
    let context = with_navigation_context(SignalSet::new(), after_navigation);
    let candidate = match &after.action {
        StepAction::Fill { target, value } | StepAction::Select { target, value } => {
            AssertionCandidate::new(
                step_index,
                after,
                step(StepAction::AssertValue {
                    target: target.clone(),
                    value: value.clone(),
                }),
                policy.confidence_value,
                format!("{} sets the value", after.action.name()),
                source,
            )
        }
        StepAction::Check { target } | StepAction::Uncheck { target } => {
            let checked = matches!(after.action, StepAction::Check { .. });
            AssertionCandidate::new(
                step_index,
                after,
                step(StepAction::AssertChecked {
                    target: target.clone(),
                    checked,
                }),
                policy.confidence_checked,
                format!("{} sets the checked state", after.action.name()),
                source,
            )
        }
        StepAction::Click { target }
        | StepAction::Dblclick { target }
        | StepAction::Hover { target }
        | StepAction::Press { target, .. } => {
            if navigation_like {
                return Vec::new();
            }
            AssertionCandidate::new(
                step_index,
                after,
                step(StepAction::AssertVisible {
                    target: target.clone(),
                }),
                policy.confidence_coverage_fallback,
                "element still visible after interaction",
                source,
            )
            .fallback()
        }
        _ => return Vec::new(),
    };
    vec![candidate.with_signals(context)]
}

fn by_rank(a: &&SnapshotNode, b: &&SnapshotNode) -> Ordering {
    a.role.high_signal_rank().cmp(&b.role.high_signal_rank())
}

/// Snapshot-diff candidates for one step.
///
/// URL and title changes only need the two observations; node rules run
/// when both sides carry snapshot nodes.
#[allow(clippy::too_many_arguments)]
#[must_use]
pub fn snapshot_candidates(
    step_index: usize,
    after: &Step,
    before_obs: &Observation,
    after_obs: &Observation,
    after_navigation: bool,
    source: AssertionSource,
    detector: &SignalDetector,
    policy: &AssertionPolicy,
) -> Vec<AssertionCandidate> {
    let context = || with_navigation_context(SignalSet::new(), after_navigation);
    let text_signals =
        |text: &str| with_navigation_context(detector.detect_text(text), after_navigation);
    let mut out = Vec::new();

    if !after_obs.url.is_empty() && before_obs.url != after_obs.url {
        out.push(
            AssertionCandidate::new(
                step_index,
                after,
                step(StepAction::AssertUrl {
                    url: after_obs.url.clone(),
                }),
                policy.confidence_url,
                format!("url changed to {}", after_obs.url),
                source,
            )
            .with_signals(context()),
        );
    }
    let title = after_obs.title.trim();
    if !title.is_empty() && before_obs.title.trim() != title {
        out.push(
            AssertionCandidate::new(
                step_index,
                after,
                step(StepAction::AssertTitle {
                    title: title.to_string(),
                }),
                policy.confidence_title,
                "title changed",
                source,
            )
            .with_signals(text_signals(title)),
        );
    }

    let (Some(before_nodes), Some(after_nodes)) = (&before_obs.nodes, &after_obs.nodes) else {
        return out;
    };
    let diff = diff_snapshots(before_nodes, after_nodes);

    let mut high_signal: Vec<&SnapshotNode> = diff
        .appeared
        .iter()
        .filter(|n| n.visible && n.role.is_high_signal())
        .collect();
    high_signal.sort_by(by_rank);
    for node in high_signal {
        let Some(text) = node.label() else { continue };
        out.push(
            AssertionCandidate::new(
                step_index,
                after,
                step(StepAction::AssertText {
                    target: role_target(&node.role, node.name.as_deref()),
                    text: text.to_string(),
                }),
                policy.confidence_appeared_text,
                format!("{} appeared", node.role),
                source,
            )
            .with_role(node.role.clone())
            .with_signals(text_signals(text)),
        );
    }

    for node in diff
        .unchanged
        .iter()
        .filter(|n| n.visible && n.role.is_stable_structural())
    {
        out.push(
            AssertionCandidate::new(
                step_index,
                after,
                step(StepAction::AssertVisible {
                    target: role_target(&node.role, node.name.as_deref()),
                }),
                policy.confidence_structural,
                format!("{} landmark stayed in place", node.role),
                source,
            )
            .structural()
            .with_role(node.role.clone())
            .with_signals(context()),
        );
    }

    for node in diff.appeared.iter().filter(|n| {
        n.visible
            && !n.role.is_high_signal()
            && (n.role == AriaRole::Dialog || n.role.is_form_control())
            && n.name.as_deref().is_some_and(|name| !name.trim().is_empty())
    }) {
        out.push(
            AssertionCandidate::new(
                step_index,
                after,
                step(StepAction::AssertVisible {
                    target: role_target(&node.role, node.name.as_deref()),
                }),
                policy.confidence_appeared_visible,
                format!("{} appeared", node.role),
                source,
            )
            .with_role(node.role.clone())
            .with_signals(context()),
        );
    }

    for change in &diff.changed {
        let node = &change.after;
        if change.text_changed && node.role.is_live_region() {
            if let Some(text) = node.label() {
                out.push(
                    AssertionCandidate::new(
                        step_index,
                        after,
                        step(StepAction::AssertText {
                            target: role_target(&node.role, node.name.as_deref()),
                            text: text.to_string(),
                        }),
                        policy.confidence_changed_text,
                        format!("{} text changed", node.role),
                        source,
                    )
                    .with_role(node.role.clone())
                    .with_signals(text_signals(text)),
                );
            }
        }
        if change.became_enabled() && node.role.is_form_control() {
            out.push(
                AssertionCandidate::new(
                    step_index,
                    after,
                    step(StepAction::AssertEnabled {
                        target: role_target(&node.role, node.name.as_deref()),
                        enabled: true,
                    }),
                    policy.confidence_enabled,
                    format!("{} became enabled", node.role),
                    source,
                )
                .with_role(node.role.clone())
                .with_signals(context()),
            );
        }
    }
    out
}

const fn source_rank(source: AssertionSource) -> u8 {
    match source {
        AssertionSource::SnapshotNative => 2,
        AssertionSource::SnapshotCli => 1,
        AssertionSource::Deterministic => 0,
    }
}

/// Whether `challenger` should replace `incumbent` under the dedup law
fn outranks(challenger: &AssertionCandidate, incumbent: &AssertionCandidate) -> bool {
    if challenger.coverage_fallback != incumbent.coverage_fallback {
        return !challenger.coverage_fallback;
    }
    match challenger.confidence.total_cmp(&incumbent.confidence) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => {
            source_rank(challenger.candidate_source) > source_rank(incumbent.candidate_source)
        }
    }
}

/// Keep one candidate per `(step, action, subject)`.
///
/// Preference: non-fallback, then higher confidence, then snapshot over
/// deterministic, then whichever came first. The survivor takes the slot
/// of the first candidate with its key.
#[must_use]
pub fn dedup_candidates(candidates: Vec<AssertionCandidate>) -> Vec<AssertionCandidate> {
    let mut slots: HashMap<(usize, &'static str, String), usize> = HashMap::new();
    let mut out: Vec<AssertionCandidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match slots.get(&candidate.dedup_key()) {
            Some(&slot) => {
                if outranks(&candidate, &out[slot]) {
                    out[slot] = candidate;
                }
            }
            None => {
                slots.insert(candidate.dedup_key(), out.len());
                out.push(candidate);
            }
        }
    }
    out
}
