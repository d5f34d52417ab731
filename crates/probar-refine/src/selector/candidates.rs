//! Candidate generation for one interaction target.
//!
//! Three sources are unioned, in this order:
//!
//! 1. syntactic normalization of the current value (no page needed)
//! 2. locators derived from the element's accessible facts
//! 3. runtime repair, only for targets carrying dynamic signals
//!
//! Candidates dedupe by `(value, kind, frame_path)`; a duplicate only adds
//! its reason code to the existing entry.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::convert::{test_id_from_css, to_locator_chain};
use super::repair::runtime_repair;
use crate::diagnostics::{codes, Diagnostics};
use crate::locator_expr::{
    canonicalize, LocatorCall, LocatorChain, RoleOptions, TextLookup, TextMatch, TextQuery,
};
use crate::page::{bounded, ElementFacts, PageHandle, RepairTier};
use crate::policy::PassOptions;
use crate::signals::SignalDetector;
use crate::step::{Target, TargetKey, TargetKind, TargetSource};

/// Provenance tags recorded on candidates
#[allow(missing_docs)]
pub mod reasons {
    pub const CURRENT: &str = "current";
    pub const NORMALIZED_EXPRESSION: &str = "normalized_locator_expression";
    pub const CONVERTED_ENGINE: &str = "converted_engine_selector";
    pub const CONVERTED_TEST_ID: &str = "converted_test_id_css";
    pub const A11Y_ROLE_NAME: &str = "a11y_role_name";
    pub const A11Y_LABEL: &str = "a11y_label";
    pub const A11Y_PLACEHOLDER: &str = "a11y_placeholder";
    pub const A11Y_TEXT: &str = "a11y_text";
    pub const A11Y_TEST_ID: &str = "a11y_test_id";
    pub const REPAIR_PUBLIC: &str = "runtime_repair_public";
    pub const REPAIR_INTERNAL: &str = "runtime_repair_internal";
}

/// Whether a candidate is the recorded target or an alternative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateOrigin {
    /// The step's recorded target
    Current,
    /// Generated alternative
    Derived,
}

/// One alternative target for a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetCandidate {
    /// Deterministic id derived from the dedup key
    pub id: String,
    /// Target
    pub target: Target,
    /// Origin
    pub origin: CandidateOrigin,
    /// Provenance tags, in the order they were added
    pub reason_codes: Vec<String>,
}

impl TargetCandidate {
    /// Create a candidate
    #[must_use]
    pub fn new(target: Target, origin: CandidateOrigin, reason: &str) -> Self {
        Self {
            id: candidate_id(&target.key()),
            target,
            origin,
            reason_codes: vec![reason.to_string()],
        }
    }

    /// Whether the candidate came from runtime repair
    #[must_use]
    pub fn is_runtime_repair(&self) -> bool {
        self.reason_codes
            .iter()
            .any(|r| r == reasons::REPAIR_PUBLIC || r == reasons::REPAIR_INTERNAL)
    }

    /// Whether this is the recorded target
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.origin == CandidateOrigin::Current
    }
}

/// `cand-` plus the first 12 hex digits of the key's SHA-256
#[must_use]
pub fn candidate_id(key: &TargetKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.kind.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(key.value.as_bytes());
    for frame in &key.frame_path {
        hasher.update(b"\x1f");
        hasher.update(frame.as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    format!("cand-{}", &digest[..12])
}

/// Ordered, deduplicated candidate list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateSet {
    candidates: Vec<TargetCandidate>,
}

impl CandidateSet {
    /// Empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target; returns `false` when an equal key was already present
    pub fn push(&mut self, target: Target, origin: CandidateOrigin, reason: &str) -> bool {
        let key = target.key();
        if let Some(existing) = self.candidates.iter_mut().find(|c| c.target.key() == key) {
            if !existing.reason_codes.iter().any(|r| r == reason) {
                existing.reason_codes.push(reason.to_string());
            }
            return false;
        }
        self.candidates
            .push(TargetCandidate::new(target, origin, reason));
        true
    }

    /// Number of candidates
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Candidates in generation order
    #[must_use]
    pub fn as_slice(&self) -> &[TargetCandidate] {
        &self.candidates
    }

    /// Consume into the candidate list
    #[must_use]
    pub fn into_vec(self) -> Vec<TargetCandidate> {
        self.candidates
    }
}

/// Locator chains suggested by an element's accessible facts
#[must_use]
pub fn a11y_chains(
    facts: &ElementFacts,
    max_text_chars: usize,
) -> Vec<(LocatorChain, &'static str)> {
    let non_empty = |s: &Option<String>| {
        s.as_deref()
            .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|v| !v.is_empty())
    };
    let mut chains = Vec::new();
    if let (Some(role), Some(name)) = (non_empty(&facts.role), non_empty(&facts.name)) {
        chains.push((
            LocatorChain::new(vec![LocatorCall::GetByRole {
                role,
                options: RoleOptions::named(name),
            }]),
            reasons::A11Y_ROLE_NAME,
        ));
    }
    let lookups = [
        (&facts.label, TextLookup::Label, reasons::A11Y_LABEL),
        (&facts.placeholder, TextLookup::Placeholder, reasons::A11Y_PLACEHOLDER),
    ];
    for (value, lookup, reason) in lookups {
        if let Some(text) = non_empty(value) {
            chains.push((
                LocatorChain::new(vec![LocatorCall::GetBy {
                    lookup,
                    query: TextQuery::text(text),
                }]),
                reason,
            ));
        }
    }
    if let Some(text) = non_empty(&facts.text).filter(|t| t.chars().count() <= max_text_chars) {
        chains.push((
            LocatorChain::new(vec![LocatorCall::GetBy {
                lookup: TextLookup::Text,
                query: TextQuery::text(text),
            }]),
            reasons::A11Y_TEXT,
        ));
    }
    if let Some(id) = non_empty(&facts.test_id) {
        chains.push((
            LocatorChain::new(vec![LocatorCall::GetByTestId(TextMatch::Text(id))]),
            reasons::A11Y_TEST_ID,
        ));
    }
    chains
}

fn derived(current: &Target, expression: String, detector: &SignalDetector) -> Target {
    let signals = detector.detect_selector(&expression);
    let target = Target::new(expression, TargetKind::LocatorExpression)
        .with_source(TargetSource::Derived)
        .with_frame_path(current.frame_path.clone());
    if signals.is_empty() {
        target
    } else {
        target.with_dynamic_signals(signals)
    }
}

fn normalize(
    current: &Target,
    set: &mut CandidateSet,
    detector: &SignalDetector,
    diagnostics: &mut Diagnostics,
) {
    match current.kind {
        TargetKind::LocatorExpression => match canonicalize(&current.value) {
            Ok(canonical) => {
                if canonical != current.value {
                    set.push(
                        derived(current, canonical, detector),
                        CandidateOrigin::Derived,
                        reasons::NORMALIZED_EXPRESSION,
                    );
                }
            }
            Err(e) => diagnostics.warn(
                codes::EXPRESSION_REJECTED,
                format!("locator expression `{}` not used: {e}", current.value),
            ),
        },
        TargetKind::EngineSelector | TargetKind::EngineInternal => {
            match to_locator_chain(&current.value, current.kind) {
                Ok(chain) => {
                    set.push(
                        derived(current, chain.to_expression(), detector),
                        CandidateOrigin::Derived,
                        reasons::CONVERTED_ENGINE,
                    );
                }
                Err(e) => {
                    debug!(value = %current.value, error = %e, "engine selector not convertible");
                }
            }
        }
        TargetKind::Css => {
            if let Some(id) = test_id_from_css(&current.value) {
                let chain = LocatorChain::new(vec![LocatorCall::GetByTestId(TextMatch::Text(id))]);
                set.push(
                    derived(current, chain.to_expression(), detector),
                    CandidateOrigin::Derived,
                    reasons::CONVERTED_TEST_ID,
                );
            }
        }
        TargetKind::Xpath | TargetKind::Unknown => {}
    }
}

/// Generate candidates for `current`.
///
/// The current target is always the first candidate. Without a page only
/// syntactic normalization runs; probe and repair failures become
/// diagnostics and never abort generation.
pub async fn generate_candidates(
    current: &Target,
    page: Option<&dyn PageHandle>,
    options: &PassOptions,
    detector: &SignalDetector,
    diagnostics: &mut Diagnostics,
) -> CandidateSet {
    let mut set = CandidateSet::new();
    set.push(current.clone(), CandidateOrigin::Current, reasons::CURRENT);
    normalize(current, &mut set, detector, diagnostics);

    let scoring = &options.policy.scoring;
    if let Some(page) = page {
        match bounded(scoring.probe_timeout(), page.describe_element(current)).await {
            Ok(Some(facts)) => {
                for (chain, reason) in a11y_chains(&facts, scoring.max_text_candidate_chars) {
                    set.push(
                        derived(current, chain.to_expression(), detector),
                        CandidateOrigin::Derived,
                        reason,
                    );
                }
            }
            Ok(None) => debug!(value = %current.value, "accessibility probe found no element"),
            Err(e) => diagnostics.warn(
                codes::PROBE_FAILED,
                format!("accessibility probe of `{}` failed: {e}", current.value),
            ),
        }
    }

    if current.is_dynamic() {
        for repaired in runtime_repair(current, page, options, diagnostics).await {
            let reason = match repaired.tier {
                RepairTier::Public => reasons::REPAIR_PUBLIC,
                RepairTier::Internal => reasons::REPAIR_INTERNAL,
            };
            set.push(
                derived(current, repaired.expression, detector),
                CandidateOrigin::Derived,
                reason,
            );
        }
    }
    set
}
