//! Selector hardening.
//!
//! For every step that acts on an element the pass generates alternative
//! targets, scores them (probing the live page when there is one) and
//! recommends a replacement when it is clearly better than the recorded
//! selector.
//!
//! ```text
//! Target ──► candidates ──► scoring ──► selection ──► SelectorStepReport
//!              │  ▲
//!              ▼  │
//!            repair (public tier, then internal tier)
//! ```

mod candidates;
mod convert;
mod pass;
mod repair;
mod scoring;
mod selection;

pub use candidates::{
    a11y_chains, candidate_id, generate_candidates, reasons, CandidateOrigin, CandidateSet,
    TargetCandidate,
};
pub use convert::{convert_selector, test_id_from_css, to_locator_chain};
pub use pass::{run_selector_pass, SelectorPassCounters, SelectorPassReport, SelectorStepReport};
pub use repair::{runtime_repair, RepairedSelector};
pub use scoring::{
    base_score, dynamic_penalty, score_candidate, score_offline, CandidateScore,
};
pub use selection::{
    rank, recommendation_status, select, Recommendation, RecommendationStatus, SelectionReason,
};
