//! Probar Refine: selector hardening and assertion inference for recorded
//! browser scripts.
//!
//! A recorded script is a list of [`Step`]s. Two passes improve it:
//!
//! - [`run_selector_pass`] proposes sturdier element targets (test ids,
//!   roles, labels) and, on request, writes them into the steps
//! - [`run_assertion_pass`] replays each step once, watches what changed
//!   and inserts the verification steps most likely to stay green
//!
//! Both passes work offline or against one live page behind
//! [`PageHandle`], and report degraded conditions as [`Diagnostics`]
//! instead of failing.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       PROBAR REFINE                              │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  steps ──► selector pass ──► steps' ──► assertion pass ──► steps"│
//! │               │   ▲                        │   ▲                 │
//! │               ▼   │                        ▼   │                 │
//! │      locator_expr / signals          snapshot / signals          │
//! │               │   ▲                        │   ▲                 │
//! │               ▼   │                        ▼   │                 │
//! │            PageHandle (live page or MockPage)                    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use probar_refine::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> RefineResult<()> {
//! let steps = vec![Step::fill(Target::css("#email"), "a@b.test")];
//! let mut page = MockPage::new().with_element(MockElement::new("#email"));
//! let options = PassOptions::new().with_apply_assertions(true);
//!
//! let report = run_assertion_pass(&steps, Some(&mut page), &options).await?;
//! assert_eq!(report.output_steps.len(), 2);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

/// Assertion inference, rating and insertion
pub mod assertions;
/// Structured, non-fatal pass diagnostics
pub mod diagnostics;
/// Locator expression parsing, allowlisting and replay
pub mod locator_expr;
/// Live page contract, selector resolvers and the mock page
pub mod page;
/// Pass options and tunables
pub mod policy;
mod result;
/// Selector candidate generation, scoring and selection
pub mod selector;
/// Dynamic-content detection
pub mod signals;
/// Accessibility snapshot parsing and diffing
pub mod snapshot;
/// Script steps and targets
pub mod step;

pub use assertions::{
    run_assertion_pass, ApplyStatus, AssertionCandidate, AssertionPassCounters,
    AssertionPassReport,
};
pub use diagnostics::{Diagnostic, DiagnosticLevel, Diagnostics};
pub use page::{ElementFacts, MockElement, MockPage, PageCapabilities, PageHandle, PageState};
pub use policy::{
    AssertionMode, AssertionPolicy, AssertionSource, PassOptions, RefinePolicy, ScoringPolicy,
    SignalPenalties, SignalPolicy, VolumeCaps,
};
pub use result::{RefineError, RefineResult};
pub use selector::{
    run_selector_pass, Recommendation, RecommendationStatus, SelectorPassCounters,
    SelectorPassReport, SelectorStepReport,
};
pub use signals::{DynamicSignal, SignalDetector, SignalSet};
pub use step::{Step, StepAction, StepSequence, Target, TargetKind, TargetSource};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::assertions::*;
    pub use super::diagnostics::*;
    pub use super::page::*;
    pub use super::policy::*;
    pub use super::result::*;
    pub use super::selector::*;
    pub use super::signals::*;
    pub use super::snapshot::*;
    pub use super::step::*;
}
