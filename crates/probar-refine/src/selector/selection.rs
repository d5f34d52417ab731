//! Deterministic selection among scored candidates.

use serde::{Deserialize, Serialize};

use super::scoring::CandidateScore;
use crate::policy::ScoringPolicy;
use crate::step::Target;

/// Slack on the adoption margin to absorb float rounding
const MARGIN_SLACK: f64 = 1e-9;

/// Why a candidate was chosen over the current target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    /// Score gain met the adoption margin
    ScoreMargin,
    /// Runtime-repair candidate tied with the best score for a dynamic target
    TieRuntimeRepair,
}

/// What the pass does with a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    /// Reported, application not requested
    Recommended,
    /// Written into the output steps
    Applied,
    /// Application requested but the candidate was not runtime-unique
    ReportOnly,
}

/// A proposed replacement target for one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// Chosen candidate id
    pub candidate_id: String,
    /// Replacement target
    pub target: Target,
    /// Replacement score
    pub score: f64,
    /// Score of the current target
    pub current_score: f64,
    /// `score - current_score`
    pub gain: f64,
    /// Why it was chosen
    pub reason: SelectionReason,
    /// Outcome
    pub status: RecommendationStatus,
    /// Live match count of the replacement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_count: Option<usize>,
}

/// Sort by score descending; equal scores keep generation order
#[must_use]
pub fn rank(mut scores: Vec<CandidateScore>) -> Vec<CandidateScore> {
    scores.sort_by(|a, b| b.score.total_cmp(&a.score));
    scores
}

/// Pick a replacement from `ranked` (output of [`rank`]).
///
/// Returns the index into `ranked` and the reason. The top candidate is
/// adopted when its value differs from `current` and it gains at least the
/// adoption margin. Failing that, a dynamic target may still switch to a
/// runtime-repair candidate that is within the tie band of the best score
/// and matched exactly one element.
#[must_use]
pub fn select(
    ranked: &[CandidateScore],
    current: &CandidateScore,
    current_dynamic: bool,
    policy: &ScoringPolicy,
) -> Option<(usize, SelectionReason)> {
    let best = ranked.first()?;
    let differs = |s: &CandidateScore| s.candidate.target.value != current.candidate.target.value;

    if differs(best) && best.score - current.score >= policy.adoption_margin - MARGIN_SLACK {
        return Some((0, SelectionReason::ScoreMargin));
    }
    if !current_dynamic {
        return None;
    }
    ranked
        .iter()
        .position(|s| {
            s.candidate.is_runtime_repair()
                && s.is_unique()
                && differs(s)
                && best.score - s.score <= policy.tie_epsilon
        })
        .map(|i| (i, SelectionReason::TieRuntimeRepair))
}

/// Status of a recommendation given whether application was requested.
///
/// Only a candidate that matched exactly one live element is written back.
#[must_use]
pub const fn recommendation_status(
    candidate: &CandidateScore,
    apply: bool,
) -> RecommendationStatus {
    if !apply {
        RecommendationStatus::Recommended
    } else if candidate.is_unique() {
        RecommendationStatus::Applied
    } else {
        RecommendationStatus::ReportOnly
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::selector::candidates::{reasons, CandidateOrigin, TargetCandidate};

    fn scored(value: &str, score: f64, reason: &str, count: Option<usize>) -> CandidateScore {
        let origin = if reason == reasons::CURRENT {
            CandidateOrigin::Current
        } else {
            CandidateOrigin::Derived
        };
        CandidateScore {
            candidate: TargetCandidate::new(Target::infer(value), origin, reason),
            score,
            base_score: score,
            uniqueness_score: 0.0,
            visibility_score: 0.0,
            match_count: count,
            probed: count.is_some(),
            reason_codes: vec![reason.to_string()],
        }
    }

    mod rank_tests {
        use super::*;

        #[test]
        fn test_rank_is_stable() {
            let ranked = rank(vec![
                scored("#a", 0.5, reasons::CURRENT, None),
                scored("getByText('b')", 0.9, reasons::A11Y_TEXT, None),
                scored("getByLabel('c')", 0.5, reasons::A11Y_LABEL, None),
            ]);
            let order: Vec<_> = ranked
                .iter()
                .map(|s| s.candidate.target.value.as_str())
                .collect();
            assert_eq!(order, vec!["getByText('b')", "#a", "getByLabel('c')"]);
        }
    }

    mod select_tests {
        use super::*;

        #[test]
        fn test_margin_adoption() {
            let p = ScoringPolicy::default();
            let current = scored("#submit", 0.725, reasons::CURRENT, Some(1));
            let ranked = rank(vec![
                current.clone(),
                scored(
                    "getByRole('button', { name: 'Save' })",
                    1.0,
                    reasons::A11Y_ROLE_NAME,
                    Some(1),
                ),
            ]);
            assert_eq!(
                select(&ranked, &current, false, &p),
                Some((0, SelectionReason::ScoreMargin))
            );
        }

        #[test]
        fn test_margin_is_inclusive() {
            let p = ScoringPolicy::default();
            let current = scored("#a", 0.6, reasons::CURRENT, None);
            let ranked = rank(vec![
                current.clone(),
                scored("getByText('a')", 0.75, reasons::A11Y_TEXT, None),
            ]);
            assert!(select(&ranked, &current, false, &p).is_some());

            let ranked = rank(vec![
                current.clone(),
                scored("getByText('a')", 0.74, reasons::A11Y_TEXT, None),
            ]);
            assert!(select(&ranked, &current, false, &p).is_none());
        }

        #[test]
        fn test_current_on_top_is_kept() {
            let p = ScoringPolicy::default();
            let current = scored("getByRole('link')", 1.0, reasons::CURRENT, Some(1));
            let ranked = rank(vec![
                current.clone(),
                scored("#x", 0.4, reasons::A11Y_TEXT, Some(1)),
            ]);
            assert!(select(&ranked, &current, true, &p).is_none());
        }

        #[test]
        fn test_runtime_repair_tie() {
            let p = ScoringPolicy::default();
            let current = scored("getByText('Order 4411')", 0.9, reasons::CURRENT, Some(1));
            let ranked = rank(vec![
                current.clone(),
                scored("getByTestId('order')", 0.8995, reasons::REPAIR_PUBLIC, Some(1)),
            ]);
            assert_eq!(
                select(&ranked, &current, true, &p),
                Some((1, SelectionReason::TieRuntimeRepair))
            );
            assert!(select(&ranked, &current, false, &p).is_none());
        }

        #[test]
        fn test_tie_requires_unique_match() {
            let p = ScoringPolicy::default();
            let current = scored("getByText('Order 4411')", 0.9, reasons::CURRENT, Some(1));
            let ranked = rank(vec![
                current.clone(),
                scored("getByTestId('order')", 0.9, reasons::REPAIR_PUBLIC, Some(2)),
            ]);
            assert!(select(&ranked, &current, true, &p).is_none());
        }
    }

    mod status_tests {
        use super::*;

        #[test]
        fn test_status() {
            let unique = scored("getByText('a')", 1.0, reasons::A11Y_TEXT, Some(1));
            let offline = scored("getByText('a')", 1.0, reasons::A11Y_TEXT, None);
            assert_eq!(recommendation_status(&unique, false), RecommendationStatus::Recommended);
            assert_eq!(recommendation_status(&unique, true), RecommendationStatus::Applied);
            assert_eq!(recommendation_status(&offline, true), RecommendationStatus::ReportOnly);
        }
    }
}
