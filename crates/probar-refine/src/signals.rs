//! Dynamic-signal detection.
//!
//! Flags text and selector values that are likely to change between runs:
//! timestamps, counters, news headlines, weather widgets. The detector is
//! built once from [`SignalPolicy`] (the keyword lists and thresholds are
//! tuned data) and is a pure function of its input afterwards.

use std::collections::BTreeSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::policy::SignalPolicy;
use crate::result::{RefineError, RefineResult};

/// A tag flagging content likely to vary between runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicSignal {
    /// Produced right after a navigation
    NavigateContext,
    /// Text longer than the long-text threshold
    LongText,
    /// Selector demands an exact text match
    ExactTrue,
    /// Contains digits
    ContainsNumericFragment,
    /// Contains a date, clock time, weekday or relative time
    ContainsDateOrTimeFragment,
    /// Contains a weather or news keyword
    ContainsWeatherOrNewsFragment,
    /// Reads like a headline
    ContainsHeadlineLikeText,
    /// Contains a `|` separator
    ContainsPipeSeparator,
}

impl DynamicSignal {
    /// Wire name of the tag
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NavigateContext => "navigate_context",
            Self::LongText => "long_text",
            Self::ExactTrue => "exact_true",
            Self::ContainsNumericFragment => "contains_numeric_fragment",
            Self::ContainsDateOrTimeFragment => "contains_date_or_time_fragment",
            Self::ContainsWeatherOrNewsFragment => "contains_weather_or_news_fragment",
            Self::ContainsHeadlineLikeText => "contains_headline_like_text",
            Self::ContainsPipeSeparator => "contains_pipe_separator",
        }
    }

    /// Whether this tag alone disqualifies a snapshot-sourced text assertion
    #[must_use]
    pub const fn hard_filters_snapshot_text(self) -> bool {
        matches!(
            self,
            Self::ContainsNumericFragment
                | Self::ContainsDateOrTimeFragment
                | Self::ContainsWeatherOrNewsFragment
                | Self::LongText
                | Self::ContainsHeadlineLikeText
                | Self::ContainsPipeSeparator
        )
    }
}

impl std::fmt::Display for DynamicSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered set of dynamic signals
pub type SignalSet = BTreeSet<DynamicSignal>;

const DATE_TIME_PATTERNS: &[&str] = &[
    r"\b\d{1,2}:\d{2}(?::\d{2})?\s*(?:am|pm)?\b",
    r"\b\d{4}-\d{1,2}-\d{1,2}\b",
    r"\b\d{1,2}[/.]\d{1,2}[/.]\d{2,4}\b",
    r"\b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+\d{1,2}\b",
    r"\b\d{1,2}\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\b",
    r"\b(?:monday|tuesday|wednesday|thursday|friday|saturday|sunday|today|yesterday|tomorrow)\b",
    r"\b\d+\s*(?:s|sec|secs|seconds?|m|min|mins|minutes?|h|hr|hrs|hours?|d|days?|w|weeks?)\s+ago\b",
    r"\bjust\s+now\b",
];

/// Compiled dynamic-signal detector
#[derive(Debug, Clone)]
pub struct SignalDetector {
    keywords: Option<Regex>,
    date_time: Regex,
    quoted: Regex,
    exact: Regex,
    content_card: Vec<Regex>,
    headline_min_chars: usize,
    headline_min_words: usize,
    long_text_chars: usize,
}

impl SignalDetector {
    /// Compile a detector from policy data
    pub fn new(policy: &SignalPolicy) -> RefineResult<Self> {
        let keywords = if policy.weather_news_keywords.is_empty() {
            None
        } else {
            let alternation = policy
                .weather_news_keywords
                .iter()
                .map(|k| regex::escape(k.trim()))
                .collect::<Vec<_>>()
                .join("|");
            Some(compile(&format!(r"(?i)\b(?:{alternation})\b"))?)
        };
        let date_time = compile(&format!("(?i){}", DATE_TIME_PATTERNS.join("|")))?;
        let content_card = policy
            .content_card_patterns
            .iter()
            .map(|p| compile(p))
            .collect::<RefineResult<Vec<_>>>()?;

        Ok(Self {
            keywords,
            date_time,
            quoted: compile(r#"'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)""#)?,
            exact: compile(r#"exact\s*:\s*true|"s\]|"s$"#)?,
            content_card,
            headline_min_chars: policy.headline_min_chars,
            headline_min_words: policy.headline_min_words,
            long_text_chars: policy.long_text_chars,
        })
    }

    /// Detector built from the default policy
    pub fn with_defaults() -> RefineResult<Self> {
        Self::new(&SignalPolicy::default())
    }

    /// Tags for a piece of visible text
    #[must_use]
    pub fn detect_text(&self, text: &str) -> SignalSet {
        let mut tags = SignalSet::new();
        let text = text.trim();
        if text.is_empty() {
            return tags;
        }
        if text.chars().count() > self.long_text_chars {
            tags.insert(DynamicSignal::LongText);
        }
        if text.chars().any(|c| c.is_ascii_digit()) {
            tags.insert(DynamicSignal::ContainsNumericFragment);
        }
        if self.date_time.is_match(text) {
            tags.insert(DynamicSignal::ContainsDateOrTimeFragment);
        }
        if self.is_news_like(text) {
            tags.insert(DynamicSignal::ContainsWeatherOrNewsFragment);
        }
        if self.is_headline_like(text) {
            tags.insert(DynamicSignal::ContainsHeadlineLikeText);
        }
        if text.contains('|') {
            tags.insert(DynamicSignal::ContainsPipeSeparator);
        }
        tags
    }

    /// Tags for a selector value.
    ///
    /// Quoted literals are inspected when present so that structural parts
    /// like `.nth(2)` do not count as volatile text.
    #[must_use]
    pub fn detect_selector(&self, value: &str) -> SignalSet {
        let mut tags = SignalSet::new();
        let literals: Vec<&str> = self
            .quoted
            .captures_iter(value)
            .filter_map(|c| c.get(1).or_else(|| c.get(2)))
            .map(|m| m.as_str())
            .collect();
        if literals.is_empty() {
            tags.extend(self.detect_text(value));
        } else {
            for literal in literals {
                tags.extend(self.detect_text(literal));
            }
        }
        if self.exact.is_match(value) {
            tags.insert(DynamicSignal::ExactTrue);
        }
        tags
    }

    /// Whether text contains a weather or news keyword
    #[must_use]
    pub fn is_news_like(&self, text: &str) -> bool {
        self.keywords.as_ref().is_some_and(|re| re.is_match(text))
    }

    /// Whether text contains a date or time fragment
    #[must_use]
    pub fn is_date_like(&self, text: &str) -> bool {
        self.date_time.is_match(text)
    }

    /// Whether text reads like a headline: long enough, enough words, mixed case
    #[must_use]
    pub fn is_headline_like(&self, text: &str) -> bool {
        let text = text.trim();
        text.chars().count() >= self.headline_min_chars
            && text.split_whitespace().count() >= self.headline_min_words
            && text.chars().any(char::is_uppercase)
            && text.chars().any(char::is_lowercase)
    }

    /// Whether text is longer than the long-text threshold
    #[must_use]
    pub fn is_long(&self, text: &str) -> bool {
        text.trim().chars().count() > self.long_text_chars
    }

    /// Whether text matches a content-card pattern
    #[must_use]
    pub fn is_content_card(&self, text: &str) -> bool {
        self.content_card.iter().any(|re| re.is_match(text))
    }

    /// Whether a link with this accessible name is expected to navigate
    /// away (and therefore disappear) when activated
    #[must_use]
    pub fn is_navigation_like_link_name(&self, name: &str) -> bool {
        self.is_long(name)
            || self.is_headline_like(name)
            || self.is_news_like(name)
            || self.is_date_like(name)
            || self.is_content_card(name)
    }
}

fn compile(pattern: &str) -> RefineResult<Regex> {
    Regex::new(pattern)
        .map_err(|e| RefineError::invalid_policy(format!("bad pattern `{pattern}`: {e}")))
}

/// Add the navigation context tag when the value was produced after a navigation
pub fn with_navigation_context(mut tags: SignalSet, after_navigation: bool) -> SignalSet {
    if after_navigation {
        tags.insert(DynamicSignal::NavigateContext);
    }
    tags
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn detector() -> SignalDetector {
        SignalDetector::with_defaults().unwrap()
    }

    mod text_tests {
        use super::*;

        #[test]
        fn test_plain_text_is_clean() {
            assert!(detector().detect_text("Save").is_empty());
            assert!(detector().detect_text("Sign in to continue").is_empty());
        }

        #[test]
        fn test_numeric_fragment() {
            let tags = detector().detect_text("Cart (3)");
            assert!(tags.contains(&DynamicSignal::ContainsNumericFragment));
        }

        #[test]
        fn test_clock_time() {
            let tags = detector().detect_text("Breaking 12:30 update");
            assert!(tags.contains(&DynamicSignal::ContainsDateOrTimeFragment));
            assert!(tags.contains(&DynamicSignal::ContainsWeatherOrNewsFragment));
            assert!(tags.contains(&DynamicSignal::ContainsNumericFragment));
        }

        #[test]
        fn test_date_forms() {
            let d = detector();
            assert!(d.is_date_like("Posted 2024-03-01"));
            assert!(d.is_date_like("Mar 4 release"));
            assert!(d.is_date_like("due tomorrow"));
            assert!(d.is_date_like("5 minutes ago"));
            assert!(!d.is_date_like("Maybe later"));
        }

        #[test]
        fn test_headline_like() {
            let d = detector();
            assert!(d.is_headline_like("Markets Rally As Central Bank Holds Rates Steady"));
            // all lowercase is not mixed case
            assert!(!d.is_headline_like("markets rally as central bank holds rates steady"));
            // too few words
            assert!(!d.is_headline_like("Supercalifragilistic Expialidocious"));
        }

        #[test]
        fn test_long_text_and_pipe() {
            let long = "a".repeat(91);
            assert!(detector()
                .detect_text(&long)
                .contains(&DynamicSignal::LongText));
            assert!(!detector()
                .detect_text(&"a".repeat(90))
                .contains(&DynamicSignal::LongText));
            assert!(detector()
                .detect_text("Home | Store")
                .contains(&DynamicSignal::ContainsPipeSeparator));
        }

        #[test]
        fn test_keywords_whole_words_only() {
            let d = detector();
            assert!(d.is_news_like("Weather for Berlin"));
            // "brain" contains "rain" but is not a keyword match
            assert!(!d.is_news_like("brain teaser"));
        }
    }

    mod selector_tests {
        use super::*;

        #[test]
        fn test_structural_digits_ignored_when_quoted() {
            let tags = detector().detect_selector("getByRole('listitem').nth(2)");
            assert!(tags.is_empty());
        }

        #[test]
        fn test_quoted_volatile_text() {
            let tags = detector()
                .detect_selector("getByText('Updated 5 minutes ago', { exact: true })");
            assert!(tags.contains(&DynamicSignal::ContainsDateOrTimeFragment));
            assert!(tags.contains(&DynamicSignal::ExactTrue));
        }

        #[test]
        fn test_raw_css_value() {
            let tags = detector().detect_selector("#item-4821");
            assert!(tags.contains(&DynamicSignal::ContainsNumericFragment));
            assert!(detector().detect_selector("#submit").is_empty());
        }

        #[test]
        fn test_internal_exact_suffix() {
            let tags = detector().detect_selector(r#"internal:role=button[name="Save"s]"#);
            assert!(tags.contains(&DynamicSignal::ExactTrue));
        }
    }

    mod policy_tests {
        use super::*;

        #[test]
        fn test_custom_keywords() {
            let policy = SignalPolicy {
                weather_news_keywords: vec!["scoreboard".to_string()],
                ..SignalPolicy::default()
            };
            let d = SignalDetector::new(&policy).unwrap();
            assert!(d.is_news_like("Live scoreboard"));
            assert!(!d.is_news_like("Weather"));
        }

        #[test]
        fn test_empty_keywords() {
            let policy = SignalPolicy {
                weather_news_keywords: Vec::new(),
                ..SignalPolicy::default()
            };
            let d = SignalDetector::new(&policy).unwrap();
            assert!(!d.is_news_like("breaking news"));
        }

        #[test]
        fn test_bad_pattern_rejected() {
            let policy = SignalPolicy {
                content_card_patterns: vec!["(unclosed".to_string()],
                ..SignalPolicy::default()
            };
            assert!(matches!(
                SignalDetector::new(&policy),
                Err(RefineError::InvalidPolicy { .. })
            ));
        }

        #[test]
        fn test_navigation_like_link_names() {
            let d = detector();
            assert!(d.is_navigation_like_link_name("Storm warning issued for coast"));
            assert!(d.is_navigation_like_link_name("Recipes · 5 min read"));
            assert!(!d.is_navigation_like_link_name("Settings"));
        }

        #[test]
        fn test_navigation_context_tag() {
            let tags = with_navigation_context(SignalSet::new(), true);
            assert!(tags.contains(&DynamicSignal::NavigateContext));
            assert!(with_navigation_context(SignalSet::new(), false).is_empty());
        }
    }
}
