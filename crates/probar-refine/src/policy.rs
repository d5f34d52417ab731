//! Pass options and the immutable refine policy.
//!
//! Every tunable number the pipeline uses lives here. Components receive the
//! policy by shared reference, so tests can exercise arbitrary policies
//! without shared mutable state.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::result::{RefineError, RefineResult};

/// Default probe timeout for selector scoring (1.5 seconds)
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 1_500;

/// Default timeout for runtime validation of one assertion
pub const DEFAULT_VALIDATION_TIMEOUT_MS: u64 = 5_000;

/// Default timeout for post-step network idle
pub const DEFAULT_NETWORK_IDLE_TIMEOUT_MS: u64 = 3_000;

/// Default timeout for replaying one recorded step
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 10_000;

/// Whether assertion candidates are produced at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertionMode {
    /// No assertion work
    None,
    /// Generate (and optionally apply) candidates
    #[default]
    Candidates,
}

/// Where assertion candidates come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssertionSource {
    /// Action-keyed rules only
    #[default]
    Deterministic,
    /// Snapshots captured through the page's native accessibility API
    SnapshotNative,
    /// Snapshots captured through the external CLI capture path
    SnapshotCli,
}

impl AssertionSource {
    /// Whether this source is snapshot-driven
    #[must_use]
    pub const fn is_snapshot(self) -> bool {
        matches!(self, Self::SnapshotNative | Self::SnapshotCli)
    }

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deterministic => "deterministic",
            Self::SnapshotNative => "snapshot-native",
            Self::SnapshotCli => "snapshot-cli",
        }
    }
}

/// Per-step volume caps for assertion candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeCaps {
    /// Max text assertions per step
    pub text: usize,
    /// Max visibility assertions per step
    pub visible: usize,
    /// Max state assertions (value/checked/enabled) per step
    pub state: usize,
    /// Max snapshot-sourced candidates on a step that navigated
    pub snapshot_after_navigation: usize,
    /// Max snapshot-sourced candidates on any other step
    pub snapshot_default: usize,
}

impl Default for VolumeCaps {
    fn default() -> Self {
        Self {
            text: 2,
            visible: 3,
            state: 2,
            snapshot_after_navigation: 1,
            snapshot_default: 2,
        }
    }
}

/// Selector scoring weights and thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Base score of a locator expression
    pub base_locator_expression: f64,
    /// Base score of an engine selector
    pub base_engine_selector: f64,
    /// Base score of a css selector
    pub base_css: f64,
    /// Base score of an xpath
    pub base_xpath: f64,
    /// Base score of an engine-internal selector
    pub base_engine_internal: f64,
    /// Base score of an unknown value
    pub base_unknown: f64,
    /// Bonus for candidates derived by runtime repair
    pub repair_bonus: f64,
    /// Extra bonus for runtime-repair candidates that matched uniquely
    pub runtime_repair_bonus: f64,
    /// Penalty applied to any selector carrying dynamic signals
    pub dynamic_penalty_base: f64,
    /// Additional penalty when the selector demands an exact text match
    pub dynamic_penalty_exact: f64,
    /// Additional penalty for headline/news-like text
    pub dynamic_penalty_headline: f64,
    /// Cap on the total dynamic penalty
    pub dynamic_penalty_cap: f64,
    /// Weight of the base score when probed
    pub weight_base: f64,
    /// Weight of the uniqueness score when probed
    pub weight_uniqueness: f64,
    /// Weight of the visibility score when probed
    pub weight_visibility: f64,
    /// Uniqueness score for multiple matches
    pub uniqueness_multiple: f64,
    /// Minimum score gain to adopt a candidate
    pub adoption_margin: f64,
    /// Width of the tie band for the runtime-repair exception
    pub tie_epsilon: f64,
    /// Probe timeout in milliseconds
    pub probe_timeout_ms: u64,
    /// Longest visible text used for a getByText candidate
    pub max_text_candidate_chars: usize,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            base_locator_expression: 1.0,
            base_engine_selector: 0.75,
            base_css: 0.45,
            base_xpath: 0.35,
            base_engine_internal: 0.2,
            base_unknown: 0.1,
            repair_bonus: 0.05,
            runtime_repair_bonus: 0.02,
            dynamic_penalty_base: 0.08,
            dynamic_penalty_exact: 0.05,
            dynamic_penalty_headline: 0.04,
            dynamic_penalty_cap: 0.2,
            weight_base: 0.5,
            weight_uniqueness: 0.35,
            weight_visibility: 0.15,
            uniqueness_multiple: 0.3,
            adoption_margin: 0.15,
            tie_epsilon: 0.001,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            max_text_candidate_chars: 80,
        }
    }
}

impl ScoringPolicy {
    /// Probe timeout as a duration
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Dynamic-signal heuristics. These are tuned data, not derived constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalPolicy {
    /// Lowercase keywords that suggest weather or news content
    pub weather_news_keywords: Vec<String>,
    /// Minimum characters for headline-like text
    pub headline_min_chars: usize,
    /// Minimum words for headline-like text
    pub headline_min_words: usize,
    /// Characters above which text counts as long
    pub long_text_chars: usize,
    /// Regex patterns that identify content-card link text
    pub content_card_patterns: Vec<String>,
}

impl Default for SignalPolicy {
    fn default() -> Self {
        let keywords = [
            "weather",
            "forecast",
            "temperature",
            "rain",
            "sunny",
            "cloudy",
            "snow",
            "storm",
            "humidity",
            "breaking",
            "news",
            "live",
            "update",
            "updated",
            "headline",
            "latest",
            "trending",
            "just in",
            "developing",
        ];
        Self {
            weather_news_keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
            headline_min_chars: 30,
            headline_min_words: 5,
            long_text_chars: 90,
            content_card_patterns: vec![
                r"(?i)\b\d+\s*(?:min|mins|minute|minutes)\s+read\b".to_string(),
                r"\s[·•]\s".to_string(),
                r"(?i)\b(?:sponsored|advertisement)\b".to_string(),
            ],
        }
    }
}

/// Per-tag penalties subtracted from an assertion's stability score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalPenalties {
    /// `contains_numeric_fragment`
    pub numeric: f64,
    /// `contains_date_or_time_fragment`
    pub date_or_time: f64,
    /// `contains_weather_or_news_fragment`
    pub weather_or_news: f64,
    /// `contains_headline_like_text`
    pub headline: f64,
    /// `contains_pipe_separator`
    pub pipe: f64,
    /// `long_text`
    pub long_text: f64,
    /// `exact_true`
    pub exact_true: f64,
    /// Cap on the summed penalty
    pub cap: f64,
}

impl Default for SignalPenalties {
    fn default() -> Self {
        Self {
            numeric: 0.06,
            date_or_time: 0.08,
            weather_or_news: 0.1,
            headline: 0.08,
            pipe: 0.05,
            long_text: 0.04,
            exact_true: 0.02,
            cap: 0.30,
        }
    }
}

/// Generation confidences and stability adjustments for assertions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssertionPolicy {
    /// Confidence of a fill/select value assertion
    pub confidence_value: f64,
    /// Confidence of a check/uncheck state assertion
    pub confidence_checked: f64,
    /// Confidence of the coverage-fallback visibility check
    pub confidence_coverage_fallback: f64,
    /// Confidence of an appeared high-signal text assertion
    pub confidence_appeared_text: f64,
    /// Confidence of a changed live-region text assertion
    pub confidence_changed_text: f64,
    /// Confidence of a stable-structural visibility assertion
    pub confidence_structural: f64,
    /// Confidence of an appeared named control visibility assertion
    pub confidence_appeared_visible: f64,
    /// Confidence of a disabled-to-enabled assertion
    pub confidence_enabled: f64,
    /// Confidence of a URL change assertion
    pub confidence_url: f64,
    /// Confidence of a title change assertion
    pub confidence_title: f64,
    /// Penalty after a navigation
    pub after_navigation_penalty: f64,
    /// Penalty for snapshot-sourced candidates
    pub snapshot_penalty: f64,
    /// Bonus for value/checked assertions
    pub value_checked_bonus: f64,
    /// Bonus for enabled-state assertions
    pub enabled_bonus: f64,
    /// Bonus for URL/title assertions
    pub url_title_bonus: f64,
    /// Bonus for text in the comfortable length band
    pub text_length_bonus: f64,
    /// Lower bound of the comfortable band (chars)
    pub text_length_min: usize,
    /// Upper bound of the comfortable band (chars)
    pub text_length_max: usize,
    /// Penalty for long text
    pub long_text_penalty: f64,
    /// Bonus when the target role is high-signal
    pub high_signal_role_bonus: f64,
    /// Bonus/penalty magnitude for structural vs. non-structural visibility
    pub structural_adjustment: f64,
    /// Per-signal penalties
    pub signal_penalties: SignalPenalties,
    /// Timeout for validating one assertion at runtime
    pub validation_timeout_ms: u64,
    /// Timeout for the post-step network idle wait
    pub network_idle_timeout_ms: u64,
    /// Timeout for replaying one recorded step
    pub step_timeout_ms: u64,
}

impl Default for AssertionPolicy {
    fn default() -> Self {
        Self {
            confidence_value: 0.9,
            confidence_checked: 0.9,
            confidence_coverage_fallback: 0.62,
            confidence_appeared_text: 0.82,
            confidence_changed_text: 0.8,
            confidence_structural: 0.84,
            confidence_appeared_visible: 0.78,
            confidence_enabled: 0.8,
            confidence_url: 0.88,
            confidence_title: 0.86,
            after_navigation_penalty: 0.18,
            snapshot_penalty: 0.04,
            value_checked_bonus: 0.08,
            enabled_bonus: 0.07,
            url_title_bonus: 0.05,
            text_length_bonus: 0.05,
            text_length_min: 4,
            text_length_max: 48,
            long_text_penalty: 0.08,
            high_signal_role_bonus: 0.08,
            structural_adjustment: 0.06,
            signal_penalties: SignalPenalties::default(),
            validation_timeout_ms: DEFAULT_VALIDATION_TIMEOUT_MS,
            network_idle_timeout_ms: DEFAULT_NETWORK_IDLE_TIMEOUT_MS,
            step_timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
        }
    }
}

impl AssertionPolicy {
    /// Validation timeout as a duration
    #[must_use]
    pub const fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }

    /// Network idle timeout as a duration
    #[must_use]
    pub const fn network_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.network_idle_timeout_ms)
    }

    /// Step replay timeout as a duration
    #[must_use]
    pub const fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }
}

/// The immutable policy passed into every component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinePolicy {
    /// Selector scoring
    pub scoring: ScoringPolicy,
    /// Dynamic-signal heuristics
    pub signals: SignalPolicy,
    /// Assertion generation and stability
    pub assertions: AssertionPolicy,
}

impl RefinePolicy {
    /// Create the default policy
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a policy from YAML
    pub fn from_yaml_str(yaml: &str) -> RefineResult<Self> {
        let policy: Self = serde_yaml_ng::from_str(yaml)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Check that every weight and threshold is in range
    pub fn validate(&self) -> RefineResult<()> {
        let s = &self.scoring;
        let unit = [
            ("scoring.base_locator_expression", s.base_locator_expression),
            ("scoring.base_engine_selector", s.base_engine_selector),
            ("scoring.base_css", s.base_css),
            ("scoring.base_xpath", s.base_xpath),
            ("scoring.base_engine_internal", s.base_engine_internal),
            ("scoring.base_unknown", s.base_unknown),
            ("scoring.dynamic_penalty_cap", s.dynamic_penalty_cap),
            ("scoring.adoption_margin", s.adoption_margin),
            ("scoring.uniqueness_multiple", s.uniqueness_multiple),
            (
                "assertions.signal_penalties.cap",
                self.assertions.signal_penalties.cap,
            ),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(RefineError::invalid_policy(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        let weights = s.weight_base + s.weight_uniqueness + s.weight_visibility;
        if (weights - 1.0).abs() > 1e-6 {
            return Err(RefineError::invalid_policy(format!(
                "probe weights must sum to 1.0, got {weights}"
            )));
        }
        if self.signals.headline_min_words == 0 {
            return Err(RefineError::invalid_policy(
                "signals.headline_min_words must be positive",
            ));
        }
        if self.assertions.text_length_min > self.assertions.text_length_max {
            return Err(RefineError::invalid_policy(
                "assertions.text_length_min exceeds text_length_max",
            ));
        }
        Ok(())
    }
}

/// Options accepted by both pass entry points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassOptions {
    /// Write adopted selectors into the output steps
    pub apply_selectors: bool,
    /// Insert selected assertions into the output steps
    pub apply_assertions: bool,
    /// Assertion mode
    pub assertion_mode: AssertionMode,
    /// Assertion candidate source
    pub assertion_source: AssertionSource,
    /// Minimum stability score for selecting an assertion
    pub confidence_threshold: f64,
    /// Per-step volume caps
    pub volume_caps: VolumeCaps,
    /// Kill-switch for the public selector-resolution repair tier
    pub public_repair_enabled: bool,
    /// Kill-switch for the internal resolved-selector repair tier
    pub internal_repair_enabled: bool,
    /// Tunables
    pub policy: RefinePolicy,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            apply_selectors: false,
            apply_assertions: false,
            assertion_mode: AssertionMode::Candidates,
            assertion_source: AssertionSource::Deterministic,
            confidence_threshold: 0.75,
            volume_caps: VolumeCaps::default(),
            public_repair_enabled: true,
            internal_repair_enabled: true,
            policy: RefinePolicy::default(),
        }
    }
}

impl PassOptions {
    /// Create options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from YAML
    pub fn from_yaml_str(yaml: &str) -> RefineResult<Self> {
        let options: Self = serde_yaml_ng::from_str(yaml)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> RefineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Check ranges
    pub fn validate(&self) -> RefineResult<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(RefineError::invalid_policy(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        self.policy.validate()
    }

    /// Enable or disable selector application
    #[must_use]
    pub const fn with_apply_selectors(mut self, apply: bool) -> Self {
        self.apply_selectors = apply;
        self
    }

    /// Enable or disable assertion application
    #[must_use]
    pub const fn with_apply_assertions(mut self, apply: bool) -> Self {
        self.apply_assertions = apply;
        self
    }

    /// Set the assertion mode
    #[must_use]
    pub const fn with_assertion_mode(mut self, mode: AssertionMode) -> Self {
        self.assertion_mode = mode;
        self
    }

    /// Set the assertion source
    #[must_use]
    pub const fn with_assertion_source(mut self, source: AssertionSource) -> Self {
        self.assertion_source = source;
        self
    }

    /// Set the confidence threshold
    #[must_use]
    pub const fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Set the volume caps
    #[must_use]
    pub const fn with_volume_caps(mut self, caps: VolumeCaps) -> Self {
        self.volume_caps = caps;
        self
    }

    /// Toggle the public repair tier
    #[must_use]
    pub const fn with_public_repair(mut self, enabled: bool) -> Self {
        self.public_repair_enabled = enabled;
        self
    }

    /// Toggle the internal repair tier
    #[must_use]
    pub const fn with_internal_repair(mut self, enabled: bool) -> Self {
        self.internal_repair_enabled = enabled;
        self
    }

    /// Replace the policy
    #[must_use]
    pub fn with_policy(mut self, policy: RefinePolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod default_tests {
        use super::*;

        #[test]
        fn test_kind_ordering() {
            let s = ScoringPolicy::default();
            assert!(s.base_locator_expression > s.base_engine_selector);
            assert!(s.base_engine_selector > s.base_css);
            assert!(s.base_css > s.base_xpath);
            assert!(s.base_xpath > s.base_engine_internal);
            assert!(s.base_engine_internal > s.base_unknown);
        }

        #[test]
        fn test_default_caps() {
            let caps = VolumeCaps::default();
            assert_eq!((caps.text, caps.visible, caps.state), (2, 3, 2));
            assert_eq!(caps.snapshot_after_navigation, 1);
            assert_eq!(caps.snapshot_default, 2);
        }

        #[test]
        fn test_default_policy_validates() {
            assert!(RefinePolicy::default().validate().is_ok());
            assert!(PassOptions::default().validate().is_ok());
        }

        #[test]
        fn test_probe_timeout() {
            assert_eq!(
                ScoringPolicy::default().probe_timeout(),
                Duration::from_millis(1500)
            );
        }
    }

    mod builder_tests {
        use super::*;

        #[test]
        fn test_builder_chain() {
            let options = PassOptions::new()
                .with_apply_selectors(true)
                .with_apply_assertions(true)
                .with_assertion_source(AssertionSource::SnapshotNative)
                .with_confidence_threshold(0.6)
                .with_internal_repair(false);
            assert!(options.apply_selectors);
            assert!(options.apply_assertions);
            assert_eq!(options.assertion_source, AssertionSource::SnapshotNative);
            assert!((options.confidence_threshold - 0.6).abs() < f64::EPSILON);
            assert!(options.public_repair_enabled);
            assert!(!options.internal_repair_enabled);
        }
    }

    mod yaml_tests {
        use super::*;
        use std::io::Write;

        #[test]
        fn test_partial_yaml_keeps_defaults() {
            let options = PassOptions::from_yaml_str(
                "apply_selectors: true\nassertion_source: snapshot-cli\nvolume_caps:\n  text: 1\n",
            )
            .unwrap();
            assert!(options.apply_selectors);
            assert_eq!(options.assertion_source, AssertionSource::SnapshotCli);
            assert_eq!(options.volume_caps.text, 1);
            assert_eq!(options.volume_caps.visible, 3);
            assert_eq!(options.policy, RefinePolicy::default());
        }

        #[test]
        fn test_rejects_out_of_range_threshold() {
            let err = PassOptions::from_yaml_str("confidence_threshold: 1.5\n").unwrap_err();
            assert!(matches!(err, RefineError::InvalidPolicy { .. }));
        }

        #[test]
        fn test_rejects_bad_weights() {
            let err =
                RefinePolicy::from_yaml_str("scoring:\n  weight_base: 0.9\n").unwrap_err();
            assert!(err.to_string().contains("sum to 1.0"));
        }

        #[test]
        fn test_custom_keywords() {
            let policy = RefinePolicy::from_yaml_str(
                "signals:\n  weather_news_keywords: [\"scores\", \"match report\"]\n",
            )
            .unwrap();
            assert_eq!(policy.signals.weather_news_keywords.len(), 2);
            assert_eq!(policy.signals.headline_min_chars, 30);
        }

        #[test]
        fn test_from_file() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "assertion_mode: none").unwrap();
            writeln!(file, "public_repair_enabled: false").unwrap();
            let options = PassOptions::from_yaml_file(file.path()).unwrap();
            assert_eq!(options.assertion_mode, AssertionMode::None);
            assert!(!options.public_repair_enabled);
        }

        #[test]
        fn test_missing_file() {
            let err = PassOptions::from_yaml_file("/definitely/not/here.yaml").unwrap_err();
            assert!(matches!(err, RefineError::Io(_)));
        }
    }
}
