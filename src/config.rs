//! Configuration management
//!
//! Loads and saves the TOML configuration covering the completion API,
//! detection ensemble, curriculum thresholds, readability window,
//! learning parameters, and the orchestrator loop.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Completion API settings
    #[serde(default)]
    pub completion: CompletionConfig,
    /// Detection ensemble settings
    #[serde(default)]
    pub detection: DetectionConfig,
    /// Curriculum threshold settings
    #[serde(default)]
    pub curriculum: CurriculumConfig,
    /// Readability validation settings
    #[serde(default)]
    pub readability: ReadabilityConfig,
    /// Feedback learning settings
    #[serde(default)]
    pub learning: LearningConfig,
    /// Attempt loop settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Failure classification boundaries
    #[serde(default)]
    pub failure: FailureClassifierConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Base URL of the OpenAI-compatible completion API
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key
    #[serde(default = "default_completion_key_env")]
    pub api_key_env: String,
    /// Model identifier sent with each request
    #[serde(default = "default_completion_model")]
    pub model: String,
    /// Maximum tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Transport retries before surfacing a TransportError
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Initial backoff between transport retries, doubled each retry
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_completion_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_completion_key_env() -> String {
    "COPYFORGE_API_KEY".to_string()
}

fn default_completion_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    512
}

fn default_request_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_completion_base_url(),
            api_key_env: default_completion_key_env(),
            model: default_completion_model(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// Weights for the local detector's heuristic components.
/// Normalized at use, so they only need to be relative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalDetectorWeights {
    #[serde(default = "default_grammar_weight")]
    pub grammar: f64,
    #[serde(default = "default_repetition_weight")]
    pub repetition: f64,
    #[serde(default = "default_phrasing_weight")]
    pub phrasing: f64,
    #[serde(default = "default_lexical_weight")]
    pub lexical: f64,
}

fn default_grammar_weight() -> f64 {
    0.20
}

fn default_repetition_weight() -> f64 {
    0.25
}

fn default_phrasing_weight() -> f64 {
    0.35
}

fn default_lexical_weight() -> f64 {
    0.15
}

impl Default for LocalDetectorWeights {
    fn default() -> Self {
        Self {
            grammar: default_grammar_weight(),
            repetition: default_repetition_weight(),
            phrasing: default_phrasing_weight(),
            lexical: default_lexical_weight(),
        }
    }
}

/// When to spend money on the external detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExternalUsageMode {
    /// Call the external detector on every attempt
    Always,
    /// Local-only for the first `local_attempts`, external afterwards
    /// and for the final acceptance check
    Smart,
    /// External only on the about-to-be-accepted candidate
    FinalOnly,
    /// Never call the external detector
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalDetectorConfig {
    /// Base URL of the paid detector API; empty disables it entirely
    #[serde(default)]
    pub base_url: String,
    /// Environment variable holding the detector API key
    #[serde(default = "default_detector_key_env")]
    pub api_key_env: String,
    /// Texts shorter than this are scored locally only, exempt from
    /// the usage-mode decision
    #[serde(default = "default_min_input_chars")]
    pub min_input_chars: usize,
}

fn default_detector_key_env() -> String {
    "COPYFORGE_DETECTOR_KEY".to_string()
}

fn default_min_input_chars() -> usize {
    120
}

impl Default for ExternalDetectorConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key_env: default_detector_key_env(),
            min_input_chars: default_min_input_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Local heuristic weights
    #[serde(default)]
    pub weights: LocalDetectorWeights,
    /// Local share of the blend when no external detector is used;
    /// the remainder goes to the simple baseline
    #[serde(default = "default_local_blend")]
    pub local_blend: f64,
    /// External share of the blend when the external detector is active (0.5..=0.8)
    #[serde(default = "default_external_blend")]
    pub external_blend: f64,
    /// External detector endpoint settings
    #[serde(default)]
    pub external: ExternalDetectorConfig,
    /// Cost-control mode for the external detector
    #[serde(default = "default_usage_mode")]
    pub mode: ExternalUsageMode,
    /// Attempts scored locally before "smart" mode engages the external detector
    #[serde(default = "default_smart_local_attempts")]
    pub smart_local_attempts: u32,
}

fn default_local_blend() -> f64 {
    0.7
}

fn default_external_blend() -> f64 {
    0.6
}

fn default_usage_mode() -> ExternalUsageMode {
    ExternalUsageMode::Disabled
}

fn default_smart_local_attempts() -> u32 {
    2
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            weights: LocalDetectorWeights::default(),
            local_blend: default_local_blend(),
            external_blend: default_external_blend(),
            external: ExternalDetectorConfig::default(),
            mode: default_usage_mode(),
            smart_local_attempts: default_smart_local_attempts(),
        }
    }
}

/// One curriculum breakpoint: at or above `min_success_rate`, accept
/// candidates whose AI-likeness is below `allowed_ai_score`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CurriculumBreakpoint {
    pub min_success_rate: f64,
    pub allowed_ai_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurriculumConfig {
    /// Trailing window of attempts for the rolling success rate
    #[serde(default = "default_curriculum_window")]
    pub window: u32,
    /// Breakpoints, highest success rate first. Below every breakpoint
    /// the lenient `base_allowed_ai_score` applies.
    #[serde(default = "default_breakpoints")]
    pub breakpoints: Vec<CurriculumBreakpoint>,
    /// Allowed AI-likeness when history is thin or success is rare
    #[serde(default = "default_base_allowed")]
    pub base_allowed_ai_score: f64,
}

fn default_curriculum_window() -> u32 {
    50
}

fn default_breakpoints() -> Vec<CurriculumBreakpoint> {
    vec![
        CurriculumBreakpoint { min_success_rate: 0.30, allowed_ai_score: 0.20 },
        CurriculumBreakpoint { min_success_rate: 0.10, allowed_ai_score: 0.30 },
    ]
}

fn default_base_allowed() -> f64 {
    0.60
}

impl Default for CurriculumConfig {
    fn default() -> Self {
        Self {
            window: default_curriculum_window(),
            breakpoints: default_breakpoints(),
            base_allowed_ai_score: default_base_allowed(),
        }
    }
}

impl CurriculumConfig {
    /// Reject breakpoint tables that would make the threshold
    /// non-monotonic in the success rate.
    pub fn validate(&self) -> Result<()> {
        let mut prev_rate = f64::INFINITY;
        let mut prev_allowed = 0.0_f64;
        for bp in &self.breakpoints {
            if bp.min_success_rate >= prev_rate {
                anyhow::bail!("curriculum breakpoints must be sorted by success rate, descending");
            }
            if bp.allowed_ai_score < prev_allowed {
                anyhow::bail!("allowed AI-likeness must not decrease as success rate falls");
            }
            prev_rate = bp.min_success_rate;
            prev_allowed = bp.allowed_ai_score;
        }
        if let Some(last) = self.breakpoints.last() {
            if self.base_allowed_ai_score < last.allowed_ai_score {
                anyhow::bail!("base allowed AI-likeness must be the most lenient value");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadabilityConfig {
    /// When false the validator reports `disabled` and never blocks
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lower bound of the acceptable Flesch reading-ease window
    #[serde(default = "default_min_ease")]
    pub min_score: f64,
    /// Upper bound of the acceptable window
    #[serde(default = "default_max_ease")]
    pub max_score: f64,
}

fn default_true() -> bool {
    true
}

fn default_min_ease() -> f64 {
    60.0
}

fn default_max_ease() -> f64 {
    100.0
}

impl Default for ReadabilityConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            min_score: default_min_ease(),
            max_score: default_max_ease(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Minimum historical samples before an advisor trusts a bucket
    #[serde(default = "default_min_samples")]
    pub min_samples: u32,
    /// Temperature bucket width for the advisor
    #[serde(default = "default_temperature_bucket")]
    pub temperature_bucket: f64,
    /// Fail-rate high-water mark above which a pattern is blacklisted
    #[serde(default = "default_blacklist_fail_rate")]
    pub blacklist_fail_rate: f64,
    /// Success-rate mark above which a pattern becomes a positive example
    #[serde(default = "default_safe_success_rate")]
    pub safe_success_rate: f64,
    /// Patterns seen in fewer attempts than this are ignored
    #[serde(default = "default_min_pattern_occurrences")]
    pub min_pattern_occurrences: u32,
    /// Shortest n-gram length mined
    #[serde(default = "default_ngram_min")]
    pub ngram_min: usize,
    /// Longest n-gram length mined
    #[serde(default = "default_ngram_max")]
    pub ngram_max: usize,
    /// Cap on blacklist entries injected into a prompt
    #[serde(default = "default_max_blacklist")]
    pub max_blacklist: usize,
}

fn default_min_samples() -> u32 {
    5
}

fn default_temperature_bucket() -> f64 {
    0.05
}

fn default_blacklist_fail_rate() -> f64 {
    0.8
}

fn default_safe_success_rate() -> f64 {
    0.8
}

fn default_min_pattern_occurrences() -> u32 {
    3
}

fn default_ngram_min() -> usize {
    2
}

fn default_ngram_max() -> usize {
    5
}

fn default_max_blacklist() -> usize {
    20
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            min_samples: default_min_samples(),
            temperature_bucket: default_temperature_bucket(),
            blacklist_fail_rate: default_blacklist_fail_rate(),
            safe_success_rate: default_safe_success_rate(),
            min_pattern_occurrences: default_min_pattern_occurrences(),
            ngram_min: default_ngram_min(),
            ngram_max: default_ngram_max(),
            max_blacklist: default_max_blacklist(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum generation attempts per request
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Probability of an exploration attempt from attempt 2 onward
    #[serde(default = "default_exploration_probability")]
    pub exploration_probability: f64,
    /// Static temperature used when the advisor has too little history
    #[serde(default = "default_baseline_temperature")]
    pub baseline_temperature: f64,
    /// Wall-clock bound on the whole multi-attempt loop, in seconds
    #[serde(default = "default_loop_timeout")]
    pub timeout_secs: u64,
    /// Skip attempts the success predictor rates below `predict_floor`
    #[serde(default)]
    pub predict_gate: bool,
    /// Probability floor for the predictor gate
    #[serde(default = "default_predict_floor")]
    pub predict_floor: f64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_exploration_probability() -> f64 {
    0.15
}

fn default_baseline_temperature() -> f64 {
    0.7
}

fn default_loop_timeout() -> u64 {
    300
}

fn default_predict_floor() -> f64 {
    0.05
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            exploration_probability: default_exploration_probability(),
            baseline_temperature: default_baseline_temperature(),
            timeout_secs: default_loop_timeout(),
            predict_gate: false,
            predict_floor: default_predict_floor(),
        }
    }
}

/// Numeric boundaries for uniform/partial/borderline classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureClassifierConfig {
    /// Mean sentence score at or above which a failure reads "uniform"
    #[serde(default = "default_uniform_mean")]
    pub uniform_mean: f64,
    /// Sentence-score spread (std dev) below which a failure reads "uniform"
    #[serde(default = "default_uniform_spread")]
    pub uniform_spread: f64,
    /// Composite scores within this band of the threshold read "borderline"
    #[serde(default = "default_borderline_band")]
    pub borderline_band: f64,
}

fn default_uniform_mean() -> f64 {
    0.8
}

fn default_uniform_spread() -> f64 {
    0.12
}

fn default_borderline_band() -> f64 {
    0.08
}

impl Default for FailureClassifierConfig {
    fn default() -> Self {
        Self {
            uniform_mean: default_uniform_mean(),
            uniform_spread: default_uniform_spread(),
            borderline_band: default_borderline_band(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating the default on first run
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            let config: Config = toml::from_str(&contents)
                .context("Failed to parse config file")?;
            config.curriculum.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Load from an explicit path (used by tests and the --config flag)
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .context("Failed to parse config file")?;
        config.curriculum.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = config_path()?;
        let parent = config_path.parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "copyforge", "copyforge")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path (feedback store lives here)
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "copyforge", "copyforge")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}

/// Default feedback store path
pub fn store_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("feedback.db"))
}

/// Show current configuration
pub fn show_config(config: &Config) -> Result<()> {
    let contents = toml::to_string_pretty(config)
        .context("Failed to serialize config")?;
    println!("{}", contents);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.curriculum.validate().unwrap();
        assert_eq!(config.orchestrator.max_attempts, 5);
        assert_eq!(config.orchestrator.exploration_probability, 0.15);
        assert_eq!(config.learning.min_samples, 5);
        assert_eq!(config.learning.blacklist_fail_rate, 0.8);
        assert_eq!(config.detection.mode, ExternalUsageMode::Disabled);
    }

    #[test]
    fn test_curriculum_rejects_non_monotone_breakpoints() {
        let bad = CurriculumConfig {
            window: 50,
            breakpoints: vec![
                CurriculumBreakpoint { min_success_rate: 0.30, allowed_ai_score: 0.40 },
                CurriculumBreakpoint { min_success_rate: 0.10, allowed_ai_score: 0.20 },
            ],
            base_allowed_ai_score: 0.60,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_curriculum_rejects_unsorted_breakpoints() {
        let bad = CurriculumConfig {
            window: 50,
            breakpoints: vec![
                CurriculumBreakpoint { min_success_rate: 0.10, allowed_ai_score: 0.30 },
                CurriculumBreakpoint { min_success_rate: 0.30, allowed_ai_score: 0.20 },
            ],
            base_allowed_ai_score: 0.60,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [orchestrator]
            max_attempts = 3

            [detection]
            mode = "smart"
            "#,
        )
        .unwrap();
        assert_eq!(config.orchestrator.max_attempts, 3);
        assert_eq!(config.orchestrator.exploration_probability, 0.15);
        assert_eq!(config.detection.mode, ExternalUsageMode::Smart);
        assert_eq!(config.detection.smart_local_attempts, 2);
    }
}
