//! Boundary contracts for externally supplied data
//!
//! Persona profiles, component length specs, and fact maps are authored
//! outside this system; we only load and consume them. Missing required
//! data is a configuration error, fatal before any attempt.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Sentence-construction norms for a voice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrammarNorms {
    pub avg_words_per_sentence: f64,
    /// Relative weights for short/medium/long sentences
    #[serde(default)]
    pub sentence_length_distribution: Vec<f64>,
    #[serde(default)]
    pub preferred_punctuation: Vec<String>,
}

/// A named voice with linguistic style parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaProfile {
    pub display_name: String,
    #[serde(default)]
    pub linguistic_traits: Vec<String>,
    pub grammar_norms: GrammarNorms,
}

impl PersonaProfile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read persona profile {}", path.display()))?;
        let profile: PersonaProfile = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse persona profile {}", path.display()))?;
        if profile.grammar_norms.avg_words_per_sentence <= 0.0 {
            anyhow::bail!(
                "persona {} has non-positive avg_words_per_sentence",
                profile.display_name
            );
        }
        Ok(profile)
    }

    /// Target sentence-count range for a word-count target:
    /// base = words / avg_words_per_sentence, then one sentence of slack
    /// either way with a floor of two sentences.
    pub fn sentence_range(&self, target_words: u32) -> (u32, u32) {
        let base = target_words as f64 / self.grammar_norms.avg_words_per_sentence;
        let min = ((base - 1.0).floor().max(2.0)) as u32;
        let max = (base + 1.0).ceil() as u32;
        (min, max.max(min))
    }
}

/// Length spec for one component type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub target_word_count: u32,
    pub acceptable_range: (u32, u32),
}

/// Component-type to length-spec mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCatalog {
    pub components: HashMap<String, ComponentSpec>,
}

impl ComponentCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read component catalog {}", path.display()))?;
        let catalog: ComponentCatalog = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse component catalog {}", path.display()))?;
        Ok(catalog)
    }

    /// Built-in defaults for the three short-passage components.
    pub fn builtin() -> Self {
        let mut components = HashMap::new();
        components.insert(
            "caption".to_string(),
            ComponentSpec { target_word_count: 25, acceptable_range: (15, 40) },
        );
        components.insert(
            "subtitle".to_string(),
            ComponentSpec { target_word_count: 12, acceptable_range: (6, 20) },
        );
        components.insert(
            "faq_answer".to_string(),
            ComponentSpec { target_word_count: 60, acceptable_range: (35, 90) },
        );
        Self { components }
    }

    pub fn spec_for(&self, component_type: &str) -> Result<ComponentSpec> {
        self.components
            .get(component_type)
            .copied()
            .with_context(|| format!("no component spec for '{}'", component_type))
    }
}

/// Facts are property-name to formatted-value pairs. BTreeMap keeps
/// prompt assembly order stable across runs.
pub type FactMap = BTreeMap<String, String>;

/// Load facts from a TOML or JSON file, chosen by extension.
pub fn load_facts(path: &Path) -> Result<FactMap> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read facts file {}", path.display()))?;
    let facts = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse facts file {}", path.display()))?,
        _ => toml::from_str(&contents)
            .with_context(|| format!("Failed to parse facts file {}", path.display()))?,
    };
    Ok(facts)
}
