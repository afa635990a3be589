//! Shared types used across the generation loop

use serde::{Deserialize, Serialize};

/// Classification of a rejected attempt, derived from its per-sentence
/// score distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureType {
    /// Near-uniform high AI-likeness across sentences
    Uniform,
    /// Mixed distribution: some sentences human-like, some not
    Partial,
    /// Composite score close to the active threshold
    Borderline,
}

impl std::fmt::Display for FailureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureType::Uniform => write!(f, "uniform"),
            FailureType::Partial => write!(f, "partial"),
            FailureType::Borderline => write!(f, "borderline"),
        }
    }
}

impl FailureType {
    /// Parse from the stored column value. "none" and unknown values map to None.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uniform" => Some(FailureType::Uniform),
            "partial" => Some(FailureType::Partial),
            "borderline" => Some(FailureType::Borderline),
            _ => None,
        }
    }
}

/// Persona-derived style parameters that the retry loop adjusts between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersonaParams {
    /// How much grammatical looseness to ask for (0.0 = polished, 1.0 = very loose)
    pub irregularity: f64,
    /// Sentence-rhythm variation (0.0 = uniform lengths, 1.0 = highly varied)
    pub rhythm_variation: f64,
}

impl Default for PersonaParams {
    fn default() -> Self {
        Self {
            irregularity: 0.3,
            rhythm_variation: 0.4,
        }
    }
}

/// Enrichment parameters controlling how much factual material goes into the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentParams {
    /// Fraction of supplied facts to weave into the text (0.0..=1.0)
    pub fact_density: f64,
    /// How strongly to anchor the text in the domain context (0.0..=1.0)
    pub contextual_grounding: f64,
}

impl Default for EnrichmentParams {
    fn default() -> Self {
        Self {
            fact_density: 0.6,
            contextual_grounding: 0.4,
        }
    }
}

/// Full parameter set for one generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenParams {
    pub temperature: f64,
    pub persona: PersonaParams,
    pub enrichment: EnrichmentParams,
}

impl GenParams {
    pub fn with_temperature(temperature: f64) -> Self {
        Self {
            temperature,
            persona: PersonaParams::default(),
            enrichment: EnrichmentParams::default(),
        }
    }

    /// Clamp all parameters back into their valid ranges after a delta was applied.
    pub fn clamp(&mut self) {
        self.temperature = self.temperature.clamp(0.1, 1.5);
        self.persona.irregularity = self.persona.irregularity.clamp(0.0, 1.0);
        self.persona.rhythm_variation = self.persona.rhythm_variation.clamp(0.0, 1.0);
        self.enrichment.fact_density = self.enrichment.fact_density.clamp(0.0, 1.0);
        self.enrichment.contextual_grounding = self.enrichment.contextual_grounding.clamp(0.0, 1.0);
    }
}

impl Default for GenParams {
    fn default() -> Self {
        Self::with_temperature(0.7)
    }
}

/// Final outcome of a multi-attempt generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub success: bool,
    pub text: String,
    /// Composite AI-likeness estimate, 0.0 (human) to 1.0 (machine)
    pub ai_score: f64,
    /// Convenience inverse of ai_score
    pub human_score: f64,
    /// None when the readability validator was disabled
    pub readability_score: Option<f64>,
    pub attempts_used: u32,
    pub failure_type: Option<FailureType>,
}
