//! Local AI-likeness heuristics
//!
//! Dependency-free scoring over four signal families: grammar
//! regularity, repetition/burstiness, unnatural phrasing, and lexical
//! diversity/structure. Weights come from configuration; the composite
//! is a normalized weighted sum. All functions are pure, so the score
//! is deterministic for a fixed input.

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::LocalDetectorWeights;

use super::{DetectionScore, Detector, SentenceScore};

/// Stock phrases that read machine-generated. Matched case-insensitively
/// against whole phrases, not substrings of words.
static AI_TELL_PHRASES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "delve into",
        "in today's world",
        "in today's fast-paced",
        "it's important to note",
        "it is important to note",
        "it's worth noting",
        "in conclusion",
        "furthermore",
        "moreover",
        "additionally",
        "overall",
        "a testament to",
        "plays a crucial role",
        "plays a vital role",
        "seamlessly",
        "unlock the potential",
        "elevate your",
        "look no further",
        "whether you're",
        "a wide range of",
        "cutting-edge",
        "state-of-the-art",
        "game-changer",
        "in the realm of",
        "navigate the complexities",
        "embark on a journey",
        "it goes without saying",
        "needless to say",
        "at the end of the day",
        "when it comes to",
        "best-in-class",
        "robust solution",
        "leverage the power",
        "harness the power",
        "revolutionize",
        "ever-evolving",
    ]
});

static SENTENCE_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^.!?]+[.!?]+|[^.!?]+$").expect("sentence regex"));

static CONTRACTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b\w+'(s|t|re|ve|ll|d|m)\b").expect("contraction regex"));

/// Split text into trimmed sentences. Empty fragments are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    SENTENCE_SPLIT
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn word_count(sentence: &str) -> usize {
    sentence.split_whitespace().count()
}

/// Fraction of sentences that are "perfectly formed": capitalized start,
/// terminal punctuation, mid-range length, no contractions or fragments.
/// Humans leave rough edges; uniformly polished text reads generated.
fn grammar_regularity(sentences: &[String]) -> f64 {
    if sentences.is_empty() {
        return 0.0;
    }
    let polished = sentences
        .iter()
        .filter(|s| {
            let words = word_count(s);
            let starts_upper = s.chars().next().map(|c| c.is_uppercase()).unwrap_or(false);
            let ends_terminal = s.ends_with('.') || s.ends_with('!') || s.ends_with('?');
            let mid_length = (8..=32).contains(&words);
            let no_contraction = !CONTRACTION.is_match(s);
            starts_upper && ends_terminal && mid_length && no_contraction
        })
        .count();
    polished as f64 / sentences.len() as f64
}

/// Repetition plus burstiness. Repeated bigrams and low variation in
/// sentence length both push the score up.
fn repetition_burstiness(text: &str, sentences: &[String]) -> f64 {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();

    let bigram_repetition = if words.len() < 3 {
        0.0
    } else {
        let mut seen = std::collections::HashSet::new();
        let mut repeated = 0usize;
        let total = words.len() - 1;
        for pair in words.windows(2) {
            if !seen.insert((pair[0].clone(), pair[1].clone())) {
                repeated += 1;
            }
        }
        repeated as f64 / total as f64
    };

    let burstiness_penalty = if sentences.len() < 2 {
        0.0
    } else {
        let lengths: Vec<f64> = sentences.iter().map(|s| word_count(s) as f64).collect();
        let mean = lengths.iter().sum::<f64>() / lengths.len() as f64;
        if mean == 0.0 {
            0.0
        } else {
            let variance =
                lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / lengths.len() as f64;
            let cv = variance.sqrt() / mean;
            // Human prose tends toward cv >= ~0.45; uniform rhythm reads generated
            ((0.45 - cv) / 0.45).clamp(0.0, 1.0)
        }
    };

    (bigram_repetition * 2.0).min(1.0) * 0.5 + burstiness_penalty * 0.5
}

fn phrase_hits(text_lower: &str) -> usize {
    AI_TELL_PHRASES
        .iter()
        .map(|p| text_lower.matches(p).count())
        .sum()
}

/// Density of stock AI phrasing per 100 words.
fn unnatural_phrasing(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let words = word_count(text);
    if words == 0 {
        return 0.0;
    }
    let density = phrase_hits(&lower) as f64 / words as f64 * 100.0;
    (density / 3.0).min(1.0)
}

/// Lexical diversity and structural uniformity: low type-token ratio
/// and repeated sentence openers both push the score up.
fn lexical_structure(text: &str, sentences: &[String]) -> f64 {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return 0.0;
    }

    let unique: std::collections::HashSet<&str> = words.iter().map(|w| w.as_str()).collect();
    let ttr = unique.len() as f64 / words.len() as f64;
    let diversity_penalty = ((0.6 - ttr) / 0.6).clamp(0.0, 1.0);

    let opener_repetition = if sentences.len() < 2 {
        0.0
    } else {
        let openers: Vec<String> = sentences
            .iter()
            .filter_map(|s| s.split_whitespace().next())
            .map(|w| w.to_lowercase())
            .collect();
        let unique_openers: std::collections::HashSet<&str> =
            openers.iter().map(|w| w.as_str()).collect();
        1.0 - unique_openers.len() as f64 / openers.len() as f64
    };

    diversity_penalty * 0.6 + opener_repetition * 0.4
}

/// Score one sentence against the corpus mean length. Used to build the
/// per-sentence distribution that failure classification reads.
fn score_sentence(sentence: &str, mean_len: f64) -> f64 {
    let lower = sentence.to_lowercase();
    let words = word_count(sentence) as f64;

    let phrase_component = (phrase_hits(&lower) as f64 * 0.5).min(1.0);

    let polish_component = {
        let starts_upper = sentence.chars().next().map(|c| c.is_uppercase()).unwrap_or(false);
        let no_contraction = !CONTRACTION.is_match(sentence);
        if starts_upper && no_contraction && (8.0..=32.0).contains(&words) {
            1.0
        } else {
            0.0
        }
    };

    let typicality = if mean_len > 0.0 {
        (1.0 - (words - mean_len).abs() / mean_len).clamp(0.0, 1.0)
    } else {
        0.0
    };

    (phrase_component * 0.5 + polish_component * 0.3 + typicality * 0.2).clamp(0.0, 1.0)
}

/// Dependency-free local detector.
#[derive(Debug, Clone)]
pub struct LocalDetector {
    weights: LocalDetectorWeights,
}

impl LocalDetector {
    pub fn new(weights: LocalDetectorWeights) -> Self {
        Self { weights }
    }

    /// Synchronous scoring entry point; the `Detector` impl wraps this.
    pub fn score(&self, text: &str) -> DetectionScore {
        let sentences = split_sentences(text);

        let grammar = grammar_regularity(&sentences);
        let repetition = repetition_burstiness(text, &sentences);
        let phrasing = unnatural_phrasing(text);
        let lexical = lexical_structure(text, &sentences);

        let w = &self.weights;
        let total_weight = w.grammar + w.repetition + w.phrasing + w.lexical;
        let ai_score = if total_weight > 0.0 {
            (grammar * w.grammar
                + repetition * w.repetition
                + phrasing * w.phrasing
                + lexical * w.lexical)
                / total_weight
        } else {
            0.0
        };

        let mean_len = if sentences.is_empty() {
            0.0
        } else {
            sentences.iter().map(|s| word_count(s) as f64).sum::<f64>() / sentences.len() as f64
        };
        let sentence_scores = sentences
            .iter()
            .map(|s| SentenceScore {
                sentence: s.clone(),
                score: score_sentence(s, mean_len),
            })
            .collect();

        DetectionScore {
            ai_score: ai_score.clamp(0.0, 1.0),
            sentence_scores,
            method: "local".to_string(),
        }
    }

    /// The "simplest baseline": phrase density alone. Blended in when no
    /// external detector is available.
    pub fn baseline_score(&self, text: &str) -> f64 {
        unnatural_phrasing(text)
    }
}

#[async_trait]
impl Detector for LocalDetector {
    fn name(&self) -> &str {
        "local"
    }

    async fn detect(&self, text: &str) -> Result<DetectionScore> {
        Ok(self.score(text))
    }
}
