//! Readability validation
//!
//! Secondary quality gate on the standard 0-100 Flesch reading-ease
//! scale. When disabled it reports `disabled` and never blocks
//! acceptance.

use serde::{Deserialize, Serialize};

use crate::config::ReadabilityConfig;
use crate::detection::local::split_sentences;

/// Outcome of a readability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadabilityStatus {
    Pass,
    TooHard,
    TooEasy,
    Disabled,
}

/// Score plus pass/fail status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadabilityReport {
    pub score: Option<f64>,
    pub status: ReadabilityStatus,
}

impl ReadabilityReport {
    /// Disabled never blocks acceptance.
    pub fn passed(&self) -> bool {
        matches!(self.status, ReadabilityStatus::Pass | ReadabilityStatus::Disabled)
    }
}

/// Approximate syllable count: vowel groups with a silent-e adjustment.
fn syllables(word: &str) -> usize {
    let word = word.to_lowercase();
    let letters: Vec<char> = word.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return 0;
    }

    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
    let mut count = 0;
    let mut prev_vowel = false;
    for &c in &letters {
        let vowel = is_vowel(c);
        if vowel && !prev_vowel {
            count += 1;
        }
        prev_vowel = vowel;
    }

    // Silent trailing e, except the consonant-le ending ("table")
    if letters.len() > 2 && letters.last() == Some(&'e') && count > 1 {
        let second_last = letters[letters.len() - 2];
        if !is_vowel(second_last) && second_last != 'l' {
            count -= 1;
        }
    }

    count.max(1)
}

/// Flesch reading ease. Higher is easier; 60-100 is plain English.
pub fn flesch_reading_ease(text: &str) -> Option<f64> {
    let sentences = split_sentences(text);
    let words: Vec<&str> = text.split_whitespace().collect();
    if sentences.is_empty() || words.is_empty() {
        return None;
    }

    let total_syllables: usize = words.iter().map(|w| syllables(w)).sum();
    let words_per_sentence = words.len() as f64 / sentences.len() as f64;
    let syllables_per_word = total_syllables as f64 / words.len() as f64;

    Some(206.835 - 1.015 * words_per_sentence - 84.6 * syllables_per_word)
}

/// Windowed readability validator.
#[derive(Debug, Clone)]
pub struct ReadabilityValidator {
    config: ReadabilityConfig,
}

impl ReadabilityValidator {
    pub fn new(config: ReadabilityConfig) -> Self {
        Self { config }
    }

    pub fn validate(&self, text: &str) -> ReadabilityReport {
        if !self.config.enabled {
            return ReadabilityReport {
                score: None,
                status: ReadabilityStatus::Disabled,
            };
        }

        let Some(score) = flesch_reading_ease(text) else {
            // Unscorable input degrades to disabled rather than blocking
            return ReadabilityReport {
                score: None,
                status: ReadabilityStatus::Disabled,
            };
        };

        let status = if score < self.config.min_score {
            ReadabilityStatus::TooHard
        } else if score > self.config.max_score {
            ReadabilityStatus::TooEasy
        } else {
            ReadabilityStatus::Pass
        };

        ReadabilityReport {
            score: Some(score),
            status,
        }
    }
}
