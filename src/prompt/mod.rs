//! Prompt assembly
//!
//! Combines externally supplied facts, the persona profile, the
//! component length spec, and the current pattern blacklist into the
//! system/user prompt pair sent to the completion service.

pub mod persona;

pub use persona::{load_facts, ComponentCatalog, ComponentSpec, FactMap, GrammarNorms, PersonaProfile};

use crate::types::GenParams;

/// Inputs for one prompt build.
pub struct PromptInputs<'a> {
    pub topic: &'a str,
    pub component_type: &'a str,
    pub domain_context: Option<&'a str>,
    pub facts: &'a FactMap,
    pub persona: &'a PersonaProfile,
    pub spec: &'a ComponentSpec,
    pub params: &'a GenParams,
    /// Patterns mined as risky; injected as explicit negative examples
    pub blacklist: &'a [String],
    /// High-success patterns injected as positive reinforcement
    pub safe_patterns: &'a [String],
}

/// The assembled system/user prompt pair.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub system: String,
    pub user: String,
}

/// Stateless prompt builder.
pub struct PromptAssembler;

impl PromptAssembler {
    pub fn assemble(inputs: &PromptInputs<'_>) -> AssembledPrompt {
        let (min_sentences, max_sentences) =
            inputs.persona.sentence_range(inputs.spec.target_word_count);

        let mut system = String::with_capacity(1024);
        system.push_str(&format!(
            "You write short website copy in the voice of {}.\n",
            inputs.persona.display_name
        ));
        if !inputs.persona.linguistic_traits.is_empty() {
            system.push_str(&format!(
                "Voice traits: {}.\n",
                inputs.persona.linguistic_traits.join(", ")
            ));
        }
        system.push_str(&format!(
            "Write like a person, not a marketer. Average about {:.0} words per sentence.\n",
            inputs.persona.grammar_norms.avg_words_per_sentence
        ));
        if !inputs.persona.grammar_norms.preferred_punctuation.is_empty() {
            system.push_str(&format!(
                "Prefer these sentence endings: {}\n",
                inputs.persona.grammar_norms.preferred_punctuation.join(" ")
            ));
        }

        // Style dials derived from the current attempt parameters
        if inputs.params.persona.irregularity > 0.5 {
            system.push_str(
                "Let the grammar breathe: sentence fragments, contractions, and asides are fine.\n",
            );
        } else if inputs.params.persona.irregularity > 0.25 {
            system.push_str("Use contractions and an occasional short fragment.\n");
        }
        if inputs.params.persona.rhythm_variation > 0.5 {
            system.push_str("Vary sentence length sharply: mix very short sentences with long ones.\n");
        }

        if !inputs.blacklist.is_empty() {
            system.push_str("\nNever use these phrases or close variants of them:\n");
            for pattern in inputs.blacklist {
                system.push_str(&format!("- \"{}\"\n", pattern));
            }
        }
        if !inputs.safe_patterns.is_empty() {
            system.push_str("\nPhrasing in this register has worked well:\n");
            for pattern in inputs.safe_patterns.iter().take(5) {
                system.push_str(&format!("- \"{}\"\n", pattern));
            }
        }

        let mut user = String::with_capacity(512);
        user.push_str(&format!(
            "Write a {} about {}.\n",
            inputs.component_type.replace('_', " "),
            inputs.topic
        ));
        user.push_str(&format!(
            "Target roughly {} words ({}-{} acceptable), in {} to {} sentences.\n",
            inputs.spec.target_word_count,
            inputs.spec.acceptable_range.0,
            inputs.spec.acceptable_range.1,
            min_sentences,
            max_sentences
        ));

        let selected_facts = select_facts(inputs.facts, inputs.params.enrichment.fact_density);
        if !selected_facts.is_empty() {
            user.push_str("\nWork in these facts where they fit naturally:\n");
            for (name, value) in &selected_facts {
                user.push_str(&format!("- {}: {}\n", name, value));
            }
        }

        if inputs.params.enrichment.contextual_grounding > 0.3 {
            if let Some(context) = inputs.domain_context {
                user.push_str(&format!("\nGround the copy in this context: {}\n", context));
            }
        }

        user.push_str("\nReturn only the copy itself, no preamble or quotes.");

        AssembledPrompt { system, user }
    }
}

/// Deterministic fact selection: the first `ceil(density * n)` entries
/// in key order. BTreeMap order keeps this stable across runs.
fn select_facts(facts: &FactMap, density: f64) -> Vec<(&String, &String)> {
    let take = (facts.len() as f64 * density.clamp(0.0, 1.0)).ceil() as usize;
    facts.iter().take(take).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::persona::GrammarNorms;

    fn sample_inputs<'a>(
        facts: &'a FactMap,
        persona: &'a PersonaProfile,
        spec: &'a ComponentSpec,
        params: &'a GenParams,
        blacklist: &'a [String],
    ) -> PromptInputs<'a> {
        PromptInputs {
            topic: "Aluminum",
            component_type: "faq_answer",
            domain_context: Some("custom metal fabrication shop"),
            facts,
            persona,
            spec,
            params,
            blacklist,
            safe_patterns: &[],
        }
    }

    fn sample_persona() -> PersonaProfile {
        PersonaProfile {
            display_name: "Shop Voice".to_string(),
            linguistic_traits: vec!["direct".to_string()],
            grammar_norms: GrammarNorms {
                avg_words_per_sentence: 12.0,
                sentence_length_distribution: vec![],
                preferred_punctuation: vec![],
            },
        }
    }

    #[test]
    fn test_prompt_includes_blacklist_as_negative_examples() {
        let facts = FactMap::new();
        let persona = sample_persona();
        let spec = ComponentSpec { target_word_count: 60, acceptable_range: (35, 90) };
        let params = GenParams::default();
        let blacklist = vec!["plays a crucial role".to_string()];

        let prompt = PromptAssembler::assemble(&sample_inputs(
            &facts, &persona, &spec, &params, &blacklist,
        ));
        assert!(prompt.system.contains("Never use these phrases"));
        assert!(prompt.system.contains("plays a crucial role"));
    }

    #[test]
    fn test_prompt_includes_sentence_range_from_persona() {
        let facts = FactMap::new();
        let persona = sample_persona();
        let spec = ComponentSpec { target_word_count: 60, acceptable_range: (35, 90) };
        let params = GenParams::default();

        let prompt =
            PromptAssembler::assemble(&sample_inputs(&facts, &persona, &spec, &params, &[]));
        // base = 60/12 = 5 -> 4 to 6 sentences
        assert!(prompt.user.contains("in 4 to 6 sentences"));
    }

    #[test]
    fn test_fact_density_limits_facts() {
        let mut facts = FactMap::new();
        facts.insert("density".to_string(), "2.70 g/cm3".to_string());
        facts.insert("melting_point".to_string(), "660 C".to_string());
        facts.insert("recyclable".to_string(), "infinitely".to_string());
        facts.insert("tensile".to_string(), "90 MPa".to_string());

        let selected = select_facts(&facts, 0.5);
        assert_eq!(selected.len(), 2);
        let all = select_facts(&facts, 1.0);
        assert_eq!(all.len(), 4);
        let none = select_facts(&facts, 0.0);
        assert!(none.is_empty());
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let mut facts = FactMap::new();
        facts.insert("density".to_string(), "2.70 g/cm3".to_string());
        let persona = sample_persona();
        let spec = ComponentSpec { target_word_count: 25, acceptable_range: (15, 40) };
        let params = GenParams::default();

        let a = PromptAssembler::assemble(&sample_inputs(&facts, &persona, &spec, &params, &[]));
        let b = PromptAssembler::assemble(&sample_inputs(&facts, &persona, &spec, &params, &[]));
        assert_eq!(a.system, b.system);
        assert_eq!(a.user, b.user);
    }
}
