//! CLI interface for copyforge

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::completion::HttpCompletionClient;
use crate::config::{self, Config};
use crate::detection::{DetectionEnsemble, DetectionScore};
use crate::error::{AttemptDiagnostics, GenerationError};
use crate::feedback::{AttemptFilter, AttemptRecord, FeedbackStore};
use crate::learning::{
    PatternLearner, PatternReport, Recommendation, SuccessPredictor, TemperatureAdvice,
    TemperatureAdvisor,
};
use crate::orchestrator::{Curriculum, GenerationRequest, Orchestrator};
use crate::prompt::{load_facts, ComponentCatalog, FactMap, PersonaProfile};
use crate::readability::ReadabilityValidator;
use crate::types::GenParams;

#[derive(Parser)]
#[command(name = "copyforge")]
#[command(about = "Closed-loop generator for short website copy that reads as human-written", long_about = None)]
#[command(version)]
struct Cli {
    /// Use an explicit config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate one copy component
    Generate {
        /// Topic to write about
        #[arg(short, long)]
        topic: String,
        /// Topic category used for learning aggregation
        #[arg(long, default_value = "general")]
        category: String,
        /// Component type (caption, subtitle, faq_answer, or a catalog entry)
        #[arg(short = 'k', long, default_value = "caption")]
        component: String,
        /// Persona profile TOML
        #[arg(short, long)]
        persona: PathBuf,
        /// Facts file (TOML or JSON)
        #[arg(short, long)]
        facts: Option<PathBuf>,
        /// Component catalog TOML; built-in length specs when omitted
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Domain context to ground the copy in
        #[arg(long)]
        context: Option<String>,
        /// Fixed exploration seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
        /// Print scores and attempt count to stderr
        #[arg(short, long)]
        verbose: bool,
    },
    /// Mine the attempt history for phrasing patterns and a temperature recommendation
    Learn {
        /// Restrict mining to one topic
        #[arg(short, long)]
        topic: Option<String>,
        /// Topic category for the temperature recommendation
        #[arg(long, default_value = "general")]
        category: String,
        /// Restrict mining to one component type
        #[arg(short = 'k', long)]
        component: Option<String>,
    },
    /// Predict success odds for a parameter choice before generating
    Predict {
        /// Topic category
        #[arg(long, default_value = "general")]
        category: String,
        /// Component type
        #[arg(short = 'k', long, default_value = "caption")]
        component: String,
        /// Proposed temperature
        #[arg(short = 'T', long)]
        temperature: f64,
        /// Attempt number the parameters would be used on
        #[arg(short, long, default_value = "1")]
        attempt: u32,
    },
    /// Recommend a temperature from the attempt history
    Advise {
        /// Topic category
        #[arg(long, default_value = "general")]
        category: String,
        /// Component type
        #[arg(short = 'k', long, default_value = "caption")]
        component: String,
    },
    /// Re-score existing text with the detection stack and report pass or fail
    Audit {
        /// File to score; stdin when omitted
        file: Option<PathBuf>,
        /// Re-score a stored attempt instead of a file
        #[arg(long, conflicts_with = "file")]
        id: Option<String>,
    },
    /// Inspect the attempt history
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
    /// Show or locate the configuration
    Config {
        /// Print the config file path instead of its contents
        #[arg(long)]
        path: bool,
    },
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// List recent attempts
    List {
        /// Maximum attempts to show
        #[arg(short, long, default_value = "20")]
        limit: u32,
        /// Filter by topic
        #[arg(short, long)]
        topic: Option<String>,
        /// Filter by component type
        #[arg(short = 'k', long)]
        component: Option<String>,
    },
    /// Show one attempt with its sentence scores and corrections
    Show {
        /// Attempt ID
        id: String,
    },
    /// Record a human correction against an attempt
    Correct {
        /// Attempt ID the correction applies to
        id: String,
        /// Corrected text
        #[arg(short = 'x', long)]
        text: String,
        /// Correction kind (e.g. manual_edit, tone, factual)
        #[arg(long, default_value = "manual_edit")]
        kind: String,
        /// Mark the corrected text as approved
        #[arg(long)]
        approved: bool,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Generate {
            topic,
            category,
            component,
            persona,
            facts,
            catalog,
            context,
            seed,
            verbose,
        } => {
            generate(
                &config, &topic, &category, &component, &persona, facts.as_deref(),
                catalog.as_deref(), context, seed, verbose,
            )
            .await?;
        }
        Commands::Learn {
            topic,
            category,
            component,
        } => {
            let store = open_store().await?;
            let (report, advice) = learn_summary(
                store,
                &config,
                topic.as_deref(),
                &category,
                component.as_deref(),
            )
            .await?;

            println!("Risky patterns ({}):", report.risky_patterns.len());
            for p in &report.risky_patterns {
                println!(
                    "  \"{}\"  fail rate {:.0}% over {} attempts",
                    p.pattern,
                    p.fail_rate * 100.0,
                    p.occurrences
                );
            }
            println!();
            println!("Safe patterns ({}):", report.safe_patterns.len());
            for p in &report.safe_patterns {
                println!(
                    "  \"{}\"  success rate {:.0}% over {} attempts",
                    p.pattern,
                    p.success_rate * 100.0,
                    p.occurrences
                );
            }
            if !report.recommendations.is_empty() {
                println!();
                for rec in &report.recommendations {
                    println!("- {}", rec);
                }
            }
            println!();
            println!(
                "Recommended temperature {:.2} ({} confidence, {} samples)",
                advice.temperature, advice.confidence, advice.sample_size
            );
        }
        Commands::Predict {
            category,
            component,
            temperature,
            attempt,
        } => {
            let store = open_store().await?;
            let predictor = SuccessPredictor::new(store, config.learning.clone());
            let prediction = predictor
                .predict(&category, &component, temperature, attempt)
                .await?;

            println!("Success probability: {:.0}%", prediction.success_probability * 100.0);
            println!("Expected AI score:   {:.2}", prediction.expected_score);
            match prediction.recommendation {
                Recommendation::Proceed => println!("Recommendation:      proceed"),
                Recommendation::Adjust => {
                    println!("Recommendation:      adjust");
                    for delta in &prediction.suggested_deltas {
                        println!("  {} {:+.2}", delta.parameter, delta.delta);
                    }
                }
            }
        }
        Commands::Advise { category, component } => {
            let store = open_store().await?;
            let advisor = TemperatureAdvisor::new(store, config.learning.clone());
            let advice = advisor
                .recommend(&category, &component, config.orchestrator.baseline_temperature)
                .await?;
            println!(
                "Temperature {:.2} ({} confidence, {} samples)",
                advice.temperature, advice.confidence, advice.sample_size
            );
        }
        Commands::Audit { file, id } => {
            let verdict = match id {
                Some(id) => {
                    let store = open_store().await?;
                    let (attempt, verdict) = audit_stored(&store, &config, &id).await?;
                    println!(
                        "Attempt {}  {}  {}  (stored ai {:.3})",
                        &attempt.id[..8.min(attempt.id.len())],
                        attempt.component_type,
                        attempt.topic,
                        attempt.ai_score
                    );
                    verdict
                }
                None => {
                    let text = match file {
                        Some(path) => std::fs::read_to_string(&path)
                            .with_context(|| format!("Failed to read {}", path.display()))?,
                        None => {
                            use std::io::Read;
                            let mut buf = String::new();
                            std::io::stdin().read_to_string(&mut buf)?;
                            buf
                        }
                    };

                    let readability =
                        ReadabilityValidator::new(config.readability.clone()).validate(&text);
                    match readability.score {
                        Some(ease) => println!("Readability: {:.1} ({:?})", ease, readability.status),
                        None => println!("Readability: n/a"),
                    }

                    let ensemble = DetectionEnsemble::from_config(&config.detection);
                    // No bucket history to consult for free-standing text
                    let threshold = Curriculum::new(config.curriculum.clone()).threshold_for(None);
                    audit_text(&ensemble, &text, threshold, GenParams::default()).await?
                }
            };

            println!(
                "AI score:    {:.3} ({})",
                verdict.score.ai_score, verdict.score.method
            );
            for s in &verdict.score.sentence_scores {
                println!("  [{:.2}] {}", s.score, s.sentence);
            }
            println!();
            if verdict.passed {
                println!(
                    "Verdict: pass ({:.3} < allowed {:.2})",
                    verdict.score.ai_score, verdict.threshold
                );
            } else {
                println!(
                    "Verdict: fail ({:.3} >= allowed {:.2})",
                    verdict.score.ai_score, verdict.threshold
                );
                return Err(GenerationError::DetectionExhausted {
                    attempts: 1,
                    diagnostics: AttemptDiagnostics {
                        ai_score: verdict.score.ai_score,
                        readability_score: None,
                        params: verdict.params,
                        failure_type: None,
                        threshold: verdict.threshold,
                    },
                }
                .into());
            }
        }
        Commands::History { command } => match command {
            HistoryCommands::List { limit, topic, component } => {
                let store = open_store().await?;
                let attempts = store
                    .query_attempts(&AttemptFilter {
                        topic,
                        component_type: component,
                        limit: Some(limit),
                        ..AttemptFilter::default()
                    })
                    .await?;

                if attempts.is_empty() {
                    println!("No attempts recorded yet.");
                    return Ok(());
                }
                for a in &attempts {
                    println!(
                        "{}  {}  {}  {}  temp {:.2}  ai {:.2}  {}",
                        &a.id[..8],
                        a.created_at.format("%Y-%m-%d %H:%M"),
                        a.component_type,
                        a.topic,
                        a.temperature,
                        a.ai_score,
                        if a.success {
                            "ok".to_string()
                        } else {
                            a.failure_type
                                .map(|f| f.to_string())
                                .unwrap_or_else(|| "failed".to_string())
                        }
                    );
                }
            }
            HistoryCommands::Show { id } => {
                let store = open_store().await?;
                let Some(attempt) = store.get_attempt(&id).await? else {
                    anyhow::bail!("no attempt with id {id}");
                };

                println!("Attempt {}", attempt.id);
                println!("  Topic:       {} ({})", attempt.topic, attempt.topic_category);
                println!("  Component:   {}", attempt.component_type);
                println!("  Attempt #:   {}", attempt.attempt_number);
                println!("  Temperature: {:.2}", attempt.temperature);
                println!(
                    "  Persona:     irregularity {:.2}, rhythm {:.2}",
                    attempt.persona_params.irregularity, attempt.persona_params.rhythm_variation
                );
                println!(
                    "  Enrichment:  facts {:.2}, grounding {:.2}",
                    attempt.enrichment_params.fact_density,
                    attempt.enrichment_params.contextual_grounding
                );
                println!("  AI score:    {:.3}", attempt.ai_score);
                if let Some(ease) = attempt.readability_score {
                    println!("  Readability: {:.1}", ease);
                }
                println!(
                    "  Outcome:     {}",
                    if attempt.success {
                        "accepted".to_string()
                    } else {
                        attempt
                            .failure_type
                            .map(|f| format!("rejected ({f})"))
                            .unwrap_or_else(|| "rejected".to_string())
                    }
                );
                println!();
                println!("{}", attempt.generated_text);

                let sentences = store.sentence_scores(&attempt.id).await?;
                if !sentences.is_empty() {
                    println!();
                    println!("Sentence scores:");
                    for s in &sentences {
                        println!("  [{:.2}] {}", s.score, s.sentence);
                    }
                }

                let corrections = store.corrections(&attempt.id).await?;
                if !corrections.is_empty() {
                    println!();
                    println!("Corrections:");
                    for c in &corrections {
                        println!(
                            "  {} [{}{}] {}",
                            c.created_at.format("%Y-%m-%d %H:%M"),
                            c.correction_type,
                            if c.approved { ", approved" } else { "" },
                            c.corrected_text
                        );
                        if let Some(notes) = &c.notes {
                            println!("    notes: {}", notes);
                        }
                    }
                }
            }
            HistoryCommands::Correct {
                id,
                text,
                kind,
                approved,
                notes,
            } => {
                let store = open_store().await?;
                let correction_id = store
                    .append_correction(&id, &text, &kind, approved, notes.as_deref())
                    .await?;
                println!("Correction {} recorded against attempt {}.", &correction_id[..8], &id[..8.min(id.len())]);
            }
        },
        Commands::Config { path } => {
            if path {
                println!("{}", config::config_path()?.display());
            } else {
                config::show_config(&config)?;
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => Config::load_from(p),
        None => Config::load(),
    }
}

/// What the audit decided about one text.
#[derive(Debug)]
struct AuditVerdict {
    score: DetectionScore,
    threshold: f64,
    params: GenParams,
    passed: bool,
}

async fn audit_text(
    ensemble: &DetectionEnsemble,
    text: &str,
    threshold: f64,
    params: GenParams,
) -> Result<AuditVerdict> {
    let score = ensemble.detect(text, 1, true).await?;
    // Same strict comparison the generation loop applies on acceptance
    let passed = score.ai_score < threshold;
    Ok(AuditVerdict {
        score,
        threshold,
        params,
        passed,
    })
}

/// Re-score a stored attempt against the threshold its bucket would
/// face today.
async fn audit_stored(
    store: &FeedbackStore,
    config: &Config,
    id: &str,
) -> Result<(AttemptRecord, AuditVerdict)> {
    let Some(attempt) = store.get_attempt(id).await? else {
        return Err(GenerationError::Configuration(format!("no attempt with id {id}")).into());
    };
    let rate = store
        .rolling_success_rate(
            &attempt.topic_category,
            &attempt.component_type,
            config.curriculum.window,
        )
        .await?;
    let threshold = Curriculum::new(config.curriculum.clone()).threshold_for(rate);
    let params = GenParams {
        temperature: attempt.temperature,
        persona: attempt.persona_params,
        enrichment: attempt.enrichment_params,
    };

    let ensemble = DetectionEnsemble::from_config(&config.detection);
    let verdict = audit_text(&ensemble, &attempt.generated_text, threshold, params).await?;
    Ok((attempt, verdict))
}

/// Pattern mining plus a temperature recommendation over the same
/// history, so one learn run reports both.
async fn learn_summary(
    store: Arc<FeedbackStore>,
    config: &Config,
    topic: Option<&str>,
    category: &str,
    component: Option<&str>,
) -> Result<(PatternReport, TemperatureAdvice)> {
    let learner = PatternLearner::new(Arc::clone(&store), config.learning.clone());
    let report = learner.learn(topic, component).await?;

    let advisor = TemperatureAdvisor::new(store, config.learning.clone());
    let advice = advisor
        .recommend(
            category,
            component.unwrap_or("caption"),
            config.orchestrator.baseline_temperature,
        )
        .await?;
    Ok((report, advice))
}

/// Open the default feedback store for commands whose whole purpose is
/// the store. Generation itself degrades instead of calling this.
async fn open_store() -> Result<Arc<FeedbackStore>> {
    let path = config::store_path()
        .map_err(|e| GenerationError::StoreUnavailable(format!("{e:#}")))?;
    let store = FeedbackStore::open(&path)
        .await
        .map_err(|e| GenerationError::StoreUnavailable(format!("{e:#}")))?;
    Ok(Arc::new(store))
}

#[allow(clippy::too_many_arguments)]
async fn generate(
    config: &Config,
    topic: &str,
    category: &str,
    component: &str,
    persona_path: &Path,
    facts_path: Option<&Path>,
    catalog_path: Option<&Path>,
    context: Option<String>,
    seed: Option<u64>,
    verbose: bool,
) -> Result<()> {
    let persona = PersonaProfile::load(persona_path)
        .map_err(|e| GenerationError::Configuration(format!("{e:#}")))?;
    let catalog = match catalog_path {
        Some(p) => ComponentCatalog::load(p)
            .map_err(|e| GenerationError::Configuration(format!("{e:#}")))?,
        None => ComponentCatalog::builtin(),
    };
    let spec = catalog
        .spec_for(component)
        .map_err(|e| GenerationError::Configuration(format!("{e:#}")))?;
    let facts = match facts_path {
        Some(p) => load_facts(p).map_err(|e| GenerationError::Configuration(format!("{e:#}")))?,
        None => FactMap::new(),
    };

    let backend = HttpCompletionClient::from_config(&config.completion)
        .map_err(|e| GenerationError::Configuration(format!("{e:#}")))?;

    // A broken store must never block generation
    let store = match config::store_path() {
        Ok(path) => match FeedbackStore::open(&path).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                tracing::warn!("feedback store unavailable, generating without learning: {e:#}");
                None
            }
        },
        Err(e) => {
            tracing::warn!("no data directory, generating without learning: {e:#}");
            None
        }
    };

    let orchestrator = Orchestrator::new(
        Arc::new(backend),
        DetectionEnsemble::from_config(&config.detection),
        ReadabilityValidator::new(config.readability.clone()),
        store,
        config.clone(),
    );

    let request = GenerationRequest {
        topic: topic.to_string(),
        topic_category: category.to_string(),
        component_type: component.to_string(),
        domain_context: context,
        facts,
        persona,
        spec,
        seed,
    };

    let result = orchestrator.generate(&request).await?;

    if verbose {
        eprintln!("attempts:    {}", result.attempts_used);
        eprintln!("ai score:    {:.3}", result.ai_score);
        if let Some(ease) = result.readability_score {
            eprintln!("readability: {:.1}", ease);
        }
    }
    println!("{}", result.text);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CurriculumConfig;
    use crate::feedback::NewAttempt;
    use crate::types::FailureType;

    fn recorded(success: bool, temperature: f64) -> NewAttempt {
        NewAttempt {
            topic: "Aluminum".to_string(),
            topic_category: "metals".to_string(),
            component_type: "caption".to_string(),
            params: GenParams::with_temperature(temperature),
            attempt_number: 1,
            generated_text: "We cut the panels on a Tuesday. The finish wasn't perfect, \
                but the client loved it anyway."
                .to_string(),
            ai_score: if success { 0.2 } else { 0.9 },
            human_score: if success { 0.8 } else { 0.1 },
            readability_score: None,
            success,
            failure_type: if success { None } else { Some(FailureType::Partial) },
        }
    }

    fn flat_curriculum(base: f64) -> CurriculumConfig {
        CurriculumConfig {
            window: 50,
            breakpoints: vec![],
            base_allowed_ai_score: base,
        }
    }

    #[tokio::test]
    async fn test_audit_rescored_stored_attempt_reports_pass_or_fail() {
        let store = FeedbackStore::in_memory().unwrap();
        let id = store.append_attempt(&recorded(true, 0.7)).await.unwrap();

        let mut config = Config::default();
        config.curriculum = flat_curriculum(1.0);
        let (attempt, verdict) = audit_stored(&store, &config, &id).await.unwrap();
        assert_eq!(attempt.id, id);
        assert!(verdict.passed);
        assert!((verdict.threshold - 1.0).abs() < 1e-9);
        assert_eq!(verdict.params.temperature, 0.7);

        // Nothing clears an allowed score of zero
        config.curriculum = flat_curriculum(0.0);
        let (_, verdict) = audit_stored(&store, &config, &id).await.unwrap();
        assert!(!verdict.passed);
    }

    #[tokio::test]
    async fn test_audit_unknown_attempt_is_a_configuration_error() {
        let store = FeedbackStore::in_memory().unwrap();
        let config = Config::default();

        let err = audit_stored(&store, &config, "no-such-id").await.unwrap_err();
        let gen = err.downcast_ref::<GenerationError>().unwrap();
        assert_eq!(gen.exit_code(), 4);
    }

    #[tokio::test]
    async fn test_learn_summary_carries_a_temperature_recommendation() {
        let store = Arc::new(FeedbackStore::in_memory().unwrap());
        for _ in 0..12 {
            store.append_attempt(&recorded(true, 0.65)).await.unwrap();
        }

        let config = Config::default();
        let (report, advice) =
            learn_summary(Arc::clone(&store), &config, None, "metals", Some("caption"))
                .await
                .unwrap();

        assert!((advice.temperature - 0.65).abs() < 1e-9);
        assert!(advice.sample_size >= 12);
        assert!(report.risky_patterns.is_empty());
    }
}
