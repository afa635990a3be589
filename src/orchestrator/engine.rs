//! The generation attempt loop
//!
//! Drives generate, detect, validate, adjust until a candidate clears
//! the active threshold or the attempt budget runs out. The feedback
//! store is consulted for advice and written after every attempt; if it
//! fails, the loop degrades to static defaults rather than blocking.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::completion::{CompletionBackend, CompletionError, CompletionRequest};
use crate::config::Config;
use crate::detection::{DetectionEnsemble, DetectionScore};
use crate::error::{AttemptDiagnostics, GenerationError};
use crate::feedback::{FeedbackStore, NewAttempt};
use crate::learning::{PatternLearner, SuccessPredictor, TemperatureAdvisor};
use crate::prompt::{ComponentSpec, FactMap, PersonaProfile, PromptAssembler, PromptInputs};
use crate::readability::ReadabilityValidator;
use crate::types::{GenParams, GenerationResult};

use super::adjust::{
    apply_failure_deltas, apply_named_delta, apply_readability_nudge, classify_failure,
};
use super::curriculum::Curriculum;

/// Where the loop currently is, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    AdvisorGuided,
    Exploring,
    Accepted,
    Exhausted,
}

/// One generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub topic: String,
    pub topic_category: String,
    pub component_type: String,
    pub domain_context: Option<String>,
    pub facts: FactMap,
    pub persona: PersonaProfile,
    pub spec: ComponentSpec,
    /// Fixed seed for reproducible exploration; fresh entropy when None
    pub seed: Option<u64>,
}

/// The closed-loop orchestrator.
pub struct Orchestrator {
    backend: Arc<dyn CompletionBackend>,
    ensemble: DetectionEnsemble,
    readability: ReadabilityValidator,
    store: Option<Arc<FeedbackStore>>,
    config: Config,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        ensemble: DetectionEnsemble,
        readability: ReadabilityValidator,
        store: Option<Arc<FeedbackStore>>,
        config: Config,
    ) -> Self {
        Self {
            backend,
            ensemble,
            readability,
            store,
            config,
        }
    }

    /// Run the whole multi-attempt loop under the configured wall-clock
    /// bound.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerationError> {
        let bound = Duration::from_secs(self.config.orchestrator.timeout_secs);
        match tokio::time::timeout(bound, self.run_attempts(request)).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout {
                elapsed_secs: self.config.orchestrator.timeout_secs,
            }),
        }
    }

    async fn run_attempts(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerationError> {
        let curriculum = Curriculum::new(self.config.curriculum.clone());
        let mut store = self.store.clone();

        let success_rate = match &store {
            Some(s) => {
                match s
                    .rolling_success_rate(
                        &request.topic_category,
                        &request.component_type,
                        self.config.curriculum.window,
                    )
                    .await
                {
                    Ok(rate) => rate,
                    Err(e) => {
                        warn!("feedback store unreadable, generating without learning: {e:#}");
                        store = None;
                        None
                    }
                }
            }
            None => None,
        };
        let threshold = curriculum.threshold_for(success_rate);
        info!(
            topic = %request.topic,
            component = %request.component_type,
            threshold,
            success_rate = ?success_rate,
            "starting generation loop"
        );

        let mut params = self.initial_params(request, &store).await;
        let (blacklist, safe_patterns) = self.pattern_context(request, &store).await;

        let seed_base = request.seed.unwrap_or_else(rand::random);
        let mut last_diagnostics: Option<AttemptDiagnostics> = None;

        for attempt in 1..=self.config.orchestrator.max_attempts {
            let mut rng = StdRng::seed_from_u64(seed_base.wrapping_add(attempt as u64));

            let mut attempt_params = params;
            let state = if attempt > 1
                && rng.random::<f64>() < self.config.orchestrator.exploration_probability
            {
                attempt_params.temperature += rng.random_range(-0.15..=0.15);
                attempt_params.persona.irregularity += rng.random_range(-0.2..=0.2);
                attempt_params.clamp();
                LoopState::Exploring
            } else {
                LoopState::AdvisorGuided
            };
            debug!(
                attempt,
                state = ?state,
                temperature = attempt_params.temperature,
                "attempt parameters chosen"
            );

            if self.config.orchestrator.predict_gate {
                if let Some(skip_params) = self.predictor_veto(request, &store, attempt_params, attempt).await {
                    params = skip_params;
                    last_diagnostics.get_or_insert(AttemptDiagnostics {
                        ai_score: 1.0,
                        readability_score: None,
                        params: attempt_params,
                        failure_type: None,
                        threshold,
                    });
                    continue;
                }
            }

            let prompt = PromptAssembler::assemble(&PromptInputs {
                topic: &request.topic,
                component_type: &request.component_type,
                domain_context: request.domain_context.as_deref(),
                facts: &request.facts,
                persona: &request.persona,
                spec: &request.spec,
                params: &attempt_params,
                blacklist: &blacklist,
                safe_patterns: &safe_patterns,
            });

            let completion_request = CompletionRequest {
                system: prompt.system,
                user: prompt.user,
                temperature: attempt_params.temperature,
                max_tokens: self.config.completion.max_tokens,
                nonce: Uuid::new_v4().to_string(),
            };

            let text = match self.backend.complete(&completion_request).await {
                Ok(text) => text,
                Err(CompletionError::Auth(msg)) => {
                    return Err(GenerationError::Configuration(msg));
                }
                Err(e) => return Err(GenerationError::Transport(e.to_string())),
            };

            let mut score = self
                .ensemble
                .detect(&text, attempt, false)
                .await
                .map_err(|e| GenerationError::Transport(e.to_string()))?;
            let readability = self.readability.validate(&text);

            let mut detection_passed = score.ai_score < threshold;
            if detection_passed {
                let chars = text.chars().count();
                if self.ensemble.needs_final_confirmation(attempt, chars) {
                    score = self
                        .ensemble
                        .detect(&text, attempt, true)
                        .await
                        .map_err(|e| GenerationError::Transport(e.to_string()))?;
                    detection_passed = score.ai_score < threshold;
                }
            }
            let accepted = detection_passed && readability.passed();

            let failure_type = if detection_passed {
                None
            } else {
                Some(classify_failure(
                    score.ai_score,
                    threshold,
                    &score.sentence_scores,
                    &self.config.failure,
                ))
            };

            if let Some(s) = &store {
                let record = NewAttempt {
                    topic: request.topic.clone(),
                    topic_category: request.topic_category.clone(),
                    component_type: request.component_type.clone(),
                    params: attempt_params,
                    attempt_number: attempt,
                    generated_text: text.clone(),
                    ai_score: score.ai_score,
                    human_score: 1.0 - score.ai_score,
                    readability_score: readability.score,
                    success: accepted,
                    failure_type,
                };
                if let Err(e) = persist_attempt(s, &record, &score).await {
                    warn!("feedback store write failed, disabling learning for this run: {e:#}");
                    store = None;
                }
            }

            if accepted {
                info!(
                    attempt,
                    state = ?LoopState::Accepted,
                    ai_score = score.ai_score,
                    method = %score.method,
                    "candidate accepted"
                );
                return Ok(GenerationResult {
                    success: true,
                    text,
                    ai_score: score.ai_score,
                    human_score: 1.0 - score.ai_score,
                    readability_score: readability.score,
                    attempts_used: attempt,
                    failure_type: None,
                });
            }

            debug!(
                attempt,
                ai_score = score.ai_score,
                threshold,
                failure = ?failure_type,
                readability = ?readability.status,
                "attempt rejected"
            );
            last_diagnostics = Some(AttemptDiagnostics {
                ai_score: score.ai_score,
                readability_score: readability.score,
                params: attempt_params,
                failure_type,
                threshold,
            });

            params = attempt_params;
            if let Some(failure) = failure_type {
                apply_failure_deltas(&mut params, failure);
            } else if !readability.passed() {
                apply_readability_nudge(&mut params, readability.status);
            }
        }

        let attempts = self.config.orchestrator.max_attempts;
        info!(attempts, state = ?LoopState::Exhausted, "attempt budget exhausted");
        Err(GenerationError::DetectionExhausted {
            attempts,
            diagnostics: last_diagnostics.unwrap_or(AttemptDiagnostics {
                ai_score: 1.0,
                readability_score: None,
                params,
                failure_type: None,
                threshold,
            }),
        })
    }

    /// Starting parameters: advisor-recommended temperature when the
    /// store has enough history, otherwise the static baseline.
    async fn initial_params(
        &self,
        request: &GenerationRequest,
        store: &Option<Arc<FeedbackStore>>,
    ) -> GenParams {
        let fallback = self.config.orchestrator.baseline_temperature;
        let temperature = match store {
            Some(s) => {
                let advisor = TemperatureAdvisor::new(Arc::clone(s), self.config.learning.clone());
                match advisor
                    .recommend(&request.topic_category, &request.component_type, fallback)
                    .await
                {
                    Ok(advice) => {
                        debug!(
                            temperature = advice.temperature,
                            confidence = %advice.confidence,
                            sample_size = advice.sample_size,
                            "temperature advice"
                        );
                        advice.temperature
                    }
                    Err(e) => {
                        warn!("temperature advisor unavailable: {e:#}");
                        fallback
                    }
                }
            }
            None => fallback,
        };
        GenParams::with_temperature(temperature)
    }

    /// Mined pattern context for prompt assembly. Any learning failure
    /// degrades to empty lists.
    async fn pattern_context(
        &self,
        request: &GenerationRequest,
        store: &Option<Arc<FeedbackStore>>,
    ) -> (Vec<String>, Vec<String>) {
        let Some(s) = store else {
            return (Vec::new(), Vec::new());
        };
        let learner = PatternLearner::new(Arc::clone(s), self.config.learning.clone());
        match learner.learn(None, Some(&request.component_type)).await {
            Ok(report) => {
                let blacklist: Vec<String> = report
                    .risky_patterns
                    .into_iter()
                    .take(self.config.learning.max_blacklist)
                    .map(|p| p.pattern)
                    .collect();
                let safe: Vec<String> = report
                    .safe_patterns
                    .into_iter()
                    .map(|p| p.pattern)
                    .collect();
                (blacklist, safe)
            }
            Err(e) => {
                warn!("pattern learning unavailable: {e:#}");
                (Vec::new(), Vec::new())
            }
        }
    }

    /// Optional pre-attempt gate: when the predictor rates the proposed
    /// parameters below the floor and has concrete adjustments, the
    /// attempt is skipped and the adjusted parameters returned.
    async fn predictor_veto(
        &self,
        request: &GenerationRequest,
        store: &Option<Arc<FeedbackStore>>,
        mut attempt_params: GenParams,
        attempt: u32,
    ) -> Option<GenParams> {
        let s = store.as_ref()?;
        let predictor = SuccessPredictor::new(Arc::clone(s), self.config.learning.clone());
        match predictor
            .predict(
                &request.topic_category,
                &request.component_type,
                attempt_params.temperature,
                attempt,
            )
            .await
        {
            Ok(prediction)
                if prediction.success_probability < self.config.orchestrator.predict_floor
                    && !prediction.suggested_deltas.is_empty() =>
            {
                debug!(
                    attempt,
                    probability = prediction.success_probability,
                    "predictor vetoed attempt, applying suggested deltas"
                );
                for delta in &prediction.suggested_deltas {
                    apply_named_delta(&mut attempt_params, &delta.parameter, delta.delta);
                }
                attempt_params.clamp();
                Some(attempt_params)
            }
            Ok(_) => None,
            Err(e) => {
                warn!("success predictor unavailable: {e:#}");
                None
            }
        }
    }
}

async fn persist_attempt(
    store: &FeedbackStore,
    record: &NewAttempt,
    score: &DetectionScore,
) -> anyhow::Result<()> {
    let id = store.append_attempt(record).await?;
    let rows: Vec<(String, f64)> = score
        .sentence_scores
        .iter()
        .map(|s| (s.sentence.clone(), s.score))
        .collect();
    store.append_sentence_scores(&id, &rows).await?;
    Ok(())
}
