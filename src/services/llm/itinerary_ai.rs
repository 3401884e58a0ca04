use super::client::{ChatMessage, ChatRequest, LlmClient, LlmError};
use super::plan_parser::{extract_json, parse_plan, PlanExpectations};
use super::prompt_builder::{build_prompt, metadata_prompt, BuiltPrompt, PlanContext};
use super::GenerationMode;
use crate::config::PlannerConfig;
use crate::constants::{AI_MAX_TOKENS_PRO, AI_MAX_TOKENS_STANDARD, AI_RETRY_JITTER_MS};
use crate::error::{AppError, Result};
use crate::models::{LocationMetadata, Plan};
use std::sync::Arc;
use std::time::Duration;

const METADATA_MAX_TOKENS: u32 = 400;

#[derive(Debug, Clone)]
pub struct GeneratedPlan {
    pub plan: Plan,
    /// Model that produced the accepted response
    pub model: String,
    /// Total calls made across all models
    pub attempts: usize,
}

/// Why a single attempt produced no plan.
#[derive(Debug)]
enum AttemptFailure {
    Llm(LlmError),
    InvalidOutput(String),
}

/// Itinerary generation over an [`LlmClient`] with retry and model fallback.
pub struct ItineraryAi {
    client: Arc<dyn LlmClient>,
    config: PlannerConfig,
}

impl ItineraryAi {
    pub fn new(client: Arc<dyn LlmClient>, config: PlannerConfig) -> Self {
        ItineraryAi { client, config }
    }

    /// Exponential backoff with jitter for the given retry index.
    fn backoff_delay(&self, retry: usize) -> Duration {
        let base = self.config.ai_retry_base_ms;
        if base == 0 {
            return Duration::ZERO;
        }
        let exp = base.saturating_mul(1u64 << retry.min(10));
        let jitter = rand::random_range(0..=AI_RETRY_JITTER_MS);
        Duration::from_millis(exp + jitter)
    }

    fn prompt_budget(&self, mode: GenerationMode) -> usize {
        match mode {
            GenerationMode::Standard => self.config.max_prompt_chars_standard,
            GenerationMode::Pro => self.config.max_prompt_chars_pro,
        }
    }

    fn chat_request(&self, model: &str, prompt: &BuiltPrompt, mode: GenerationMode) -> ChatRequest {
        let (temperature, max_tokens) = match mode {
            GenerationMode::Standard => (0.7, AI_MAX_TOKENS_STANDARD),
            GenerationMode::Pro => (0.6, AI_MAX_TOKENS_PRO),
        };
        ChatRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage::system(prompt.system.clone()),
                ChatMessage::user(prompt.user.clone()),
            ],
            temperature,
            max_tokens,
            json_mode: true,
        }
    }

    async fn attempt(
        &self,
        request: ChatRequest,
        expectations: &PlanExpectations,
    ) -> std::result::Result<Plan, AttemptFailure> {
        let completion = self
            .client
            .complete(request)
            .await
            .map_err(AttemptFailure::Llm)?;

        let value = extract_json(&completion.content)
            .map_err(|e| AttemptFailure::InvalidOutput(e.to_string()))?;
        parse_plan(&value, expectations).map_err(|e| AttemptFailure::InvalidOutput(e.to_string()))
    }

    /// Generate a plan, walking the model chain for `mode`.
    ///
    /// Rate limits, transient failures and unusable output are retried on the
    /// same model with backoff. An unavailable model moves on to the next one
    /// immediately. A rejected request stops the whole chain.
    pub async fn generate(
        &self,
        context: &PlanContext,
        mode: GenerationMode,
    ) -> Result<GeneratedPlan> {
        let prompt = build_prompt(context, mode, self.prompt_budget(mode));
        let day_count = u32::try_from(context.request.day_count())
            .map_err(|_| AppError::InvalidRequest("Invalid day count".to_string()))?;
        let expectations = PlanExpectations::from_allocation(
            context.request.start_date,
            day_count,
            &context.allocation,
            context.destination.name.clone(),
        );

        let chain = self.config.model_chain(mode.is_pro());
        let max_retries = self.config.ai_max_retries.max(1);
        let mut attempts = 0;
        let mut last_error = String::from("no model configured");

        tracing::info!(
            mode = %mode,
            models = ?chain,
            prompt_chars = prompt.len(),
            days = day_count,
            "Generating itinerary"
        );

        for model in &chain {
            for retry in 0..max_retries {
                attempts += 1;
                let request = self.chat_request(model, &prompt, mode);

                match self.attempt(request, &expectations).await {
                    Ok(plan) => {
                        tracing::info!(
                            model = %model,
                            attempts,
                            days = plan.days().len(),
                            "Itinerary generated"
                        );
                        return Ok(GeneratedPlan {
                            plan,
                            model: model.clone(),
                            attempts,
                        });
                    }
                    Err(AttemptFailure::Llm(LlmError::ModelUnavailable(msg))) => {
                        tracing::warn!(model = %model, "Model unavailable, trying next: {}", msg);
                        last_error = msg;
                        break;
                    }
                    Err(AttemptFailure::Llm(e @ LlmError::Fatal(_))) => {
                        tracing::error!(model = %model, "Model request rejected: {}", e);
                        return Err(e.into());
                    }
                    Err(failure) => {
                        let message = match failure {
                            AttemptFailure::Llm(e) => e.to_string(),
                            AttemptFailure::InvalidOutput(e) => e,
                        };
                        tracing::warn!(
                            model = %model,
                            attempt = retry + 1,
                            max_retries,
                            "Itinerary attempt failed: {}",
                            message
                        );
                        last_error = message;

                        if retry + 1 < max_retries {
                            tokio::time::sleep(self.backoff_delay(retry)).await;
                        }
                    }
                }
            }
        }

        Err(AppError::AiService(format!(
            "All models failed after {} attempts: {}",
            attempts, last_error
        )))
    }

    /// Ask the model for descriptive metadata about a place.
    ///
    /// Unavailable models fall through the chain; anything else is returned.
    pub async fn enrich_location(
        &self,
        name: &str,
        country_hint: Option<&str>,
    ) -> Result<LocationMetadata> {
        let (system, user) = metadata_prompt(name, country_hint);

        for model in self.config.model_chain(false) {
            let request = ChatRequest {
                model: model.clone(),
                messages: vec![ChatMessage::system(system.clone()), ChatMessage::user(user.clone())],
                temperature: 0.2,
                max_tokens: METADATA_MAX_TOKENS,
                json_mode: true,
            };

            match self.client.complete(request).await {
                Ok(completion) => {
                    let value = extract_json(&completion.content)?;
                    let metadata: LocationMetadata = serde_json::from_value(value)
                        .map_err(|e| AppError::AiResponse(format!("Invalid metadata: {}", e)))?;
                    tracing::debug!(location = %name, model = %model, "Location metadata enriched");
                    return Ok(metadata);
                }
                Err(LlmError::ModelUnavailable(msg)) => {
                    tracing::warn!(model = %model, "Model unavailable for enrichment: {}", msg);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::AiService(
            "No model available for location enrichment".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        BudgetLevel, Coordinates, DayAllocation, Location, RouteInfo, RouteProvider,
        TransportMode, TripRequest,
    };
    use crate::services::llm::client::ChatCompletion;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use time::macros::date;

    /// Replays scripted responses and records which model each call used.
    struct ScriptedClient {
        responses: Mutex<VecDeque<std::result::Result<String, LlmError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<std::result::Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(ScriptedClient {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(
            &self,
            request: ChatRequest,
        ) -> std::result::Result<ChatCompletion, LlmError> {
            self.calls.lock().unwrap().push(request.model.clone());
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Transient("script exhausted".to_string())));
            next.map(|content| ChatCompletion {
                content,
                model: request.model,
                usage: None,
            })
        }
    }

    fn config() -> PlannerConfig {
        PlannerConfig {
            model: "primary".to_string(),
            pro_model: "reasoner".to_string(),
            fallback_models: vec!["backup".to_string()],
            ai_max_retries: 2,
            ai_retry_base_ms: 0,
            ..PlannerConfig::default()
        }
    }

    fn context() -> PlanContext {
        let origin = Location::new("Paris".to_string(), Coordinates::new(48.8566, 2.3522).unwrap());
        let destination = Location::new("Lyon".to_string(), Coordinates::new(45.764, 4.8357).unwrap());
        PlanContext {
            request: TripRequest {
                from: "Paris".to_string(),
                to: "Lyon".to_string(),
                stops: Vec::new(),
                start_date: date!(2025 - 06 - 01),
                end_date: date!(2025 - 06 - 02),
                interests: Vec::new(),
                budget: BudgetLevel::Moderate,
                transport_mode: TransportMode::Train,
                pro_mode: false,
            },
            origin: origin.clone(),
            stops: Vec::new(),
            destination: destination.clone(),
            route: RouteInfo {
                total_distance_km: 465.0,
                total_duration_hours: 4.6,
                legs: Vec::new(),
                geometry: vec![origin.coordinates, destination.coordinates],
                provider: RouteProvider::Haversine,
            },
            allocation: vec![DayAllocation {
                slug: "lyon".to_string(),
                name: "Lyon".to_string(),
                start_day: 1,
                days: 2,
                pass_through: false,
            }],
            stays: Vec::new(),
            waypoints: Vec::new(),
            route_pois: Vec::new(),
            overnight_stops: Vec::new(),
        }
    }

    const GOOD_PLAN: &str = r#"{"summary": "Lyon", "days": [
        {"day": 1, "location": "Lyon", "items": [{"title": "Vieux Lyon"}]},
        {"day": 2, "location": "Lyon", "items": [{"title": "Parc de la Tête d'Or"}]}
    ]}"#;

    #[tokio::test]
    async fn test_first_attempt_succeeds() {
        let client = ScriptedClient::new(vec![Ok(GOOD_PLAN.to_string())]);
        let ai = ItineraryAi::new(client.clone(), config());

        let generated = ai.generate(&context(), GenerationMode::Standard).await.unwrap();
        assert_eq!(generated.model, "primary");
        assert_eq!(generated.attempts, 1);
        assert_eq!(generated.plan.days().len(), 2);
        assert_eq!(client.calls(), vec!["primary"]);
    }

    #[tokio::test]
    async fn test_retries_invalid_output_then_succeeds() {
        let client = ScriptedClient::new(vec![
            Ok("I cannot help with that".to_string()),
            Ok(GOOD_PLAN.to_string()),
        ]);
        let ai = ItineraryAi::new(client.clone(), config());

        let generated = ai.generate(&context(), GenerationMode::Standard).await.unwrap();
        assert_eq!(generated.attempts, 2);
        assert_eq!(client.calls(), vec!["primary", "primary"]);
    }

    #[tokio::test]
    async fn test_unavailable_model_falls_back_immediately() {
        let client = ScriptedClient::new(vec![
            Err(LlmError::ModelUnavailable("decommissioned".to_string())),
            Ok(GOOD_PLAN.to_string()),
        ]);
        let ai = ItineraryAi::new(client.clone(), config());

        let generated = ai.generate(&context(), GenerationMode::Standard).await.unwrap();
        assert_eq!(generated.model, "backup");
        assert_eq!(client.calls(), vec!["primary", "backup"]);
    }

    #[tokio::test]
    async fn test_pro_mode_uses_pro_model() {
        let client = ScriptedClient::new(vec![Ok(GOOD_PLAN.to_string())]);
        let ai = ItineraryAi::new(client.clone(), config());

        let generated = ai.generate(&context(), GenerationMode::Pro).await.unwrap();
        assert_eq!(generated.model, "reasoner");
    }

    #[tokio::test]
    async fn test_fatal_error_stops_chain() {
        let client = ScriptedClient::new(vec![Err(LlmError::Fatal("invalid api key".to_string()))]);
        let ai = ItineraryAi::new(client.clone(), config());

        let result = ai.generate(&context(), GenerationMode::Standard).await;
        assert!(matches!(result, Err(AppError::AiService(_))));
        assert_eq!(client.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_exhausting_all_models_is_error() {
        let client = ScriptedClient::new(vec![
            Err(LlmError::RateLimited("429".to_string())),
            Err(LlmError::Transient("503".to_string())),
            Err(LlmError::Transient("503".to_string())),
            Err(LlmError::Transient("503".to_string())),
        ]);
        let ai = ItineraryAi::new(client.clone(), config());

        let result = ai.generate(&context(), GenerationMode::Standard).await;
        match result {
            Err(AppError::AiService(msg)) => assert!(msg.contains("4 attempts")),
            other => panic!("expected AiService error, got {:?}", other.map(|g| g.model)),
        }
        assert_eq!(client.calls(), vec!["primary", "primary", "backup", "backup"]);
    }

    #[tokio::test]
    async fn test_enrich_location() {
        let client = ScriptedClient::new(vec![
            Err(LlmError::ModelUnavailable("gone".to_string())),
            Ok(r#"{"country": "France", "region": null, "continent": "Europe", "description": "Alpine lake town"}"#.to_string()),
        ]);
        let ai = ItineraryAi::new(client.clone(), config());

        let metadata = ai.enrich_location("Annecy", Some("France")).await.unwrap();
        assert_eq!(metadata.country.as_deref(), Some("France"));
        assert!(metadata.region.is_none());
        assert_eq!(client.calls(), vec!["primary", "backup"]);
    }

    #[test]
    fn test_backoff_grows() {
        let ai = ItineraryAi::new(
            ScriptedClient::new(Vec::new()),
            PlannerConfig {
                ai_retry_base_ms: 100,
                ..config()
            },
        );
        let first = ai.backoff_delay(0);
        let third = ai.backoff_delay(2);
        assert!(first >= Duration::from_millis(100));
        assert!(first <= Duration::from_millis(100 + AI_RETRY_JITTER_MS));
        assert!(third >= Duration::from_millis(400));
    }
}
