//! High-level generation calls: plan, steps, output, score, plan comparison.
//!
//! [`Generator`] wraps a provider and the model registry. Every call resolves
//! the model's sampling options from the registry before hitting the backend;
//! backend failures propagate untouched so callers can decide on retries.

use crate::config::ModelsConfig;
use crate::error::LlmResult;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::plan::{self, Step};
use std::sync::Arc;

/// Drives the generation backend for plans, steps, outputs, and scores
#[derive(Clone)]
pub struct Generator {
    provider: Arc<dyn LlmProvider>,
    models: ModelsConfig,
}

impl Generator {
    /// Create a generator over a provider and model registry
    pub fn new(provider: Arc<dyn LlmProvider>, models: ModelsConfig) -> Self {
        Self { provider, models }
    }

    /// The default model from the registry configuration
    pub fn default_model(&self) -> &str {
        &self.models.default
    }

    /// Generate text for a prompt
    pub async fn output(
        &self,
        model: &str,
        user_prompt: &str,
        system_prompt: &str,
    ) -> LlmResult<String> {
        let options = self.models.options_for(model);

        let mut request = CompletionRequest::new(model);
        if !system_prompt.is_empty() {
            request = request.with_message(ChatMessage::system(system_prompt));
        }
        request = request.with_message(ChatMessage::user(user_prompt));
        request.max_tokens = options.max_tokens;
        request.temperature = options.temperature;
        request.top_p = options.top_p;
        request.top_k = options.top_k;

        tracing::debug!(
            model,
            prompt_chars = user_prompt.len(),
            "calling generation backend"
        );
        let response = self.provider.complete(request).await?;
        tracing::debug!(chars = response.content.len(), "backend response received");
        Ok(response.content)
    }

    /// Generate a free-form plan for a task
    pub async fn plan(
        &self,
        model: &str,
        user_prompt: &str,
        system_prompt: &str,
    ) -> LlmResult<String> {
        let plan_prompt = format!(
            "Before answering, create a concise structured plan for how you'll approach this task.\n\
             \n\
             Task: {user_prompt}\n\
             \n\
             Requirements:\n\
             - Be brief and to-the-point\n\
             - Focus only on essential steps\n\
             - Avoid verbose explanations or justifications\n\
             - Provide only the plan, not the actual output"
        );
        self.output(model, &plan_prompt, system_prompt).await
    }

    /// Convert a free-form plan into ordered, atomic steps.
    ///
    /// The backend is asked for strict JSON; parsing recovers from anything
    /// it returns, so the result is never empty (see [`plan::parse_steps`]).
    pub async fn steps(
        &self,
        model: &str,
        plan_text: &str,
        system_prompt: &str,
    ) -> LlmResult<Vec<Step>> {
        let steps_prompt = format!(
            "You are converting a free-form plan into structured steps.\n\
             Return STRICT JSON only, no code fences, no commentary, exactly this schema:\n\
             {{\"steps\": [{{\"order\": 1, \"text\": \"...\"}}]}}\n\
             \n\
             Input plan:\n\
             {plan_text}"
        );
        let raw = self.output(model, &steps_prompt, system_prompt).await?;
        let steps = plan::parse_steps(&raw, plan_text);
        tracing::debug!(count = steps.len(), "steps generated");
        Ok(steps)
    }

    /// Score a text on a 0..1 scale; an unparseable reply yields `None`
    pub async fn score(&self, model: &str, output: &str) -> LlmResult<Option<f64>> {
        let eval_prompt = format!(
            "Rate the following text on a scale from 0 to 1, where 1 is excellent. \
             Respond with only the number.\n\
             \n\
             {output}"
        );
        let raw = self.output(model, &eval_prompt, "").await?;
        Ok(raw.trim().parse().ok())
    }

    /// Ask the backend for a free-text analysis of how two plans differ
    pub async fn compare_plans(&self, model: &str, a: &[Step], b: &[Step]) -> LlmResult<String> {
        let comparison_prompt = format!(
            "Compare these two plans and explain the key differences in approach, ordering, and content.\n\
             \n\
             Plan A:\n\
             {}\n\
             \n\
             Plan B:\n\
             {}\n\
             \n\
             Provide a concise analysis of what changed and why it might matter.",
            plan::render_plan(a),
            plan::render_plan(b),
        );
        self.output(model, &comparison_prompt, "").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{CompletionResponse, TokenUsage};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedProvider {
        responses: Mutex<VecDeque<String>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let content = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::Network("script exhausted".to_string()))?;
            Ok(CompletionResponse {
                id: "scripted".to_string(),
                model: request.model,
                content,
                usage: TokenUsage::default(),
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn is_ready(&self) -> bool {
            true
        }
    }

    fn generator(responses: Vec<&str>) -> Generator {
        Generator::new(
            Arc::new(ScriptedProvider::new(responses)),
            ModelsConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_steps_from_strict_json() {
        let generator = generator(vec![r#"{"steps": [{"order": 1, "text": "Greet"}]}"#]);
        let steps = generator.steps("gpt-4o", "1. Greet", "").await.unwrap();
        assert_eq!(steps, vec![Step::new(1, "Greet")]);
    }

    #[tokio::test]
    async fn test_steps_from_garbage_still_nonempty() {
        let generator = generator(vec!["not json {{"]);
        let steps = generator.steps("gpt-4o", "make it sparkle", "").await.unwrap();
        assert!(!steps.is_empty());
    }

    #[tokio::test]
    async fn test_score_parses_number() {
        let generator = generator(vec!["  0.85\n"]);
        let score = generator.score("gpt-4o", "some text").await.unwrap();
        assert_eq!(score, Some(0.85));
    }

    #[tokio::test]
    async fn test_score_unparseable_is_none() {
        let generator = generator(vec!["pretty good"]);
        let score = generator.score("gpt-4o", "some text").await.unwrap();
        assert_eq!(score, None);
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let generator = generator(vec![]);
        let err = generator.output("gpt-4o", "hi", "").await.unwrap_err();
        assert!(matches!(err, LlmError::Network(_)));
    }
}
