use serde_json::{Map, Value};
use std::sync::Arc;

use crate::llm_client::{ChatMessage, ChatModel, CompletionRequest};

pub const RESPONSE_FALLBACK: &str = "I'm sorry, I couldn't process your request.";
pub const SUMMARY_FALLBACK: &str = "I couldn't generate a summary for this session.";
pub const RECOMMENDATION_FALLBACK: &str =
    "I'm sorry, I couldn't generate a recommendation at this time.";

/// Wraps the language model behind the chat and recommendation endpoints.
///
/// Every method returns text. When no model is configured, or the call
/// fails, a fixed fallback sentence is returned and the failure is logged.
#[derive(Clone, Default)]
pub struct Assistant {
    model: Option<Arc<dyn ChatModel>>,
}

impl Assistant {
    pub fn new(model: Option<Arc<dyn ChatModel>>) -> Self {
        Self { model }
    }

    pub fn is_configured(&self) -> bool {
        self.model.is_some()
    }

    pub async fn generate_response(&self, user_input: &str, context: Option<&str>) -> String {
        tracing::info!(input_len = user_input.len(), "generating chat response");
        self.ask(response_request(user_input, context), RESPONSE_FALLBACK)
            .await
    }

    pub async fn summarize_chat(&self, history: &[String]) -> String {
        tracing::info!(messages = history.len(), "summarizing chat history");
        self.ask(summary_request(history), SUMMARY_FALLBACK).await
    }

    pub async fn generate_recommendation(
        &self,
        context: &str,
        preferences: &Map<String, Value>,
    ) -> String {
        tracing::info!(context = %context, "generating recommendation");
        self.ask(
            recommendation_request(context, preferences),
            RECOMMENDATION_FALLBACK,
        )
        .await
    }

    async fn ask(&self, request: CompletionRequest, fallback: &str) -> String {
        let Some(model) = &self.model else {
            tracing::warn!("language model not configured, returning fallback text");
            return fallback.to_string();
        };

        match model.complete(request).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "language model request failed");
                fallback.to_string()
            }
        }
    }
}

fn response_request(user_input: &str, context: Option<&str>) -> CompletionRequest {
    let mut messages = Vec::with_capacity(2);
    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        messages.push(ChatMessage::system(context));
    }
    messages.push(ChatMessage::user(user_input));

    CompletionRequest {
        messages,
        max_tokens: 150,
        temperature: 0.7,
    }
}

fn summary_request(history: &[String]) -> CompletionRequest {
    CompletionRequest {
        messages: vec![ChatMessage::user(format!(
            "Summarize the following conversation:\n{}",
            history.join("\n")
        ))],
        max_tokens: 200,
        temperature: 0.5,
    }
}

fn recommendation_request(context: &str, preferences: &Map<String, Value>) -> CompletionRequest {
    let preferences = preferences
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{key}: {s}"),
            other => format!("{key}: {other}"),
        })
        .collect::<Vec<_>>()
        .join(", ");

    CompletionRequest {
        messages: vec![ChatMessage::user(format!(
            "Based on the context '{context}' and preferences ({preferences}), provide a personalized recommendation."
        ))],
        max_tokens: 150,
        temperature: 0.7,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::LlmError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingModel {
        seen: Mutex<Vec<CompletionRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl ChatModel for RecordingModel {
        async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
            self.seen.lock().push(request);
            if self.fail {
                Err(LlmError::EmptyResponse)
            } else {
                Ok("model reply".to_string())
            }
        }
    }

    #[test]
    fn test_response_prompt_puts_context_first() {
        let request = response_request("Can I afford a car?", Some("Income: 5000"));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0], ChatMessage::system("Income: 5000"));
        assert_eq!(request.messages[1], ChatMessage::user("Can I afford a car?"));
        assert_eq!(request.max_tokens, 150);

        let bare = response_request("hello", Some("  "));
        assert_eq!(bare.messages, vec![ChatMessage::user("hello")]);
    }

    #[test]
    fn test_summary_prompt_joins_history() {
        let request = summary_request(&["first".to_string(), "second".to_string()]);
        assert_eq!(
            request.messages[0].content,
            "Summarize the following conversation:\nfirst\nsecond"
        );
        assert_eq!(request.max_tokens, 200);
    }

    #[test]
    fn test_recommendation_prompt_lists_preferences() {
        let prefs = json!({"cuisine": "Italian", "budget": 50});
        let request = recommendation_request("dinner with friends", prefs.as_object().unwrap());
        let prompt = &request.messages[0].content;

        assert!(prompt.starts_with("Based on the context 'dinner with friends' and preferences ("));
        assert!(prompt.contains("cuisine: Italian"));
        assert!(prompt.contains("budget: 50"));
        assert!(prompt.ends_with("provide a personalized recommendation."));
    }

    #[tokio::test]
    async fn test_unconfigured_assistant_falls_back() {
        let assistant = Assistant::default();
        assert!(!assistant.is_configured());
        assert_eq!(assistant.generate_response("hi", None).await, RESPONSE_FALLBACK);
        assert_eq!(assistant.summarize_chat(&[]).await, SUMMARY_FALLBACK);
        assert_eq!(
            assistant.generate_recommendation("x", &Map::new()).await,
            RECOMMENDATION_FALLBACK
        );
    }

    #[tokio::test]
    async fn test_model_failure_falls_back() {
        let model = Arc::new(RecordingModel {
            fail: true,
            ..Default::default()
        });
        let shared: Arc<dyn ChatModel> = model.clone();
        let assistant = Assistant::new(Some(shared));

        assert_eq!(assistant.generate_response("hi", None).await, RESPONSE_FALLBACK);
        assert_eq!(model.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_model_reply_is_returned() {
        let model = Arc::new(RecordingModel::default());
        let shared: Arc<dyn ChatModel> = model.clone();
        let assistant = Assistant::new(Some(shared));

        let reply = assistant.summarize_chat(&["a".to_string()]).await;
        assert_eq!(reply, "model reply");
        assert_eq!(model.seen.lock()[0].temperature, 0.5);
    }
}
