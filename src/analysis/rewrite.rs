//! Model-backed rewriting of ambiguous follow-up queries

use super::ConversationTurn;
use crate::providers::{GenerationModel, ModelError};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Number of most recent turns included in the rewrite prompt
const HISTORY_TURNS: usize = 6;

/// Turns "what about those?" into a self-contained query using recent history
pub struct QueryRewriter {
    model: Arc<dyn GenerationModel>,
    temperature: f32,
    timeout: Duration,
}

impl QueryRewriter {
    pub fn new(model: Arc<dyn GenerationModel>, temperature: f32, timeout: Duration) -> Self {
        Self {
            model,
            temperature,
            timeout,
        }
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "rewrittenQuery": { "type": "string" }
            },
            "required": ["rewrittenQuery"]
        })
    }

    fn prompt(query: &str, history: &[ConversationTurn]) -> String {
        let start = history.len().saturating_sub(HISTORY_TURNS);
        let transcript: Vec<String> = history[start..]
            .iter()
            .map(|turn| format!("{}: {}", turn.role, turn.content))
            .collect();

        format!(
            "Rewrite the latest user query so it can be understood without the conversation.\n\
             Resolve pronouns and references using the conversation. Keep the user's language.\n\
             Return only the rewritten query.\n\n\
             Conversation:\n{}\n\nLatest query: {}",
            transcript.join("\n"),
            query
        )
    }

    /// Rewrite `query`; errors leave the decision to keep the original to the caller
    pub async fn rewrite(
        &self,
        query: &str,
        history: &[ConversationTurn],
    ) -> Result<String, ModelError> {
        let schema = Self::schema();
        let prompt = Self::prompt(query, history);

        let response = tokio::time::timeout(
            self.timeout,
            self.model
                .generate_structured(&schema, &prompt, self.temperature),
        )
        .await
        .map_err(|_| ModelError::Timeout {
            millis: self.timeout.as_millis() as u64,
        })??;

        response
            .get("rewrittenQuery")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ModelError::InvalidResponse("missing rewrittenQuery".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedModel(Result<Value, String>);

    #[async_trait]
    impl GenerationModel for FixedModel {
        async fn generate_structured(
            &self,
            _schema: &Value,
            prompt: &str,
            _temperature: f32,
        ) -> Result<Value, ModelError> {
            assert!(prompt.contains("Latest query"));
            self.0.clone().map_err(ModelError::Generation)
        }
    }

    fn history() -> Vec<ConversationTurn> {
        vec![ConversationTurn::user("show my github repos")]
    }

    #[tokio::test]
    async fn test_rewrite_returns_model_output() {
        let model = Arc::new(FixedModel(Ok(json!({"rewrittenQuery": " my github repositories "}))));
        let rewriter = QueryRewriter::new(model, 0.2, Duration::from_secs(1));
        let rewritten = rewriter.rewrite("more about them", &history()).await.unwrap();
        assert_eq!(rewritten, "my github repositories");
    }

    #[tokio::test]
    async fn test_rewrite_rejects_empty_output() {
        let model = Arc::new(FixedModel(Ok(json!({"rewrittenQuery": ""}))));
        let rewriter = QueryRewriter::new(model, 0.2, Duration::from_secs(1));
        let err = rewriter.rewrite("more", &history()).await.unwrap_err();
        assert!(matches!(err, ModelError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_rewrite_propagates_model_failure() {
        let model = Arc::new(FixedModel(Err("offline".to_string())));
        let rewriter = QueryRewriter::new(model, 0.2, Duration::from_secs(1));
        assert!(rewriter.rewrite("more", &history()).await.is_err());
    }
}
