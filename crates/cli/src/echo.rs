//! A language model that answers with the last user message.

use async_trait::async_trait;

use swarmloop_core::turn::MessageRole;
use swarmloop_core::{LanguageModel, LlmError, LlmRequest, LlmResult};

pub struct EchoModel;

#[async_trait]
impl LanguageModel for EchoModel {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: LlmRequest) -> Result<LlmResult, LlmError> {
        let input = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(LlmResult::text(format!("echo: {input}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmloop_core::{EffectiveConfig, TurnMessage};

    fn request(messages: Vec<TurnMessage>) -> LlmRequest {
        LlmRequest {
            model: Some("echo".into()),
            params: serde_json::Value::Null,
            blocks: Vec::new(),
            messages,
            catalog: Vec::new(),
            turn_id: "t".into(),
            step_id: "s".into(),
            step_index: 0,
            effective_config: EffectiveConfig::default(),
        }
    }

    #[tokio::test]
    async fn echoes_the_latest_user_message() {
        let request = request(vec![
            TurnMessage::user("first"),
            TurnMessage::assistant("ok", Vec::new()),
            TurnMessage::user("second"),
        ]);
        let result = EchoModel.complete(request).await.unwrap();
        assert_eq!(result.content.as_deref(), Some("echo: second"));
        assert!(result.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn resume_turns_without_input_still_answer() {
        let result = EchoModel.complete(request(Vec::new())).await.unwrap();
        assert_eq!(result.content.as_deref(), Some("echo: (no input)"));
    }
}
