//! OpenAI chat completion provider implementation

use super::client::OpenAiClient;
use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, WireFunction, WireMessage, WireTool,
};
use crate::providers::invalid_response;
use crate::{ChatProvider, ChatReply, ChatRequest, ChatRole, ToolCall};
use async_trait::async_trait;
use renum_core::RenumResult;

/// OpenAI chat completion provider.
pub struct OpenAiChatProvider {
    client: OpenAiClient,
    default_model: String,
}

impl OpenAiChatProvider {
    /// Create a new OpenAI chat provider.
    pub fn new(api_key: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            client: OpenAiClient::new(api_key, 60),
            default_model: default_model.into(),
        }
    }
}

fn role_str(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::Tool => "tool",
    }
}

#[async_trait]
impl ChatProvider for OpenAiChatProvider {
    async fn complete(&self, request: &ChatRequest) -> RenumResult<ChatReply> {
        let wire_request = ChatCompletionRequest {
            model: if request.model.is_empty() {
                self.default_model.clone()
            } else {
                request.model.clone()
            },
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: role_str(m.role).to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            tools: request
                .tools
                .iter()
                .map(|t| WireTool {
                    tool_type: "function".to_string(),
                    function: WireFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response: ChatCompletionResponse =
            self.client.request("chat/completions", wire_request).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| invalid_response("openai", "No choices in response"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|c| {
                let arguments = serde_json::from_str(&c.function.arguments)
                    .unwrap_or(serde_json::Value::Null);
                ToolCall {
                    name: c.function.name,
                    arguments,
                }
            })
            .collect();

        let (input_tokens, output_tokens) = response
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        Ok(ChatReply {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            input_tokens,
            output_tokens,
        })
    }

    fn model_id(&self) -> &str {
        &self.default_model
    }
}

impl std::fmt::Debug for OpenAiChatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatProvider")
            .field("default_model", &self.default_model)
            .finish()
    }
}
