//! Cohere `/v2/chat` adapter

use crate::registry::ProviderDescriptor;
use crate::request::{GenerationRequest, TokenUsage};
use crate::transport::WireRequest;
use serde::{Deserialize, Serialize};

use super::Completion;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Vec<ResponseContent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    tokens: Option<UsageTokens>,
}

#[derive(Debug, Deserialize)]
struct UsageTokens {
    input_tokens: f64,
    output_tokens: f64,
}

pub(super) fn build(
    descriptor: &ProviderDescriptor,
    request: &GenerationRequest,
    api_key: &str,
) -> WireRequest {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &request.system {
        messages.push(ChatMessage {
            role: "system",
            content: system.clone(),
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: request.prompt.clone(),
    });

    let body = ChatRequest {
        model: descriptor.default_model.clone(),
        messages,
        max_tokens: Some(request.max_tokens.unwrap_or(descriptor.max_tokens)),
        temperature: request.temperature,
    };

    WireRequest {
        provider: descriptor.name.clone(),
        url: format!("{}/v2/chat", descriptor.endpoint),
        headers: vec![
            ("Authorization".to_string(), format!("Bearer {api_key}")),
            ("Content-Type".to_string(), "application/json".to_string()),
        ],
        body: serde_json::to_value(&body).unwrap_or_default(),
    }
}

pub(super) fn parse_body(body: &str) -> Result<Completion, String> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| format!("malformed chat response: {e}"))?;

    let content = response
        .message
        .content
        .iter()
        .filter_map(|block| match block {
            ResponseContent::Text { text } => Some(text.as_str()),
            ResponseContent::Other => None,
        })
        .collect::<Vec<_>>()
        .join("");

    let usage = response.usage.and_then(|u| u.tokens).map(|t| {
        let prompt = t.input_tokens as u32;
        let completion = t.output_tokens as u32;
        TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    });

    Ok(Completion { content, usage })
}
