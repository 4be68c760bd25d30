//! Anthropic `/v1/messages` adapter

use crate::registry::ProviderDescriptor;
use crate::request::{GenerationRequest, TokenUsage};
use crate::transport::WireRequest;
use serde::{Deserialize, Serialize};

use super::Completion;

/// Anthropic API version header value
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<MessageBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct MessageBody {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    // Tool-use and thinking blocks are not part of the normalized
    // contract; they carry no plain text.
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

pub(super) fn build(
    descriptor: &ProviderDescriptor,
    request: &GenerationRequest,
    api_key: &str,
) -> WireRequest {
    let body = MessagesRequest {
        model: descriptor.default_model.clone(),
        max_tokens: request.max_tokens.unwrap_or(descriptor.max_tokens),
        system: request.system.clone(),
        messages: vec![MessageBody {
            role: "user",
            content: request.prompt.clone(),
        }],
        temperature: request.temperature,
    };

    WireRequest {
        provider: descriptor.name.clone(),
        url: format!("{}/v1/messages", descriptor.endpoint),
        headers: vec![
            ("x-api-key".to_string(), api_key.to_string()),
            ("anthropic-version".to_string(), API_VERSION.to_string()),
            ("content-type".to_string(), "application/json".to_string()),
        ],
        body: serde_json::to_value(&body).unwrap_or_default(),
    }
}

pub(super) fn parse_body(body: &str) -> Result<Completion, String> {
    let response: MessagesResponse =
        serde_json::from_str(body).map_err(|e| format!("malformed messages response: {e}"))?;

    let content = response
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            ContentBlock::Other => None,
        })
        .collect::<Vec<_>>()
        .join("");

    Ok(Completion {
        content,
        usage: Some(TokenUsage {
            prompt_tokens: response.usage.input_tokens,
            completion_tokens: response.usage.output_tokens,
            total_tokens: response.usage.input_tokens + response.usage.output_tokens,
        }),
    })
}
