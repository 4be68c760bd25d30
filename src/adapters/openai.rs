//! OpenAI-compatible `/chat/completions` adapter
//!
//! Covers OpenAI itself plus the compatible gateways (Groq, DeepSeek,
//! OpenRouter, Fireworks and friends). Tolerates servers that answer a
//! non-streaming request with an SSE chunk stream: chunks are buffered
//! and concatenated into a single completion.

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
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// Streaming chunk shape, for servers that ignore `stream: false`
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
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
        stream: false,
    };

    WireRequest {
        provider: descriptor.name.clone(),
        url: format!("{}/chat/completions", descriptor.endpoint),
        headers: vec![
            ("Authorization".to_string(), format!("Bearer {api_key}")),
            ("Content-Type".to_string(), "application/json".to_string()),
        ],
        body: serde_json::to_value(&body).unwrap_or_default(),
    }
}

pub(super) fn parse_body(body: &str) -> Result<Completion, String> {
    if body.trim_start().starts_with("data:") {
        return parse_sse(body);
    }

    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| format!("malformed chat response: {e}"))?;
    let choice = response
        .choices
        .first()
        .ok_or_else(|| "no choices in response".to_string())?;

    Ok(Completion {
        content: choice.message.content.clone().unwrap_or_default(),
        usage: response.usage.map(usage),
    })
}

// Buffer an SSE body into one completion for the non-streaming contract.
fn parse_sse(body: &str) -> Result<Completion, String> {
    let mut content = String::new();
    let mut last_usage = None;
    let mut saw_chunk = false;

    for line in body.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            continue;
        }
        let chunk: ChatChunk =
            serde_json::from_str(data).map_err(|e| format!("malformed stream chunk: {e}"))?;
        saw_chunk = true;
        if let Some(choice) = chunk.choices.first() {
            if let Some(delta) = &choice.delta.content {
                content.push_str(delta);
            }
        }
        if let Some(u) = chunk.usage {
            last_usage = Some(u);
        }
    }

    if !saw_chunk {
        return Err("stream body contained no chunks".to_string());
    }
    Ok(Completion {
        content,
        usage: last_usage.map(usage),
    })
}

fn usage(u: ChatUsage) -> TokenUsage {
    TokenUsage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    }
}
