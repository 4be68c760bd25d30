//! Google `generateContent` adapter
//!
//! The credential travels as a `?key=` query parameter rather than a
//! header, so the URL itself is sensitive and must never be logged raw.

use crate::registry::ProviderDescriptor;
use crate::request::{GenerationRequest, TokenUsage};
use crate::transport::WireRequest;
use serde::{Deserialize, Serialize};

use super::Completion;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: Option<u32>,
    total_token_count: u32,
}

pub(super) fn build(
    descriptor: &ProviderDescriptor,
    request: &GenerationRequest,
    api_key: &str,
) -> WireRequest {
    let body = GenerateRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: Some(request.prompt.clone()),
            }],
        }],
        system_instruction: request.system.as_ref().map(|system| Content {
            role: None,
            parts: vec![Part {
                text: Some(system.clone()),
            }],
        }),
        generation_config: Some(GenerationConfig {
            max_output_tokens: Some(request.max_tokens.unwrap_or(descriptor.max_tokens)),
            temperature: request.temperature,
        }),
    };

    WireRequest {
        provider: descriptor.name.clone(),
        url: format!(
            "{}/models/{}:generateContent?key={}",
            descriptor.endpoint, descriptor.default_model, api_key
        ),
        headers: vec![(
            "Content-Type".to_string(),
            "application/json".to_string(),
        )],
        body: serde_json::to_value(&body).unwrap_or_default(),
    }
}

pub(super) fn parse_body(body: &str) -> Result<Completion, String> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| format!("malformed generateContent response: {e}"))?;

    let candidate = response
        .candidates
        .first()
        .ok_or_else(|| "no candidates in response".to_string())?;

    let content = candidate
        .content
        .parts
        .iter()
        .filter_map(|part| part.text.as_deref())
        .collect::<Vec<_>>()
        .join("");

    Ok(Completion {
        content,
        usage: response.usage_metadata.map(|u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count.unwrap_or(0),
            total_tokens: u.total_token_count,
        }),
    })
}
