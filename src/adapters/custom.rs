//! Plain prompt/response adapter for self-hosted or bespoke endpoints
//!
//! Speaks the Ollama-style `/api/generate` shape: a single prompt in, a
//! single `response` string out. The bearer header is only attached when
//! a key is configured, since local servers usually run without one.

use crate::registry::ProviderDescriptor;
use crate::request::{GenerationRequest, TokenUsage};
use crate::transport::WireRequest;
use serde::{Deserialize, Serialize};

use super::Completion;

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

pub(super) fn build(
    descriptor: &ProviderDescriptor,
    request: &GenerationRequest,
    api_key: &str,
) -> WireRequest {
    let body = GenerateRequest {
        model: descriptor.default_model.clone(),
        prompt: request.prompt.clone(),
        system: request.system.clone(),
        stream: false,
        options: GenerateOptions {
            num_predict: request.max_tokens.unwrap_or(descriptor.max_tokens),
            temperature: request.temperature,
        },
    };

    let mut headers = vec![(
        "Content-Type".to_string(),
        "application/json".to_string(),
    )];
    if !api_key.is_empty() {
        headers.push(("Authorization".to_string(), format!("Bearer {api_key}")));
    }

    WireRequest {
        provider: descriptor.name.clone(),
        url: format!("{}/api/generate", descriptor.endpoint),
        headers,
        body: serde_json::to_value(&body).unwrap_or_default(),
    }
}

pub(super) fn parse_body(body: &str) -> Result<Completion, String> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| format!("malformed generate response: {e}"))?;

    let usage = match (response.prompt_eval_count, response.eval_count) {
        (Some(prompt), Some(completion)) => Some(TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }),
        _ => None,
    };

    Ok(Completion {
        content: response.response,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::descriptor;
    use super::super::AdapterKind;
    use super::*;
    use crate::request::GenerationRequest;

    const RESPONSE: &str = r#"{
        "model": "llama3.2",
        "response": "Local model here.",
        "done": true,
        "prompt_eval_count": 11,
        "eval_count": 4
    }"#;

    #[test]
    fn test_build_without_key_has_no_auth_header() {
        let descriptor = descriptor(AdapterKind::CustomSdk);
        let request = GenerationRequest::new("hi");
        let wire = build(&descriptor, &request, "");

        assert_eq!(wire.url, "https://api.example.com/api/generate");
        assert!(!wire.headers.iter().any(|(k, _)| k == "Authorization"));
        assert_eq!(wire.body["stream"], false);
        assert_eq!(wire.body["options"]["num_predict"], 1024);
    }

    #[test]
    fn test_build_with_key_adds_bearer() {
        let descriptor = descriptor(AdapterKind::CustomSdk);
        let wire = build(&descriptor, &GenerationRequest::new("hi"), "local-key");
        assert!(wire
            .headers
            .iter()
            .any(|(k, v)| k == "Authorization" && v == "Bearer local-key"));
    }

    #[test]
    fn test_parse_fixture_exact() {
        let completion = parse_body(RESPONSE).unwrap();
        assert_eq!(completion.content, "Local model here.");
        let usage = completion.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 11);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn test_parse_without_counts_has_no_usage() {
        let completion = parse_body(r#"{"response": "x"}"#).unwrap();
        assert_eq!(completion.content, "x");
        assert!(completion.usage.is_none());
    }

    #[test]
    fn test_parse_missing_response_rejected() {
        assert!(parse_body(r#"{"done": true}"#).is_err());
    }
}
