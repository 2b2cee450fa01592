use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::CONFIG;
use crate::llm::media::decode_data_url;
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

#[derive(Debug, thiserror::Error)]
#[error("Image generation failed: {0}")]
pub struct ImageGenerationError(pub String);

#[derive(Debug, Clone, Copy)]
pub struct ImageRequest<'a> {
    pub model: &'a str,
    pub aspect_ratio: &'a str,
    pub image_size: &'a str,
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_payload(payload: &Value) -> String {
    let model = payload
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let message_count = payload
        .get("messages")
        .and_then(|v| v.as_array())
        .map(|messages| messages.len())
        .unwrap_or(0);
    let modalities = payload
        .get("modalities")
        .and_then(|v| v.as_array())
        .map(|values| {
            values
                .iter()
                .filter_map(|value| value.as_str())
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_else(|| "text".to_string());
    let aspect_ratio = payload
        .pointer("/image_config/aspect_ratio")
        .and_then(|v| v.as_str())
        .unwrap_or("-");

    format!(
        "model={}, messages={}, modalities=[{}], aspect_ratio={}",
        model, message_count, modalities, aspect_ratio
    )
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

fn first_message(response: &Value) -> &Value {
    response
        .get("choices")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("message"))
        .unwrap_or(&Value::Null)
}

fn extract_text_content(message: &Value) -> String {
    match message.get("content") {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter(|part| part.get("type").and_then(|v| v.as_str()) == Some("text"))
            .filter_map(|part| part.get("text").and_then(|v| v.as_str()))
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn extract_image_url(message: &Value) -> Option<&str> {
    message
        .get("images")
        .and_then(|v| v.as_array())
        .and_then(|images| images.first())
        .and_then(|image| image.pointer("/image_url/url"))
        .and_then(|v| v.as_str())
}

async fn call_openrouter_api(payload: &Value) -> Result<Value> {
    debug!("OpenRouter request: {}", summarize_payload(payload));

    let api_key = CONFIG.openrouter_api_key()?;
    let client = get_http_client();
    let response = client
        .post(format!(
            "{}/chat/completions",
            CONFIG.openrouter_base_url.trim_end_matches('/')
        ))
        .header("Authorization", format!("Bearer {}", api_key))
        .header("HTTP-Referer", "https://aical.art")
        .header("X-Title", "AI Calendar Art")
        .json(payload)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let (message, body_summary) = summarize_error_body(&body);
        warn!(
            "OpenRouter API error: status={}, body={}",
            status, body_summary
        );
        let detail = message.unwrap_or(body_summary);
        return Err(anyhow!(
            "OpenRouter request failed with status {}: {}",
            status,
            detail
        ));
    }

    let value = response.json::<Value>().await?;
    debug!(
        "OpenRouter response received for model={}",
        payload
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
    );
    Ok(value)
}

/// Single-turn completion; returns the assistant text.
pub async fn chat_completion(system_prompt: &str, user_content: &str, model: &str) -> Result<String> {
    if model.trim().is_empty() {
        return Err(anyhow!("Model identifier is required"));
    }

    let payload = json!({
        "model": model,
        "messages": [
            { "role": "system", "content": system_prompt },
            { "role": "user", "content": user_content },
        ],
    });

    log_llm_timing("openrouter", model, "openrouter:prompt", None, || async {
        let response = call_openrouter_api(&payload).await?;
        let content = extract_text_content(first_message(&response));
        if content.is_empty() {
            warn!(
                "OpenRouter response had empty content: {}",
                truncate_for_log(&response.to_string(), 2000)
            );
            return Err(anyhow!("Model {} returned an empty prompt", model));
        }
        Ok(content)
    })
    .await
}

/// Renders one image and returns its decoded bytes.
pub async fn generate_image(
    prompt: &str,
    request: ImageRequest<'_>,
) -> Result<Vec<u8>, ImageGenerationError> {
    let payload = json!({
        "model": request.model,
        "messages": [
            { "role": "user", "content": prompt },
        ],
        "modalities": ["image", "text"],
        "image_config": {
            "aspect_ratio": request.aspect_ratio,
            "image_size": request.image_size,
        },
    });
    let metadata = json!({
        "aspect_ratio": request.aspect_ratio,
        "image_size": request.image_size,
    });

    let result = log_llm_timing(
        "openrouter",
        request.model,
        "openrouter:image",
        Some(metadata),
        || async {
            let response = call_openrouter_api(&payload).await?;
            let message = first_message(&response);
            let Some(url) = extract_image_url(message) else {
                let text = extract_text_content(message);
                return Err(anyhow!(
                    "No images returned by {} (text: {})",
                    request.model,
                    truncate_for_log(&text, 300)
                ));
            };
            let (mime_type, bytes) = decode_data_url(url)?;
            debug!(
                "Received {} image ({} bytes) at aspect ratio {}",
                mime_type,
                bytes.len(),
                request.aspect_ratio
            );
            Ok(bytes)
        },
    )
    .await;

    result.map_err(|err| ImageGenerationError(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_message_error_from_body() {
        let (message, summary) =
            summarize_error_body(r#"{"error":{"message":"Rate limited","code":429}}"#);
        assert_eq!(message.as_deref(), Some("Rate limited"));
        assert!(summary.contains("429"));

        let (message, summary) = summarize_error_body("   ");
        assert!(message.is_none());
        assert_eq!(summary, "empty response body");
    }

    #[test]
    fn reads_text_from_string_or_parts() {
        let message = json!({ "content": "  a tabby cat on a rooftop  " });
        assert_eq!(extract_text_content(&message), "a tabby cat on a rooftop");

        let message = json!({
            "content": [
                { "type": "text", "text": "first" },
                { "type": "image_url", "image_url": { "url": "data:," } },
                { "type": "text", "text": "second" }
            ]
        });
        assert_eq!(extract_text_content(&message), "first\nsecond");
        assert_eq!(extract_text_content(&Value::Null), "");
    }

    #[test]
    fn finds_first_image_url() {
        let response = json!({
            "choices": [{
                "message": {
                    "content": "",
                    "images": [
                        { "type": "image_url", "image_url": { "url": "data:image/png;base64,AAAA" } },
                        { "type": "image_url", "image_url": { "url": "data:image/png;base64,BBBB" } }
                    ]
                }
            }]
        });
        assert_eq!(
            extract_image_url(first_message(&response)),
            Some("data:image/png;base64,AAAA")
        );
        assert_eq!(extract_image_url(first_message(&json!({}))), None);
    }

    #[test]
    fn summarizes_image_payload() {
        let payload = json!({
            "model": "google/gemini-3-pro-image-preview",
            "messages": [{ "role": "user", "content": "x" }],
            "modalities": ["image", "text"],
            "image_config": { "aspect_ratio": "9:16" }
        });
        assert_eq!(
            summarize_payload(&payload),
            "model=google/gemini-3-pro-image-preview, messages=1, modalities=[image,text], aspect_ratio=9:16"
        );
    }

    #[test]
    fn truncates_long_values() {
        assert_eq!(truncate_for_log("abcdef", 3), "abc... (truncated)");
        assert_eq!(truncate_for_log("abc", 3), "abc");
    }
}
