//! OpenAI-compatible chat completions gateway
//!
//! Defaults target DashScope's compatible mode; any endpoint speaking the
//! `/chat/completions` protocol works.

use crate::*;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, trace};

pub const DEFAULT_API_BASE: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

/// Values used for any request field left unset
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationDefaults {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            model: "qwen-max".to_string(),
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 2000,
        }
    }
}

/// HTTP gateway for OpenAI-compatible endpoints
pub struct CompatProvider {
    client: Client,
    api_key: String,
    api_base: String,
    defaults: GenerationDefaults,
}

impl CompatProvider {
    pub fn new(
        api_key: impl Into<String>,
        api_base: Option<String>,
        defaults: GenerationDefaults,
    ) -> Self {
        let api_base = api_base
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_base: api_base.trim_end_matches('/').to_string(),
            defaults,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn build_request(&self, request: &ModelRequest) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                let mut obj = json!({ "role": &m.role, "content": &m.content });
                if !m.tool_calls.is_empty() {
                    let calls: Vec<serde_json::Value> = m
                        .tool_calls
                        .iter()
                        .map(|c| {
                            json!({
                                "id": &c.id,
                                "type": "function",
                                "function": {
                                    "name": &c.name,
                                    "arguments": c.arguments.to_string(),
                                }
                            })
                        })
                        .collect();
                    obj["tool_calls"] = json!(calls);
                }
                if let Some(tool_call_id) = &m.tool_call_id {
                    obj["tool_call_id"] = json!(tool_call_id);
                }
                if let Some(name) = &m.name {
                    obj["name"] = json!(name);
                }
                obj
            })
            .collect();

        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(self.defaults.model.as_str()),
            "messages": messages,
            "max_tokens": request.max_tokens.unwrap_or(self.defaults.max_tokens),
            "temperature": request.temperature.unwrap_or(self.defaults.temperature),
            "top_p": request.top_p.unwrap_or(self.defaults.top_p),
        });

        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": &t.name,
                            "description": &t.description,
                            "parameters": &t.parameters
                        }
                    })
                })
                .collect();

            body["tools"] = json!(tools);
            body["tool_choice"] = match &request.tool_choice {
                ToolChoice::Auto => json!("auto"),
                ToolChoice::Required(name) => {
                    json!({"type": "function", "function": {"name": name}})
                }
                ToolChoice::None => json!("none"),
            };
        }

        body
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<ModelOutput> {
        let choice = json["choices"]
            .get(0)
            .ok_or_else(|| ProviderError::InvalidResponse("missing choices".to_string()))?;
        let message = &choice["message"];
        if !message.is_object() {
            return Err(ProviderError::InvalidResponse("missing message".to_string()));
        }

        let content = message["content"].as_str().unwrap_or_default().to_string();
        let finish_reason = choice["finish_reason"]
            .as_str()
            .unwrap_or("stop")
            .to_string();

        let mut tool_calls = Vec::new();
        if let Some(calls) = message["tool_calls"].as_array() {
            for (index, call) in calls.iter().enumerate() {
                let function = &call["function"];
                let name = function["name"]
                    .as_str()
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| {
                        ProviderError::InvalidResponse(format!("tool call {} has no name", index))
                    })?;

                let arguments = match &function["arguments"] {
                    serde_json::Value::String(s) if s.trim().is_empty() => json!({}),
                    serde_json::Value::String(s) => serde_json::from_str(s).map_err(|e| {
                        ProviderError::InvalidResponse(format!(
                            "arguments for '{}' are not JSON: {}",
                            name, e
                        ))
                    })?,
                    serde_json::Value::Null => json!({}),
                    other => other.clone(),
                };

                let id = call["id"]
                    .as_str()
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("call_{}", index));

                tool_calls.push(ToolCall::new(id, name, arguments));
            }
        }

        let usage = json["usage"]
            .as_object()
            .map(|usage| Usage {
                prompt_tokens: usage
                    .get("prompt_tokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as u32,
                completion_tokens: usage
                    .get("completion_tokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as u32,
                total_tokens: usage
                    .get("total_tokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as u32,
            })
            .unwrap_or_default();

        Ok(ModelOutput {
            content,
            tool_calls,
            finish_reason,
            usage,
            model: json["model"]
                .as_str()
                .unwrap_or(self.defaults.model.as_str())
                .to_string(),
        })
    }
}

#[async_trait::async_trait]
impl LanguageModel for CompatProvider {
    async fn generate(&self, request: ModelRequest) -> Result<ModelOutput> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NoApiKey);
        }

        trace!("◆ POSTING COMPLETION TO {}", self.api_base);

        let url = format!("{}/chat/completions", self.api_base);
        let body = self.build_request(&request);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            let error = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(ProviderError::Api(error));
        }

        let json: serde_json::Value = serde_json::from_str(&text)?;
        let output = self.parse_response(json)?;

        debug!(
            "◆ MODEL RESPONDED: {} chars, {} tool calls",
            output.content.len(),
            output.tool_calls.len()
        );

        Ok(output)
    }

    fn default_model(&self) -> String {
        self.defaults.model.clone()
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}
