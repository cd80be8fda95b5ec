//! Gemini REST client
//!
//! Implements both model seams against the `v1beta` HTTP API:
//! `models/{model}:generateContent` and `models/{model}:embedContent`.

use super::{EmbeddingModel, LanguageModel};
use crate::config::ModelsConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest {
    model: String,
    content: Content,
    output_dimensionality: usize,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Option<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}

/// HTTP client for the Gemini API
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Create a client for `model` using the given API key
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    /// Build from configuration; `None` when remote models are disabled or
    /// no API key is available.
    pub fn from_config(config: &ModelsConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        let Some(api_key) = config.resolve_api_key() else {
            tracing::warn!(
                env = %config.api_key_env,
                "No API key found, remote models disabled"
            );
            return Ok(None);
        };
        Self::new(
            &config.base_url,
            &api_key,
            &config.classify_model,
            Duration::from_secs(config.request_timeout_secs),
        )
        .map(Some)
    }

    fn method_url(&self, model: &str, method: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/v1beta/models/{}:{}", self.base_url, model, method)
    }

    async fn post<B: Serialize, R: DeserializeOwned>(&self, url: &str, body: &B) -> Result<R> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::RemoteUnavailable("request timed out".to_string())
                } else {
                    Error::RemoteUnavailable(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RemoteUnavailable(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| Error::UnparsableResponse(format!("invalid response body: {}", e)))
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                max_output_tokens: 1024,
            },
        };

        let response: GenerateResponse = self
            .post(&self.method_url(&self.model, "generateContent"), &request)
            .await?;

        response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .and_then(|p| p.text.clone())
            .ok_or_else(|| Error::UnparsableResponse("no text candidate".to_string()))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[async_trait]
impl EmbeddingModel for GeminiClient {
    async fn embed(&self, model: &str, text: &str, dimension: usize) -> Result<Vec<f32>> {
        let bare = model.strip_prefix("models/").unwrap_or(model);
        let request = EmbedRequest {
            model: format!("models/{}", bare),
            content: Content {
                parts: vec![Part {
                    text: text.to_string(),
                }],
            },
            output_dimensionality: dimension,
        };

        let response: EmbedResponse = self
            .post(&self.method_url(model, "embedContent"), &request)
            .await?;

        match response.embedding {
            Some(e) if !e.values.is_empty() => Ok(e.values),
            _ => Err(Error::UnparsableResponse("empty embedding".to_string())),
        }
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use serde_json::{json, Value};

    async fn fake_api(
        Path(call): Path<String>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        if headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()) != Some("test-key") {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
        }
        match call.as_str() {
            "gemini-2.5-flash:generateContent" => (
                StatusCode::OK,
                Json(json!({
                    "candidates": [{"content": {"parts": [{"text": "{\"kind\":\"advice\"}"}]}}]
                })),
            ),
            "text-embedding-004:embedContent" => {
                let dim = body["outputDimensionality"].as_u64().unwrap_or(0) as usize;
                assert_eq!(body["model"], "models/text-embedding-004");
                (
                    StatusCode::OK,
                    Json(json!({"embedding": {"values": vec![0.5f32; dim]}})),
                )
            }
            "empty-model:embedContent" => (StatusCode::OK, Json(json!({"embedding": {"values": []}}))),
            _ => (StatusCode::NOT_FOUND, Json(json!({"error": "unknown model"}))),
        }
    }

    async fn spawn_fake() -> String {
        let app = Router::new().route("/v1beta/models/:call", post(fake_api));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base: &str, key: &str) -> GeminiClient {
        GeminiClient::new(base, key, "gemini-2.5-flash", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_generate() {
        let base = spawn_fake().await;
        let text = client(&base, "test-key").generate("hi").await.unwrap();
        assert_eq!(text, "{\"kind\":\"advice\"}");
    }

    #[tokio::test]
    async fn test_generate_bad_key() {
        let base = spawn_fake().await;
        let err = client(&base, "wrong").generate("hi").await.unwrap_err();
        assert!(matches!(err, Error::RemoteUnavailable(_)));
    }

    #[tokio::test]
    async fn test_embed_strips_models_prefix() {
        let base = spawn_fake().await;
        let c = client(&base, "test-key");
        let v = c.embed("models/text-embedding-004", "текст", 8).await.unwrap();
        assert_eq!(v.len(), 8);
        let v = c.embed("text-embedding-004", "текст", 4).await.unwrap();
        assert_eq!(v, vec![0.5; 4]);
    }

    #[tokio::test]
    async fn test_embed_unknown_and_empty() {
        let base = spawn_fake().await;
        let c = client(&base, "test-key");
        assert!(matches!(
            c.embed("embedding-001", "x", 8).await,
            Err(Error::RemoteUnavailable(_))
        ));
        assert!(matches!(
            c.embed("empty-model", "x", 8).await,
            Err(Error::UnparsableResponse(_))
        ));
    }

    #[test]
    fn test_from_config_disabled() {
        let config = ModelsConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(GeminiClient::from_config(&config).unwrap().is_none());

        let config = ModelsConfig {
            api_key_env: "MEMORIA_TEST_GEMINI_KEY_UNSET".to_string(),
            ..Default::default()
        };
        assert!(GeminiClient::from_config(&config).unwrap().is_none());
    }
}
