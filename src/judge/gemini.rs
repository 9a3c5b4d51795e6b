use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::{DetectorError, Result},
    judge::{Judge, JudgeRequest},
    resource::ResourceLoader,
};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash-latest";
pub const DEFAULT_API_KEY_VAR: &str = "GEMINI_API_KEY";

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Client for the Gemini `generateContent` REST call.
///
/// The API key is looked up in the environment on every call, so a
/// missing key fails the request rather than the client construction.
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key_var: String,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, endpoint: &str, model: &str, api_key_var: &str) -> Self {
        Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key_var: api_key_var.to_string(),
        }
    }

    pub fn url(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.endpoint, self.model)
    }

    fn api_key(&self) -> Result<String> {
        match std::env::var(&self.api_key_var) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(DetectorError::ExternalService(format!(
                "{} is not set",
                self.api_key_var
            ))),
        }
    }
}

#[async_trait]
impl Judge for GeminiClient {
    async fn judge(&self, request: JudgeRequest) -> Result<String> {
        let api_key = self.api_key()?;

        let mut parts = vec![Part::Text {
            text: &request.prompt,
        }];
        parts.extend(request.images.iter().map(|image| Part::Inline {
            inline_data: InlineData {
                mime_type: &image.mime_type,
                data: STANDARD.encode(&image.data),
            },
        }));
        let body = GenerateContentRequest {
            contents: vec![Content { parts }],
        };

        debug!(
            "Calling {} with {} image(s)",
            self.model,
            request.images.len()
        );
        let resp = self
            .http
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(DetectorError::ExternalService(format!(
                "judge API error ({}): {}",
                status, text
            )));
        }

        let parsed: GenerateContentResponse = resp.json().await?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| DetectorError::ExternalService("judge returned no text".into()))?;

        Ok(text)
    }

    fn judge_name(&self) -> &str {
        &self.model
    }
}

/// Builds the HTTP client handle lazily, on the first judged request.
#[derive(Debug, Clone)]
pub struct GeminiLoader {
    pub endpoint: String,
    pub model: String,
    pub api_key_var: String,
    pub timeout: Option<Duration>,
}

impl Default for GeminiLoader {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_var: DEFAULT_API_KEY_VAR.to_string(),
            timeout: None,
        }
    }
}

impl ResourceLoader<Box<dyn Judge>> for GeminiLoader {
    fn load(&self) -> Result<Box<dyn Judge>> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Box::new(GeminiClient::new(
            http,
            &self.endpoint,
            &self.model,
            &self.api_key_var,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::InlineImage;

    #[test]
    fn test_url() {
        let client = GeminiClient::new(reqwest::Client::new(), "http://localhost:9/", "m-1", "X");
        assert_eq!(client.url(), "http://localhost:9/v1beta/models/m-1:generateContent");
    }

    #[test]
    fn test_request_body_shape() {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: "look" },
                    Part::Inline {
                        inline_data: InlineData {
                            mime_type: "image/png",
                            data: STANDARD.encode([1u8, 2, 3]),
                        },
                    },
                ],
            }],
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "look");
        assert_eq!(
            json["contents"][0]["parts"][1]["inlineData"]["mimeType"],
            "image/png"
        );
        assert_eq!(json["contents"][0]["parts"][1]["inlineData"]["data"], "AQID");
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_at_call_time() {
        let loader = GeminiLoader {
            api_key_var: "IMAGE_AUTHENTICITY_TEST_UNSET_KEY".into(),
            ..Default::default()
        };
        let judge = loader.load().unwrap();

        let err = judge
            .judge(JudgeRequest {
                prompt: "p".into(),
                images: vec![InlineImage::new("image/png", vec![0])],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DetectorError::ExternalService(_)));
        assert!(err.to_string().contains("IMAGE_AUTHENTICITY_TEST_UNSET_KEY"));
    }
}
