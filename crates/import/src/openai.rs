use async_trait::async_trait;
use auszug_core::CategoryVocabulary;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::categorize::{CategorizationProvider, CategorizationServiceError, TransactionForAnalysis};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const PROMPT_VERSION: &str = "1.0.0";
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Usually injected from `OPENAI_API_KEY`; never written to config files.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub prompt_version: String,
    pub chunk_size: usize,
    pub timeout_secs: u64,
    pub temperature: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            prompt_version: PROMPT_VERSION.to_string(),
            chunk_size: crate::categorize::DEFAULT_CHUNK_SIZE,
            timeout_secs: crate::categorize::DEFAULT_TIMEOUT.as_secs(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// Chat-completions backend requesting a JSON object response.
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: AiConfig,
}

impl OpenAiProvider {
    /// `None` when no API key is configured.
    pub fn from_config(config: AiConfig) -> Option<Self> {
        config.api_key.as_deref().filter(|k| !k.trim().is_empty())?;
        Some(Self {
            client: reqwest::Client::new(),
            config,
        })
    }

    pub fn prompt_version(&self) -> &str {
        &self.config.prompt_version
    }
}

fn system_prompt(vocabulary: &CategoryVocabulary) -> String {
    format!(
        "You are a financial transaction analyzer. For each transaction:\n\
         1. Pick exactly one category from the list below.\n\
         2. Extract a clean merchant name from the raw description \
         (e.g. \"AMAZON.DE*123ABC\" -> \"Amazon\").\n\
         3. Give a confidence between 0 and 1.\n\n\
         Available categories: {}\n\n\
         Use \"uncategorized\" when unsure. Never include amounts or totals. \
         Respond ONLY with JSON.",
        vocabulary.keys().join(", ")
    )
}

fn user_prompt(chunk: &[TransactionForAnalysis]) -> Result<String, CategorizationServiceError> {
    let payload = serde_json::to_string_pretty(chunk)
        .map_err(|e| CategorizationServiceError::Transport(e.to_string()))?;
    Ok(format!(
        "Analyze these transactions:\n\n{payload}\n\n\
         Return JSON in exactly this shape:\n\
         {{\"transactions\": [{{\"index\": <transaction index>, \
         \"suggestedCategory\": \"<category from the list>\", \
         \"merchantNormalized\": \"<clean merchant name>\", \
         \"confidence\": <0.0 to 1.0>}}]}}"
    ))
}

#[async_trait]
impl CategorizationProvider for OpenAiProvider {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn analyze(
        &self,
        chunk: &[TransactionForAnalysis],
        vocabulary: &CategoryVocabulary,
    ) -> Result<String, CategorizationServiceError> {
        #[derive(Serialize)]
        struct Msg {
            role: &'static str,
            content: String,
        }

        #[derive(Serialize)]
        struct ResponseFormat {
            #[serde(rename = "type")]
            t: &'static str,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg>,
            temperature: f32,
            response_format: ResponseFormat,
        }

        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }

        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: Option<String>,
        }

        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or(CategorizationServiceError::NotConfigured)?;

        let body = Req {
            model: &self.config.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system_prompt(vocabulary),
                },
                Msg {
                    role: "user",
                    content: user_prompt(chunk)?,
                },
            ],
            temperature: self.config.temperature,
            response_format: ResponseFormat { t: "json_object" },
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| CategorizationServiceError::Transport(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| CategorizationServiceError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CategorizationServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let out: Resp = resp
            .json()
            .await
            .map_err(|e| CategorizationServiceError::InvalidJson(e.to_string()))?;
        out.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(CategorizationServiceError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auszug_core::{Currency, DraftTransaction, SourceRef};
    use chrono::NaiveDate;

    #[test]
    fn no_key_means_no_provider() {
        assert!(OpenAiProvider::from_config(AiConfig::default()).is_none());
        let blank = AiConfig {
            api_key: Some("  ".into()),
            ..AiConfig::default()
        };
        assert!(OpenAiProvider::from_config(blank).is_none());
    }

    #[test]
    fn provider_reports_model() {
        let config = AiConfig {
            api_key: Some("sk-test".into()),
            ..AiConfig::default()
        };
        let provider = OpenAiProvider::from_config(config).unwrap();
        assert_eq!(provider.model(), "gpt-4o-mini");
        assert_eq!(provider.prompt_version(), "1.0.0");
    }

    #[test]
    fn prompts_carry_vocabulary_and_indices() {
        let vocab = CategoryVocabulary::new(["food_groceries"]);
        let system = system_prompt(&vocab);
        assert!(system.contains("food_groceries, uncategorized"));

        let draft = DraftTransaction::new(
            NaiveDate::from_ymd_opt(2025, 11, 28).unwrap(),
            -1990,
            Currency::EUR,
            "REWE",
            SourceRef::Row(2),
        );
        let user = user_prompt(&[TransactionForAnalysis::from_draft(5, &draft)]).unwrap();
        assert!(user.contains("\"index\": 5"));
        assert!(user.contains("REWE"));
    }

    #[test]
    fn config_defaults_fill_partial_toml() {
        let config: AiConfig = toml::from_str("model = \"gpt-4o\"").unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.chunk_size, 50);
        assert_eq!(config.timeout_secs, 30);
        assert!(config.api_key.is_none());
    }
}
