//! Remote LLM-backed classifier via an OpenRouter-compatible API.
//!
//! Each capability is a single chat-completion call with a constrained
//! answer format, parsed defensively: anything the parser cannot understand
//! is a `Malformed` error, which the engine downgrades to an undetermined
//! finding rather than a match.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::classifier::{AdapterError, Classifier, PiiSpan};
use crate::domain::{ContentCategory, FilterStrength, PiiEntityType, TopicRule};

/// Remote classifier configuration.
#[derive(Debug, Clone)]
pub struct RemoteClassifierConfig {
    /// API key for the completion endpoint.
    pub api_key: String,
    /// Model to use.
    pub model: String,
    /// Endpoint base URL.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RemoteClassifierConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "meta-llama/llama-guard-4-12b".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Span as the model reports it: character offsets plus an entity label.
#[derive(Debug, Deserialize)]
struct ReportedSpan {
    entity: String,
    start: usize,
    end: usize,
}

/// LLM-backed classifier.
pub struct RemoteClassifier {
    config: RemoteClassifierConfig,
    client: Client,
}

impl RemoteClassifier {
    pub fn new(config: RemoteClassifierConfig) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AdapterError::Http(e.to_string()))?;

        Ok(Self { config, client })
    }

    async fn complete(&self, prompt: String) -> Result<String, AdapterError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
            max_tokens: Some(200),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AdapterError::Timeout(self.config.timeout_secs)
                } else {
                    AdapterError::Http(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Http(format!("API error {}: {}", status, body)));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Malformed(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AdapterError::Malformed("response has no choices".to_string()))
    }

    /// Parse a match/no_match answer.
    fn parse_topic_answer(answer: &str) -> Result<bool, AdapterError> {
        let first = answer
            .trim()
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        match first.as_str() {
            "match" => Ok(true),
            "no_match" | "no match" => Ok(false),
            other => Err(AdapterError::Malformed(format!(
                "expected match/no_match, got '{}'",
                other
            ))),
        }
    }

    /// Parse a severity answer.
    fn parse_severity_answer(answer: &str) -> Result<FilterStrength, AdapterError> {
        let first = answer
            .trim()
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        first
            .parse::<FilterStrength>()
            .map_err(AdapterError::Malformed)
    }

    /// Parse the JSON span list, dropping entities we do not track and spans
    /// that fall outside the text.
    fn parse_spans(answer: &str, text_len: usize) -> Result<Vec<PiiSpan>, AdapterError> {
        let trimmed = answer.trim();
        // Tolerate a fenced code block around the JSON.
        let json = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .and_then(|s| s.strip_suffix("```"))
            .unwrap_or(trimmed)
            .trim();

        let reported: Vec<ReportedSpan> =
            serde_json::from_str(json).map_err(|e| AdapterError::Malformed(e.to_string()))?;

        let mut spans = Vec::new();
        for span in reported {
            let entity_type = match span.entity.to_lowercase().as_str() {
                "age" => PiiEntityType::Age,
                "email" => PiiEntityType::Email,
                "phone" => PiiEntityType::Phone,
                "name" => PiiEntityType::Name,
                "address" => PiiEntityType::Address,
                "credit_card_number" => PiiEntityType::CreditCardNumber,
                "ip_address" => PiiEntityType::IpAddress,
                _ => continue,
            };
            if span.start < span.end && span.end <= text_len {
                spans.push(PiiSpan {
                    entity_type,
                    start: span.start,
                    end: span.end,
                });
            }
        }
        spans.sort_by_key(|s| s.start);
        Ok(spans)
    }
}

#[async_trait]
impl Classifier for RemoteClassifier {
    async fn classify_topic(&self, text: &str, topic: &TopicRule) -> Result<bool, AdapterError> {
        let mut prompt = format!(
            "You are a topic classifier. Topic: {}\nDefinition: {}\n",
            topic.name, topic.definition
        );
        if !topic.examples.is_empty() {
            prompt.push_str("Utterances that belong to this topic:\n");
            for example in &topic.examples {
                prompt.push_str("- ");
                prompt.push_str(example);
                prompt.push('\n');
            }
        }
        prompt.push_str(&format!(
            "\nDoes the following message fall under this topic?\n\
             Message: {}\n\n\
             Answer with exactly one word: match or no_match.",
            text
        ));

        let answer = self.complete(prompt).await?;
        Self::parse_topic_answer(&answer)
    }

    async fn classify_content(
        &self,
        text: &str,
        category: ContentCategory,
    ) -> Result<FilterStrength, AdapterError> {
        let prompt = format!(
            "You are a content safety classifier. Rate the severity of the \
             following message for the category '{}'.\n\
             Message: {}\n\n\
             Answer with exactly one word: none, low, medium or high.",
            category, text
        );

        let answer = self.complete(prompt).await?;
        Self::parse_severity_answer(&answer)
    }

    async fn detect_pii(&self, text: &str) -> Result<Vec<PiiSpan>, AdapterError> {
        let prompt = format!(
            "Find personally identifiable information in the following text. \
             Report each occurrence as a JSON array of objects with fields \
             \"entity\" (one of: age, email, phone, name, address, \
             credit_card_number, ip_address), \"start\" and \"end\" \
             (character offsets into the text). Answer with the JSON array \
             only; answer [] if there is none.\n\nText: {}",
            text
        );

        let answer = self.complete(prompt).await?;
        Self::parse_spans(&answer, text.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_topic_answer() {
        assert!(RemoteClassifier::parse_topic_answer("match").unwrap());
        assert!(!RemoteClassifier::parse_topic_answer("no_match").unwrap());
        assert!(!RemoteClassifier::parse_topic_answer("No Match\nbecause...").unwrap());
        assert!(RemoteClassifier::parse_topic_answer("maybe").is_err());
    }

    #[test]
    fn test_parse_severity_answer() {
        assert_eq!(
            RemoteClassifier::parse_severity_answer("HIGH").unwrap(),
            FilterStrength::High
        );
        assert_eq!(
            RemoteClassifier::parse_severity_answer("none\n").unwrap(),
            FilterStrength::None
        );
        assert!(RemoteClassifier::parse_severity_answer("severe").is_err());
    }

    #[test]
    fn test_parse_spans() {
        let answer = r#"[{"entity": "email", "start": 0, "end": 11}, {"entity": "ssn", "start": 20, "end": 24}]"#;
        let spans = RemoteClassifier::parse_spans(answer, 30).unwrap();
        // The untracked entity is dropped, not an error.
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].entity_type, PiiEntityType::Email);
    }

    #[test]
    fn test_parse_spans_fenced() {
        let answer = "```json\n[{\"entity\": \"age\", \"start\": 4, \"end\": 6}]\n```";
        let spans = RemoteClassifier::parse_spans(answer, 10).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].entity_type, PiiEntityType::Age);
    }

    #[test]
    fn test_parse_spans_out_of_bounds_dropped() {
        let answer = r#"[{"entity": "email", "start": 5, "end": 50}]"#;
        let spans = RemoteClassifier::parse_spans(answer, 10).unwrap();
        assert!(spans.is_empty());
    }

    #[test]
    fn test_parse_spans_garbage_is_malformed() {
        assert!(RemoteClassifier::parse_spans("I found nothing!", 10).is_err());
    }
}
