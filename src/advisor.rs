//! Optional column-mapping suggestions from a generative-language API.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::AiSettings;
use crate::error::Result;
use crate::parser::columns::ColumnSuggestion;
use crate::schema::Field;
use crate::utils::truncate;

const MAX_CELL_CHARS: usize = 60;

/// Soft failures: the caller logs them and keeps the heuristic mapping.
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("request timed out")]
    Timeout,
    #[error("api key rejected ({0})")]
    Auth(StatusCode),
    #[error("http status {0}")]
    Http(StatusCode),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("empty response")]
    Empty,
}

impl AdvisorError {
    /// Short label for logs and run metrics.
    pub fn fallback_reason(&self) -> &'static str {
        match self {
            AdvisorError::Timeout => "timeout",
            AdvisorError::Auth(_) => "auth",
            AdvisorError::Http(_) => "http_error",
            AdvisorError::Transport(_) => "transport",
            AdvisorError::Malformed(_) => "malformed_json",
            AdvisorError::Empty => "empty_response",
        }
    }
}

impl From<reqwest::Error> for AdvisorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AdvisorError::Timeout
        } else if let Some(status) = e.status() {
            AdvisorError::Http(status)
        } else if e.is_decode() {
            AdvisorError::Malformed(e.to_string())
        } else {
            AdvisorError::Transport(e.to_string())
        }
    }
}

/// What the advisor sees of one file.
#[derive(Debug, Clone)]
pub struct AdvisorRequest<'a> {
    pub file_name: &'a str,
    pub headers: &'a [String],
    pub sample: &'a [Vec<String>],
    /// Field-knowledge summary used as a weak prior.
    pub knowledge: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdvisorResponse {
    pub header_trusted: Option<bool>,
    pub confidence: f32,
    pub columns: Vec<ColumnSuggestion>,
}

pub trait ColumnAdvisor {
    fn suggest(&self, request: &AdvisorRequest) -> Result<AdvisorResponse, AdvisorError>;
}

pub struct GeminiAdvisor {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiAdvisor {
    pub fn new(settings: &AiSettings) -> Result<Self> {
        let api_key = settings.resolve_api_key()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(GeminiAdvisor {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

impl ColumnAdvisor for GeminiAdvisor {
    fn suggest(&self, request: &AdvisorRequest) -> Result<AdvisorResponse, AdvisorError> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let body = json!({
            "contents": [{ "parts": [{ "text": build_prompt(request) }] }],
            "generationConfig": { "temperature": 0, "responseMimeType": "application/json" },
        });
        debug!(file = request.file_name, model = %self.model, "requesting column suggestions");

        let resp = self
            .client
            .post(url)
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AdvisorError::Auth(status));
        }
        if !status.is_success() {
            return Err(AdvisorError::Http(status));
        }
        let parsed: GenerateResponse = resp.json()?;
        let text = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .collect::<String>();
        parse_response(&text)
    }
}

/// Decode the model's JSON answer, tolerating a markdown code fence.
pub fn parse_response(text: &str) -> Result<AdvisorResponse, AdvisorError> {
    let body = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    if body.is_empty() {
        return Err(AdvisorError::Empty);
    }
    let response: AdvisorResponse =
        serde_json::from_str(body).map_err(|e| AdvisorError::Malformed(e.to_string()))?;
    if response.columns.is_empty() && response.header_trusted.is_none() {
        return Err(AdvisorError::Empty);
    }
    Ok(response)
}

pub fn build_prompt(request: &AdvisorRequest) -> String {
    let fields = Field::ALL.iter().map(|f| f.key()).collect::<Vec<_>>().join(", ");
    let headers = request
        .headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{}: {}", i, truncate(h.trim(), MAX_CELL_CHARS)))
        .collect::<Vec<_>>()
        .join("\n");
    let sample = request
        .sample
        .iter()
        .map(|row| {
            row.iter()
                .map(|c| truncate(c.trim(), MAX_CELL_CHARS))
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You map columns of a Japanese company-list CSV to canonical fields.\n\
         File: {file}\n\
         Canonical fields: {fields}\n\n\
         Header cells (index: text):\n{headers}\n\n\
         Sample rows:\n{sample}\n\n\
         Previously observed value shapes per field:\n{knowledge}\n\n\
         Answer with JSON only: {{\"headerTrusted\": bool, \"confidence\": 0..1, \
         \"columns\": [{{\"index\": int, \"field\": \"<canonical field>\", \"confidence\": 0..1}}]}}. \
         Leave out columns that match no field.",
        file = request.file_name,
        fields = fields,
        headers = if headers.is_empty() { "(none detected)".to_string() } else { headers },
        sample = sample,
        knowledge = if request.knowledge.is_empty() { "(none)" } else { request.knowledge },
    )
}

/// Ask the advisor. A failure is logged and reduced to its fallback label.
pub fn advise(advisor: &dyn ColumnAdvisor, request: &AdvisorRequest) -> Result<AdvisorResponse, &'static str> {
    match advisor.suggest(request) {
        Ok(resp) => {
            debug!(file = request.file_name, columns = resp.columns.len(), "advisor answered");
            Ok(resp)
        }
        Err(e) => {
            warn!(
                file = request.file_name,
                reason = e.fallback_reason(),
                "advisor unavailable, using heuristic mapping: {}",
                e
            );
            Err(e.fallback_reason())
        }
    }
}

/// Canned advisor for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticAdvisor {
    pub response: Option<AdvisorResponse>,
}

impl ColumnAdvisor for StaticAdvisor {
    fn suggest(&self, _request: &AdvisorRequest) -> Result<AdvisorResponse, AdvisorError> {
        self.response.clone().ok_or(AdvisorError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(headers: &'a [String], sample: &'a [Vec<String>]) -> AdvisorRequest<'a> {
        AdvisorRequest {
            file_name: "list.csv",
            headers,
            sample,
            knowledge: "",
        }
    }

    #[test]
    fn parses_fenced_json() {
        let text = "```json\n{\"headerTrusted\":true,\"confidence\":0.9,\"columns\":[{\"index\":2,\"field\":\"tel\",\"confidence\":0.8}]}\n```";
        let resp = parse_response(text).unwrap();
        assert_eq!(resp.header_trusted, Some(true));
        assert_eq!(resp.columns[0].index, 2);
        assert_eq!(resp.columns[0].field, "tel");
    }

    #[test]
    fn classifies_bad_answers() {
        assert_eq!(parse_response("").unwrap_err().fallback_reason(), "empty_response");
        assert_eq!(parse_response("{}").unwrap_err().fallback_reason(), "empty_response");
        assert_eq!(parse_response("not json").unwrap_err().fallback_reason(), "malformed_json");
        assert_eq!(AdvisorError::Timeout.fallback_reason(), "timeout");
        assert_eq!(AdvisorError::Auth(StatusCode::FORBIDDEN).fallback_reason(), "auth");
    }

    #[test]
    fn prompt_lists_headers_and_fields() {
        let headers = vec!["会社名".to_string(), "連絡先".to_string()];
        let sample = vec![vec!["株式会社A".to_string(), "03-1234-5678".to_string()]];
        let prompt = build_prompt(&request(&headers, &sample));
        assert!(prompt.contains("1: 連絡先"));
        assert!(prompt.contains("株式会社A | 03-1234-5678"));
        assert!(prompt.contains("corporateNumber"));
    }

    #[test]
    fn failures_fall_back_to_none() {
        let headers = vec![];
        let sample = vec![];
        assert_eq!(
            advise(&StaticAdvisor::default(), &request(&headers, &sample)),
            Err("empty_response")
        );

        let canned = StaticAdvisor {
            response: Some(AdvisorResponse {
                header_trusted: Some(false),
                confidence: 0.8,
                columns: vec![],
            }),
        };
        let resp = advise(&canned, &request(&headers, &sample)).unwrap();
        assert_eq!(resp.header_trusted, Some(false));
    }

    #[test]
    fn gemini_needs_a_key() {
        let settings = AiSettings::default();
        assert!(GeminiAdvisor::new(&settings).is_err());
    }
}
