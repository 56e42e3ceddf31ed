//! LLM-assisted fallback extractor, remote build (`llm` feature).
//!
//! Posts the document text to an extraction endpoint and maps its response
//! onto the adapter contract. Timeouts and server errors are transient;
//! client errors and malformed responses are permanent.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::AdapterError;
use crate::model::{DocType, ProcessorKind};

use super::{decode_text, Extraction, ExtractionAdapter};

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8089/extract";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    fields: Map<String, Value>,
    #[serde(default)]
    confidences: BTreeMap<String, f64>,
}

pub struct LlmAssistedAdapter {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl LlmAssistedAdapter {
    pub fn new(endpoint: Option<&str>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.unwrap_or(DEFAULT_ENDPOINT).to_string(),
        }
    }
}

impl ExtractionAdapter for LlmAssistedAdapter {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::LlmAssisted
    }

    fn extract(&self, bytes: &[u8], doc_type: DocType) -> Result<Extraction, AdapterError> {
        let text = decode_text(bytes)?;

        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "text": text,
                "doc_type": doc_type.as_str(),
            }))
            .send()
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    AdapterError::Transient(format!("extraction endpoint unreachable: {}", e))
                } else {
                    AdapterError::Permanent(format!("extraction request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AdapterError::Transient(format!(
                "extraction endpoint returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(AdapterError::Permanent(format!(
                "extraction endpoint rejected request: {}",
                status
            )));
        }

        let parsed: ExtractResponse = response
            .json()
            .map_err(|e| AdapterError::Permanent(format!("malformed extraction response: {}", e)))?;

        let mut extraction = Extraction::new(ProcessorKind::LlmAssisted);
        for (field, value) in parsed.fields {
            let confidence = parsed.confidences.get(&field).copied().unwrap_or(0.5);
            extraction.insert(&field, value, confidence);
        }
        Ok(extraction)
    }
}
