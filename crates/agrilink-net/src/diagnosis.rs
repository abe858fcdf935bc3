//! Plant health assessment client (Plant.id).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use agrilink_shared::constants::PLANT_ID_ENDPOINT;
use agrilink_shared::models::{Diagnosis, DiseaseProbability};

use crate::error::{NetError, Result};

const MODIFIERS: [&str; 2] = ["crops_fast", "similar_images"];

#[derive(Debug, Serialize)]
struct AssessmentRequest<'a> {
    images: Vec<String>,
    modifiers: &'a [&'a str],
    language: &'a str,
}

#[derive(Debug, Deserialize)]
struct AssessmentResponse {
    health_assessment: HealthAssessment,
}

#[derive(Debug, Deserialize)]
struct HealthAssessment {
    is_healthy: bool,
    #[serde(default)]
    diseases: Vec<DiseaseProbability>,
}

/// Sends crop photos to the health-assessment API.
#[derive(Debug, Clone)]
pub struct PlantDiagnosisClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl PlantDiagnosisClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_endpoint(api_key, PLANT_ID_ENDPOINT)
    }

    pub fn with_endpoint(api_key: Option<String>, endpoint: impl Into<String>) -> Self {
        let api_key = api_key.filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!("Plant.id API key is missing; diagnosis is disabled");
        }
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Assess the health of the plant in `image` (raw JPEG/PNG bytes).
    pub async fn diagnose(&self, image: &[u8]) -> Result<Diagnosis> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| NetError::NotConfigured("Plant.id API key".into()))?;

        let body = AssessmentRequest {
            images: vec![BASE64.encode(image)],
            modifiers: &MODIFIERS,
            language: "en",
        };

        debug!(bytes = image.len(), "Requesting plant health assessment");

        let resp = self
            .http
            .post(&self.endpoint)
            .header("Api-Key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(NetError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = resp.json().await?;
        parse_health_assessment(json)
    }
}

/// Map a raw health-assessment response onto a [`Diagnosis`].
pub fn parse_health_assessment(json: Value) -> Result<Diagnosis> {
    let parsed: AssessmentResponse = serde_json::from_value(json)
        .map_err(|e| NetError::InvalidResponse(format!("health assessment: {e}")))?;

    Ok(Diagnosis {
        is_healthy: parsed.health_assessment.is_healthy,
        diseases: parsed.health_assessment.diseases,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_keeps_name_and_probability() {
        let raw = json!({
            "id": 123,
            "health_assessment": {
                "is_healthy": false,
                "is_healthy_probability": 0.12,
                "diseases": [
                    { "name": "leaf rust", "probability": 0.81, "entity_id": 9 },
                    { "name": "water deficiency", "probability": 0.07 }
                ]
            }
        });

        let d = parse_health_assessment(raw).unwrap();
        assert!(!d.is_healthy);
        assert_eq!(d.diseases.len(), 2);
        assert_eq!(d.top_disease().unwrap().name, "leaf rust");
    }

    #[test]
    fn test_parse_rejects_missing_assessment() {
        let err = parse_health_assessment(json!({ "suggestions": [] })).unwrap_err();
        assert!(matches!(err, NetError::InvalidResponse(_)));
    }

    #[test]
    fn test_request_body_shape() {
        let body = AssessmentRequest {
            images: vec![BASE64.encode(b"img")],
            modifiers: &MODIFIERS,
            language: "en",
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["images"][0], "aW1n");
        assert_eq!(v["modifiers"], json!(["crops_fast", "similar_images"]));
        assert_eq!(v["language"], "en");
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let client = PlantDiagnosisClient::new(Some("  ".into()));
        assert!(!client.is_configured());
        let err = client.diagnose(b"img").await.unwrap_err();
        assert!(matches!(err, NetError::NotConfigured(_)));
    }
}
