//! Plant species catalogue client (Perenual).

use serde_json::Value;
use tracing::debug;

use agrilink_shared::constants::PERENUAL_ENDPOINT;
use agrilink_shared::models::PlantSpecies;

use crate::error::{NetError, Result};

/// Fetches species listings for the home screen.
#[derive(Debug, Clone)]
pub struct PlantSpeciesClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl PlantSpeciesClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_endpoint(api_key, PERENUAL_ENDPOINT)
    }

    pub fn with_endpoint(api_key: Option<String>, endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Fetch one page of species, optionally only indoor plants.
    pub async fn species_page(&self, page: u32, indoor: bool) -> Result<Vec<PlantSpecies>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| NetError::NotConfigured("Perenual API key".into()))?;

        let page = page.to_string();
        let indoor = if indoor { "1" } else { "0" };

        debug!(page = %page, indoor, "Fetching plant species");

        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[("key", api_key), ("page", page.as_str()), ("indoor", indoor)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NetError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = resp.json().await?;
        parse_species_list(&json)
    }
}

/// Map a species-list response, filling display fallbacks for gaps.
pub fn parse_species_list(json: &Value) -> Result<Vec<PlantSpecies>> {
    let items = json
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| NetError::InvalidResponse("species list has no data array".into()))?;

    Ok(items.iter().map(species_from_json).collect())
}

fn species_from_json(item: &Value) -> PlantSpecies {
    PlantSpecies {
        id: item.get("id").and_then(Value::as_u64).unwrap_or_default(),
        common_name: text_or(item.get("common_name"), "Unknown Plant"),
        scientific_name: text_or(item.get("scientific_name"), "Scientific name not available"),
        cycle: text_or(item.get("cycle"), "Cycle not specified"),
        watering: text_or(item.get("watering"), "Watering needs not specified"),
        image_url: item
            .get("default_image")
            .and_then(|img| img.get("regular_url"))
            .and_then(Value::as_str)
            .map(str::to_string),
        description: text_or(item.get("description"), "No description available"),
    }
}

// Strings pass through; arrays use their first non-empty string.
fn text_or(value: Option<&Value>, fallback: &str) -> String {
    let text = match value {
        Some(Value::String(s)) => Some(s.as_str()),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .find(|s| !s.is_empty()),
        _ => None,
    };
    text.filter(|s| !s.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_fills_fallbacks() {
        let raw = json!({
            "data": [
                {
                    "id": 1,
                    "common_name": "European Silver Fir",
                    "scientific_name": ["Abies alba"],
                    "cycle": "Perennial",
                    "watering": "Frequent",
                    "default_image": { "regular_url": "https://img/1.jpg" }
                },
                { "id": 2, "common_name": "", "default_image": null }
            ]
        });

        let species = parse_species_list(&raw).unwrap();
        assert_eq!(species.len(), 2);

        assert_eq!(species[0].scientific_name, "Abies alba");
        assert_eq!(species[0].image_url.as_deref(), Some("https://img/1.jpg"));
        assert_eq!(species[0].description, "No description available");

        assert_eq!(species[1].common_name, "Unknown Plant");
        assert_eq!(species[1].scientific_name, "Scientific name not available");
        assert_eq!(species[1].cycle, "Cycle not specified");
        assert_eq!(species[1].watering, "Watering needs not specified");
        assert!(species[1].image_url.is_none());
    }

    #[test]
    fn test_parse_requires_data_array() {
        let err = parse_species_list(&json!({ "data": "nope" })).unwrap_err();
        assert!(matches!(err, NetError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let client = PlantSpeciesClient::new(None);
        let err = client.species_page(2, true).await.unwrap_err();
        assert!(matches!(err, NetError::NotConfigured(_)));
    }
}
