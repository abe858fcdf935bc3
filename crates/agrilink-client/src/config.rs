//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client runs with zero configuration;
//! the plant APIs simply report `NotConfigured` until their keys are set.

use std::path::PathBuf;
use std::time::Duration;

use agrilink_shared::constants::{
    DEFAULT_NEARBY_RADIUS_KM, DEFAULT_REMOTE_WRITE_TIMEOUT_SECS, DEFAULT_SEARCH_MAX_DISTANCE_KM,
    PERENUAL_ENDPOINT, PLANT_ID_ENDPOINT,
};

/// Client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Directory holding `agrilink.db`.
    /// Env: `AGRILINK_DATA_DIR`
    /// Default: the platform data directory.
    pub data_dir: Option<PathBuf>,

    /// Env: `PLANT_ID_API_KEY`
    pub plant_id_api_key: Option<String>,

    /// Env: `PERENUAL_API_KEY`
    pub perenual_api_key: Option<String>,

    /// Env: `PLANT_ID_ENDPOINT`
    pub plant_id_endpoint: String,

    /// Env: `PERENUAL_ENDPOINT`
    pub perenual_endpoint: String,

    /// Upper bound on a single remote profile write before it is queued.
    /// Env: `REMOTE_WRITE_TIMEOUT_SECS`
    /// Default: `10`
    pub remote_write_timeout: Duration,

    /// Radius of the "online farmers nearby" map view.
    /// Env: `NEARBY_RADIUS_KM`
    /// Default: `10`
    pub nearby_radius_km: f64,

    /// Cut-off for the distance component of user search.
    /// Env: `SEARCH_MAX_DISTANCE_KM`
    /// Default: `50`
    pub search_max_distance_km: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            plant_id_api_key: None,
            perenual_api_key: None,
            plant_id_endpoint: PLANT_ID_ENDPOINT.to_string(),
            perenual_endpoint: PERENUAL_ENDPOINT.to_string(),
            remote_write_timeout: Duration::from_secs(DEFAULT_REMOTE_WRITE_TIMEOUT_SECS),
            nearby_radius_km: DEFAULT_NEARBY_RADIUS_KM,
            search_max_distance_km: DEFAULT_SEARCH_MAX_DISTANCE_KM,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("AGRILINK_DATA_DIR").filter(|d| !d.is_empty()) {
            config.data_dir = Some(PathBuf::from(dir));
        }

        config.plant_id_api_key = lookup("PLANT_ID_API_KEY").filter(|k| !k.is_empty());
        config.perenual_api_key = lookup("PERENUAL_API_KEY").filter(|k| !k.is_empty());

        if let Some(url) = lookup("PLANT_ID_ENDPOINT") {
            config.plant_id_endpoint = url;
        }
        if let Some(url) = lookup("PERENUAL_ENDPOINT") {
            config.perenual_endpoint = url;
        }

        if let Some(val) = lookup("REMOTE_WRITE_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.remote_write_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid REMOTE_WRITE_TIMEOUT_SECS, using default"),
            }
        }

        if let Some(val) = lookup("NEARBY_RADIUS_KM") {
            match parse_km(&val) {
                Some(km) => config.nearby_radius_km = km,
                None => tracing::warn!(value = %val, "Invalid NEARBY_RADIUS_KM, using default"),
            }
        }

        if let Some(val) = lookup("SEARCH_MAX_DISTANCE_KM") {
            match parse_km(&val) {
                Some(km) => config.search_max_distance_km = km,
                None => {
                    tracing::warn!(value = %val, "Invalid SEARCH_MAX_DISTANCE_KM, using default")
                }
            }
        }

        config
    }
}

// API keys stay out of log output.
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("data_dir", &self.data_dir)
            .field("plant_id_api_key", &self.plant_id_api_key.as_ref().map(|_| "<set>"))
            .field("perenual_api_key", &self.perenual_api_key.as_ref().map(|_| "<set>"))
            .field("plant_id_endpoint", &self.plant_id_endpoint)
            .field("perenual_endpoint", &self.perenual_endpoint)
            .field("remote_write_timeout", &self.remote_write_timeout)
            .field("nearby_radius_km", &self.nearby_radius_km)
            .field("search_max_distance_km", &self.search_max_distance_km)
            .finish()
    }
}

fn parse_km(val: &str) -> Option<f64> {
    val.trim()
        .parse::<f64>()
        .ok()
        .filter(|km| km.is_finite() && *km > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::from_lookup(lookup(&[]));
        assert!(config.data_dir.is_none());
        assert!(config.plant_id_api_key.is_none());
        assert_eq!(config.remote_write_timeout, Duration::from_secs(10));
        assert_eq!(config.nearby_radius_km, 10.0);
        assert_eq!(config.search_max_distance_km, 50.0);
        assert_eq!(config.plant_id_endpoint, PLANT_ID_ENDPOINT);
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("AGRILINK_DATA_DIR", "/tmp/agrilink"),
            ("PLANT_ID_API_KEY", "secret"),
            ("REMOTE_WRITE_TIMEOUT_SECS", "3"),
            ("NEARBY_RADIUS_KM", "25.5"),
        ]));
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/agrilink")));
        assert_eq!(config.plant_id_api_key.as_deref(), Some("secret"));
        assert_eq!(config.remote_write_timeout, Duration::from_secs(3));
        assert_eq!(config.nearby_radius_km, 25.5);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("REMOTE_WRITE_TIMEOUT_SECS", "0"),
            ("NEARBY_RADIUS_KM", "-4"),
            ("SEARCH_MAX_DISTANCE_KM", "far"),
            ("PERENUAL_API_KEY", ""),
        ]));
        assert_eq!(config.remote_write_timeout, Duration::from_secs(10));
        assert_eq!(config.nearby_radius_km, 10.0);
        assert_eq!(config.search_max_distance_km, 50.0);
        assert!(config.perenual_api_key.is_none());
    }

    #[test]
    fn test_debug_hides_keys() {
        let config = ClientConfig::from_lookup(lookup(&[("PLANT_ID_API_KEY", "secret")]));
        let printed = format!("{config:?}");
        assert!(!printed.contains("secret"));
        assert!(printed.contains("<set>"));
    }
}
