//! Backend document shapes shared by the client and the backend adapters.
//!
//! Field names follow the documents as stored remotely (camelCase), so a
//! model can be written with `serde_json::to_value` and read back without a
//! separate DTO layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{GeoPoint, UserId};

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Public user document used by discovery and chat (`users/{id}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<UserLocation>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub expertise: Vec<String>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: String,
}

impl UserLocation {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

// ---------------------------------------------------------------------------
// Plant groups
// ---------------------------------------------------------------------------

/// A plant-interest community (`plantGroups/{id}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlantGroup {
    pub id: String,
    pub name: String,
    pub plant_type: String,
    #[serde(default)]
    pub member_count: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub members: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl PlantGroup {
    pub fn has_member(&self, user: &UserId) -> bool {
        self.members.iter().any(|m| m == user.as_str())
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A direct message (`messages/{id}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub text: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub conversation_id: String,
    #[serde(default)]
    pub read: bool,
}

/// A message posted to a plant group (`groupMessages/{id}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessage {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub text: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    pub group_id: String,
    #[serde(default)]
    pub read: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub text: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

/// A direct conversation between participants (`conversations/{id}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub participants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
    pub last_active: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub unread_count: u32,
}

// ---------------------------------------------------------------------------
// Plant APIs
// ---------------------------------------------------------------------------

/// Result of a plant health assessment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Diagnosis {
    pub is_healthy: bool,
    pub diseases: Vec<DiseaseProbability>,
}

impl Diagnosis {
    /// The most probable disease, if any was reported.
    pub fn top_disease(&self) -> Option<&DiseaseProbability> {
        self.diseases
            .iter()
            .max_by(|a, b| a.probability.total_cmp(&b.probability))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiseaseProbability {
    pub name: String,
    pub probability: f64,
}

/// One entry of the species catalogue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlantSpecies {
    pub id: u64,
    pub common_name: String,
    pub scientific_name: String,
    pub cycle: String,
    pub watering: String,
    pub image_url: Option<String>,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_profile_tolerates_sparse_documents() {
        let json = serde_json::json!({ "id": "u1", "name": "Amal" });
        let user: UserProfile = serde_json::from_value(json).unwrap();
        assert_eq!(user.id, "u1");
        assert!(user.interests.is_empty());
        assert!(!user.is_online);
        assert!(user.location.is_none());
    }

    #[test]
    fn top_disease_picks_highest_probability() {
        let d = Diagnosis {
            is_healthy: false,
            diseases: vec![
                DiseaseProbability {
                    name: "rust".into(),
                    probability: 0.2,
                },
                DiseaseProbability {
                    name: "blight".into(),
                    probability: 0.7,
                },
            ],
        };
        assert_eq!(d.top_disease().unwrap().name, "blight");
    }
}
