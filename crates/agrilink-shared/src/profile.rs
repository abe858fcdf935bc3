//! Farmer profile model.
//!
//! A profile exists in three shapes:
//! - [`ProfileDraft`] is the editable form state, every field optional.
//! - [`FarmerProfile`] is a complete, validated profile as stored remotely.
//! - [`ProfileUpdate`] is a partial payload merged over a stored profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AgrilinkError;
use crate::types::{GeoPoint, UserId};

/// A required profile field that the draft leaves empty.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum MissingField {
    FullName,
    FarmName,
    Region,
    Location,
}

impl MissingField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullName => "fullName",
            Self::FarmName => "farmName",
            Self::Region => "region",
            Self::Location => "location",
        }
    }
}

// ---------------------------------------------------------------------------
// Complete profile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FarmerProfile {
    pub uid: UserId,
    pub full_name: String,
    #[serde(default)]
    pub farm_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub location: GeoPoint,
    #[serde(default)]
    pub selected_crops: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub farm_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub irrigation_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FarmerProfile {
    /// Minimal profile created on first sign-in at the device position.
    pub fn initial(
        uid: UserId,
        display_name: &str,
        email: Option<String>,
        location: GeoPoint,
        is_anonymous: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            uid,
            full_name: display_name.to_string(),
            farm_name: String::new(),
            email,
            phone_number: None,
            location,
            selected_crops: Vec::new(),
            experience: None,
            bio: None,
            farm_size: None,
            irrigation_system: None,
            region: None,
            is_anonymous,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a partial update over this profile and stamp `updated_at`.
    ///
    /// `uid` and `created_at` are never overwritten.
    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(v) = &update.full_name {
            self.full_name = v.clone();
        }
        if let Some(v) = &update.farm_name {
            self.farm_name = v.clone();
        }
        if let Some(v) = &update.email {
            self.email = Some(v.clone());
        }
        if let Some(v) = &update.phone_number {
            self.phone_number = Some(v.clone());
        }
        if let Some(v) = update.location {
            self.location = v;
        }
        if let Some(v) = &update.selected_crops {
            self.selected_crops = v.clone();
        }
        if let Some(v) = &update.experience {
            self.experience = Some(v.clone());
        }
        if let Some(v) = &update.bio {
            self.bio = Some(v.clone());
        }
        if let Some(v) = &update.farm_size {
            self.farm_size = Some(v.clone());
        }
        if let Some(v) = &update.irrigation_system {
            self.irrigation_system = Some(v.clone());
        }
        if let Some(v) = &update.region {
            self.region = Some(v.clone());
        }
        if let Some(v) = update.is_anonymous {
            self.is_anonymous = v;
        }
        self.updated_at = Utc::now();
    }

    /// Create a profile from an update when no remote document exists yet.
    ///
    /// Fails with the list of required fields the update does not carry.
    pub fn from_update(uid: UserId, update: &ProfileUpdate) -> Result<Self, AgrilinkError> {
        let full_name = update.full_name.as_deref().filter(|s| !s.is_empty());
        let (Some(full_name), Some(location)) = (full_name, update.location) else {
            let mut missing = Vec::new();
            if full_name.is_none() {
                missing.push(MissingField::FullName);
            }
            if update.location.is_none() {
                missing.push(MissingField::Location);
            }
            return Err(AgrilinkError::Validation(missing));
        };

        let mut profile = Self::initial(uid, full_name, None, location, false);
        profile.apply(update);
        Ok(profile)
    }
}

// ---------------------------------------------------------------------------
// Partial update
// ---------------------------------------------------------------------------

/// Partial profile payload. Absent fields leave the stored value untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub farm_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_crops: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub farm_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub irrigation_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_anonymous: Option<bool>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ---------------------------------------------------------------------------
// Form draft
// ---------------------------------------------------------------------------

/// Profile setup form state, persisted locally between edits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDraft {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub farm_name: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub selected_crops: Vec<String>,
    #[serde(default)]
    pub experience: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub farm_size: String,
    #[serde(default)]
    pub irrigation_system: String,
    #[serde(default)]
    pub region: String,
}

impl Default for ProfileDraft {
    fn default() -> Self {
        Self {
            full_name: String::new(),
            farm_name: String::new(),
            phone_number: String::new(),
            location: None,
            selected_crops: Vec::new(),
            experience: "< 1".into(),
            bio: String::new(),
            farm_size: "< 1".into(),
            irrigation_system: String::new(),
            region: String::new(),
        }
    }
}

impl ProfileDraft {
    /// Every required field that is blank or absent, in form order.
    pub fn missing_fields(&self) -> Vec<MissingField> {
        let mut missing = Vec::new();
        if self.full_name.trim().is_empty() {
            missing.push(MissingField::FullName);
        }
        if self.farm_name.trim().is_empty() {
            missing.push(MissingField::FarmName);
        }
        if self.region.trim().is_empty() {
            missing.push(MissingField::Region);
        }
        if self.location.is_none() {
            missing.push(MissingField::Location);
        }
        missing
    }

    /// Validate the draft and produce the trimmed update payload to save.
    pub fn validate(&self) -> Result<ProfileUpdate, AgrilinkError> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(AgrilinkError::Validation(missing));
        }

        let non_empty = |s: &str| {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        };

        Ok(ProfileUpdate {
            full_name: Some(self.full_name.trim().to_string()),
            farm_name: Some(self.farm_name.trim().to_string()),
            email: None,
            phone_number: non_empty(&self.phone_number),
            location: self.location,
            selected_crops: Some(self.selected_crops.clone()),
            experience: non_empty(&self.experience),
            bio: non_empty(&self.bio),
            farm_size: non_empty(&self.farm_size),
            irrigation_system: non_empty(&self.irrigation_system),
            region: Some(self.region.trim().to_string()),
            is_anonymous: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> GeoPoint {
        GeoPoint::new(36.8, 10.18).unwrap()
    }

    #[test]
    fn empty_draft_reports_every_required_field() {
        let draft = ProfileDraft::default();
        assert_eq!(
            draft.missing_fields(),
            vec![
                MissingField::FullName,
                MissingField::FarmName,
                MissingField::Region,
                MissingField::Location,
            ]
        );
        assert!(matches!(
            draft.validate(),
            Err(AgrilinkError::Validation(fields)) if fields.len() == 4
        ));
    }

    #[test]
    fn whitespace_counts_as_missing() {
        let draft = ProfileDraft {
            full_name: "   ".into(),
            farm_name: "Oasis".into(),
            region: "Nabeul".into(),
            location: Some(point()),
            ..ProfileDraft::default()
        };
        assert_eq!(draft.missing_fields(), vec![MissingField::FullName]);
    }

    #[test]
    fn valid_draft_trims_into_update() {
        let draft = ProfileDraft {
            full_name: " Amal Ben Ali ".into(),
            farm_name: "Oasis".into(),
            region: "Nabeul ".into(),
            location: Some(point()),
            bio: "  ".into(),
            ..ProfileDraft::default()
        };
        let update = draft.validate().unwrap();
        assert_eq!(update.full_name.as_deref(), Some("Amal Ben Ali"));
        assert_eq!(update.region.as_deref(), Some("Nabeul"));
        assert_eq!(update.bio, None);
        assert_eq!(update.experience.as_deref(), Some("< 1"));
    }

    #[test]
    fn apply_merges_only_present_fields() {
        let mut profile =
            FarmerProfile::initial(UserId::new("u1"), "Amal", None, point(), false);
        let created = profile.created_at;
        profile.apply(&ProfileUpdate {
            farm_name: Some("Oasis".into()),
            selected_crops: Some(vec!["Olives".into()]),
            ..ProfileUpdate::default()
        });
        assert_eq!(profile.full_name, "Amal");
        assert_eq!(profile.farm_name, "Oasis");
        assert_eq!(profile.selected_crops, vec!["Olives".to_string()]);
        assert_eq!(profile.created_at, created);
        assert!(profile.updated_at >= created);
    }

    #[test]
    fn from_update_requires_name_and_location() {
        let err = FarmerProfile::from_update(
            UserId::new("u1"),
            &ProfileUpdate {
                farm_name: Some("Oasis".into()),
                ..ProfileUpdate::default()
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AgrilinkError::Validation(ref f)
                if f == &vec![MissingField::FullName, MissingField::Location]
        ));

        let profile = FarmerProfile::from_update(
            UserId::new("u1"),
            &ProfileUpdate {
                full_name: Some("Amal".into()),
                location: Some(point()),
                region: Some("Nabeul".into()),
                ..ProfileUpdate::default()
            },
        )
        .unwrap();
        assert_eq!(profile.region.as_deref(), Some("Nabeul"));
    }

    #[test]
    fn update_serializes_only_present_fields() {
        let update = ProfileUpdate {
            bio: Some("olives".into()),
            ..ProfileUpdate::default()
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            serde_json::json!({ "bio": "olives" })
        );
        assert!(ProfileUpdate::default().is_empty());
    }
}
