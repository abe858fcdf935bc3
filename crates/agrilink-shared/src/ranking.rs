//! Proximity and affinity ranking of farmers and plant groups.
//!
//! Every ranker is a pure function over a snapshot of candidates: it
//! computes distances and scores from the candidates as given, filters,
//! sorts (stable, so ties keep input order) and truncates. Nothing is
//! cached between calls.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_SEARCH_LIMIT, DEFAULT_SEARCH_MAX_DISTANCE_KM, EARTH_RADIUS_KM,
    MATCH_ONLINE_BONUS, MATCH_WEIGHT_DISTANCE, MATCH_WEIGHT_EXPERTISE, MATCH_WEIGHT_INTERESTS,
};
use crate::models::{PlantGroup, UserProfile};
use crate::profile::FarmerProfile;
use crate::types::GeoPoint;

// ---------------------------------------------------------------------------
// Candidate / result types
// ---------------------------------------------------------------------------

/// A user or group being ranked for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Candidate {
    pub id: String,
    pub position: Option<GeoPoint>,
    pub interests: BTreeSet<String>,
    pub expertise: BTreeSet<String>,
    pub online: bool,
}

impl Candidate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn at(mut self, position: GeoPoint) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_interests<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interests = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_expertise<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expertise = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    /// Candidate view of a discovery user document. Out-of-range stored
    /// coordinates count as no position.
    pub fn from_user(user: &UserProfile) -> Self {
        Self {
            id: user.id.clone(),
            position: user
                .location
                .as_ref()
                .map(|l| l.point())
                .filter(GeoPoint::is_valid),
            interests: user.interests.iter().cloned().collect(),
            expertise: user.expertise.iter().cloned().collect(),
            online: user.is_online,
        }
    }

    /// Candidate view of a farmer profile; crops count as interests.
    pub fn from_farmer(profile: &FarmerProfile) -> Self {
        Self {
            id: profile.uid.to_string(),
            position: Some(profile.location),
            interests: profile.selected_crops.iter().cloned().collect(),
            expertise: BTreeSet::new(),
            online: false,
        }
    }

    /// Candidate view of a plant group; its plant type and tags are the
    /// interests it matches against.
    pub fn from_group(group: &PlantGroup) -> Self {
        let mut interests: BTreeSet<String> = group.tags.iter().cloned().collect();
        interests.insert(group.plant_type.clone());
        Self {
            id: group.id.clone(),
            position: None,
            interests,
            expertise: BTreeSet::new(),
            online: false,
        }
    }
}

/// A candidate with the values derived for one ranking call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RankedResult {
    pub candidate: Candidate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

// ---------------------------------------------------------------------------
// Distance
// ---------------------------------------------------------------------------

/// Great-circle distance between two points in kilometres.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

// ---------------------------------------------------------------------------
// Rankers
// ---------------------------------------------------------------------------

/// Closest candidates first. Candidates without a position are dropped.
pub fn rank_by_proximity(origin: GeoPoint, candidates: &[Candidate], limit: usize) -> Vec<RankedResult> {
    let mut ranked: Vec<RankedResult> = candidates
        .iter()
        .filter_map(|c| {
            let position = c.position?;
            Some(RankedResult {
                candidate: c.clone(),
                distance_km: Some(haversine_km(origin, position)),
                score: None,
            })
        })
        .collect();

    ranked.sort_by(|a, b| distance_of(a).total_cmp(&distance_of(b)));
    ranked.truncate(limit);
    ranked
}

/// Candidates sharing the most interest and expertise tags with `origin`.
///
/// The score is the raw overlap count; zero-overlap candidates and the
/// origin itself are excluded.
pub fn rank_by_affinity(origin: &Candidate, candidates: &[Candidate], limit: usize) -> Vec<RankedResult> {
    let mut ranked: Vec<RankedResult> = candidates
        .iter()
        .filter(|c| c.id != origin.id)
        .filter_map(|c| {
            let overlap = origin.interests.intersection(&c.interests).count()
                + origin.expertise.intersection(&c.expertise).count();
            (overlap > 0).then(|| RankedResult {
                candidate: c.clone(),
                distance_km: None,
                score: Some(overlap as f64),
            })
        })
        .collect();

    ranked.sort_by(|a, b| score_of(b).total_cmp(&score_of(a)));
    ranked.truncate(limit);
    ranked
}

/// Candidates within `radius_km` of `origin`, in input order.
pub fn within_radius(origin: GeoPoint, candidates: &[Candidate], radius_km: f64) -> Vec<RankedResult> {
    candidates
        .iter()
        .filter_map(|c| {
            let d = haversine_km(origin, c.position?);
            (d <= radius_km).then(|| RankedResult {
                candidate: c.clone(),
                distance_km: Some(d),
                score: None,
            })
        })
        .collect()
}

/// Tuning for [`rank_by_match`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchOptions {
    /// Beyond this distance a candidate earns no proximity points.
    pub max_distance_km: f64,
    pub limit: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            max_distance_km: DEFAULT_SEARCH_MAX_DISTANCE_KM,
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

/// Weighted user search combining proximity, shared tags and presence.
///
/// Points: up to 40 for proximity (linear inside `max_distance_km`), up to
/// 30 each for the fraction of the origin's interests and expertise the
/// candidate shares, and 10 for being online. Zero-score candidates are
/// dropped.
pub fn rank_by_match(origin: &Candidate, candidates: &[Candidate], options: &MatchOptions) -> Vec<RankedResult> {
    let mut ranked: Vec<RankedResult> = candidates
        .iter()
        .filter(|c| c.id != origin.id)
        .filter_map(|c| {
            let mut score = 0.0;

            let distance_km = origin
                .position
                .zip(c.position)
                .map(|(a, b)| haversine_km(a, b));
            if let Some(d) = distance_km {
                if d <= options.max_distance_km && options.max_distance_km > 0.0 {
                    score += (options.max_distance_km - d) / options.max_distance_km
                        * MATCH_WEIGHT_DISTANCE;
                }
            }

            score += overlap_fraction(&origin.interests, &c.interests) * MATCH_WEIGHT_INTERESTS;
            score += overlap_fraction(&origin.expertise, &c.expertise) * MATCH_WEIGHT_EXPERTISE;

            if c.online {
                score += MATCH_ONLINE_BONUS;
            }

            (score > 0.0).then(|| RankedResult {
                candidate: c.clone(),
                distance_km,
                score: Some(score),
            })
        })
        .collect();

    ranked.sort_by(|a, b| score_of(b).total_cmp(&score_of(a)));
    ranked.truncate(options.limit);
    ranked
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn overlap_fraction(mine: &BTreeSet<String>, theirs: &BTreeSet<String>) -> f64 {
    if mine.is_empty() {
        return 0.0;
    }
    mine.intersection(theirs).count() as f64 / mine.len() as f64
}

fn distance_of(r: &RankedResult) -> f64 {
    r.distance_km.unwrap_or(f64::INFINITY)
}

fn score_of(r: &RankedResult) -> f64 {
    r.score.unwrap_or(0.0)
}
