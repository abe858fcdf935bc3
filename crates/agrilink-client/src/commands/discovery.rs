//! Farmer, user and plant group discovery.
//!
//! Each command loads a snapshot of documents from the backend, turns them
//! into ranking candidates and maps the ranked results back onto the
//! documents for display.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use agrilink_net::Query;
use agrilink_shared::constants::{
    COLLECTION_FARMERS, COLLECTION_PLANT_GROUPS, COLLECTION_USERS,
};
use agrilink_shared::error::{AgrilinkError, Result};
use agrilink_shared::models::{PlantGroup, UserProfile};
use agrilink_shared::ranking::{self, Candidate, MatchOptions, RankedResult};
use agrilink_shared::types::GeoPoint;
use agrilink_shared::FarmerProfile;

use crate::commands::decode_all;
use crate::state::AppContext;

/// How many user documents a search considers before scoring.
const SEARCH_POOL_SIZE: usize = 50;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmerMatch {
    pub profile: FarmerProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMatch {
    pub user: UserProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMatch {
    pub group: PlantGroup,
    pub score: f64,
}

// ---------------------------------------------------------------------------
// Farmers
// ---------------------------------------------------------------------------

/// The `limit` farmers closest to `origin`, excluding the signed-in user.
pub async fn nearby_farmers(
    ctx: &AppContext,
    origin: GeoPoint,
    limit: usize,
) -> Result<Vec<FarmerMatch>> {
    let farmers = load_farmers(ctx, Query::collection(COLLECTION_FARMERS)).await?;
    let candidates: Vec<Candidate> = farmers.iter().map(Candidate::from_farmer).collect();

    let ranked = ranking::rank_by_proximity(origin, &candidates, limit);
    debug!(pool = candidates.len(), returned = ranked.len(), "Ranked nearby farmers");
    Ok(attach_farmers(ranked, farmers))
}

/// Online farmers inside `radius_km` of `origin`, for the map view.
pub async fn online_farmers_nearby(
    ctx: &AppContext,
    origin: GeoPoint,
    radius_km: f64,
) -> Result<Vec<FarmerMatch>> {
    let query = Query::collection(COLLECTION_FARMERS).where_eq("isOnline", true);
    let farmers = load_farmers(ctx, query).await?;
    let candidates: Vec<Candidate> = farmers
        .iter()
        .map(|f| Candidate::from_farmer(f).online(true))
        .collect();

    let ranked = ranking::within_radius(origin, &candidates, radius_km);
    Ok(attach_farmers(ranked, farmers))
}

/// Publish the signed-in farmer's position and mark them online.
pub async fn share_location(ctx: &AppContext, position: GeoPoint) -> Result<()> {
    let user = ctx.current_user()?;
    ctx.documents
        .update_document(
            COLLECTION_FARMERS,
            user.uid.as_str(),
            json!({
                "location": position,
                "isOnline": true,
                "lastUpdated": Utc::now(),
            }),
        )
        .await?;
    debug!(user = %user.uid, %position, "Shared location");
    Ok(())
}

// Every farmer except the signed-in user.
async fn load_farmers(ctx: &AppContext, query: Query) -> Result<Vec<FarmerProfile>> {
    let me = ctx.auth.current_user().map(|u| u.uid);
    let docs = ctx.documents.query(&query).await?;
    Ok(decode_all::<FarmerProfile>(docs)
        .into_iter()
        .filter(|f| me.as_ref() != Some(&f.uid))
        .collect())
}

fn attach_farmers(ranked: Vec<RankedResult>, farmers: Vec<FarmerProfile>) -> Vec<FarmerMatch> {
    let mut by_id: HashMap<String, FarmerProfile> =
        farmers.into_iter().map(|f| (f.uid.to_string(), f)).collect();
    ranked
        .into_iter()
        .filter_map(|r| {
            by_id.remove(&r.candidate.id).map(|profile| FarmerMatch {
                profile,
                distance_km: r.distance_km,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Users sharing the most interests and expertise with the signed-in user.
pub async fn similar_farmers(ctx: &AppContext, limit: usize) -> Result<Vec<UserMatch>> {
    let me = my_user_document(ctx).await?.ok_or(AgrilinkError::NotFound)?;
    let users = load_users(ctx, Query::collection(COLLECTION_USERS)).await?;

    let candidates: Vec<Candidate> = users.iter().map(Candidate::from_user).collect();
    let ranked = ranking::rank_by_affinity(&Candidate::from_user(&me), &candidates, limit);
    Ok(attach_users(ranked, users))
}

/// Weighted search over nearby users. Empty when the signed-in user has
/// no `users` document.
pub async fn search_users(ctx: &AppContext, options: &MatchOptions) -> Result<Vec<UserMatch>> {
    let Some(me) = my_user_document(ctx).await? else {
        return Ok(Vec::new());
    };

    let query = Query::collection(COLLECTION_USERS)
        .where_not_eq("id", me.id.as_str())
        .limit(SEARCH_POOL_SIZE);
    let users: Vec<UserProfile> = load_users(ctx, query)
        .await?
        .into_iter()
        .filter(|u| u.id != me.id)
        .collect();

    let candidates: Vec<Candidate> = users.iter().map(Candidate::from_user).collect();
    let ranked = ranking::rank_by_match(&Candidate::from_user(&me), &candidates, options);
    Ok(attach_users(ranked, users))
}

async fn my_user_document(ctx: &AppContext) -> Result<Option<UserProfile>> {
    let user = ctx.current_user()?;
    let doc = ctx
        .documents
        .get_document(COLLECTION_USERS, user.uid.as_str())
        .await?;
    Ok(doc.map(|d| d.decode::<UserProfile>()).transpose()?)
}

async fn load_users(ctx: &AppContext, query: Query) -> Result<Vec<UserProfile>> {
    let docs = ctx.documents.query(&query).await?;
    Ok(decode_all(docs))
}

fn attach_users(ranked: Vec<RankedResult>, users: Vec<UserProfile>) -> Vec<UserMatch> {
    let mut by_id: HashMap<String, UserProfile> =
        users.into_iter().map(|u| (u.id.clone(), u)).collect();
    ranked
        .into_iter()
        .filter_map(|r| {
            by_id.remove(&r.candidate.id).map(|user| UserMatch {
                user,
                distance_km: r.distance_km,
                score: r.score,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Plant groups
// ---------------------------------------------------------------------------

/// Groups whose plant type and tags overlap the user's interests and
/// expertise, excluding groups already joined.
pub async fn recommend_groups(ctx: &AppContext, limit: usize) -> Result<Vec<GroupMatch>> {
    let user = ctx.current_user()?;
    let me = my_user_document(ctx).await?.unwrap_or_else(|| UserProfile {
        id: user.uid.to_string(),
        ..UserProfile::default()
    });

    let docs = ctx
        .documents
        .query(&Query::collection(COLLECTION_PLANT_GROUPS))
        .await?;
    let groups: Vec<PlantGroup> = decode_all::<PlantGroup>(docs)
        .into_iter()
        .filter(|g| !g.has_member(&user.uid))
        .collect();

    let origin = Candidate::new(me.id.clone())
        .with_interests(me.interests.iter().chain(me.expertise.iter()).cloned());
    let candidates: Vec<Candidate> = groups.iter().map(Candidate::from_group).collect();
    let ranked = ranking::rank_by_affinity(&origin, &candidates, limit);

    let mut by_id: HashMap<String, PlantGroup> =
        groups.into_iter().map(|g| (g.id.clone(), g)).collect();
    Ok(ranked
        .into_iter()
        .filter_map(|r| {
            let score = r.score.unwrap_or_default();
            by_id
                .remove(&r.candidate.id)
                .map(|group| GroupMatch { group, score })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use agrilink_net::{AuthUser, ConnectivityMonitor, DocumentStore, MemoryBackend};
    use agrilink_shared::constants::HOME_NEARBY_LIMIT;
    use agrilink_shared::types::{Reachability, UserId};
    use agrilink_store::Database;
    use serde_json::Value;

    use crate::config::ClientConfig;
    use crate::device::FixedLocation;
    use crate::state::Backends;

    fn pt(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    async fn setup() -> (MemoryBackend, Arc<AppContext>) {
        let backend = MemoryBackend::new();
        let ctx = AppContext::start(
            ClientConfig::default(),
            Database::open_in_memory().unwrap(),
            Backends::memory(&backend),
            ConnectivityMonitor::new(Reachability::Online),
            Arc::new(FixedLocation::new(pt(5.60, -0.19))),
        )
        .await;
        backend.sign_in_as(AuthUser {
            uid: UserId::new("me"),
            email: None,
            display_name: Some("Me".into()),
            is_anonymous: false,
        });
        (backend, ctx)
    }

    async fn put(backend: &MemoryBackend, collection: &str, id: &str, data: Value) {
        backend.set_document(collection, id, data).await.unwrap();
    }

    async fn put_farmer(backend: &MemoryBackend, id: &str, at: GeoPoint, online: bool) {
        let mut profile = FarmerProfile::initial(UserId::new(id), id, None, at, false);
        profile.selected_crops = vec!["maize".into()];
        let mut data = serde_json::to_value(&profile).unwrap();
        data["isOnline"] = Value::Bool(online);
        put(backend, COLLECTION_FARMERS, id, data).await;
    }

    #[tokio::test]
    async fn nearby_excludes_self_and_orders_by_distance() {
        let (backend, ctx) = setup().await;
        let origin = pt(5.60, -0.19);
        put_farmer(&backend, "me", origin, true).await;
        put_farmer(&backend, "far", pt(6.60, -0.19), false).await;
        put_farmer(&backend, "near", pt(5.61, -0.19), false).await;
        put_farmer(&backend, "mid", pt(5.70, -0.19), true).await;

        let found = nearby_farmers(&ctx, origin, HOME_NEARBY_LIMIT).await.unwrap();
        let ids: Vec<_> = found.iter().map(|m| m.profile.uid.to_string()).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);
        assert!(found[0].distance_km.unwrap() < 2.0);

        let top = nearby_farmers(&ctx, origin, 1).await.unwrap();
        assert_eq!(top.len(), 1);
        ctx.shutdown();
    }

    #[tokio::test]
    async fn online_nearby_applies_radius_and_status() {
        let (backend, ctx) = setup().await;
        let origin = pt(5.60, -0.19);
        put_farmer(&backend, "close-online", pt(5.62, -0.19), true).await;
        put_farmer(&backend, "close-offline", pt(5.61, -0.19), false).await;
        put_farmer(&backend, "far-online", pt(6.00, -0.19), true).await;

        let found = online_farmers_nearby(&ctx, origin, 10.0).await.unwrap();
        let ids: Vec<_> = found.iter().map(|m| m.profile.uid.to_string()).collect();
        assert_eq!(ids, vec!["close-online"]);
        ctx.shutdown();
    }

    #[tokio::test]
    async fn share_location_marks_farmer_online() {
        let (backend, ctx) = setup().await;
        put_farmer(&backend, "me", pt(5.60, -0.19), false).await;

        share_location(&ctx, pt(5.65, -0.2)).await.unwrap();
        let doc = backend
            .get_document(COLLECTION_FARMERS, "me")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.data["isOnline"], true);
        assert_eq!(doc.data["location"]["latitude"], 5.65);
        ctx.shutdown();
    }

    async fn put_user(backend: &MemoryBackend, id: &str, interests: &[&str], expertise: &[&str], online: bool) {
        let data = json!({
            "id": id,
            "name": id,
            "location": { "latitude": 5.60, "longitude": -0.19, "address": "" },
            "interests": interests,
            "expertise": expertise,
            "isOnline": online,
        });
        put(backend, COLLECTION_USERS, id, data).await;
    }

    #[tokio::test]
    async fn similar_ranks_by_shared_tags() {
        let (backend, ctx) = setup().await;
        put_user(&backend, "me", &["maize", "rice"], &["irrigation"], true).await;
        put_user(&backend, "one", &["maize"], &[], false).await;
        put_user(&backend, "three", &["maize", "rice"], &["irrigation"], false).await;
        put_user(&backend, "none", &["cocoa"], &[], false).await;

        let found = similar_farmers(&ctx, 5).await.unwrap();
        let ids: Vec<_> = found.iter().map(|m| m.user.id.as_str()).collect();
        assert_eq!(ids, vec!["three", "one"]);
        assert_eq!(found[0].score, Some(3.0));
        ctx.shutdown();
    }

    #[tokio::test]
    async fn similar_requires_user_document() {
        let (_backend, ctx) = setup().await;
        assert!(matches!(
            similar_farmers(&ctx, 5).await,
            Err(AgrilinkError::NotFound)
        ));
        ctx.shutdown();
    }

    #[tokio::test]
    async fn search_scores_and_skips_self() {
        let (backend, ctx) = setup().await;
        assert!(search_users(&ctx, &MatchOptions::default()).await.unwrap().is_empty());

        put_user(&backend, "me", &["maize"], &["soil"], true).await;
        put_user(&backend, "match", &["maize"], &["soil"], true).await;
        put_user(&backend, "online-only", &[], &[], true).await;

        let found = search_users(&ctx, &MatchOptions::default()).await.unwrap();
        let ids: Vec<_> = found.iter().map(|m| m.user.id.as_str()).collect();
        assert_eq!(ids, vec!["match", "online-only"]);
        // co-located: full distance weight, both fractions, online bonus
        assert!((found[0].score.unwrap() - 110.0).abs() < 1e-9);
        ctx.shutdown();
    }

    #[tokio::test]
    async fn recommend_skips_joined_groups() {
        let (backend, ctx) = setup().await;
        put_user(&backend, "me", &["tomato"], &["greenhouse"], true).await;

        let now = Utc::now();
        let group = |id: &str, plant: &str, tags: &[&str], members: &[&str]| {
            json!({
                "name": id,
                "plantType": plant,
                "tags": tags,
                "members": members,
                "memberCount": members.len(),
                "createdAt": now,
                "lastActive": now,
            })
        };
        put(&backend, COLLECTION_PLANT_GROUPS, "tomatoes", group("tomatoes", "tomato", &["greenhouse"], &[])).await;
        put(&backend, COLLECTION_PLANT_GROUPS, "joined", group("joined", "tomato", &[], &["me"])).await;
        put(&backend, COLLECTION_PLANT_GROUPS, "cocoa", group("cocoa", "cocoa", &["shade"], &[])).await;

        let found = recommend_groups(&ctx, 5).await.unwrap();
        let ids: Vec<_> = found.iter().map(|m| m.group.id.as_str()).collect();
        assert_eq!(ids, vec!["tomatoes"]);
        assert_eq!(found[0].score, 2.0);
        ctx.shutdown();
    }
}
