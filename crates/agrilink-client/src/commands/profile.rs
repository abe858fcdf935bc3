use tracing::{info, warn};

use agrilink_net::AuthUser;
use agrilink_shared::constants::{
    COLLECTION_FARMERS, STORAGE_KEY_CACHED_PROFILE, STORAGE_KEY_FORM_DRAFT,
};
use agrilink_shared::error::{AgrilinkError, Result};
use agrilink_shared::{FarmerProfile, ProfileDraft, ProfileUpdate};

use crate::state::AppContext;
use crate::sync::{merge_profile, SaveOutcome};

const DEFAULT_DISPLAY_NAME: &str = "New User";

/// Load the signed-in farmer's profile.
///
/// Offline, only a cached profile belonging to the signed-in user is
/// returned. Online, a missing profile is created for full accounts and
/// left absent for guests. Remote failures fall back to the cache.
pub async fn fetch_profile(ctx: &AppContext) -> Result<Option<FarmerProfile>> {
    let user = ctx.current_user()?;

    if !ctx.is_online() {
        return cached_profile_for(ctx, &user.uid)
            .map(Some)
            .ok_or(AgrilinkError::NetworkUnavailable);
    }

    match fetch_remote_profile(ctx, &user).await {
        Ok(profile) => Ok(profile),
        Err(e) => {
            warn!(user = %user.uid, error = %e, "Profile fetch failed, trying cache");
            match cached_profile_for(ctx, &user.uid) {
                Some(profile) => Ok(Some(profile)),
                None => Err(e),
            }
        }
    }
}

async fn fetch_remote_profile(ctx: &AppContext, user: &AuthUser) -> Result<Option<FarmerProfile>> {
    let Some(doc) = ctx
        .documents
        .get_document(COLLECTION_FARMERS, user.uid.as_str())
        .await?
    else {
        if user.is_anonymous {
            return Ok(None);
        }
        let name = user.display_name.as_deref().unwrap_or(DEFAULT_DISPLAY_NAME);
        return initialize_profile(ctx, name).await.map(Some);
    };

    let profile: FarmerProfile = doc.decode()?;
    cache_profile(ctx, &profile);
    Ok(Some(profile))
}

/// Merge `update` into the remote profile and cache the result.
pub async fn update_profile(ctx: &AppContext, update: &ProfileUpdate) -> Result<FarmerProfile> {
    let user = ctx.current_user()?;
    if !ctx.is_online() {
        return Err(AgrilinkError::NetworkUnavailable);
    }

    let profile = merge_profile(ctx.documents.as_ref(), &user.uid, update).await?;
    cache_profile(ctx, &profile);
    info!(user = %user.uid, "Profile updated");
    Ok(profile)
}

/// Save an edit through the sync engine; queued when it cannot be written.
pub async fn save_profile(ctx: &AppContext, update: ProfileUpdate) -> Result<SaveOutcome> {
    let user = ctx.current_user()?;
    Ok(ctx.sync.submit(&user.uid, update).await)
}

/// Validate and save the profile setup form.
pub async fn submit_profile_form(ctx: &AppContext, draft: &ProfileDraft) -> Result<SaveOutcome> {
    let user = ctx.current_user()?;
    ctx.sync.submit_draft(&user.uid, draft).await
}

/// Create the first profile at the device's current position.
pub async fn initialize_profile(ctx: &AppContext, display_name: &str) -> Result<FarmerProfile> {
    let user = ctx.current_user()?;
    if !ctx.is_online() {
        return Err(AgrilinkError::NetworkUnavailable);
    }

    if !ctx.location.request_permission().await {
        return Err(AgrilinkError::PermissionDenied(
            "Location permission denied".into(),
        ));
    }
    let position = ctx.location.current_position().await?;

    let profile = FarmerProfile::initial(
        user.uid.clone(),
        display_name,
        user.email.clone(),
        position,
        user.is_anonymous,
    );

    ctx.documents
        .set_document(
            COLLECTION_FARMERS,
            user.uid.as_str(),
            serde_json::to_value(&profile)?,
        )
        .await?;

    cache_profile(ctx, &profile);
    info!(user = %user.uid, "Profile initialized");
    Ok(profile)
}

pub fn save_draft(ctx: &AppContext, draft: &ProfileDraft) -> Result<()> {
    ctx.with_db(|db| db.set_json(STORAGE_KEY_FORM_DRAFT, draft))
}

/// The saved form draft, or a fresh one.
pub fn load_draft(ctx: &AppContext) -> Result<ProfileDraft> {
    let draft = ctx.with_db(|db| db.get_json::<ProfileDraft>(STORAGE_KEY_FORM_DRAFT))?;
    Ok(draft.unwrap_or_default())
}

pub fn cached_profile(ctx: &AppContext) -> Option<FarmerProfile> {
    match ctx.with_db(|db| db.get_json::<FarmerProfile>(STORAGE_KEY_CACHED_PROFILE)) {
        Ok(profile) => profile,
        Err(e) => {
            warn!(error = %e, "Failed to read cached profile");
            None
        }
    }
}

fn cached_profile_for(ctx: &AppContext, uid: &agrilink_shared::UserId) -> Option<FarmerProfile> {
    cached_profile(ctx).filter(|p| &p.uid == uid)
}

fn cache_profile(ctx: &AppContext, profile: &FarmerProfile) {
    if let Err(e) = ctx.with_db(|db| db.set_json(STORAGE_KEY_CACHED_PROFILE, profile)) {
        warn!(error = %e, "Failed to cache profile");
    }
}
