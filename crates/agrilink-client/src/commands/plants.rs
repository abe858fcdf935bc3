use std::path::Path;

use tracing::info;

use agrilink_shared::error::{AgrilinkError, Result};
use agrilink_shared::models::{Diagnosis, PlantSpecies};

use crate::state::AppContext;

/// Assess the health of the plant in a photo.
pub async fn diagnose(ctx: &AppContext, image: &[u8]) -> Result<Diagnosis> {
    if !ctx.diagnosis.is_configured() {
        return Err(AgrilinkError::NotConfigured("Plant.id API key".into()));
    }
    if !ctx.is_online() {
        return Err(AgrilinkError::NetworkUnavailable);
    }

    let diagnosis = ctx.diagnosis.diagnose(image).await?;
    info!(
        healthy = diagnosis.is_healthy,
        diseases = diagnosis.diseases.len(),
        "Plant diagnosed"
    );
    Ok(diagnosis)
}

/// [`diagnose`] for a photo on disk.
pub async fn diagnose_file(ctx: &AppContext, path: &Path) -> Result<Diagnosis> {
    let image = tokio::fs::read(path).await?;
    diagnose(ctx, &image).await
}

/// One page of the species catalogue.
pub async fn species(ctx: &AppContext, page: u32, indoor: bool) -> Result<Vec<PlantSpecies>> {
    if !ctx.species.is_configured() {
        return Err(AgrilinkError::NotConfigured("Perenual API key".into()));
    }
    if !ctx.is_online() {
        return Err(AgrilinkError::NetworkUnavailable);
    }
    Ok(ctx.species.species_page(page.max(1), indoor).await?)
}
