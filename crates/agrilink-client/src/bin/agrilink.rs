//! AgriLink command-line client.
//!
//! Runs the client against an in-process demo backend seeded with farmers,
//! users and plant groups around the given position. The pending-edit queue
//! lives in the real local database, so an edit queued with `--offline`
//! survives until a later `sync`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use agrilink_client::commands::{discovery, plants, profile};
use agrilink_client::sync::SyncState;
use agrilink_client::{init_tracing, AppContext, Backends, ClientConfig, FixedLocation};
use agrilink_net::{AuthUser, ConnectivityMonitor, DocumentStore, MemoryBackend};
use agrilink_shared::constants::{
    COLLECTION_FARMERS, COLLECTION_PLANT_GROUPS, COLLECTION_USERS, DEFAULT_RANK_LIMIT,
    DEFAULT_SEARCH_LIMIT, HOME_NEARBY_LIMIT,
};
use agrilink_shared::types::{GeoPoint, Reachability, UserId};
use agrilink_shared::{FarmerProfile, MatchOptions, ProfileUpdate};

#[derive(Parser, Debug)]
#[command(name = "agrilink")]
#[command(about = "AgriLink client: farmer discovery, profile sync and plant tools", long_about = None)]
struct Args {
    /// Signed-in user id
    #[arg(short, long, default_value = "demo-farmer", global = true)]
    user: String,

    /// Current latitude (defaults to Accra)
    #[arg(long, default_value_t = 5.6037, global = true, allow_negative_numbers = true)]
    lat: f64,

    /// Current longitude
    #[arg(long, default_value_t = -0.187, global = true, allow_negative_numbers = true)]
    lon: f64,

    /// Start with the network marked unreachable
    #[arg(long, global = true)]
    offline: bool,

    /// Override AGRILINK_DATA_DIR
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Closest farmers
    Nearby {
        #[arg(short, long, default_value_t = HOME_NEARBY_LIMIT)]
        limit: usize,
    },
    /// Online farmers within the configured radius
    Online,
    /// Users with the most shared interests
    Similar {
        #[arg(short, long, default_value_t = DEFAULT_RANK_LIMIT)]
        limit: usize,
    },
    /// Weighted user search
    Search {
        #[arg(long)]
        max_distance_km: Option<f64>,
        #[arg(short, long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    /// Recommended plant groups
    Groups {
        #[arg(short, long, default_value_t = DEFAULT_RANK_LIMIT)]
        limit: usize,
    },
    /// Edit the profile; queued locally when the backend is unreachable
    Edit {
        #[arg(long)]
        farm_name: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        /// Comma-separated crop list
        #[arg(long, value_delimiter = ',')]
        crops: Option<Vec<String>>,
    },
    /// Show queued profile edits
    Pending,
    /// Replay queued profile edits
    Sync,
    /// Assess plant health from a photo
    Diagnose { image: PathBuf },
    /// Browse the species catalogue
    Species {
        #[arg(short, long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        indoor: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = ClientConfig::from_env();
    if let Some(dir) = args.data_dir.clone() {
        config.data_dir = Some(dir);
    }
    let origin = GeoPoint::new(args.lat, args.lon).context("Invalid position")?;

    let backend = MemoryBackend::new();
    seed_demo(&backend, &args.user, origin).await?;

    let database = AppContext::open_database(&config).context("Failed to open local database")?;
    let ctx = AppContext::start(
        config,
        database,
        Backends::memory(&backend),
        ConnectivityMonitor::new(Reachability::from(!args.offline)),
        Arc::new(FixedLocation::new(origin)),
    )
    .await;

    backend.sign_in_as(AuthUser {
        uid: UserId::new(args.user.as_str()),
        email: None,
        display_name: Some(args.user.clone()),
        is_anonymous: false,
    });

    let result = run(&ctx, args.command, origin).await;
    ctx.shutdown();
    result
}

async fn run(ctx: &AppContext, command: Command, origin: GeoPoint) -> Result<()> {
    match command {
        Command::Nearby { limit } => print(&discovery::nearby_farmers(ctx, origin, limit).await?),
        Command::Online => {
            let radius = ctx.config.nearby_radius_km;
            print(&discovery::online_farmers_nearby(ctx, origin, radius).await?)
        }
        Command::Similar { limit } => print(&discovery::similar_farmers(ctx, limit).await?),
        Command::Search {
            max_distance_km,
            limit,
        } => {
            let options = MatchOptions {
                max_distance_km: max_distance_km.unwrap_or(ctx.config.search_max_distance_km),
                limit,
            };
            print(&discovery::search_users(ctx, &options).await?)
        }
        Command::Groups { limit } => print(&discovery::recommend_groups(ctx, limit).await?),
        Command::Edit {
            farm_name,
            bio,
            crops,
        } => {
            let update = ProfileUpdate {
                farm_name,
                bio,
                selected_crops: crops,
                ..ProfileUpdate::default()
            };
            let outcome = profile::save_profile(ctx, update).await?;
            info!(?outcome, "Edit submitted");
            print(&json!({ "saved": outcome.is_saved(), "queued": ctx.sync.queued_count() }))
        }
        Command::Pending => print(&ctx.sync.pending()),
        Command::Sync => {
            let mut report = ctx.sync.sync_pending().await;
            if report.coalesced {
                // The startup replay got there first; wait for it instead.
                let mut state = ctx.sync.subscribe_state();
                state
                    .wait_for(|s| *s != SyncState::SyncingQueue)
                    .await
                    .context("Sync state channel closed")?;
                report = ctx.sync.sync_pending().await;
            }
            print(&json!({
                "succeeded": report.succeeded,
                "failed": report.failed,
                "remaining": ctx.sync.queued_count(),
            }))
        }
        Command::Diagnose { image } => print(&plants::diagnose_file(ctx, &image).await?),
        Command::Species { page, indoor } => print(&plants::species(ctx, page, indoor).await?),
    }
}

fn print<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Populate the demo backend with a small community around `origin`.
async fn seed_demo(backend: &MemoryBackend, me: &str, origin: GeoPoint) -> Result<()> {
    let farmers = [
        ("kofi", "Kofi Boateng", 0.02, 0.01, &["maize", "cassava"][..], true),
        ("ama", "Ama Owusu", -0.05, 0.03, &["tomato", "pepper"][..], false),
        ("yaw", "Yaw Mensah", 0.15, -0.10, &["cocoa"][..], true),
        ("esi", "Esi Addo", 0.40, 0.25, &["rice", "maize"][..], false),
    ];

    for (id, name, dlat, dlon, crops, online) in farmers {
        let at = GeoPoint::new(origin.latitude + dlat, origin.longitude + dlon)?;
        let mut profile = FarmerProfile::initial(UserId::new(id), name, None, at, false);
        profile.selected_crops = crops.iter().map(|c| c.to_string()).collect();

        let mut farmer = serde_json::to_value(&profile)?;
        farmer["isOnline"] = json!(online);
        backend.set_document(COLLECTION_FARMERS, id, farmer).await?;

        let expertise = if online { ["irrigation"] } else { ["composting"] };

        backend
            .set_document(
                COLLECTION_USERS,
                id,
                json!({
                    "id": id,
                    "name": name,
                    "location": { "latitude": at.latitude, "longitude": at.longitude, "address": "" },
                    "interests": crops,
                    "expertise": expertise,
                    "isOnline": online,
                }),
            )
            .await?;
    }

    backend
        .set_document(
            COLLECTION_USERS,
            me,
            json!({
                "id": me,
                "name": me,
                "location": { "latitude": origin.latitude, "longitude": origin.longitude, "address": "" },
                "interests": ["maize", "tomato"],
                "expertise": ["irrigation"],
                "isOnline": true,
            }),
        )
        .await?;

    let now = Utc::now();
    let groups = [
        ("maize-growers", "Maize Growers", "maize", &["irrigation", "harvest"][..]),
        ("tomato-club", "Tomato Club", "tomato", &["greenhouse"][..]),
        ("cocoa-circle", "Cocoa Circle", "cocoa", &["shade"][..]),
    ];
    for (id, name, plant, tags) in groups {
        backend
            .set_document(
                COLLECTION_PLANT_GROUPS,
                id,
                json!({
                    "name": name,
                    "plantType": plant,
                    "tags": tags,
                    "members": [],
                    "memberCount": 0,
                    "createdAt": now,
                    "lastActive": now,
                }),
            )
            .await?;
    }

    Ok(())
}
