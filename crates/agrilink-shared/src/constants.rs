/// Application name
pub const APP_NAME: &str = "AgriLink";

/// Mean Earth radius in kilometres (haversine)
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Default number of results returned by the rankers
pub const DEFAULT_RANK_LIMIT: usize = 5;

/// Number of closest farmers shown on the home view
pub const HOME_NEARBY_LIMIT: usize = 10;

/// Radius of the "online nearby" map overlay, in kilometres
pub const DEFAULT_NEARBY_RADIUS_KM: f64 = 10.0;

/// Distance beyond which the weighted search gives no location points
pub const DEFAULT_SEARCH_MAX_DISTANCE_KM: f64 = 50.0;

/// Default result count of the weighted user search
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

/// Weighted search: maximum points for proximity
pub const MATCH_WEIGHT_DISTANCE: f64 = 40.0;

/// Weighted search: maximum points for shared interests
pub const MATCH_WEIGHT_INTERESTS: f64 = 30.0;

/// Weighted search: maximum points for shared expertise
pub const MATCH_WEIGHT_EXPERTISE: f64 = 30.0;

/// Weighted search: bonus for candidates currently online
pub const MATCH_ONLINE_BONUS: f64 = 10.0;

/// Default bound on a single remote profile write, in seconds
pub const DEFAULT_REMOTE_WRITE_TIMEOUT_SECS: u64 = 10;

/// Backend collections
pub const COLLECTION_FARMERS: &str = "farmers";
pub const COLLECTION_USERS: &str = "users";
pub const COLLECTION_CONVERSATIONS: &str = "conversations";
pub const COLLECTION_MESSAGES: &str = "messages";
pub const COLLECTION_PLANT_GROUPS: &str = "plantGroups";
pub const COLLECTION_GROUP_MESSAGES: &str = "groupMessages";

/// Local key/value storage keys
pub const STORAGE_KEY_CACHED_PROFILE: &str = "cachedProfile";
pub const STORAGE_KEY_FORM_DRAFT: &str = "profileSetupFormData";
pub const STORAGE_KEY_SIGNED_IN_USER: &str = "user";

/// Plant.id health assessment endpoint
pub const PLANT_ID_ENDPOINT: &str = "https://api.plant.id/v2/health_assessment";

/// Perenual species catalogue endpoint
pub const PERENUAL_ENDPOINT: &str = "https://perenual.com/api/species-list";
