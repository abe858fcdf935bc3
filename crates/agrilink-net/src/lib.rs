// Remote collaborators: backend-as-a-service seams, connectivity and plant APIs.

pub mod backend;
pub mod connectivity;
pub mod diagnosis;
pub mod error;
pub mod memory;
pub mod species;

pub use backend::{
    AuthProvider, AuthUser, Direction, Document, DocumentStore, Filter, ObjectStorage, Query,
    SnapshotCallback, Subscription,
};
pub use connectivity::ConnectivityMonitor;
pub use diagnosis::PlantDiagnosisClient;
pub use error::NetError;
pub use memory::MemoryBackend;
pub use species::PlantSpeciesClient;
