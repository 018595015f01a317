pub mod engine;
pub mod executor;
pub mod fingerprint;
pub mod inventory;
pub mod listing;
pub mod reconciler;
pub mod scanner;

pub use engine::{EngineConfig, MirrorEngine, SyncReport};
pub use executor::{ItemOutcome, ItemStatus, SyncExecutor};
pub use fingerprint::{store_key, Fingerprint};
pub use inventory::read_inventory;
pub use listing::ListingEntry;
pub use reconciler::{Reconciler, SyncItem, SyncPlan};
pub use scanner::{RemoteListing, RemoteScanner};
