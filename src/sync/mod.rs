pub mod coordinator;
pub mod counter;
pub mod debounce;
pub mod snapshot;

pub use coordinator::{Diagnostics, SyncCoordinator, SyncError, SyncSettings};
pub use counter::DailyCounter;
pub use debounce::Debouncer;
pub use snapshot::{SyncSnapshot, SyncStatus};
