//! 远端同步：可达性探测、恢复重试门、对象 / 集合镜像

pub mod collection;
pub mod reachability;
pub mod retry;

pub use collection::{SyncedCollection, DEFAULT_GUEST_CAPACITY};
pub use reachability::{AvailabilityProbe, OfflineFlag, Reachability, ReachabilityCache, ReachabilitySnapshot};
pub use retry::{RetryGate, RetryState, DEFAULT_MAX_RECOVERY_ATTEMPTS};
