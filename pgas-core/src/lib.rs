#![forbid(unsafe_code)]

mod checker;
mod classify;
mod config;
mod error;
mod lifecycle;
mod position;
mod region;
mod state;
mod sync;
mod violation;
pub mod interval;

pub use checker::{CallEvent, Checker, Transition};
pub use classify::{CallCategory, Dialect};
pub use config::{find_config, CheckerConfig, DialectConfig, CONFIG_FILE_NAME};
pub use error::ConfigError;
pub use interval::{ranges_overlap, Interval, IntervalTracker, NotTracked, OverlapPolicy, PeerKey};
pub use lifecycle::{Lifecycle, NotActive, RegionLifecycle};
pub use position::PositionTracker;
pub use region::{location, Location, Region, RegionId, Storage, ValueId};
pub use state::AbstractState;
pub use sync::{SyncStatus, ValueSyncStore};
pub use violation::{RelatedInfo, Violation, ViolationKind};
