//! Pure domain layer for the scheduling & accountability core: entities,
//! the `TrackerAggregate`, SM-2 math, the response generator, and the
//! narrow ports the storage/scheduler crates implement or consume. No I/O
//! happens in this crate except through the `ports` traits.

pub mod clock;
pub mod entities;
pub mod error;
pub mod ports;
pub mod response;
pub mod srs;
pub mod tracker;

pub use clock::{Clock, FixedClock, SystemClock};
pub use entities::*;
pub use error::DomainError;
pub use ports::{
    DispatchPort, InlineAction, JobRegistry, Payload, RetentionStore, RetentionSweepCounts, Store,
    StoreTx, Vault, VaultMetadata,
};
pub use tracker::TrackerAggregate;
