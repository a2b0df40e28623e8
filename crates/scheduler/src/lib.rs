//! Scheduling & accountability core: the in-process dispatcher (C7) and the
//! domain schedulers composed on top of it (C9-C11, C13), plus the install
//! surfaces and reference adapters an operator needs to run them (§6).

pub mod accountability;
pub mod dispatch;
pub mod health;
pub mod install;
pub mod life_weeks;
pub mod retention;
pub mod runtime;
pub mod srs_scheduler;

pub use accountability::AccountabilityScheduler;
pub use dispatch::LoggingDispatchPort;
pub use health::{HealthRegistry, HealthReport, HealthState};
pub use life_weeks::LifeWeeksScheduler;
pub use retention::RetentionSweeper;
pub use runtime::{JobCallback, JobContext, RuntimeScheduler};
pub use srs_scheduler::SrsScheduler;
