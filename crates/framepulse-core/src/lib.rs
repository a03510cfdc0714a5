//! FramePulse core
//!
//! Priority-based cooperative frame scheduler. Subsystems register one
//! callback each; the scheduler runs them once per tick in tier order, sheds
//! low tiers when the frame rate sags or the frame budget is spent, contains
//! callback failures, and quarantines callbacks that are chronically slow.

pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod handle;
pub mod health;
pub mod policy;
pub mod priority;
pub mod registry;
pub mod scheduler;
pub mod stats;
pub mod sync;
pub mod telemetry;
pub mod time;

pub use clock::{FrameClock, FrameRequest, ManualClock, SystemClock};
pub use config::{CallbackConfig, SchedulerConfig};
pub use driver::run_loop;
pub use error::{CallbackFailure, SchedulerError, SchedulerResult};
pub use handle::SchedulerHandle;
pub use priority::Priority;
pub use registry::{BoxedCallback, CallbackId, Context, FrameArgs, Registration};
pub use scheduler::{CallbackFactory, Scheduler};
pub use stats::{CallbackStats, Stats};
pub use sync::ShutdownToken;
