//! The per-provider control loop: the randomness
//! scheduler, the fast-sync engine, the equivocation detector, and the
//! provider instance actor that ties them together into the finality
//! voting state machine.

mod equivocation;
mod error;
mod fast_sync;
mod instance;
mod randomness;
mod support;

pub use equivocation::EquivocationDetector;
pub use error::{CoreError, Result};
pub use fast_sync::{FastSyncEngine, FastSyncOutcome};
pub use instance::{ProviderInstance, ProviderInstanceConfig, ProviderInstanceHandle, SubmitOutcome};
pub use randomness::{commitment_message, RandomnessScheduler, RandomnessSchedulerConfig};
