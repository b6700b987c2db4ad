//! Remote lifecycle control for a game server living on a wake-on-LAN host:
//! power the machine up, drive the server through its boot/shutdown console
//! milestones inside a persistent remote session, and stream progress back to
//! the caller. Library-level; the command frontend lives elsewhere.

pub mod boot;
pub mod busy;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod milestones;
pub mod net;
pub mod probe;
pub mod profiles;
pub mod progress;
pub mod session;
pub mod shell;
pub mod status;
mod support;
pub mod wake;

pub use busy::{BusyFlag, BusyPermit};
pub use config::{HostCredentials, Timings};
pub use error::LifecycleError;
pub use lifecycle::Orchestrator;
pub use milestones::MilestoneTable;
pub use net::{HostNetwork, TokioHostNetwork};
pub use profiles::{JsonProfileStore, ProfileEdit, ProfileSource};
pub use progress::Progress;
pub use status::StatusPing;

pub use warden_core::{ProgressTick, ServerState, WorldProfile};
