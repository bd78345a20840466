//! # botfleet-config
//!
//! Declarative fleet configuration: model, validation, and queryable
//! snapshots for bot group resolution.
//!
//! ## Design Principles
//!
//! - The raw model is untrusted and field-for-field identical to the wire
//!   document; all meaning is assigned by validation
//! - Validation collects every violation before rejecting, and rejects the
//!   whole document atomically
//! - A validated snapshot is immutable; resolution indexes (expanded bot
//!   IDs, sorted prefixes, machine type names) are built once at validation
//!   time
//! - The active snapshot is replaced by atomic pointer swap; readers are
//!   lock-free and never observe a partial update
//! - A failed reload keeps the last good snapshot authoritative (fail-safe,
//!   not fail-open)
//!
//! ## Resolution
//!
//! `Snapshot::resolve_bot_group` matches a bot ID against, in order: the
//! materialized literal-ID index, the longest matching prefix, and the
//! default group. Validation guarantees at most one group can ever match.

mod error;
mod expand;
mod model;
mod registry;
mod snapshot;
mod validate;

pub use error::{ValidationError, ValidationReport};
pub use expand::{expand_bot_id, ExpandError};
pub use model::{
    BotAuth, BotGroup, DailySchedule, FleetConfig, LoadBased, MachineType, Schedule,
};
pub use registry::{ConfigSource, Registry, ReloadError, ReloadWorker};
pub use snapshot::{
    AuthMode, DailyWindow, DaySet, GroupAuth, GroupConfig, LoadBounds, PoolConfig, Snapshot,
    SystemAccount,
};
pub use validate::validate;
