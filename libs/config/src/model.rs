//! Raw declarative configuration model.
//!
//! These types mirror the wire document field for field. Nothing here is
//! trusted: a `FleetConfig` is what the external loader hands us after
//! parsing, before validation. Field names must stay exactly as they appear
//! on the wire - existing deployments depend on them.
//!
//! Every field is defaulted so a partial document still deserializes; the
//! validator reports the semantic problems instead of serde bailing on the
//! first missing field.

use serde::{Deserialize, Serialize};

/// Root of the declarative fleet configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Dimension keys reserved for server assignment. A bot can never set
    /// these itself; values come from the matched group's `dimensions`.
    #[serde(default)]
    pub trusted_dimensions: Vec<String>,

    /// Ordered list of bot groups. Order matters for daily-schedule
    /// first-match semantics and for error reporting.
    #[serde(default)]
    pub bot_group: Vec<BotGroup>,
}

/// One policy bucket of bots: membership predicate plus group properties.
///
/// A group with empty `bot_id`, `bot_id_prefix`, and `machine_type` is the
/// default (catch-all) group; at most one may exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotGroup {
    /// Literal bot IDs. Each entry may contain one brace-expansion span,
    /// e.g. `vm{1..10}-m1` or `vm{100,150,200}-m1`.
    #[serde(default)]
    pub bot_id: Vec<String>,

    /// Bot ID prefixes. Prefixes must be non-intersecting across the whole
    /// configuration.
    #[serde(default)]
    pub bot_id_prefix: Vec<String>,

    /// Leased machine pools owned by this group. Not a membership rule: a
    /// bot is never identified by machine type.
    #[serde(default)]
    pub machine_type: Vec<MachineType>,

    /// Required. How bots in this group authenticate.
    #[serde(default)]
    pub auth: Option<BotAuth>,

    /// Owner emails, informational only.
    #[serde(default)]
    pub owners: Vec<String>,

    /// `key:value` dimensions assigned by the server to bots in this group.
    #[serde(default)]
    pub dimensions: Vec<String>,

    /// Opaque script payload handed to bots in this group. Not interpreted
    /// here.
    #[serde(default)]
    pub bot_config_script: String,

    /// Service account bots in this group use for system-level calls.
    /// Empty, a service account email, or the literal `"bot"`.
    #[serde(default)]
    pub system_service_account: String,
}

/// Authentication requirements for a bot group.
///
/// `require_luci_machine_token` and `require_service_account` are mutually
/// exclusive primary modes; `ip_whitelist` is orthogonal and is ANDed with
/// whichever primary mode is active, or stands alone if neither is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotAuth {
    /// Require a machine token whose hostname equals the claimed bot ID.
    #[serde(default)]
    pub require_luci_machine_token: bool,

    /// Require OAuth as this exact service account email.
    #[serde(default)]
    pub require_service_account: String,

    /// Name of an externally maintained IP allow-list the bot's source IP
    /// must be in.
    #[serde(default)]
    pub ip_whitelist: String,
}

/// A named pool of leased machines with a target fleet size.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineType {
    /// Pool name, globally unique across the configuration.
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Seconds before lease expiry at which an idle machine may be released.
    #[serde(default)]
    pub early_release_secs: u32,

    /// Lease length requested from the machine provider.
    #[serde(default)]
    pub lease_duration_secs: u32,

    /// `key:value` dimensions sent to the machine provider when leasing.
    #[serde(default)]
    pub mp_dimensions: Vec<String>,

    /// Baseline fleet size when no schedule entry applies.
    #[serde(default)]
    pub target_size: u32,

    /// Optional time-of-day and load-based sizing rules.
    #[serde(default)]
    pub schedule: Option<Schedule>,
}

/// Sizing rules for a machine type. Both lists are optional and apply
/// independently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub daily: Vec<DailySchedule>,

    #[serde(default)]
    pub load_based: Vec<LoadBased>,
}

/// A same-day UTC wall-clock window with its own target size.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailySchedule {
    /// Window start, `"HH:MM"` UTC. Must be before `end`.
    #[serde(default)]
    pub start: String,

    /// Window end, `"HH:MM"` UTC, exclusive.
    #[serde(default)]
    pub end: String,

    /// Weekdays the window applies to, Mon=0 .. Sun=6. Empty means no day.
    #[serde(default)]
    pub days_of_the_week: Vec<u32>,

    /// Fleet size while the window is active.
    #[serde(default)]
    pub target_size: u32,
}

/// Utilization-driven size bounds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadBased {
    #[serde(default)]
    pub minimum_size: u32,

    #[serde(default)]
    pub maximum_size: u32,
}

impl BotGroup {
    /// True if this group has no membership predicate at all, making it the
    /// catch-all default group.
    pub fn is_default(&self) -> bool {
        self.bot_id.is_empty() && self.bot_id_prefix.is_empty() && self.machine_type.is_empty()
    }
}
