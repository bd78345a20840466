//! Validation error types.
//!
//! The validator collects every violation before returning, so an
//! administrator fixing a bad configuration sees the whole list in one pass.

use thiserror::Error;

use crate::expand::ExpandError;

/// One field-level violation in a fleet configuration.
///
/// Groups are identified by their position in `bot_group`, machine types by
/// name (names are checked for uniqueness first).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A bot group without `auth`.
    #[error("bot_group #{group}: auth is required")]
    MissingAuth { group: usize },

    /// Both primary auth modes set at once.
    #[error(
        "bot_group #{group}: require_luci_machine_token and require_service_account \
         are mutually exclusive"
    )]
    AmbiguousAuthMode { group: usize },

    /// Neither primary mode nor an IP whitelist; such a group could never
    /// authenticate any bot.
    #[error("bot_group #{group}: auth defines no usable mechanism")]
    NoAuthMechanism { group: usize },

    /// A malformed brace expression in a `bot_id` entry.
    #[error("bot_group #{group}: bot_id {entry:?}: {source}")]
    BraceExpansion {
        group: usize,
        entry: String,
        source: ExpandError,
    },

    /// An empty `bot_id` entry.
    #[error("bot_group #{group}: empty bot_id entry")]
    EmptyBotId { group: usize },

    /// An empty `bot_id_prefix` entry.
    #[error("bot_group #{group}: empty bot_id_prefix entry")]
    EmptyPrefix { group: usize },

    /// The same literal bot ID (after expansion) claimed by two groups, or
    /// twice within one group.
    #[error("bot id {bot_id:?} belongs to both bot_group #{first} and bot_group #{second}")]
    DuplicateBotId {
        bot_id: String,
        first: usize,
        second: usize,
    },

    /// One prefix is a prefix of another, which would make resolution
    /// ambiguous.
    #[error(
        "bot_id_prefix {shorter:?} (bot_group #{first}) intersects \
         {longer:?} (bot_group #{second})"
    )]
    IntersectingPrefixes {
        shorter: String,
        longer: String,
        first: usize,
        second: usize,
    },

    /// More than one group with no membership predicate.
    #[error("multiple default bot groups: #{first} and #{second}")]
    MultipleDefaultGroups { first: usize, second: usize },

    /// A `dimensions` entry that is not `key:value`.
    #[error("bot_group #{group}: dimension {dimension:?} is not key:value")]
    BadDimension { group: usize, dimension: String },

    /// A `system_service_account` that is neither empty, an email, nor the
    /// literal `"bot"`.
    #[error(
        "bot_group #{group}: system_service_account {account:?} is not a \
         service account email or \"bot\""
    )]
    BadSystemServiceAccount { group: usize, account: String },

    /// The `"bot"` sentinel only makes sense with OAuth-based bot auth.
    #[error(
        "bot_group #{group}: system_service_account \"bot\" requires \
         require_service_account auth"
    )]
    BotTokenWithoutOauth { group: usize },

    /// A machine type with an empty name.
    #[error("bot_group #{group}: machine_type with empty name")]
    EmptyMachineTypeName { group: usize },

    /// The same machine type name in two places.
    #[error("machine_type {name:?}: defined in both bot_group #{first} and bot_group #{second}")]
    DuplicateMachineType {
        name: String,
        first: usize,
        second: usize,
    },

    /// An `mp_dimensions` entry that is not `key:value`.
    #[error("machine_type {name:?}: mp_dimension {dimension:?} is not key:value")]
    BadPoolDimension { name: String, dimension: String },

    /// `early_release_secs` longer than the lease itself.
    #[error(
        "machine_type {name:?}: early_release_secs {early_release_secs} exceeds \
         lease_duration_secs {lease_duration_secs}"
    )]
    EarlyReleaseTooLong {
        name: String,
        early_release_secs: u32,
        lease_duration_secs: u32,
    },

    /// A daily schedule bound that is not strict `"HH:MM"`.
    #[error("machine_type {name:?}: bad time of day {value:?} (want \"HH:MM\")")]
    BadTimeOfDay { name: String, value: String },

    /// A daily window whose start is not strictly before its end.
    #[error("machine_type {name:?}: daily window start {start:?} is not before end {end:?}")]
    EmptyDailyWindow {
        name: String,
        start: String,
        end: String,
    },

    /// A weekday outside Mon=0 .. Sun=6.
    #[error("machine_type {name:?}: day of week {day} out of range 0..=6")]
    BadDayOfWeek { name: String, day: u32 },

    /// Load-based bounds with `minimum_size > maximum_size`.
    #[error(
        "machine_type {name:?}: minimum_size {minimum_size} exceeds \
         maximum_size {maximum_size}"
    )]
    BadLoadBounds {
        name: String,
        minimum_size: u32,
        maximum_size: u32,
    },
}

/// Every violation found in one validation pass.
///
/// The whole configuration is rejected atomically; the previously installed
/// snapshot stays authoritative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub(crate) fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub(crate) fn into_result<T>(self, value: T) -> Result<T, ValidationReport> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }

    /// All violations, in the order they were found.
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "configuration rejected with {} error(s):",
            self.errors.len()
        )?;
        for error in &self.errors {
            writeln!(f, "  - {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationReport {}
