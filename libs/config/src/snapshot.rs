//! Validated configuration snapshots and bot group resolution.
//!
//! A `Snapshot` is the immutable product of a successful validation pass:
//! group properties in their checked form (tagged auth mode, parsed
//! dimensions, materialized schedule windows) plus the derived indexes the
//! resolver needs. Snapshots are shared behind `Arc` and replaced wholesale;
//! nothing here mutates after construction.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

/// Primary authentication mode for a bot group.
///
/// The two wire booleans are mutually exclusive, so the checked form is a
/// tagged variant; the "both set" state is unrepresentable here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// A machine token whose embedded hostname must equal the claimed bot ID.
    MachineToken,

    /// OAuth as exactly this service account email.
    ServiceAccount(String),

    /// No primary mode; the group authenticates by IP whitelist alone.
    IpOnly,
}

/// Checked authentication requirements for a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupAuth {
    pub mode: AuthMode,

    /// Name of an external IP allow-list, ANDed with the primary mode.
    /// Always present when `mode` is `IpOnly`.
    pub ip_whitelist: Option<String>,
}

/// What the bots of a group use for authenticated system-level calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SystemAccount {
    /// No system-level calls.
    #[default]
    None,

    /// A specific service account; the token-minting collaborator verifies
    /// delegation rights.
    Explicit(String),

    /// The `"bot"` sentinel: reuse the bot's own OAuth token.
    BotToken,
}

/// Set of weekdays, Mon=0 .. Sun=6.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaySet(u8);

impl DaySet {
    /// Build from validated day numbers. Callers must have range-checked.
    pub fn from_days(days: &[u32]) -> Self {
        let mut mask = 0u8;
        for &day in days {
            mask |= 1 << day;
        }
        Self(mask)
    }

    pub fn contains(&self, day: u32) -> bool {
        day < 7 && self.0 & (1 << day) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// A validated same-day UTC window with its own target size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyWindow {
    /// Minutes from midnight, inclusive.
    pub start: u16,

    /// Minutes from midnight, exclusive. Always > `start`.
    pub end: u16,

    pub days: DaySet,
    pub target_size: u32,
}

impl DailyWindow {
    /// True if the window covers the given weekday and minute of day.
    pub fn is_active(&self, weekday: u32, minute: u16) -> bool {
        self.days.contains(weekday) && self.start <= minute && minute < self.end
    }
}

/// Load-based size bounds. `minimum_size <= maximum_size` after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadBounds {
    pub minimum_size: u32,
    pub maximum_size: u32,
}

/// A validated machine type: a named pool of leased machines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub name: String,
    pub description: String,
    pub early_release_secs: u32,
    pub lease_duration_secs: u32,

    /// `key:value` dimensions forwarded to the machine provider.
    pub mp_dimensions: Vec<String>,

    /// Baseline fleet size when no daily window is active.
    pub target_size: u32,

    /// Daily windows in document order; the first active one wins.
    pub daily: Vec<DailyWindow>,

    pub load_based: Vec<LoadBounds>,
}

/// A validated bot group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    pub auth: GroupAuth,

    pub owners: Vec<String>,

    /// Server-assigned dimensions, key -> value set.
    pub dimensions: BTreeMap<String, BTreeSet<String>>,

    /// Opaque script payload, empty if the group has none.
    pub bot_config_script: String,

    pub system_service_account: SystemAccount,

    pub machine_types: Vec<PoolConfig>,
}

/// Location of a machine type inside a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PoolRef {
    group: usize,
    pool: usize,
}

/// An immutable, validated configuration snapshot.
///
/// Readers resolve against whichever snapshot they loaded; installing a new
/// one never disturbs resolutions already in flight.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub(crate) version: u64,

    trusted_dimensions: Vec<String>,
    groups: Vec<GroupConfig>,

    /// Literal bot ID -> group, brace expansion fully materialized.
    direct: HashMap<String, usize>,

    /// (prefix, group), longest prefix first.
    prefixes: Vec<(String, usize)>,

    default_group: Option<usize>,

    machine_types: HashMap<String, PoolRef>,
}

impl Snapshot {
    /// An empty snapshot: no groups, so every bot resolves to nothing and
    /// is refused. The registry starts from this before the first good load.
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn new(
        trusted_dimensions: Vec<String>,
        groups: Vec<GroupConfig>,
        direct: HashMap<String, usize>,
        mut prefixes: Vec<(String, usize)>,
        default_group: Option<usize>,
    ) -> Self {
        // Longest-first keeps prefix lookup deterministic even if the
        // non-intersection invariant were ever bypassed.
        prefixes.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let mut machine_types = HashMap::new();
        for (group_idx, group) in groups.iter().enumerate() {
            for (pool_idx, pool) in group.machine_types.iter().enumerate() {
                machine_types.insert(
                    pool.name.clone(),
                    PoolRef {
                        group: group_idx,
                        pool: pool_idx,
                    },
                );
            }
        }

        Self {
            version: 0,
            trusted_dimensions,
            groups,
            direct,
            prefixes,
            default_group,
            machine_types,
        }
    }

    /// Monotonic install version assigned by the registry; 0 before install.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Dimension keys reserved for server assignment.
    pub fn trusted_dimensions(&self) -> &[String] {
        &self.trusted_dimensions
    }

    /// All groups in document order.
    pub fn groups(&self) -> &[GroupConfig] {
        &self.groups
    }

    /// Resolve the single group governing `bot_id`, or `None` if nothing
    /// matches (the caller must refuse the connection).
    ///
    /// Matching order: literal ID, then prefix (at most one can match in a
    /// validated snapshot), then the default group.
    pub fn resolve_bot_group(&self, bot_id: &str) -> Option<&GroupConfig> {
        if let Some(&idx) = self.direct.get(bot_id) {
            debug!(bot_id, group = idx, "bot resolved by literal id");
            return Some(&self.groups[idx]);
        }

        for (prefix, idx) in &self.prefixes {
            if bot_id.starts_with(prefix.as_str()) {
                debug!(bot_id, prefix = %prefix, group = *idx, "bot resolved by prefix");
                return Some(&self.groups[*idx]);
            }
        }

        match self.default_group {
            Some(idx) => {
                debug!(bot_id, group = idx, "bot resolved to default group");
                Some(&self.groups[idx])
            }
            None => {
                debug!(bot_id, "bot matches no group");
                None
            }
        }
    }

    /// Look up a machine type and its owning group by name.
    pub fn machine_type(&self, name: &str) -> Option<(&PoolConfig, &GroupConfig)> {
        let r = self.machine_types.get(name)?;
        let group = &self.groups[r.group];
        Some((&group.machine_types[r.pool], group))
    }

    /// Iterate every machine type with its owning group.
    pub fn machine_types(&self) -> impl Iterator<Item = (&PoolConfig, &GroupConfig)> {
        self.groups
            .iter()
            .flat_map(|g| g.machine_types.iter().map(move |p| (p, g)))
    }

    /// Number of literal bot IDs after brace expansion.
    pub fn known_bot_count(&self) -> usize {
        self.direct.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(owner: &str) -> GroupConfig {
        GroupConfig {
            auth: GroupAuth {
                mode: AuthMode::MachineToken,
                ip_whitelist: None,
            },
            owners: vec![owner.to_string()],
            dimensions: BTreeMap::new(),
            bot_config_script: String::new(),
            system_service_account: SystemAccount::None,
            machine_types: Vec::new(),
        }
    }

    fn snapshot_with(
        direct: &[(&str, usize)],
        prefixes: &[(&str, usize)],
        default_group: Option<usize>,
        groups: Vec<GroupConfig>,
    ) -> Snapshot {
        Snapshot::new(
            Vec::new(),
            groups,
            direct
                .iter()
                .map(|(id, idx)| (id.to_string(), *idx))
                .collect(),
            prefixes
                .iter()
                .map(|(p, idx)| (p.to_string(), *idx))
                .collect(),
            default_group,
        )
    }

    #[test]
    fn test_resolution_order() {
        let snapshot = snapshot_with(
            &[("vm1-m1", 0)],
            &[("vm", 1)],
            Some(2),
            vec![group("literal"), group("prefix"), group("default")],
        );

        // Literal beats prefix even though the prefix also matches.
        assert_eq!(
            snapshot.resolve_bot_group("vm1-m1").unwrap().owners,
            vec!["literal"]
        );
        assert_eq!(
            snapshot.resolve_bot_group("vm2-m1").unwrap().owners,
            vec!["prefix"]
        );
        assert_eq!(
            snapshot.resolve_bot_group("other").unwrap().owners,
            vec!["default"]
        );
    }

    #[test]
    fn test_no_match_without_default() {
        let snapshot = snapshot_with(&[("bot1", 0)], &[], None, vec![group("g")]);
        assert!(snapshot.resolve_bot_group("bot2").is_none());
    }

    #[test]
    fn test_longest_prefix_wins_when_invariant_bypassed() {
        // Intersecting prefixes never pass validation; if they somehow
        // appear, the longer one must win deterministically.
        let snapshot = snapshot_with(
            &[],
            &[("vm-", 0), ("vm-1", 1)],
            None,
            vec![group("short"), group("long")],
        );

        assert_eq!(
            snapshot.resolve_bot_group("vm-1-abc").unwrap().owners,
            vec!["long"]
        );
        assert_eq!(
            snapshot.resolve_bot_group("vm-2-abc").unwrap().owners,
            vec!["short"]
        );
    }

    #[test]
    fn test_empty_snapshot_refuses_everything() {
        let snapshot = Snapshot::empty();
        assert!(snapshot.resolve_bot_group("anything").is_none());
        assert_eq!(snapshot.known_bot_count(), 0);
    }

    #[test]
    fn test_machine_type_lookup() {
        let mut g = group("pools");
        g.machine_types.push(PoolConfig {
            name: "gce-small".to_string(),
            description: String::new(),
            early_release_secs: 0,
            lease_duration_secs: 3600,
            mp_dimensions: Vec::new(),
            target_size: 4,
            daily: Vec::new(),
            load_based: Vec::new(),
        });

        let snapshot = snapshot_with(&[], &[], None, vec![g]);

        let (pool, owner) = snapshot.machine_type("gce-small").unwrap();
        assert_eq!(pool.target_size, 4);
        assert_eq!(owner.owners, vec!["pools"]);
        assert!(snapshot.machine_type("unknown").is_none());
        assert_eq!(snapshot.machine_types().count(), 1);
    }

    #[test]
    fn test_day_set() {
        let days = DaySet::from_days(&[0, 2, 6]);
        assert!(days.contains(0));
        assert!(!days.contains(1));
        assert!(days.contains(6));
        assert!(!days.contains(7));
        assert!(DaySet::default().is_empty());
    }

    #[test]
    fn test_daily_window_bounds() {
        let window = DailyWindow {
            start: 8 * 60,
            end: 18 * 60,
            days: DaySet::from_days(&[2]),
            target_size: 10,
        };

        assert!(window.is_active(2, 10 * 60));
        assert!(window.is_active(2, 8 * 60)); // start inclusive
        assert!(!window.is_active(2, 18 * 60)); // end exclusive
        assert!(!window.is_active(5, 10 * 60));
    }
}
