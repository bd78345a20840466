//! Trusted dimension merging.
//!
//! Bots self-report capability dimensions, but keys listed in the
//! configuration's `trusted_dimensions` are reserved for server assignment:
//! a bot's claims for those keys are discarded and the matched group's
//! values are used instead. Untrusted keys pass through as reported.

use std::collections::{BTreeMap, BTreeSet};

use botfleet_config::{GroupConfig, Snapshot};

/// Dimension map: key -> set of values.
pub type Dimensions = BTreeMap<String, BTreeSet<String>>;

/// Compute the effective dimensions for a resolved bot.
///
/// Group-config values win for every trusted key; bot-reported values
/// survive only for untrusted keys; the group's own dimensions are always
/// present in the result.
pub fn effective_dimensions(
    snapshot: &Snapshot,
    group: &GroupConfig,
    bot_reported: &Dimensions,
) -> Dimensions {
    let mut effective = bot_reported.clone();

    for key in snapshot.trusted_dimensions() {
        effective.remove(key);
    }

    for (key, values) in &group.dimensions {
        effective
            .entry(key.clone())
            .or_default()
            .extend(values.iter().cloned());
    }

    effective
}
