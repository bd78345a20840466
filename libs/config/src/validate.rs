//! Whole-document configuration validation.
//!
//! `validate` turns a raw `FleetConfig` into an immutable `Snapshot`, or a
//! `ValidationReport` listing every violation found. It never fails fast:
//! per-group checks and the global invariants (prefix non-intersection,
//! single default group, unique machine type names, unique expanded bot IDs)
//! all run to completion so one push of a bad document surfaces every
//! problem at once. The input is never mutated.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{ValidationError, ValidationReport};
use crate::expand::expand_bot_id;
use crate::model::{BotAuth, BotGroup, FleetConfig, MachineType};
use crate::snapshot::{
    AuthMode, DailyWindow, DaySet, GroupAuth, GroupConfig, LoadBounds, PoolConfig, Snapshot,
    SystemAccount,
};

/// Sentinel for "use the bot's own OAuth token" in `system_service_account`.
const BOT_TOKEN_SENTINEL: &str = "bot";

/// Validate a raw configuration and build the queryable snapshot.
///
/// Collects all violations; on any violation the whole configuration is
/// rejected and the returned report lists everything found.
pub fn validate(config: &FleetConfig) -> Result<Snapshot, ValidationReport> {
    let mut report = ValidationReport::default();

    let mut groups = Vec::with_capacity(config.bot_group.len());
    let mut direct: HashMap<String, usize> = HashMap::new();
    let mut prefixes: Vec<(String, usize)> = Vec::new();
    let mut default_group: Option<usize> = None;
    let mut machine_type_names: HashMap<String, usize> = HashMap::new();

    for (idx, group) in config.bot_group.iter().enumerate() {
        if group.is_default() {
            match default_group {
                None => default_group = Some(idx),
                Some(first) => report.push(ValidationError::MultipleDefaultGroups {
                    first,
                    second: idx,
                }),
            }
        }

        let auth = check_auth(idx, group.auth.as_ref(), &mut report);

        for entry in &group.bot_id {
            if entry.is_empty() {
                report.push(ValidationError::EmptyBotId { group: idx });
                continue;
            }
            match expand_bot_id(entry) {
                Ok(ids) => {
                    for id in ids {
                        if let Some(&first) = direct.get(&id) {
                            report.push(ValidationError::DuplicateBotId {
                                bot_id: id,
                                first,
                                second: idx,
                            });
                        } else {
                            direct.insert(id, idx);
                        }
                    }
                }
                Err(source) => report.push(ValidationError::BraceExpansion {
                    group: idx,
                    entry: entry.clone(),
                    source,
                }),
            }
        }

        for prefix in &group.bot_id_prefix {
            if prefix.is_empty() {
                report.push(ValidationError::EmptyPrefix { group: idx });
            } else {
                prefixes.push((prefix.clone(), idx));
            }
        }

        let dimensions = check_dimensions(idx, &group.dimensions, &mut report);
        let system_service_account = check_system_account(idx, group, &auth, &mut report);

        let mut machine_types = Vec::with_capacity(group.machine_type.len());
        for mt in &group.machine_type {
            machine_types.push(check_machine_type(
                idx,
                mt,
                &mut machine_type_names,
                &mut report,
            ));
        }

        groups.push(GroupConfig {
            auth,
            owners: group.owners.clone(),
            dimensions,
            bot_config_script: group.bot_config_script.clone(),
            system_service_account,
            machine_types,
        });
    }

    check_prefix_intersections(&prefixes, &mut report);

    let snapshot = Snapshot::new(
        config.trusted_dimensions.clone(),
        groups,
        direct,
        prefixes,
        default_group,
    );
    report.into_result(snapshot)
}

/// Check a group's auth block and fold it into the tagged form.
///
/// On violation a placeholder is returned; it is never observable because
/// the report makes the whole configuration fail.
fn check_auth(idx: usize, auth: Option<&BotAuth>, report: &mut ValidationReport) -> GroupAuth {
    let Some(auth) = auth else {
        report.push(ValidationError::MissingAuth { group: idx });
        return GroupAuth {
            mode: AuthMode::IpOnly,
            ip_whitelist: None,
        };
    };

    let machine_token = auth.require_luci_machine_token;
    let service_account = !auth.require_service_account.is_empty();
    let ip_whitelist = (!auth.ip_whitelist.is_empty()).then(|| auth.ip_whitelist.clone());

    if machine_token && service_account {
        report.push(ValidationError::AmbiguousAuthMode { group: idx });
    }
    if !machine_token && !service_account && ip_whitelist.is_none() {
        report.push(ValidationError::NoAuthMechanism { group: idx });
    }

    let mode = if machine_token {
        AuthMode::MachineToken
    } else if service_account {
        AuthMode::ServiceAccount(auth.require_service_account.clone())
    } else {
        AuthMode::IpOnly
    };

    GroupAuth { mode, ip_whitelist }
}

/// Parse `key:value` dimension strings into a key -> value-set map.
fn check_dimensions(
    idx: usize,
    dimensions: &[String],
    report: &mut ValidationReport,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for dimension in dimensions {
        match dimension.split_once(':') {
            Some((key, value)) if !key.is_empty() => {
                map.entry(key.to_string()).or_default().insert(value.to_string());
            }
            _ => report.push(ValidationError::BadDimension {
                group: idx,
                dimension: dimension.clone(),
            }),
        }
    }
    map
}

fn check_system_account(
    idx: usize,
    group: &BotGroup,
    auth: &GroupAuth,
    report: &mut ValidationReport,
) -> SystemAccount {
    let raw = group.system_service_account.as_str();
    if raw.is_empty() {
        return SystemAccount::None;
    }

    if raw == BOT_TOKEN_SENTINEL {
        // Reusing the bot's own token only works when the bot itself
        // authenticates via OAuth.
        if !matches!(auth.mode, AuthMode::ServiceAccount(_)) {
            report.push(ValidationError::BotTokenWithoutOauth { group: idx });
        }
        return SystemAccount::BotToken;
    }

    if !is_email_shaped(raw) {
        report.push(ValidationError::BadSystemServiceAccount {
            group: idx,
            account: raw.to_string(),
        });
        return SystemAccount::None;
    }

    SystemAccount::Explicit(raw.to_string())
}

/// `<name>@<domain>` with a dotted domain; the token-minting collaborator
/// owns any stricter checks.
fn is_email_shaped(raw: &str) -> bool {
    match raw.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && domain.contains('.')
                && !raw.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

fn check_machine_type(
    group_idx: usize,
    mt: &MachineType,
    seen_names: &mut HashMap<String, usize>,
    report: &mut ValidationReport,
) -> PoolConfig {
    if mt.name.is_empty() {
        report.push(ValidationError::EmptyMachineTypeName { group: group_idx });
    } else if let Some(&first) = seen_names.get(&mt.name) {
        report.push(ValidationError::DuplicateMachineType {
            name: mt.name.clone(),
            first,
            second: group_idx,
        });
    } else {
        seen_names.insert(mt.name.clone(), group_idx);
    }

    for dimension in &mt.mp_dimensions {
        let valid = matches!(dimension.split_once(':'), Some((key, _)) if !key.is_empty());
        if !valid {
            report.push(ValidationError::BadPoolDimension {
                name: mt.name.clone(),
                dimension: dimension.clone(),
            });
        }
    }

    if mt.lease_duration_secs > 0 && mt.early_release_secs > mt.lease_duration_secs {
        report.push(ValidationError::EarlyReleaseTooLong {
            name: mt.name.clone(),
            early_release_secs: mt.early_release_secs,
            lease_duration_secs: mt.lease_duration_secs,
        });
    }

    let mut daily = Vec::new();
    let mut load_based = Vec::new();

    if let Some(schedule) = &mt.schedule {
        for entry in &schedule.daily {
            let start = parse_time_of_day(&entry.start);
            if start.is_none() {
                report.push(ValidationError::BadTimeOfDay {
                    name: mt.name.clone(),
                    value: entry.start.clone(),
                });
            }
            let end = parse_time_of_day(&entry.end);
            if end.is_none() {
                report.push(ValidationError::BadTimeOfDay {
                    name: mt.name.clone(),
                    value: entry.end.clone(),
                });
            }

            // Day checks are independent of the time bounds; report both.
            let mut days = Vec::new();
            for &day in &entry.days_of_the_week {
                if day > 6 {
                    report.push(ValidationError::BadDayOfWeek {
                        name: mt.name.clone(),
                        day,
                    });
                } else {
                    days.push(day);
                }
            }

            let (Some(start), Some(end)) = (start, end) else {
                continue;
            };
            if start >= end {
                report.push(ValidationError::EmptyDailyWindow {
                    name: mt.name.clone(),
                    start: entry.start.clone(),
                    end: entry.end.clone(),
                });
                continue;
            }

            daily.push(DailyWindow {
                start,
                end,
                days: DaySet::from_days(&days),
                target_size: entry.target_size,
            });
        }

        for bounds in &schedule.load_based {
            if bounds.minimum_size > bounds.maximum_size {
                report.push(ValidationError::BadLoadBounds {
                    name: mt.name.clone(),
                    minimum_size: bounds.minimum_size,
                    maximum_size: bounds.maximum_size,
                });
                continue;
            }
            load_based.push(LoadBounds {
                minimum_size: bounds.minimum_size,
                maximum_size: bounds.maximum_size,
            });
        }
    }

    PoolConfig {
        name: mt.name.clone(),
        description: mt.description.clone(),
        early_release_secs: mt.early_release_secs,
        lease_duration_secs: mt.lease_duration_secs,
        mp_dimensions: mt.mp_dimensions.clone(),
        target_size: mt.target_size,
        daily,
        load_based,
    }
}

/// Strict `"HH:MM"` to minutes from midnight.
fn parse_time_of_day(raw: &str) -> Option<u16> {
    let (hours, minutes) = raw.split_once(':')?;
    if hours.len() != 2 || minutes.len() != 2 {
        return None;
    }
    let hours: u16 = hours.parse().ok()?;
    let minutes: u16 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(hours * 60 + minutes)
}

/// Global pass: no prefix may be a prefix of another, anywhere in the
/// document. This is what guarantees resolution never ties.
fn check_prefix_intersections(prefixes: &[(String, usize)], report: &mut ValidationReport) {
    for (i, (a, group_a)) in prefixes.iter().enumerate() {
        for (b, group_b) in &prefixes[i + 1..] {
            let (shorter, longer, first, second) = if a.len() <= b.len() {
                (a, b, *group_a, *group_b)
            } else {
                (b, a, *group_b, *group_a)
            };
            if longer.starts_with(shorter.as_str()) {
                report.push(ValidationError::IntersectingPrefixes {
                    shorter: shorter.clone(),
                    longer: longer.clone(),
                    first,
                    second,
                });
            }
        }
    }
}
