//! System service account decisions.
//!
//! The configuration decides what identity a group's bots use for
//! authenticated calls to system-level services; the token-minting
//! collaborator acts on the decision (and owns delegation checks for
//! explicit accounts).

use tracing::warn;

use botfleet_config::{AuthMode, GroupConfig, SystemAccount};

/// Resolve the system account decision for a group.
///
/// The decision is materialized at validation time; this additionally
/// defends against the `"bot"` sentinel appearing without OAuth bot auth
/// (a config error the validator flags) by degrading it to `None` - there
/// is no bot token to reuse in that case.
pub fn resolve_system_account(group: &GroupConfig) -> SystemAccount {
    match &group.system_service_account {
        SystemAccount::BotToken => {
            if matches!(group.auth.mode, AuthMode::ServiceAccount(_)) {
                SystemAccount::BotToken
            } else {
                warn!(
                    "system_service_account \"bot\" without service account auth; \
                     treating as no system account"
                );
                SystemAccount::None
            }
        }
        account => account.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botfleet_config::GroupAuth;
    use std::collections::BTreeMap;

    fn group(mode: AuthMode, account: SystemAccount) -> GroupConfig {
        GroupConfig {
            auth: GroupAuth {
                mode,
                ip_whitelist: None,
            },
            owners: Vec::new(),
            dimensions: BTreeMap::new(),
            bot_config_script: String::new(),
            system_service_account: account,
            machine_types: Vec::new(),
        }
    }

    #[test]
    fn test_unset_is_none() {
        let g = group(AuthMode::MachineToken, SystemAccount::None);
        assert_eq!(resolve_system_account(&g), SystemAccount::None);
    }

    #[test]
    fn test_explicit_account_passes_through() {
        let account = SystemAccount::Explicit("sys@proj.iam.gserviceaccount.com".to_string());
        let g = group(AuthMode::MachineToken, account.clone());
        assert_eq!(resolve_system_account(&g), account);
    }

    #[test]
    fn test_bot_token_with_oauth_auth() {
        let g = group(
            AuthMode::ServiceAccount("bots@proj.iam.gserviceaccount.com".to_string()),
            SystemAccount::BotToken,
        );
        assert_eq!(resolve_system_account(&g), SystemAccount::BotToken);
    }

    #[test]
    fn test_bot_token_without_oauth_degrades_to_none() {
        let g = group(AuthMode::MachineToken, SystemAccount::BotToken);
        assert_eq!(resolve_system_account(&g), SystemAccount::None);
    }
}
