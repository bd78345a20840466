//! Bot authentication policy evaluation.
//!
//! The evaluator consumes already-extracted credential facts - the
//! transport layer verifies tokens and OAuth upstream and hands us the
//! resulting hostname/email plus the source IP. Nothing here performs I/O;
//! IP allow-list membership is answered by an external collaborator behind
//! `IpWhitelist`.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use botfleet_config::{AuthMode, GroupAuth};

/// Credential facts observed on a bot connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotCredentials {
    /// Hostname embedded in a presented machine token, if any.
    pub machine_token_hostname: Option<String>,

    /// Email of the presented OAuth service account, if any.
    pub service_account_email: Option<String>,

    /// Source IP of the connection.
    pub source_ip: IpAddr,
}

/// External allow-list membership oracle.
///
/// The named lists are maintained outside this core; callers pre-resolve
/// whatever state the lookup needs so the call itself never blocks.
pub trait IpWhitelist {
    fn ip_in_whitelist(&self, name: &str, ip: IpAddr) -> bool;
}

/// Which authentication check failed.
///
/// The tags are stable: they end up in logs and rejection responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    /// No machine token, or its hostname is not exactly the claimed bot ID.
    TokenHostnameMismatch,

    /// No service account presented, or not the required one.
    ServiceAccountMismatch,

    /// Source IP not in the group's allow-list.
    IpNotWhitelisted,

    /// The group defines no way to authenticate at all. Validation excludes
    /// this; the evaluator still refuses rather than accepting by default.
    NoAuthMechanism,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::TokenHostnameMismatch => "token-hostname-mismatch",
            RejectReason::ServiceAccountMismatch => "service-account-mismatch",
            RejectReason::IpNotWhitelisted => "ip-not-whitelisted",
            RejectReason::NoAuthMechanism => "no-auth-mechanism",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of evaluating a group's auth policy against a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Accepted,
    Rejected { reason: RejectReason },
}

impl AuthDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AuthDecision::Accepted)
    }

    fn rejected(bot_id: &str, reason: RejectReason) -> Self {
        debug!(bot_id, reason = reason.as_str(), "bot auth rejected");
        AuthDecision::Rejected { reason }
    }
}

/// Evaluate a resolved group's auth requirements against observed
/// credentials. Every applicable condition must hold.
pub fn evaluate_auth(
    auth: &GroupAuth,
    bot_id: &str,
    credentials: &BotCredentials,
    whitelists: &dyn IpWhitelist,
) -> AuthDecision {
    match &auth.mode {
        AuthMode::MachineToken => {
            // The token hostname must equal the claimed bot ID exactly; a
            // prefix or suffix match would let one machine impersonate
            // another.
            if credentials.machine_token_hostname.as_deref() != Some(bot_id) {
                return AuthDecision::rejected(bot_id, RejectReason::TokenHostnameMismatch);
            }
        }
        AuthMode::ServiceAccount(required) => {
            if credentials.service_account_email.as_deref() != Some(required.as_str()) {
                return AuthDecision::rejected(bot_id, RejectReason::ServiceAccountMismatch);
            }
        }
        AuthMode::IpOnly => {
            if auth.ip_whitelist.is_none() {
                return AuthDecision::rejected(bot_id, RejectReason::NoAuthMechanism);
            }
        }
    }

    if let Some(name) = &auth.ip_whitelist {
        if !whitelists.ip_in_whitelist(name, credentials.source_ip) {
            return AuthDecision::rejected(bot_id, RejectReason::IpNotWhitelisted);
        }
    }

    AuthDecision::Accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticWhitelist {
        name: &'static str,
        members: Vec<IpAddr>,
    }

    impl IpWhitelist for StaticWhitelist {
        fn ip_in_whitelist(&self, name: &str, ip: IpAddr) -> bool {
            name == self.name && self.members.contains(&ip)
        }
    }

    fn no_whitelists() -> StaticWhitelist {
        StaticWhitelist {
            name: "unused",
            members: Vec::new(),
        }
    }

    fn ip(raw: &str) -> IpAddr {
        raw.parse().unwrap()
    }

    fn creds() -> BotCredentials {
        BotCredentials {
            machine_token_hostname: None,
            service_account_email: None,
            source_ip: ip("10.0.0.7"),
        }
    }

    fn machine_token_auth() -> GroupAuth {
        GroupAuth {
            mode: AuthMode::MachineToken,
            ip_whitelist: None,
        }
    }

    #[test]
    fn test_machine_token_hostname_must_match_exactly() {
        let auth = machine_token_auth();
        let credentials = BotCredentials {
            machine_token_hostname: Some("bot42".to_string()),
            ..creds()
        };

        assert!(evaluate_auth(&auth, "bot42", &credentials, &no_whitelists()).is_accepted());

        assert_eq!(
            evaluate_auth(&auth, "bot43", &credentials, &no_whitelists()),
            AuthDecision::Rejected {
                reason: RejectReason::TokenHostnameMismatch
            }
        );

        // Suffix/prefix of the bot id is not good enough.
        assert!(!evaluate_auth(&auth, "bot421", &credentials, &no_whitelists()).is_accepted());
    }

    #[test]
    fn test_missing_machine_token_rejects() {
        let decision = evaluate_auth(&machine_token_auth(), "bot42", &creds(), &no_whitelists());
        assert_eq!(
            decision,
            AuthDecision::Rejected {
                reason: RejectReason::TokenHostnameMismatch
            }
        );
    }

    #[test]
    fn test_service_account_exact_match() {
        let auth = GroupAuth {
            mode: AuthMode::ServiceAccount("ci@proj.iam.gserviceaccount.com".to_string()),
            ip_whitelist: None,
        };

        let ok = BotCredentials {
            service_account_email: Some("ci@proj.iam.gserviceaccount.com".to_string()),
            ..creds()
        };
        assert!(evaluate_auth(&auth, "bot1", &ok, &no_whitelists()).is_accepted());

        let wrong = BotCredentials {
            service_account_email: Some("other@proj.iam.gserviceaccount.com".to_string()),
            ..creds()
        };
        assert_eq!(
            evaluate_auth(&auth, "bot1", &wrong, &no_whitelists()),
            AuthDecision::Rejected {
                reason: RejectReason::ServiceAccountMismatch
            }
        );

        assert!(!evaluate_auth(&auth, "bot1", &creds(), &no_whitelists()).is_accepted());
    }

    #[test]
    fn test_ip_whitelist_alone() {
        let auth = GroupAuth {
            mode: AuthMode::IpOnly,
            ip_whitelist: Some("office".to_string()),
        };
        let whitelists = StaticWhitelist {
            name: "office",
            members: vec![ip("10.0.0.7")],
        };

        assert!(evaluate_auth(&auth, "bot1", &creds(), &whitelists).is_accepted());

        let outsider = BotCredentials {
            source_ip: ip("192.168.1.1"),
            ..creds()
        };
        assert_eq!(
            evaluate_auth(&auth, "bot1", &outsider, &whitelists),
            AuthDecision::Rejected {
                reason: RejectReason::IpNotWhitelisted
            }
        );
    }

    #[test]
    fn test_whitelist_is_anded_with_primary_mode() {
        let auth = GroupAuth {
            mode: AuthMode::MachineToken,
            ip_whitelist: Some("office".to_string()),
        };
        let whitelists = StaticWhitelist {
            name: "office",
            members: vec![ip("10.0.0.7")],
        };
        let credentials = BotCredentials {
            machine_token_hostname: Some("bot42".to_string()),
            ..creds()
        };

        // Valid token from a whitelisted IP: accepted.
        assert!(evaluate_auth(&auth, "bot42", &credentials, &whitelists).is_accepted());

        // Valid token from elsewhere: the whitelist still applies.
        let elsewhere = BotCredentials {
            source_ip: ip("8.8.8.8"),
            ..credentials.clone()
        };
        assert_eq!(
            evaluate_auth(&auth, "bot42", &elsewhere, &whitelists),
            AuthDecision::Rejected {
                reason: RejectReason::IpNotWhitelisted
            }
        );

        // Whitelisted IP with a bad token: primary mode still applies.
        let bad_token = BotCredentials {
            machine_token_hostname: Some("bot43".to_string()),
            ..creds()
        };
        assert!(!evaluate_auth(&auth, "bot42", &bad_token, &whitelists).is_accepted());
    }

    #[test]
    fn test_no_mechanism_never_accepts() {
        // Validation refuses this shape; the evaluator must too.
        let auth = GroupAuth {
            mode: AuthMode::IpOnly,
            ip_whitelist: None,
        };
        assert_eq!(
            evaluate_auth(&auth, "bot1", &creds(), &no_whitelists()),
            AuthDecision::Rejected {
                reason: RejectReason::NoAuthMechanism
            }
        );
    }

    #[test]
    fn test_reason_tags_are_stable() {
        assert_eq!(
            RejectReason::TokenHostnameMismatch.as_str(),
            "token-hostname-mismatch"
        );
        assert_eq!(
            serde_json::to_string(&RejectReason::IpNotWhitelisted).unwrap(),
            "\"ip-not-whitelisted\""
        );
        assert_eq!(RejectReason::NoAuthMechanism.to_string(), "no-auth-mechanism");
    }
}
