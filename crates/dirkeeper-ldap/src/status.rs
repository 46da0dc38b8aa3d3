//! Simplified account status.

use crate::account::{AccountState, RawAccountStatus};
use crate::client::{DirectorySession, SearchRequest};
use crate::Result;
use dirkeeper_core::Error;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Simplified status label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SimpleStatus {
    /// Account is usable.
    Active,
    /// Account exceeded its inactivity limit.
    Inactive,
    /// Account is locked directly or through a role.
    Locked,
    /// State could not be determined.
    Unknown,
}

impl SimpleStatus {
    /// Maps a raw account state onto its simplified label.
    #[must_use]
    pub fn from_state(state: &AccountState) -> Self {
        match state {
            AccountState::DirectlyLocked | AccountState::IndirectlyLocked => Self::Locked,
            AccountState::InactivityLimitExceeded => Self::Inactive,
            AccountState::Activated => Self::Active,
            AccountState::Other(_) => Self::Unknown,
        }
    }

    /// Lower-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Locked => "locked",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SimpleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimpleStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "locked" => Ok(Self::Locked),
            "unknown" => Ok(Self::Unknown),
            other => Err(Error::InvalidRequest(format!(
                "unknown status `{other}` (expected active, inactive, locked or unknown)"
            ))),
        }
    }
}

/// Account status as attached to entries under `computed_status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountStatus {
    /// Simplified label.
    pub simple_status: SimpleStatus,
    /// Raw state name, or the error text when the state could not be read.
    pub detailed_status: String,
    /// Auxiliary values with timestamps already rendered as text.
    pub status_params: BTreeMap<String, Value>,
    /// Evaluation instant (RFC 3339).
    pub calc_time: Option<String>,
}

impl AccountStatus {
    fn from_raw(raw: RawAccountStatus) -> Self {
        Self {
            simple_status: SimpleStatus::from_state(&raw.state),
            detailed_status: raw.state.name().to_string(),
            status_params: raw
                .params
                .into_iter()
                .map(|(name, value)| (name, value.to_json()))
                .collect(),
            calc_time: raw.calc_time.map(|time| time.to_rfc3339()),
        }
    }

    fn from_lock_flag(locked: bool) -> Self {
        let state = if locked {
            AccountState::DirectlyLocked
        } else {
            AccountState::Activated
        };
        Self {
            simple_status: SimpleStatus::from_state(&state),
            detailed_status: state.name().to_string(),
            status_params: BTreeMap::new(),
            calc_time: None,
        }
    }

    fn unknown(error: &Error) -> Self {
        Self {
            simple_status: SimpleStatus::Unknown,
            detailed_status: format!("Error: {error}"),
            status_params: BTreeMap::new(),
            calc_time: None,
        }
    }
}

/// Computes the status of the entry at `dn`. Never fails.
///
/// The account-status query is tried first. If it fails, `nsAccountLock` is read directly. If
/// that fails too, the status is `unknown` and `detailed_status` carries the first error.
pub async fn classify(
    session: &mut dyn DirectorySession,
    dn: &str,
    base_dn: &str,
) -> AccountStatus {
    let primary = match session.account_status(dn, base_dn).await {
        Ok(raw) => return AccountStatus::from_raw(raw),
        Err(err) => err,
    };
    debug!(dn, error = %primary, "Account status query failed, probing nsAccountLock");

    match lock_flag(session, dn).await {
        Ok(locked) => AccountStatus::from_lock_flag(locked),
        Err(secondary) => {
            warn!(dn, error = %secondary, "Could not determine account status");
            AccountStatus::unknown(&primary)
        }
    }
}

async fn lock_flag(session: &mut dyn DirectorySession, dn: &str) -> Result<bool> {
    let request = SearchRequest::base_object(dn).with_attributes(["nsAccountLock"]);
    let entries = session.search(&request).await?;
    Ok(entries.first().is_some_and(|entry| {
        entry
            .first("nsAccountLock")
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{LdapEntry, MockDirectorySession};
    use crate::value::parse_generalized_time;
    use std::collections::HashMap;

    const DN: &str = "uid=testuser1,ou=people,dc=test,dc=com";
    const BASE: &str = "dc=test,dc=com";

    fn lock_entry(value: &str) -> LdapEntry {
        LdapEntry {
            dn: DN.to_string(),
            attributes: HashMap::from([("nsAccountLock".to_string(), vec![value.to_string()])]),
        }
    }

    #[test]
    fn state_mapping() {
        let cases = [
            (AccountState::DirectlyLocked, SimpleStatus::Locked),
            (AccountState::IndirectlyLocked, SimpleStatus::Locked),
            (AccountState::InactivityLimitExceeded, SimpleStatus::Inactive),
            (AccountState::Activated, SimpleStatus::Active),
            (AccountState::Other("PASSWORD_EXPIRED".to_string()), SimpleStatus::Unknown),
        ];
        for (state, expected) in cases {
            assert_eq!(SimpleStatus::from_state(&state), expected);
        }
    }

    #[test]
    fn status_labels_parse() {
        assert_eq!("Locked".parse::<SimpleStatus>().unwrap(), SimpleStatus::Locked);
        assert!("frozen".parse::<SimpleStatus>().is_err());
        assert_eq!(
            serde_json::to_value(SimpleStatus::Inactive).unwrap(),
            serde_json::json!("inactive")
        );
    }

    #[tokio::test]
    async fn primary_path_converts_timestamps() {
        let mut session = MockDirectorySession::new();
        session.expect_account_status().returning(|_, _| {
            let last = parse_generalized_time("20240101000000Z").unwrap();
            Ok(RawAccountStatus::new(AccountState::InactivityLimitExceeded)
                .with_param("last_login_time", last)
                .with_param("account_inactivity_limit", 86_400_i64)
                .calculated_at(last))
        });
        session.expect_search().never();

        let status = classify(&mut session, DN, BASE).await;
        assert_eq!(status.simple_status, SimpleStatus::Inactive);
        assert_eq!(status.detailed_status, "INACTIVITY_LIMIT_EXCEEDED");
        assert_eq!(
            status.status_params["last_login_time"],
            serde_json::json!("2024-01-01T00:00:00+00:00")
        );
        assert_eq!(status.status_params["account_inactivity_limit"], 86_400);
        assert_eq!(status.calc_time.as_deref(), Some("2024-01-01T00:00:00+00:00"));
    }

    #[tokio::test]
    async fn fallback_reads_lock_attribute() {
        let mut session = MockDirectorySession::new();
        session
            .expect_account_status()
            .returning(|_, _| Err(Error::InternalError("no status".to_string())));
        session
            .expect_search()
            .withf(|request| request.base_dn == DN && request.attributes == ["nsAccountLock"])
            .returning(|_| Ok(vec![lock_entry("TRUE")]));

        let status = classify(&mut session, DN, BASE).await;
        assert_eq!(status.simple_status, SimpleStatus::Locked);
        assert_eq!(status.detailed_status, "DIRECTLY_LOCKED");
    }

    #[tokio::test]
    async fn fallback_without_lock_is_active() {
        let mut session = MockDirectorySession::new();
        session
            .expect_account_status()
            .returning(|_, _| Err(Error::InternalError("no status".to_string())));
        session
            .expect_search()
            .returning(|_| Ok(vec![lock_entry("false")]));

        let status = classify(&mut session, DN, BASE).await;
        assert_eq!(status.simple_status, SimpleStatus::Active);
        assert_eq!(status.detailed_status, "ACTIVATED");
    }

    #[tokio::test]
    async fn double_failure_is_unknown() {
        let mut session = MockDirectorySession::new();
        session.expect_account_status().returning(|_, _| {
            Err(Error::ExternalServiceError {
                service: "ldap".to_string(),
                message: "Insufficient access".to_string(),
            })
        });
        session
            .expect_search()
            .returning(|_| Err(Error::Timeout("search timed out".to_string())));

        let status = classify(&mut session, DN, BASE).await;
        assert_eq!(status.simple_status, SimpleStatus::Unknown);
        assert!(status.detailed_status.contains("Insufficient access"));
        assert!(status.status_params.is_empty());
    }
}
