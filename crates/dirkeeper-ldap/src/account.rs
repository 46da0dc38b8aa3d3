//! Account state evaluation for 389 Directory Server entries.
//!
//! The server does not expose a single "account state" attribute. The state is derived from the
//! entry's own lock flag, the roles it inherits and, when the Account Policy plugin is configured,
//! how long ago the account was last used.

use crate::client::LdapEntry;
use crate::dn::{DistinguishedName, RelativeDistinguishedName};
use crate::value::{parse_generalized_time, DirectoryValue};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// DN of the Account Policy plugin configuration entry.
pub const ACCOUNT_POLICY_CONFIG_DN: &str =
    "cn=config,cn=Account Policy Plugin,cn=plugins,cn=config";

const DEFAULT_STATE_ATTRIBUTE: &str = "lastLoginTime";
const DEFAULT_ALT_STATE_ATTRIBUTE: &str = "createTimestamp";
const DISABLED_ROLES: &[&str] = &["nsManagedDisabledRole", "nsDisabledRole"];

/// Raw account state reported by the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountState {
    /// Account is usable.
    Activated,
    /// `nsAccountLock` is set on the entry itself.
    DirectlyLocked,
    /// Entry inherits a disabled role.
    IndirectlyLocked,
    /// Account has not been used within the configured inactivity limit.
    InactivityLimitExceeded,
    /// State name this crate does not know.
    Other(String),
}

impl AccountState {
    /// Wire name of the state (`ACTIVATED`, `DIRECTLY_LOCKED`, ...).
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Activated => "ACTIVATED",
            Self::DirectlyLocked => "DIRECTLY_LOCKED",
            Self::IndirectlyLocked => "INDIRECTLY_LOCKED",
            Self::InactivityLimitExceeded => "INACTIVITY_LIMIT_EXCEEDED",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for AccountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Account state plus the values it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAccountStatus {
    /// Evaluated state.
    pub state: AccountState,
    /// Auxiliary values (role DN, inactivity figures).
    pub params: BTreeMap<String, DirectoryValue>,
    /// Instant the evaluation was made.
    pub calc_time: Option<DateTime<Utc>>,
}

impl RawAccountStatus {
    /// Creates a status without parameters.
    #[must_use]
    pub fn new(state: AccountState) -> Self {
        Self {
            state,
            params: BTreeMap::new(),
            calc_time: None,
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_param(mut self, name: &str, value: impl Into<DirectoryValue>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    /// Sets the evaluation instant.
    #[must_use]
    pub fn calculated_at(mut self, time: DateTime<Utc>) -> Self {
        self.calc_time = Some(time);
        self
    }
}

/// Inactivity settings of the Account Policy plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountPolicy {
    /// Attribute recording the last use of the account.
    pub state_attribute: String,
    /// Attribute consulted when the state attribute is absent.
    pub alt_state_attribute: Option<String>,
    /// Allowed inactivity in seconds.
    pub inactivity_limit_secs: Option<i64>,
}

impl Default for AccountPolicy {
    fn default() -> Self {
        Self {
            state_attribute: DEFAULT_STATE_ATTRIBUTE.to_string(),
            alt_state_attribute: Some(DEFAULT_ALT_STATE_ATTRIBUTE.to_string()),
            inactivity_limit_secs: None,
        }
    }
}

impl AccountPolicy {
    /// Attributes to request from the plugin configuration entry.
    pub const ATTRIBUTES: &'static [&'static str] =
        &["stateattrname", "altstateattrname", "accountInactivityLimit"];

    /// Reads the policy from the plugin configuration entry.
    #[must_use]
    pub fn from_entry(entry: &LdapEntry) -> Self {
        let defaults = Self::default();
        Self {
            state_attribute: entry
                .first("stateattrname")
                .map_or(defaults.state_attribute, str::to_string),
            alt_state_attribute: entry
                .first("altstateattrname")
                .map(str::to_string)
                .or(defaults.alt_state_attribute),
            inactivity_limit_secs: entry
                .first("accountInactivityLimit")
                .and_then(|raw| raw.trim().parse::<i64>().ok())
                .filter(|limit| *limit > 0),
        }
    }

    /// Attributes an entry must be read with to evaluate its state under this policy.
    #[must_use]
    pub fn entry_attributes(&self) -> Vec<String> {
        let mut attributes = vec!["nsAccountLock".to_string(), "nsRole".to_string()];
        attributes.push(self.state_attribute.clone());
        if let Some(alt) = &self.alt_state_attribute {
            attributes.push(alt.clone());
        }
        attributes
    }
}

/// Evaluates the state of `entry` at `now`.
///
/// Checks run in order: direct lock, disabled role under `base_dn`, inactivity limit.
#[must_use]
pub fn evaluate(
    entry: &LdapEntry,
    policy: Option<&AccountPolicy>,
    base_dn: &str,
    now: DateTime<Utc>,
) -> RawAccountStatus {
    if entry.bool_value("nsAccountLock") {
        return RawAccountStatus::new(AccountState::DirectlyLocked).calculated_at(now);
    }

    if let Some(role_dn) = disabled_role(entry, base_dn) {
        return RawAccountStatus::new(AccountState::IndirectlyLocked)
            .with_param("role_dn", role_dn)
            .calculated_at(now);
    }

    let Some((policy, limit)) =
        policy.and_then(|policy| policy.inactivity_limit_secs.map(|limit| (policy, limit)))
    else {
        return RawAccountStatus::new(AccountState::Activated).calculated_at(now);
    };

    let last_used = entry
        .first(&policy.state_attribute)
        .or_else(|| {
            policy
                .alt_state_attribute
                .as_deref()
                .and_then(|alt| entry.first(alt))
        })
        .and_then(parse_generalized_time);

    let Some(last_used) = last_used else {
        return RawAccountStatus::new(AccountState::Activated).calculated_at(now);
    };

    let elapsed = (now - last_used).num_seconds();
    let status = if elapsed > limit {
        RawAccountStatus::new(AccountState::InactivityLimitExceeded)
            .with_param("time_since_inactive", elapsed.saturating_sub(limit))
    } else {
        RawAccountStatus::new(AccountState::Activated)
            .with_param("time_until_inactive", limit.saturating_sub(elapsed))
    };

    status
        .with_param("last_login_time", last_used)
        .with_param("account_inactivity_limit", limit)
        .calculated_at(now)
}

fn disabled_role(entry: &LdapEntry, base_dn: &str) -> Option<String> {
    let base = DistinguishedName::parse(base_dn).ok()?;
    let disabled = DISABLED_ROLES
        .iter()
        .map(|role| {
            base.clone()
                .with_prefix(RelativeDistinguishedName::new("cn", *role))
        })
        .collect::<Vec<_>>();

    entry.values("nsRole")?.iter().find_map(|raw| {
        let role = DistinguishedName::parse(raw).ok()?;
        disabled
            .iter()
            .any(|candidate| candidate.same_entry(&role))
            .then(|| raw.clone())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const BASE: &str = "dc=test,dc=com";

    fn entry(attributes: &[(&str, &str)]) -> LdapEntry {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in attributes {
            map.entry((*name).to_string())
                .or_default()
                .push((*value).to_string());
        }
        LdapEntry {
            dn: "uid=testuser1,ou=people,dc=test,dc=com".to_string(),
            attributes: map,
        }
    }

    fn now() -> DateTime<Utc> {
        parse_generalized_time("20240201000000Z").unwrap()
    }

    fn policy(limit: i64) -> AccountPolicy {
        AccountPolicy {
            inactivity_limit_secs: Some(limit),
            ..AccountPolicy::default()
        }
    }

    #[test]
    fn state_wire_names() {
        assert_eq!(AccountState::Activated.name(), "ACTIVATED");
        assert_eq!(AccountState::DirectlyLocked.name(), "DIRECTLY_LOCKED");
        assert_eq!(AccountState::IndirectlyLocked.name(), "INDIRECTLY_LOCKED");
        assert_eq!(
            AccountState::InactivityLimitExceeded.to_string(),
            "INACTIVITY_LIMIT_EXCEEDED"
        );
        assert_eq!(
            AccountState::Other("PASSWORD_EXPIRED".to_string()).name(),
            "PASSWORD_EXPIRED"
        );
    }

    #[test]
    fn plain_entry_is_activated() {
        let status = evaluate(&entry(&[("uid", "testuser1")]), None, BASE, now());
        assert_eq!(status.state, AccountState::Activated);
        assert!(status.params.is_empty());
        assert_eq!(status.calc_time, Some(now()));
    }

    #[test]
    fn lock_flag_wins() {
        let locked = entry(&[
            ("nsAccountLock", "TRUE"),
            ("nsRole", "cn=nsManagedDisabledRole,dc=test,dc=com"),
        ]);
        let status = evaluate(&locked, None, BASE, now());
        assert_eq!(status.state, AccountState::DirectlyLocked);
    }

    #[test]
    fn disabled_role_locks_indirectly() {
        let member = entry(&[
            ("nsrole", "cn=Staff,dc=test,dc=com"),
            ("nsrole", "CN=nsDisabledRole,DC=test,DC=com"),
        ]);
        let status = evaluate(&member, None, BASE, now());
        assert_eq!(status.state, AccountState::IndirectlyLocked);
        assert_eq!(
            status.params.get("role_dn"),
            Some(&DirectoryValue::Text("CN=nsDisabledRole,DC=test,DC=com".to_string()))
        );

        let other_suffix = entry(&[("nsRole", "cn=nsDisabledRole,dc=other,dc=com")]);
        assert_eq!(
            evaluate(&other_suffix, None, BASE, now()).state,
            AccountState::Activated
        );
    }

    #[test]
    fn inactivity_limit_exceeded() {
        let stale = entry(&[("lastLoginTime", "20240101000000Z")]);
        let status = evaluate(&stale, Some(&policy(86_400)), BASE, now());
        assert_eq!(status.state, AccountState::InactivityLimitExceeded);
        assert_eq!(
            status.params.get("time_since_inactive"),
            Some(&DirectoryValue::Integer(31 * 86_400 - 86_400))
        );
        assert!(matches!(
            status.params.get("last_login_time"),
            Some(DirectoryValue::Timestamp(_))
        ));
    }

    #[test]
    fn inactivity_falls_back_to_alternate_attribute() {
        let recent = entry(&[("createTimestamp", "20240131000000Z")]);
        let status = evaluate(&recent, Some(&policy(7 * 86_400)), BASE, now());
        assert_eq!(status.state, AccountState::Activated);
        assert_eq!(
            status.params.get("time_until_inactive"),
            Some(&DirectoryValue::Integer(6 * 86_400))
        );
    }

    #[test]
    fn huge_limit_with_future_login_saturates() {
        let future = entry(&[("lastLoginTime", "20990101000000Z")]);
        let status = evaluate(&future, Some(&policy(i64::MAX)), BASE, now());
        assert_eq!(status.state, AccountState::Activated);
        assert_eq!(
            status.params.get("time_until_inactive"),
            Some(&DirectoryValue::Integer(i64::MAX))
        );
    }

    #[test]
    fn policy_from_config_entry() {
        let config = entry(&[
            ("stateattrname", "lastLoginTime"),
            ("altstateattrname", "modifyTimestamp"),
            ("accountInactivityLimit", "1728000"),
        ]);
        let policy = AccountPolicy::from_entry(&config);
        assert_eq!(policy.alt_state_attribute.as_deref(), Some("modifyTimestamp"));
        assert_eq!(policy.inactivity_limit_secs, Some(1_728_000));
        assert_eq!(
            policy.entry_attributes(),
            vec!["nsAccountLock", "nsRole", "lastLoginTime", "modifyTimestamp"]
        );

        let empty = AccountPolicy::from_entry(&entry(&[("accountInactivityLimit", "none")]));
        assert_eq!(empty, AccountPolicy::default());
    }
}
