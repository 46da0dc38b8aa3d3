//! Server monitor lookups and the health-check catalog.

use crate::client::{SearchRequest, SearchScope};
use crate::dn::{DistinguishedName, RelativeDistinguishedName};
use crate::filter::escape_filter_value_strict;
use crate::Result;
use dirkeeper_core::Error;
use serde::Serialize;

/// Server-wide monitor entry.
pub const SERVER_MONITOR_DN: &str = "cn=monitor";

/// Container of the `ldbm database` backend instances.
pub const LDBM_DATABASE_DN: &str = "cn=ldbm database,cn=plugins,cn=config";

/// Request every user and operational attribute.
pub const MONITOR_ATTRIBUTES: &[&str] = &["*", "+"];

const BACKEND_FILTER: &str = "(objectClass=nsBackendInstance)";

/// Checks that apply to the whole server.
const SERVER_CHECKS: &[(&str, &str)] = &[
    ("config:hr_timestamp", "High resolution timestamps are enabled"),
    ("config:passwordscheme", "Password storage schemes are strong"),
    ("dseldif:nsstate", "Replication CSN state is consistent"),
    ("encryption:check_tls_version", "Minimum TLS version is secure"),
    ("fschecks:file_perms", "Sensitive files have safe permissions"),
    ("logs:notes", "Access log has no unindexed search notes"),
    ("memberof:member_attr_indexed", "memberOf attributes are indexed"),
    ("monitor-disk-space:disk_space", "Database and log partitions have free space"),
    ("referint:attr_indexes", "Referential integrity attributes are indexed"),
    ("referint:update_delay", "Referential integrity runs without delay"),
    ("replication:agmts_status", "Replication agreements are in sync"),
    ("replication:conflicts", "No replication conflict entries exist"),
    ("tls:certificate_expiration", "Server certificate is not about to expire"),
];

/// Checks run for each backend.
const BACKEND_CHECKS: &[(&str, &str)] = &[
    ("cl_trimming", "Changelog trimming is configured"),
    ("mappingtree", "Backend has a valid mapping tree entry"),
    ("search", "Backend suffix is searchable"),
    ("virt_attrs", "Virtual attributes are not indexed"),
];

/// Which monitor entry to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorTarget {
    /// `cn=monitor`
    Server,
    /// Monitor of a named backend.
    Backend(String),
    /// Monitor of the backend holding a suffix.
    Suffix(String),
}

impl MonitorTarget {
    /// Chooses the target from optional tool parameters; blank values count as absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if both a backend and a suffix are given.
    pub fn from_params(backend: Option<&str>, suffix: Option<&str>) -> Result<Self> {
        let backend = backend.map(str::trim).filter(|value| !value.is_empty());
        let suffix = suffix.map(str::trim).filter(|value| !value.is_empty());
        match (backend, suffix) {
            (Some(_), Some(_)) => Err(Error::InvalidRequest(
                "specify either a backend or a suffix, not both".to_string(),
            )),
            (Some(backend), None) => Ok(Self::Backend(backend.to_string())),
            (None, Some(suffix)) => Ok(Self::Suffix(suffix.to_string())),
            (None, None) => Ok(Self::Server),
        }
    }
}

/// DN of a backend's monitor entry.
///
/// # Errors
///
/// Returns [`Error::InvalidRequest`] if the backend name cannot form a DN.
pub fn backend_monitor_dn(backend: &str) -> Result<String> {
    let base = DistinguishedName::parse(LDBM_DATABASE_DN)?;
    let dn = base
        .with_prefix(RelativeDistinguishedName::new("cn", backend))
        .with_prefix(RelativeDistinguishedName::new("cn", "monitor"));
    Ok(dn.to_string())
}

/// Search listing backend instances with their suffixes.
#[must_use]
pub fn backend_list_request() -> SearchRequest {
    SearchRequest::new(LDBM_DATABASE_DN, SearchScope::OneLevel, BACKEND_FILTER)
        .with_attributes(["cn", "nsslapd-suffix"])
}

/// Search resolving the backend that holds `suffix`.
#[must_use]
pub fn backend_for_suffix_request(suffix: &str) -> SearchRequest {
    let filter = format!(
        "(&{BACKEND_FILTER}(nsslapd-suffix={}))",
        escape_filter_value_strict(suffix)
    );
    SearchRequest::new(LDBM_DATABASE_DN, SearchScope::OneLevel, filter)
        .with_attributes(["cn", "nsslapd-suffix"])
}

/// Request reading one monitor entry.
#[must_use]
pub fn monitor_request(dn: &str) -> SearchRequest {
    SearchRequest::base_object(dn).with_attributes(MONITOR_ATTRIBUTES.iter().copied())
}

/// One available health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    /// Check identifier (`<area>:<check>` or `backends:<backend>:<check>`).
    pub name: String,
    /// What the check verifies.
    pub description: String,
    /// Backend the check applies to, for backend checks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
}

/// Catalog of checks: server checks first, then each backend's checks.
#[must_use]
pub fn health_checks(backends: &[String]) -> Vec<HealthCheck> {
    let server = SERVER_CHECKS.iter().map(|(name, description)| HealthCheck {
        name: (*name).to_string(),
        description: (*description).to_string(),
        backend: None,
    });

    let per_backend = backends.iter().flat_map(|backend| {
        let key = backend.to_ascii_lowercase();
        BACKEND_CHECKS.iter().map(move |(check, description)| HealthCheck {
            name: format!("backends:{key}:{check}"),
            description: (*description).to_string(),
            backend: Some(key.clone()),
        })
    });

    server.chain(per_backend).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_selection() {
        assert_eq!(MonitorTarget::from_params(None, None).unwrap(), MonitorTarget::Server);
        assert_eq!(
            MonitorTarget::from_params(Some("userroot"), Some(" ")).unwrap(),
            MonitorTarget::Backend("userroot".to_string())
        );
        assert_eq!(
            MonitorTarget::from_params(None, Some("dc=test,dc=com")).unwrap(),
            MonitorTarget::Suffix("dc=test,dc=com".to_string())
        );
        assert!(matches!(
            MonitorTarget::from_params(Some("userroot"), Some("dc=test,dc=com")),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn backend_monitor_dns() {
        assert_eq!(
            backend_monitor_dn("userroot").unwrap(),
            "cn=monitor,cn=userroot,cn=ldbm database,cn=plugins,cn=config"
        );
        assert_eq!(
            backend_monitor_dn("odd,name").unwrap(),
            r"cn=monitor,cn=odd\,name,cn=ldbm database,cn=plugins,cn=config"
        );
    }

    #[test]
    fn suffix_lookup_is_escaped() {
        let request = backend_for_suffix_request("dc=te(st,dc=com");
        assert_eq!(request.scope, SearchScope::OneLevel);
        assert_eq!(
            request.filter,
            "(&(objectClass=nsBackendInstance)(nsslapd-suffix=dc=te\\28st,dc=com))"
        );
    }

    #[test]
    fn catalog_lists_backend_checks() {
        let catalog = health_checks(&["userRoot".to_string()]);
        assert_eq!(catalog.len(), SERVER_CHECKS.len() + BACKEND_CHECKS.len());
        assert!(catalog.iter().any(|c| c.name == "backends:userroot:mappingtree"));
        assert!(catalog
            .iter()
            .filter(|c| c.backend.is_none())
            .all(|c| !c.name.starts_with("backends:")));

        assert_eq!(health_checks(&[]).len(), SERVER_CHECKS.len());
    }
}
