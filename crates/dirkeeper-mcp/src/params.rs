//! Tool input schemas.

use dirkeeper_core::Result;
use dirkeeper_ldap::{AdvancedFilters, AdvancedSearchRequest, LdapSearchRequest, SimpleStatus};
use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Input of the plain listing tools.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct LimitInput {
    /// Maximum number of entries to return (1-1000, default 50)
    pub limit: Option<i64>,
}

/// Input of `search_users_by_name`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchByNameInput {
    /// Name or fragment to look for in uid, cn, sn, givenName, mail and displayName
    pub name: String,
    /// exact, wildcard (default) or fuzzy
    pub search_mode: Option<String>,
    /// Maximum number of entries to return (1-1000, default 50)
    pub limit: Option<i64>,
}

/// Input of `search_users_by_attribute`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchByAttributeInput {
    /// Attribute to match, e.g. employeeType
    pub attribute: String,
    /// Substring the attribute must contain; a value with `*` is used as given
    pub value: String,
    /// Maximum number of entries to return (1-1000, default 50)
    pub limit: Option<i64>,
}

/// Input of `get_user_details`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct UserDetailsInput {
    /// The user's uid
    pub username: String,
}

/// Structured criteria of `advanced_search`.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct AdvancedFiltersInput {
    /// Groups the user must belong to (all of them), by cn or full DN
    pub group_membership: Option<Vec<String>>,
    /// Attribute name to substring it must contain
    pub attribute_contains: Option<BTreeMap<String, String>>,
    /// Attributes that must be present
    pub has_attribute: Option<Vec<String>>,
    /// Require (true) or exclude (false) users with a recorded last login
    pub has_last_login: Option<bool>,
    /// active, inactive, locked or unknown
    pub status: Option<String>,
    /// Extra LDAP filter clause ANDed with the other criteria
    pub custom_filter: Option<String>,
}

impl AdvancedFiltersInput {
    /// Converts into the directory-side criteria.
    ///
    /// # Errors
    ///
    /// Returns [`dirkeeper_core::Error::InvalidRequest`] for an unknown status.
    pub fn into_filters(self) -> Result<AdvancedFilters> {
        let status = self
            .status
            .as_deref()
            .map(str::trim)
            .filter(|status| !status.is_empty())
            .map(str::parse::<SimpleStatus>)
            .transpose()?;

        Ok(AdvancedFilters {
            group_membership: self.group_membership.unwrap_or_default(),
            attribute_contains: self.attribute_contains.unwrap_or_default(),
            has_attribute: self.has_attribute.unwrap_or_default(),
            has_last_login: self.has_last_login,
            status,
            custom_filter: self.custom_filter,
        })
    }
}

/// Input of `advanced_search`.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct AdvancedSearchInput {
    /// Optional name term, matched like search_users_by_name
    pub search_term: Option<String>,
    /// exact, wildcard (default) or fuzzy
    pub search_mode: Option<String>,
    /// Structured criteria
    pub filters: Option<AdvancedFiltersInput>,
    /// Maximum number of entries to return (1-1000, default 50)
    pub limit: Option<i64>,
}

impl AdvancedSearchInput {
    /// Converts into a tool request.
    ///
    /// # Errors
    ///
    /// Returns [`dirkeeper_core::Error::InvalidRequest`] for an unknown status criterion.
    pub fn into_request(self) -> Result<AdvancedSearchRequest> {
        Ok(AdvancedSearchRequest {
            search_term: self.search_term,
            search_mode: self.search_mode,
            filters: self
                .filters
                .map(AdvancedFiltersInput::into_filters)
                .transpose()?
                .unwrap_or_default(),
            limit: self.limit,
        })
    }
}

/// Input of `get_monitor_info`.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct MonitorInput {
    /// Backend name, e.g. userRoot
    pub backend: Option<String>,
    /// Suffix whose backend should be inspected, e.g. dc=example,dc=com
    pub suffix: Option<String>,
}

/// Input of `ldap_search`.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct LdapSearchInput {
    /// Search base (defaults to the configured base DN)
    pub base_dn: Option<String>,
    /// BASE, ONELEVEL or SUBTREE (default)
    pub scope: Option<String>,
    /// LDAP filter (default `(objectClass=*)`)
    pub filter: Option<String>,
    /// Comma-separated attributes to return
    pub attributes: Option<String>,
    /// Return attribute names only
    pub attrs_only: Option<bool>,
    /// Maximum number of entries to return (1-1000, default 50)
    pub limit: Option<i64>,
}

impl From<LdapSearchInput> for LdapSearchRequest {
    fn from(input: LdapSearchInput) -> Self {
        Self {
            base_dn: input.base_dn,
            scope: input.scope,
            filter: input.filter,
            attributes: input.attributes,
            attrs_only: input.attrs_only.unwrap_or(false),
            limit: input.limit,
        }
    }
}
