use super::{clamp_limit, Collect, DirectoryTools, ToolResponse};
use crate::client::{SearchRequest, SearchScope};
use crate::filter::is_valid_attribute_name;
use crate::Result;
use dirkeeper_core::{DirectoryConfig, Error};
use serde_json::Value;

const DEFAULT_FILTER: &str = "(objectClass=*)";

/// Parameters of a raw directory search.
#[derive(Debug, Clone, Default)]
pub struct LdapSearchRequest {
    /// Search base; the configured base DN when absent. An empty string addresses the root DSE.
    pub base_dn: Option<String>,
    /// `BASE`, `ONELEVEL` or `SUBTREE` (default).
    pub scope: Option<String>,
    /// Filter; `(objectClass=*)` when absent or blank.
    pub filter: Option<String>,
    /// Comma-separated attribute list.
    pub attributes: Option<String>,
    /// Return attribute names without values.
    pub attrs_only: bool,
    /// Requested limit.
    pub limit: Option<i64>,
}

/// Parses a comma-separated attribute list, keeping `*` and `+`.
fn parse_attributes(list: &str) -> Result<Vec<String>> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            if name == "*" || name == "+" || is_valid_attribute_name(name) {
                Ok(name.to_string())
            } else {
                Err(Error::InvalidRequest(format!("invalid attribute name `{name}`")))
            }
        })
        .collect()
}

impl DirectoryTools {
    /// Runs an arbitrary search. Scope and attribute list are validated before connecting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidScope`] for an unknown scope, [`Error::InvalidRequest`] for a bad
    /// attribute name, [`Error::NotFound`] if the base does not exist, [`Error::InvalidFilter`] if
    /// the filter is rejected, or any other directory error.
    pub async fn ldap_search(
        &self,
        config: &DirectoryConfig,
        request: LdapSearchRequest,
    ) -> Result<ToolResponse> {
        let scope = match request.scope.as_deref().map(str::trim) {
            Some(scope) if !scope.is_empty() => scope.parse::<SearchScope>()?,
            _ => SearchScope::default(),
        };
        let attributes = match request.attributes.as_deref() {
            Some(list) => parse_attributes(list)?,
            None => Vec::new(),
        };
        let base_dn = request
            .base_dn
            .as_deref()
            .map_or_else(|| config.base_dn().to_string(), |base| base.trim().to_string());
        let filter = request
            .filter
            .as_deref()
            .map(str::trim)
            .filter(|filter| !filter.is_empty())
            .unwrap_or(DEFAULT_FILTER)
            .to_string();
        let limit = clamp_limit(request.limit);

        let everything = attributes.is_empty() || attributes.iter().any(|a| a == "*" || a == "+");
        let search = SearchRequest::new(base_dn.clone(), scope, filter.clone())
            .with_attributes(attributes.iter().cloned())
            .with_attrs_only(request.attrs_only);
        let plan = Collect::new(search, limit)
            .with_projection((!everything).then_some(attributes.as_slice()));

        let collected = self.collect_once(config, plan).await?;

        Ok(ToolResponse::new("ldap_search", limit, collected.items)
            .echo("base_dn", base_dn)
            .echo("scope", scope.as_str())
            .echo("filter", filter)
            .echo(
                "attributes_requested",
                request.attributes.map_or(Value::Null, Value::from),
            )
            .echo("attrs_only", request.attrs_only))
    }
}
