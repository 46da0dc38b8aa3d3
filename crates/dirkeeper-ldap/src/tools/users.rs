use super::{clamp_limit, collect, finish, Collect, Collected, DirectoryTools, ToolResponse};
use crate::client::{DirectorySession, SearchRequest, SearchScope};
use crate::filter::{
    advanced_filter, attribute_search_filter, combine_search, escape_filter_value_strict,
    is_valid_attribute_name, name_search_filter, scoped, AdvancedFilters, SearchMode,
    USER_OBJECT_FILTER,
};
use crate::normalize::NormalizedEntry;
use crate::status::SimpleStatus;
use crate::Result;
use dirkeeper_core::{DirectoryConfig, Error};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

/// Parameters of an advanced user search.
#[derive(Debug, Clone, Default)]
pub struct AdvancedSearchRequest {
    /// Optional name term, matched like a name search.
    pub search_term: Option<String>,
    /// Matching mode of the term; unknown values mean wildcard.
    pub search_mode: Option<String>,
    /// Structured criteria.
    pub filters: AdvancedFilters,
    /// Requested limit.
    pub limit: Option<i64>,
}

/// Response of `get_user_details`.
#[derive(Debug, Clone, Serialize)]
pub struct UserDetailsResponse {
    /// Always `user_details`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Requested user id.
    pub username: String,
    /// The matching entry with its computed status.
    pub user: NormalizedEntry,
}

fn user_plan(config: &DirectoryConfig, filter: String, limit: usize) -> Collect<'_> {
    let request = SearchRequest::new(config.user_base_dn(), SearchScope::Subtree, filter);
    Collect::new(request, limit).with_status(config.base_dn())
}

fn non_empty<'a>(name: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidRequest(format!("{name} must not be empty")));
    }
    Ok(trimmed)
}

impl DirectoryTools {
    /// Lists user entries with their computed status.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be reached or the search fails.
    pub async fn list_all_users(
        &self,
        config: &DirectoryConfig,
        limit: Option<i64>,
    ) -> Result<ToolResponse> {
        let limit = clamp_limit(limit);
        let collected = self
            .collect_once(config, user_plan(config, USER_OBJECT_FILTER.to_string(), limit))
            .await?;
        Ok(ToolResponse::new("user_list", limit, collected.items))
    }

    /// Searches users by name across the searchable attributes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for a blank name, or any directory error.
    pub async fn search_users_by_name(
        &self,
        config: &DirectoryConfig,
        name: &str,
        search_mode: Option<&str>,
        limit: Option<i64>,
    ) -> Result<ToolResponse> {
        let name = non_empty("name", name)?;
        let mode = search_mode.map(SearchMode::parse_lenient).unwrap_or_default();
        let limit = clamp_limit(limit);

        let filter = scoped(USER_OBJECT_FILTER, Some(name_search_filter(name, mode).as_str()));
        let collected = self
            .collect_once(config, user_plan(config, filter, limit))
            .await?;

        Ok(ToolResponse::new("user_search", limit, collected.items)
            .echo("search_term", name)
            .echo("search_mode", mode.as_str()))
    }

    /// Searches users whose `attribute` contains `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for an invalid attribute name or blank value, or any
    /// directory error.
    pub async fn search_users_by_attribute(
        &self,
        config: &DirectoryConfig,
        attribute: &str,
        value: &str,
        limit: Option<i64>,
    ) -> Result<ToolResponse> {
        let attribute = attribute.trim();
        if !is_valid_attribute_name(attribute) {
            return Err(Error::InvalidRequest(format!(
                "invalid attribute name `{attribute}`"
            )));
        }
        let value = non_empty("value", value)?;
        let limit = clamp_limit(limit);

        let filter = scoped(
            USER_OBJECT_FILTER,
            Some(attribute_search_filter(attribute, value).as_str()),
        );
        let collected = self
            .collect_once(config, user_plan(config, filter, limit))
            .await?;

        Ok(ToolResponse::new("attribute_search", limit, collected.items)
            .echo("attribute", attribute)
            .echo("value", value))
    }

    /// Fetches one user by `uid`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no user has that `uid`, or any directory error.
    pub async fn get_user_details(
        &self,
        config: &DirectoryConfig,
        username: &str,
    ) -> Result<UserDetailsResponse> {
        let username = non_empty("username", username)?;
        let filter = scoped(
            USER_OBJECT_FILTER,
            Some(format!("(uid={})", escape_filter_value_strict(username)).as_str()),
        );

        let collected = self
            .collect_once(config, user_plan(config, filter, 1))
            .await?;
        let user = collected
            .items
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("User '{username}' not found")))?;

        Ok(UserDetailsResponse {
            kind: "user_details",
            username: username.to_string(),
            user,
        })
    }

    /// Lists users whose computed status is `active`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be reached or the search fails.
    pub async fn list_active_users(
        &self,
        config: &DirectoryConfig,
        limit: Option<i64>,
    ) -> Result<ToolResponse> {
        self.list_by_status(config, SimpleStatus::Active, "active_users", limit)
            .await
    }

    /// Lists users whose computed status is `locked`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be reached or the search fails.
    pub async fn list_locked_users(
        &self,
        config: &DirectoryConfig,
        limit: Option<i64>,
    ) -> Result<ToolResponse> {
        self.list_by_status(config, SimpleStatus::Locked, "locked_users", limit)
            .await
    }

    async fn list_by_status(
        &self,
        config: &DirectoryConfig,
        status: SimpleStatus,
        kind: &'static str,
        limit: Option<i64>,
    ) -> Result<ToolResponse> {
        let limit = clamp_limit(limit);
        let plan =
            user_plan(config, USER_OBJECT_FILTER.to_string(), limit).only_status(Some(status));
        let collected = self.collect_once(config, plan).await?;

        let found = collected.items.len();
        Ok(ToolResponse::new(kind, limit, collected.items)
            .echo(&format!("{kind}_found"), found)
            .echo("total_processed", collected.total_processed))
    }

    /// Combines a name term with structured criteria.
    ///
    /// If the server rejects the compiled filter, the search is retried with the plain user filter
    /// and the response reports `fallback_used`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be reached or a search fails for a reason other
    /// than a rejected filter.
    pub async fn advanced_search(
        &self,
        config: &DirectoryConfig,
        request: AdvancedSearchRequest,
    ) -> Result<ToolResponse> {
        let mode = request
            .search_mode
            .as_deref()
            .map(SearchMode::parse_lenient)
            .unwrap_or_default();
        let term = request
            .search_term
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty());
        let limit = clamp_limit(request.limit);

        let criteria = advanced_filter(&request.filters, &config.group_base_dn());
        let combined = combine_search(term.map(|t| name_search_filter(t, mode)), criteria);
        let filter = scoped(USER_OBJECT_FILTER, combined.as_deref());

        let mut session = self.open(config).await?;
        let outcome =
            advanced_collect(session.as_mut(), config, filter, request.filters.status, limit).await;
        let (collected, filter_applied, fallback_used) = finish(session, outcome).await?;

        info!(
            filter = %filter_applied,
            fallback_used,
            returned = collected.items.len(),
            "Advanced search completed"
        );

        Ok(ToolResponse::new("advanced_search", limit, collected.items)
            .echo("search_term", term.map_or(Value::Null, Value::from))
            .echo("search_mode", mode.as_str())
            .echo("filters", serde_json::to_value(&request.filters)?)
            .echo("filter_applied", filter_applied)
            .echo("fallback_used", fallback_used)
            .echo("total_processed", collected.total_processed))
    }
}

async fn advanced_collect(
    session: &mut dyn DirectorySession,
    config: &DirectoryConfig,
    filter: String,
    status: Option<SimpleStatus>,
    limit: usize,
) -> Result<(Collected, String, bool)> {
    let plan = user_plan(config, filter.clone(), limit).only_status(status);
    match collect(session, &plan).await {
        Ok(collected) => Ok((collected, filter, false)),
        Err(Error::InvalidFilter(detail)) => {
            warn!(
                %filter,
                %detail,
                "Advanced search filter rejected, retrying with the user filter"
            );
            let plan =
                user_plan(config, USER_OBJECT_FILTER.to_string(), limit).only_status(status);
            let collected = collect(session, &plan).await?;
            Ok((collected, USER_OBJECT_FILTER.to_string(), true))
        }
        Err(err) => Err(err),
    }
}
