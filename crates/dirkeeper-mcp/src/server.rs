//! MCP server exposing the directory tools.
//!
//! Every tool call resolves a fresh [`DirectoryConfig`], runs one [`DirectoryTools`] operation and
//! renders the outcome as a single text content: pretty JSON on success, a structured error body
//! with `isError` set on failure. Tool failures never surface as protocol errors.

use crate::params::{
    AdvancedSearchInput, LdapSearchInput, LimitInput, MonitorInput, SearchByAttributeInput,
    SearchByNameInput, UserDetailsInput,
};
use dirkeeper_core::{DirectoryConfig, Error, Result as CoreResult};
use dirkeeper_ldap::DirectoryTools;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error};

/// Resolves the directory configuration for one tool call.
pub type ConfigLoader = Arc<dyn Fn() -> CoreResult<DirectoryConfig> + Send + Sync>;

const INSTRUCTIONS: &str = "Read-only access to a 389 Directory Server. List and search users and \
groups, inspect a single user with its computed account status (active, inactive, locked or \
unknown), list active or locked accounts, combine name and attribute criteria with \
advanced_search, read server or backend monitors, list health checks, or run a raw ldap_search. \
Connection settings come from the LDAP_* environment variables.";

/// DirKeeper MCP server.
#[derive(Clone)]
pub struct DirKeeperServer {
    tools: DirectoryTools,
    load_config: ConfigLoader,
    tool_router: ToolRouter<Self>,
}

impl Default for DirKeeperServer {
    fn default() -> Self {
        Self::new(DirectoryTools::default(), Arc::new(DirectoryConfig::from_env))
    }
}

#[tool_router]
impl DirKeeperServer {
    /// Creates a server over the given tools and configuration source.
    #[must_use]
    pub fn new(tools: DirectoryTools, load_config: ConfigLoader) -> Self {
        Self {
            tools,
            load_config,
            tool_router: Self::tool_router(),
        }
    }

    fn config(&self) -> CoreResult<DirectoryConfig> {
        (self.load_config)()
    }

    #[tool(
        name = "list_all_users",
        description = "List user entries with their computed account status."
    )]
    async fn list_all_users(
        &self,
        Parameters(input): Parameters<LimitInput>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = async {
            let config = self.config()?;
            self.tools.list_all_users(&config, input.limit).await
        }
        .await;
        Ok(render("list_all_users", outcome))
    }

    #[tool(
        name = "list_all_groups",
        description = "List group entries (groupOfNames, groupOfUniqueNames, posixGroup)."
    )]
    async fn list_all_groups(
        &self,
        Parameters(input): Parameters<LimitInput>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = async {
            let config = self.config()?;
            self.tools.list_all_groups(&config, input.limit).await
        }
        .await;
        Ok(render("list_all_groups", outcome))
    }

    #[tool(
        name = "search_users_by_name",
        description = "Search users by uid, cn, sn, givenName, mail or displayName. \
                       Modes: exact, wildcard (default), fuzzy."
    )]
    async fn search_users_by_name(
        &self,
        Parameters(input): Parameters<SearchByNameInput>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = async {
            let config = self.config()?;
            self.tools
                .search_users_by_name(
                    &config,
                    &input.name,
                    input.search_mode.as_deref(),
                    input.limit,
                )
                .await
        }
        .await;
        Ok(render("search_users_by_name", outcome))
    }

    #[tool(
        name = "search_users_by_attribute",
        description = "Search users whose attribute contains a value, e.g. employeeType=Contractor."
    )]
    async fn search_users_by_attribute(
        &self,
        Parameters(input): Parameters<SearchByAttributeInput>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = async {
            let config = self.config()?;
            self.tools
                .search_users_by_attribute(&config, &input.attribute, &input.value, input.limit)
                .await
        }
        .await;
        Ok(render("search_users_by_attribute", outcome))
    }

    #[tool(
        name = "get_user_details",
        description = "Get one user by uid, including the computed account status."
    )]
    async fn get_user_details(
        &self,
        Parameters(input): Parameters<UserDetailsInput>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = async {
            let config = self.config()?;
            self.tools.get_user_details(&config, &input.username).await
        }
        .await;
        Ok(render("get_user_details", outcome))
    }

    #[tool(
        name = "list_active_users",
        description = "List users whose computed account status is active."
    )]
    async fn list_active_users(
        &self,
        Parameters(input): Parameters<LimitInput>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = async {
            let config = self.config()?;
            self.tools.list_active_users(&config, input.limit).await
        }
        .await;
        Ok(render("list_active_users", outcome))
    }

    #[tool(
        name = "list_locked_users",
        description = "List users whose account is locked directly or through a role."
    )]
    async fn list_locked_users(
        &self,
        Parameters(input): Parameters<LimitInput>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = async {
            let config = self.config()?;
            self.tools.list_locked_users(&config, input.limit).await
        }
        .await;
        Ok(render("list_locked_users", outcome))
    }

    #[tool(
        name = "advanced_search",
        description = "Search users by name term combined with group membership, attribute, \
                       last-login, status and custom filter criteria. A filter the server \
                       rejects falls back to listing all users (reported as fallback_used)."
    )]
    async fn advanced_search(
        &self,
        Parameters(input): Parameters<AdvancedSearchInput>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = async {
            let request = input.into_request()?;
            let config = self.config()?;
            self.tools.advanced_search(&config, request).await
        }
        .await;
        Ok(render("advanced_search", outcome))
    }

    #[tool(
        name = "get_monitor_info",
        description = "Read cn=monitor, or the monitor of a backend chosen by name or suffix."
    )]
    async fn get_monitor_info(
        &self,
        Parameters(input): Parameters<MonitorInput>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = async {
            let config = self.config()?;
            self.tools
                .get_monitor_info(&config, input.backend.as_deref(), input.suffix.as_deref())
                .await
        }
        .await;
        Ok(render("get_monitor_info", outcome))
    }

    #[tool(
        name = "list_health_checks",
        description = "List the server and per-backend health checks available."
    )]
    async fn list_health_checks(&self) -> Result<CallToolResult, McpError> {
        let outcome = async {
            let config = self.config()?;
            self.tools.list_health_checks(&config).await
        }
        .await;
        Ok(render("list_health_checks", outcome))
    }

    #[tool(
        name = "ldap_search",
        description = "Run a raw LDAP search. Scope is BASE, ONELEVEL or SUBTREE; attributes is \
                       a comma-separated list."
    )]
    async fn ldap_search(
        &self,
        Parameters(input): Parameters<LdapSearchInput>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = async {
            let config = self.config()?;
            self.tools.ldap_search(&config, input.into()).await
        }
        .await;
        Ok(render("ldap_search", outcome))
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for DirKeeperServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "DirKeeper".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Renders a tool outcome as one text content.
///
/// Failures carry the structured `{error: {code, message}, tool}` body.
fn render<T: Serialize>(tool: &str, outcome: CoreResult<T>) -> CallToolResult {
    match outcome.and_then(|value| serde_json::to_string_pretty(&value).map_err(Error::from)) {
        Ok(json) => CallToolResult::success(vec![Content::text(json)]),
        Err(err) => {
            if err.should_log() {
                error!(tool, code = err.error_code(), error = %err, "Tool call failed");
            } else {
                debug!(tool, code = err.error_code(), error = %err, "Tool call rejected");
            }
            let message = err.to_string();
            let response = err.into_error_response_for(Some(tool.to_string()));
            let body = serde_json::to_string_pretty(&response).unwrap_or(message);
            CallToolResult::error(vec![Content::text(body)])
        }
    }
}
