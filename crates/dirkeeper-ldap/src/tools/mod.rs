//! Tool operations.
//!
//! Every tool runs the same pipeline: open one bound session, build a filter, enumerate entries up
//! to [`SAFETY_BOUND`], normalize and classify them, apply post-filters, stop at the caller's limit
//! and unbind. The session is unbound whatever the outcome; only a failed connect skips that step.

mod directory;
mod groups;
mod server;
mod users;

pub use directory::LdapSearchRequest;
pub use server::{HealthCheckResponse, MonitorResponse};
pub use users::{AdvancedSearchRequest, UserDetailsResponse};

use crate::client::{DirectoryConnector, DirectorySession, Ldap3Connector, SearchRequest};
use crate::normalize::{normalize_entry, NormalizedEntry};
use crate::status::{classify, SimpleStatus};
use crate::Result;
use dirkeeper_core::DirectoryConfig;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Limit used when the caller gives none.
pub const DEFAULT_LIMIT: usize = 50;

/// Largest limit a caller may request.
pub const MAX_LIMIT: usize = 1000;

/// Upper bound on entries requested from the server per search.
pub const SAFETY_BOUND: usize = 1000;

/// Clamps a caller-supplied limit into `1..=MAX_LIMIT`.
#[must_use]
pub fn clamp_limit(limit: Option<i64>) -> usize {
    limit.map_or(DEFAULT_LIMIT, |requested| {
        usize::try_from(requested.clamp(1, MAX_LIMIT as i64)).unwrap_or(DEFAULT_LIMIT)
    })
}

/// Uniform listing response: `{type, ...echoed params, total_returned, limit_applied, items}`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse<T = NormalizedEntry> {
    /// Tag of the producing tool.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Echoed request parameters and tool-specific counters.
    #[serde(flatten)]
    pub echo: Map<String, Value>,
    /// Number of items returned.
    pub total_returned: usize,
    /// Limit in force.
    pub limit_applied: usize,
    /// Returned items.
    pub items: Vec<T>,
}

impl<T> ToolResponse<T> {
    /// Creates a response; `total_returned` is derived from `items`.
    #[must_use]
    pub fn new(kind: &'static str, limit_applied: usize, items: Vec<T>) -> Self {
        Self {
            kind,
            echo: Map::new(),
            total_returned: items.len(),
            limit_applied,
            items,
        }
    }

    /// Adds an echoed field.
    #[must_use]
    pub fn echo(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.echo.insert(key.to_string(), value.into());
        self
    }
}

/// Entry point for all tool operations.
#[derive(Clone)]
pub struct DirectoryTools {
    connector: Arc<dyn DirectoryConnector>,
}

impl Default for DirectoryTools {
    fn default() -> Self {
        Self::new(Arc::new(Ldap3Connector::new()))
    }
}

impl DirectoryTools {
    /// Creates the tool set over a custom connector.
    #[must_use]
    pub fn new(connector: Arc<dyn DirectoryConnector>) -> Self {
        Self { connector }
    }

    async fn open(&self, config: &DirectoryConfig) -> Result<Box<dyn DirectorySession>> {
        self.connector.connect(config).await
    }

    /// Opens a session, runs one collection and unbinds.
    async fn collect_once(&self, config: &DirectoryConfig, plan: Collect<'_>) -> Result<Collected> {
        let mut session = self.open(config).await?;
        let outcome = collect(session.as_mut(), &plan).await;
        finish(session, outcome).await
    }
}

/// Unbinds `session` and hands back `outcome`. Unbind failures are logged only.
async fn finish<T>(mut session: Box<dyn DirectorySession>, outcome: Result<T>) -> Result<T> {
    if let Err(err) = session.unbind().await {
        warn!(error = %err, "Failed to unbind directory session");
    }
    outcome
}

/// One enumeration: what to search for and what to keep.
pub(crate) struct Collect<'a> {
    request: SearchRequest,
    projection: Option<&'a [String]>,
    status_base_dn: Option<&'a str>,
    status_filter: Option<SimpleStatus>,
    limit: usize,
}

impl<'a> Collect<'a> {
    fn new(request: SearchRequest, limit: usize) -> Self {
        Self {
            request: request.with_size_limit(SAFETY_BOUND),
            projection: None,
            status_base_dn: None,
            status_filter: None,
            limit,
        }
    }

    /// Attaches `computed_status`, evaluating roles under `base_dn`.
    fn with_status(mut self, base_dn: &'a str) -> Self {
        self.status_base_dn = Some(base_dn);
        self
    }

    /// Keeps only entries whose simplified status equals `status`.
    fn only_status(mut self, status: Option<SimpleStatus>) -> Self {
        self.status_filter = status;
        self
    }

    fn with_projection(mut self, projection: Option<&'a [String]>) -> Self {
        self.projection = projection;
        self
    }
}

pub(crate) struct Collected {
    items: Vec<NormalizedEntry>,
    total_processed: usize,
}

async fn collect(session: &mut dyn DirectorySession, plan: &Collect<'_>) -> Result<Collected> {
    let entries = session.search(&plan.request).await?;
    let mut items = Vec::with_capacity(plan.limit.min(entries.len()));
    let mut total_processed = 0;

    for entry in &entries {
        if items.len() >= plan.limit {
            break;
        }
        total_processed += 1;

        let mut item = match normalize_entry(entry, plan.projection) {
            Ok(item) => item,
            Err(err) => {
                warn!(dn = %entry.dn, error = %err, "Skipping entry that failed to normalize");
                continue;
            }
        };

        if let Some(base_dn) = plan.status_base_dn {
            let status = classify(session, &entry.dn, base_dn).await;
            if plan
                .status_filter
                .is_some_and(|wanted| wanted != status.simple_status)
            {
                continue;
            }
            if let Err(err) = item.attach_status(&status) {
                warn!(
                    dn = %entry.dn,
                    error = %err,
                    "Skipping entry whose status could not be attached"
                );
                continue;
            }
        }

        items.push(item);
    }

    debug!(
        base_dn = %plan.request.base_dn,
        received = entries.len(),
        processed = total_processed,
        kept = items.len(),
        "Collected directory entries"
    );

    Ok(Collected {
        items,
        total_processed,
    })
}
