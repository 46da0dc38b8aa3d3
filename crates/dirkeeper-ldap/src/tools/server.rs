use super::{finish, DirectoryTools};
use crate::client::DirectorySession;
use crate::monitor::{
    backend_for_suffix_request, backend_list_request, backend_monitor_dn, health_checks,
    monitor_request, HealthCheck, MonitorTarget, SERVER_MONITOR_DN,
};
use crate::normalize::{normalize_entry, NormalizedEntry};
use crate::Result;
use dirkeeper_core::{DirectoryConfig, Error};
use serde::Serialize;
use tracing::debug;

/// Response of `get_monitor_info`.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorResponse {
    /// Always `monitor`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Backend whose monitor was read, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    /// Suffix that selected the backend, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    /// The monitor entry.
    pub item: NormalizedEntry,
}

/// Response of `list_health_checks`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResponse {
    /// Always `health_checks`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Backends found on the server.
    pub backends: Vec<String>,
    /// Number of checks listed.
    pub total_returned: usize,
    /// Available checks.
    pub items: Vec<HealthCheck>,
}

impl DirectoryTools {
    /// Reads the server monitor, or the monitor of one backend chosen by name or suffix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if both a backend and a suffix are given,
    /// [`Error::NotFound`] if the suffix has no backend or the monitor entry is missing, or any
    /// directory error.
    pub async fn get_monitor_info(
        &self,
        config: &DirectoryConfig,
        backend: Option<&str>,
        suffix: Option<&str>,
    ) -> Result<MonitorResponse> {
        let target = MonitorTarget::from_params(backend, suffix)?;
        let mut session = self.open(config).await?;
        let outcome = read_monitor(session.as_mut(), &target).await;
        finish(session, outcome).await
    }

    /// Lists the health checks available on the server, including per-backend checks.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be reached or the backend list cannot be read.
    pub async fn list_health_checks(
        &self,
        config: &DirectoryConfig,
    ) -> Result<HealthCheckResponse> {
        let mut session = self.open(config).await?;
        let outcome = session.search(&backend_list_request()).await;
        let entries = finish(session, outcome).await?;

        let backends = entries
            .iter()
            .filter_map(|entry| entry.first("cn").map(str::to_string))
            .collect::<Vec<_>>();
        let items = health_checks(&backends);

        Ok(HealthCheckResponse {
            kind: "health_checks",
            backends,
            total_returned: items.len(),
            items,
        })
    }
}

async fn read_monitor(
    session: &mut dyn DirectorySession,
    target: &MonitorTarget,
) -> Result<MonitorResponse> {
    let (dn, backend, suffix) = match target {
        MonitorTarget::Server => (SERVER_MONITOR_DN.to_string(), None, None),
        MonitorTarget::Backend(backend) => {
            (backend_monitor_dn(backend)?, Some(backend.clone()), None)
        }
        MonitorTarget::Suffix(suffix) => {
            let backend = resolve_backend(session, suffix).await?;
            (
                backend_monitor_dn(&backend)?,
                Some(backend),
                Some(suffix.clone()),
            )
        }
    };

    debug!(%dn, "Reading monitor entry");
    let entry = session
        .search(&monitor_request(&dn))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotFound(format!("Monitor entry '{dn}' does not exist")))?;

    Ok(MonitorResponse {
        kind: "monitor",
        backend,
        suffix,
        item: normalize_entry(&entry, None)?,
    })
}

async fn resolve_backend(session: &mut dyn DirectorySession, suffix: &str) -> Result<String> {
    session
        .search(&backend_for_suffix_request(suffix))
        .await?
        .iter()
        .find_map(|entry| entry.first("cn").map(str::to_string))
        .ok_or_else(|| Error::NotFound(format!("No backend found for suffix '{suffix}'")))
}
