//! Directory sessions backed by `ldap3`.

use crate::account::{self, AccountPolicy, RawAccountStatus, ACCOUNT_POLICY_CONFIG_DN};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use dirkeeper_core::{ConnectionTarget, DirectoryConfig, Error};
use ldap3::{LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry, SearchOptions};
use native_tls::{Certificate, TlsConnector};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

const SERVICE: &str = "ldap";

const RC_SUCCESS: u32 = 0;
const RC_SIZE_LIMIT_EXCEEDED: u32 = 4;
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_FILTER_ERROR: u32 = 87;

/// Represents the search scope for LDAP queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    #[default]
    Subtree,
}

impl SearchScope {
    /// Upper-case name used in tool parameters and responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Base => "BASE",
            Self::OneLevel => "ONELEVEL",
            Self::Subtree => "SUBTREE",
        }
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BASE" => Ok(Self::Base),
            "ONELEVEL" | "ONE" | "ONE_LEVEL" => Ok(Self::OneLevel),
            "SUBTREE" | "SUB" => Ok(Self::Subtree),
            _ => Err(Error::InvalidScope(s.to_string())),
        }
    }
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// LDAP entry representation used by the client.
///
/// Attribute names keep the spelling the server returned; lookups ignore case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute map (values preserve server order).
    pub attributes: HashMap<String, Vec<String>>,
}

impl LdapEntry {
    /// Returns all values for the attribute.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
            .map(|(_, values)| values.as_slice())
    }

    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.values(attribute)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Parses the attribute as boolean (`true` / `1`).
    #[must_use]
    pub fn bool_value(&self, attribute: &str) -> bool {
        self.first(attribute)
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("true") || value.trim() == "1")
    }
}

/// Parameters of one search operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Search base.
    pub base_dn: String,
    /// Search scope.
    pub scope: SearchScope,
    /// RFC 4515 filter.
    pub filter: String,
    /// Attributes to return; empty means all user attributes.
    pub attributes: Vec<String>,
    /// Return attribute names without values.
    pub attrs_only: bool,
    /// Server-side size limit; zero means none.
    pub size_limit: i32,
}

impl SearchRequest {
    /// Creates a request returning all user attributes.
    #[must_use]
    pub fn new(base_dn: impl Into<String>, scope: SearchScope, filter: impl Into<String>) -> Self {
        Self {
            base_dn: base_dn.into(),
            scope,
            filter: filter.into(),
            attributes: Vec::new(),
            attrs_only: false,
            size_limit: 0,
        }
    }

    /// Reads a single entry.
    #[must_use]
    pub fn base_object(dn: impl Into<String>) -> Self {
        Self::new(dn, SearchScope::Base, "(objectClass=*)")
    }

    /// Restricts the returned attributes.
    #[must_use]
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Requests attribute names only.
    #[must_use]
    pub const fn with_attrs_only(mut self, attrs_only: bool) -> Self {
        self.attrs_only = attrs_only;
        self
    }

    /// Sets the server-side size limit.
    #[must_use]
    pub fn with_size_limit(mut self, limit: usize) -> Self {
        self.size_limit = i32::try_from(limit).unwrap_or(i32::MAX);
        self
    }
}

/// A bound directory session.
///
/// The session is owned by exactly one tool call; callers must [`unbind`](Self::unbind) it when
/// they are done, on success and failure alike.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectorySession: Send {
    /// Runs a search and returns the matching entries.
    ///
    /// A size-limit overrun is not an error; the entries received so far are returned.
    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<LdapEntry>>;

    /// Computes the account state of the entry at `dn`, evaluating roles under `base_dn`.
    async fn account_status(&mut self, dn: &str, base_dn: &str) -> Result<RawAccountStatus>;

    /// Closes the session.
    async fn unbind(&mut self) -> Result<()>;
}

/// Opens bound sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Connects and binds according to `config`.
    async fn connect(&self, config: &DirectoryConfig) -> Result<Box<dyn DirectorySession>>;
}

/// Real connector backed by `ldap3`.
///
/// Remote targets use a simple bind with the configured credentials; local instances are reached
/// over their `ldapi` socket with SASL EXTERNAL.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ldap3Connector;

impl Ldap3Connector {
    /// Creates a new connector instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DirectoryConnector for Ldap3Connector {
    async fn connect(&self, config: &DirectoryConfig) -> Result<Box<dyn DirectorySession>> {
        let target = config.target();
        let url = target.ldap_url();
        let settings = build_ldap_settings(config)?;

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|err| Error::ConnectionFailed(format!("{url}: {err}")))?;
        ldap3::drive!(conn);

        let bind = match &target {
            ConnectionTarget::Remote { .. } => {
                timeout(
                    config.operation_timeout(),
                    ldap.simple_bind(config.bind_dn(), config.bind_password()),
                )
                .await
            }
            ConnectionTarget::LocalInstance { .. } => {
                timeout(config.operation_timeout(), ldap.sasl_external_bind()).await
            }
        };

        bind.map_err(|_| Error::Timeout(format!("bind to {url} timed out")))?
            .and_then(ldap3::LdapResult::success)
            .map_err(|err| Error::ConnectionFailed(format!("bind to {url} rejected: {err}")))?;

        debug!(url = %url, local = target.is_local(), "Directory session bound");

        Ok(Box::new(Ldap3Session {
            inner: ldap,
            operation_timeout: config.operation_timeout(),
            policy: PolicyCache::default(),
        }))
    }
}

struct Ldap3Session {
    inner: ldap3::Ldap,
    operation_timeout: Duration,
    policy: PolicyCache,
}

/// Account policy read at most once per session.
///
/// Failed reads are not remembered; the next status evaluation retries.
#[derive(Debug, Default)]
struct PolicyCache {
    loaded: Option<Option<AccountPolicy>>,
}

impl PolicyCache {
    async fn get_or_load<F, Fut>(&mut self, load: F) -> Result<Option<AccountPolicy>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<AccountPolicy>>>,
    {
        if let Some(policy) = &self.loaded {
            return Ok(policy.clone());
        }
        let policy = load().await?;
        self.loaded = Some(policy.clone());
        Ok(policy)
    }
}

async fn read_account_policy(
    ldap: &mut ldap3::Ldap,
    operation_timeout: Duration,
) -> Result<Option<AccountPolicy>> {
    let request = SearchRequest::base_object(ACCOUNT_POLICY_CONFIG_DN)
        .with_attributes(AccountPolicy::ATTRIBUTES.iter().copied());
    match search_entries(ldap, operation_timeout, &request).await {
        Ok(entries) => {
            let policy = entries.first().map(AccountPolicy::from_entry);
            debug!(configured = policy.is_some(), "Account policy loaded");
            Ok(policy)
        }
        Err(Error::NotFound(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

async fn search_entries(
    ldap: &mut ldap3::Ldap,
    operation_timeout: Duration,
    request: &SearchRequest,
) -> Result<Vec<LdapEntry>> {
    let options = SearchOptions::new()
        .sizelimit(request.size_limit)
        .typesonly(request.attrs_only);
    let attributes = request
        .attributes
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>();

    let ldap3::SearchResult(entries, result) = timeout(
        operation_timeout,
        ldap.with_search_options(options).search(
            &request.base_dn,
            request.scope.into(),
            &request.filter,
            attributes,
        ),
    )
    .await
    .map_err(|_| Error::Timeout(format!("search under {} timed out", request.base_dn)))?
    .map_err(|err| map_ldap_error(err, request))?;

    check_search_outcome(result.rc, &result.text, request)?;

    let entries = entries
        .into_iter()
        .map(SearchEntry::construct)
        .map(|entry| LdapEntry {
            dn: entry.dn,
            attributes: entry.attrs,
        })
        .collect::<Vec<_>>();

    debug!(
        base_dn = %request.base_dn,
        scope = %request.scope,
        filter = %request.filter,
        returned = entries.len(),
        "Directory search completed"
    );
    Ok(entries)
}

#[async_trait]
impl DirectorySession for Ldap3Session {
    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<LdapEntry>> {
        search_entries(&mut self.inner, self.operation_timeout, request).await
    }

    async fn account_status(&mut self, dn: &str, base_dn: &str) -> Result<RawAccountStatus> {
        let operation_timeout = self.operation_timeout;
        let ldap = &mut self.inner;
        let policy = self
            .policy
            .get_or_load(move || read_account_policy(ldap, operation_timeout))
            .await?;
        let attributes = policy.clone().unwrap_or_default().entry_attributes();
        let request = SearchRequest::base_object(dn).with_attributes(attributes);
        let entry = self
            .search(&request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("entry '{dn}' does not exist")))?;

        Ok(account::evaluate(&entry, policy.as_ref(), base_dn, Utc::now()))
    }

    async fn unbind(&mut self) -> Result<()> {
        timeout(self.operation_timeout, self.inner.unbind())
            .await
            .map_err(|_| Error::Timeout("unbind timed out".to_string()))?
            .map_err(|err| Error::ExternalServiceError {
                service: SERVICE.to_string(),
                message: err.to_string(),
            })
    }
}

fn build_ldap_settings(config: &DirectoryConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new().set_conn_timeout(config.connect_timeout());

    if config.target().is_local() {
        return Ok(settings);
    }

    if !config.tls_verify() {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to construct TLS connector: {err}"))
            })?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = config.tls_ca_cert() {
        let pem = fs::read(cert_path).map_err(|err| {
            Error::ConfigError(format!(
                "failed to read CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| Error::ConfigError(format!("invalid CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| Error::ConfigError(format!("failed to load CA certificate: {err}")))?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

/// Maps a search result code onto the error model. Size-limit overruns count as success.
fn check_search_outcome(rc: u32, text: &str, request: &SearchRequest) -> Result<()> {
    match rc {
        RC_SUCCESS | RC_SIZE_LIMIT_EXCEEDED => Ok(()),
        RC_NO_SUCH_OBJECT => Err(Error::NotFound(format!(
            "Base DN '{}' does not exist",
            request.base_dn
        ))),
        RC_FILTER_ERROR => Err(Error::InvalidFilter(if text.is_empty() {
            request.filter.clone()
        } else {
            format!("{} ({text})", request.filter)
        })),
        _ => Err(Error::ExternalServiceError {
            service: SERVICE.to_string(),
            message: format!(
                "search under {} failed with result code {rc}: {text}",
                request.base_dn
            ),
        }),
    }
}

fn map_ldap_error(err: LdapError, request: &SearchRequest) -> Error {
    match err {
        LdapError::FilterParsing => Error::InvalidFilter(request.filter.clone()),
        LdapError::LdapResult { result } => {
            match check_search_outcome(result.rc, &result.text, request) {
                Ok(()) => Error::InternalError(format!(
                    "unexpected success code {} reported as error",
                    result.rc
                )),
                Err(err) => err,
            }
        }
        other => Error::ExternalServiceError {
            service: SERVICE.to_string(),
            message: other.to_string(),
        },
    }
}
