//! Directory connection configuration.
//!
//! A [`DirectoryConfig`] is resolved from the process environment at the start of every tool call
//! and passed by reference to the components that need it. Nothing is cached between calls, so a
//! changed environment takes effect on the next invocation.

use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use std::env::VarError;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Environment variable holding the directory server URL.
pub const ENV_URL: &str = "LDAP_URL";
/// Environment variable holding the search base DN.
pub const ENV_BASE_DN: &str = "LDAP_BASE_DN";
/// Environment variable holding the bind DN.
pub const ENV_BIND_DN: &str = "LDAP_BIND_DN";
/// Environment variable holding the bind password.
pub const ENV_BIND_PASSWORD: &str = "LDAP_BIND_PASSWORD";
/// Environment variable selecting a local server instance (switches to `ldapi`).
pub const ENV_INSTANCE: &str = "LDAP_INSTANCE";
/// Environment variable overriding the directory holding instance sockets.
pub const ENV_SOCKET_DIR: &str = "LDAP_SOCKET_DIR";
/// Environment variable overriding the user container RDN.
pub const ENV_USER_RDN: &str = "LDAP_USER_RDN";
/// Environment variable overriding the group container RDN.
pub const ENV_GROUP_RDN: &str = "LDAP_GROUP_RDN";
/// Environment variable toggling TLS certificate verification.
pub const ENV_TLS_VERIFY: &str = "LDAP_TLS_VERIFY";
/// Environment variable pointing at a PEM CA certificate.
pub const ENV_TLS_CA_CERT: &str = "LDAP_TLS_CA_CERT";
/// Environment variable overriding the connect timeout.
pub const ENV_CONNECT_TIMEOUT: &str = "LDAP_CONNECT_TIMEOUT_SECS";
/// Environment variable overriding the per-operation timeout.
pub const ENV_OPERATION_TIMEOUT: &str = "LDAP_OPERATION_TIMEOUT_SECS";

/// Default directory server URL.
pub const DEFAULT_URL: &str = "ldap://localhost:389";
/// Default search base.
pub const DEFAULT_BASE_DN: &str = "dc=example,dc=com";
/// Default bind DN.
pub const DEFAULT_BIND_DN: &str = "cn=Directory Manager";
/// Default bind password.
pub const DEFAULT_BIND_PASSWORD: &str = "password";
/// Default directory holding `slapd-<instance>.socket`.
pub const DEFAULT_SOCKET_DIR: &str = "/run";
/// Default user container, relative to the base DN.
pub const DEFAULT_USER_RDN: &str = "ou=people";
/// Default group container, relative to the base DN.
pub const DEFAULT_GROUP_RDN: &str = "ou=groups";
/// Default connection timeout (seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Default operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

/// Where a session should be opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    /// Remote server reached over `ldap://` or `ldaps://` with a simple bind.
    Remote {
        /// Server URL
        url: String,
    },
    /// Local instance reached over its `ldapi` socket with SASL EXTERNAL autobind.
    LocalInstance {
        /// Instance name (the `slapd-<name>` suffix)
        instance: String,
        /// Unix socket path
        socket_path: PathBuf,
    },
}

impl ConnectionTarget {
    /// Returns the URL handed to the LDAP client.
    ///
    /// Local instances are addressed as `ldapi://` with a percent-encoded socket path.
    #[must_use]
    pub fn ldap_url(&self) -> String {
        match self {
            Self::Remote { url } => url.clone(),
            Self::LocalInstance { socket_path, .. } => {
                let encoded = socket_path.to_string_lossy().replace('/', "%2F");
                format!("ldapi://{encoded}")
            }
        }
    }

    /// Returns true when the target is a local instance socket.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::LocalInstance { .. })
    }
}

/// Connection parameters for one tool invocation.
#[derive(Debug, Validate)]
pub struct DirectoryConfig {
    url: String,

    #[validate(length(min = 1))]
    base_dn: String,

    bind_dn: String,

    bind_password: SecretString,

    instance: Option<String>,

    socket_dir: PathBuf,

    #[validate(length(min = 1))]
    user_rdn: String,

    #[validate(length(min = 1))]
    group_rdn: String,

    tls_verify: bool,

    tls_ca_cert: Option<PathBuf>,

    #[validate(range(min = 1, max = 300))]
    connect_timeout_secs: u64,

    #[validate(range(min = 1, max = 3600))]
    operation_timeout_secs: u64,
}

impl DirectoryConfig {
    /// Creates a configuration for a remote server, with defaults for everything else.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the URL or base DN is invalid.
    pub fn new(
        url: impl Into<String>,
        base_dn: impl Into<String>,
        bind_dn: impl Into<String>,
        bind_password: impl Into<String>,
    ) -> Result<Self> {
        let config = Self {
            url: url.into(),
            base_dn: base_dn.into(),
            bind_dn: bind_dn.into(),
            bind_password: SecretString::from(bind_password.into()),
            instance: None,
            socket_dir: PathBuf::from(DEFAULT_SOCKET_DIR),
            user_rdn: DEFAULT_USER_RDN.to_string(),
            group_rdn: DEFAULT_GROUP_RDN.to_string(),
            tls_verify: true,
            tls_ca_cert: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        };
        config.checked()
    }

    /// Resolves the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] when a variable holds an unparseable or invalid value.
    pub fn from_env() -> Result<Self> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Resolves the configuration from a custom variable reader.
    ///
    /// Unset and empty variables fall back to their defaults. Tests use this to supply variables
    /// without touching the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] when a variable holds an unparseable or invalid value.
    pub fn from_reader<F>(reader: F) -> Result<Self>
    where
        F: Fn(&str) -> std::result::Result<String, VarError>,
    {
        let read = |key: &str| reader(key).ok().filter(|value| !value.trim().is_empty());
        let read_or = |key: &str, default: &str| read(key).unwrap_or_else(|| default.to_string());

        let instance = read(ENV_INSTANCE).map(|name| name.trim().to_string());
        if let Some(name) = &instance {
            validate_instance_name(name)?;
        }

        let tls_verify = match read(ENV_TLS_VERIFY) {
            Some(value) => parse_flag(ENV_TLS_VERIFY, &value)?,
            None => true,
        };

        let config = Self {
            url: read_or(ENV_URL, DEFAULT_URL),
            base_dn: read_or(ENV_BASE_DN, DEFAULT_BASE_DN),
            bind_dn: read_or(ENV_BIND_DN, DEFAULT_BIND_DN),
            bind_password: SecretString::from(
                reader(ENV_BIND_PASSWORD).unwrap_or_else(|_| DEFAULT_BIND_PASSWORD.to_string()),
            ),
            instance,
            socket_dir: PathBuf::from(read_or(ENV_SOCKET_DIR, DEFAULT_SOCKET_DIR)),
            user_rdn: read_or(ENV_USER_RDN, DEFAULT_USER_RDN),
            group_rdn: read_or(ENV_GROUP_RDN, DEFAULT_GROUP_RDN),
            tls_verify,
            tls_ca_cert: read(ENV_TLS_CA_CERT).map(PathBuf::from),
            connect_timeout_secs: parse_secs(
                ENV_CONNECT_TIMEOUT,
                read(ENV_CONNECT_TIMEOUT),
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?,
            operation_timeout_secs: parse_secs(
                ENV_OPERATION_TIMEOUT,
                read(ENV_OPERATION_TIMEOUT),
                DEFAULT_OPERATION_TIMEOUT_SECS,
            )?,
        };

        let config = config.checked()?;
        tracing::debug!(
            target = ?config.target(),
            base_dn = %config.base_dn,
            "Resolved directory configuration"
        );
        Ok(config)
    }

    fn checked(self) -> Result<Self> {
        let parsed = url::Url::parse(&self.url)?;
        if !matches!(parsed.scheme(), "ldap" | "ldaps" | "ldapi") {
            return Err(Error::ConfigError(format!(
                "unsupported directory URL scheme `{}` (expected ldap, ldaps or ldapi)",
                parsed.scheme()
            )));
        }
        self.validate()?;
        Ok(self)
    }

    /// Returns the remote server URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the base distinguished name.
    #[must_use]
    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    /// Returns the bind distinguished name.
    #[must_use]
    pub fn bind_dn(&self) -> &str {
        &self.bind_dn
    }

    /// Returns the bind password.
    #[must_use]
    pub fn bind_password(&self) -> &str {
        self.bind_password.expose_secret()
    }

    /// Returns the local instance name, if one was selected.
    #[must_use]
    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    /// Returns the user container DN (`<user rdn>,<base dn>`).
    #[must_use]
    pub fn user_base_dn(&self) -> String {
        format!("{},{}", self.user_rdn, self.base_dn)
    }

    /// Returns the group container DN (`<group rdn>,<base dn>`).
    #[must_use]
    pub fn group_base_dn(&self) -> String {
        format!("{},{}", self.group_rdn, self.base_dn)
    }

    /// Returns whether TLS certificate verification is enabled.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Optional custom CA certificate path.
    #[must_use]
    pub fn tls_ca_cert(&self) -> Option<&PathBuf> {
        self.tls_ca_cert.as_ref()
    }

    /// Returns the connection timeout duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Returns the operation timeout duration.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Returns where sessions for this configuration should be opened.
    #[must_use]
    pub fn target(&self) -> ConnectionTarget {
        match &self.instance {
            Some(instance) => ConnectionTarget::LocalInstance {
                instance: instance.clone(),
                socket_path: self.socket_dir.join(format!("slapd-{instance}.socket")),
            },
            None => ConnectionTarget::Remote {
                url: self.url.clone(),
            },
        }
    }

    /// Selects a local instance.
    #[must_use]
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Overrides the group container RDN.
    #[must_use]
    pub fn with_group_rdn(mut self, rdn: impl Into<String>) -> Self {
        self.group_rdn = rdn.into();
        self
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Overrides the operation timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }
}

fn validate_instance_name(name: &str) -> Result<()> {
    let valid = name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::ConfigError(format!(
            "invalid value for {ENV_INSTANCE}: `{name}` (letters, digits, `-` and `_` only)"
        )))
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::ConfigError(format!(
            "invalid value for {key}: `{other}` is not a boolean"
        ))),
    }
}

fn parse_secs(key: &str, value: Option<String>, default: u64) -> Result<u64> {
    value.map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<u64>()
            .map_err(|e| Error::ConfigError(format!("invalid value for {key}: {e}")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn make_reader(
        vars: HashMap<&str, &str>,
    ) -> impl Fn(&str) -> std::result::Result<String, VarError> {
        let owned: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| owned.get(key).cloned().ok_or(VarError::NotPresent)
    }

    #[test]
    fn test_defaults() {
        let config = DirectoryConfig::from_reader(make_reader(HashMap::new())).unwrap();
        assert_eq!(config.url(), DEFAULT_URL);
        assert_eq!(config.base_dn(), DEFAULT_BASE_DN);
        assert_eq!(config.bind_dn(), DEFAULT_BIND_DN);
        assert_eq!(config.bind_password(), DEFAULT_BIND_PASSWORD);
        assert!(config.instance().is_none());
        assert!(config.tls_verify());
        assert_eq!(config.user_base_dn(), "ou=people,dc=example,dc=com");
        assert_eq!(config.group_base_dn(), "ou=groups,dc=example,dc=com");
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.operation_timeout(), Duration::from_secs(30));
        assert_eq!(
            config.target(),
            ConnectionTarget::Remote {
                url: DEFAULT_URL.to_string()
            }
        );
    }

    #[test]
    fn test_overrides() {
        let reader = make_reader(HashMap::from([
            (ENV_URL, "ldaps://ds.example.net:636"),
            (ENV_BASE_DN, "dc=test,dc=com"),
            (ENV_BIND_DN, "cn=admin,dc=test,dc=com"),
            (ENV_BIND_PASSWORD, "TestPassword123"),
            (ENV_USER_RDN, "ou=Staff"),
            (ENV_TLS_VERIFY, "false"),
            (ENV_OPERATION_TIMEOUT, "45"),
        ]));
        let config = DirectoryConfig::from_reader(reader).unwrap();
        assert_eq!(config.url(), "ldaps://ds.example.net:636");
        assert_eq!(config.bind_password(), "TestPassword123");
        assert_eq!(config.user_base_dn(), "ou=Staff,dc=test,dc=com");
        assert!(!config.tls_verify());
        assert_eq!(config.operation_timeout(), Duration::from_secs(45));
    }

    #[test]
    fn test_empty_values_fall_back_to_defaults() {
        let reader = make_reader(HashMap::from([(ENV_BASE_DN, "  "), (ENV_INSTANCE, "")]));
        let config = DirectoryConfig::from_reader(reader).unwrap();
        assert_eq!(config.base_dn(), DEFAULT_BASE_DN);
        assert!(config.instance().is_none());
    }

    #[test]
    fn test_local_instance_target() {
        let reader = make_reader(HashMap::from([
            (ENV_INSTANCE, "localhost"),
            (ENV_SOCKET_DIR, "/var/run/dirsrv"),
        ]));
        let config = DirectoryConfig::from_reader(reader).unwrap();
        let target = config.target();
        assert!(target.is_local());
        assert_eq!(
            target.ldap_url(),
            "ldapi://%2Fvar%2Frun%2Fdirsrv%2Fslapd-localhost.socket"
        );
    }

    #[test]
    fn test_invalid_instance_name() {
        let reader = make_reader(HashMap::from([(ENV_INSTANCE, "../etc")]));
        let err = DirectoryConfig::from_reader(reader).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
        assert!(err.to_string().contains(ENV_INSTANCE));
    }

    #[test]
    fn test_invalid_url() {
        let reader = make_reader(HashMap::from([(ENV_URL, "not a url")]));
        let err = DirectoryConfig::from_reader(reader).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
        assert!(err.to_string().contains("invalid directory URL"));
    }

    #[test]
    fn test_non_ldap_scheme_rejected() {
        let reader = make_reader(HashMap::from([(ENV_URL, "http://ds.example.net")]));
        let err = DirectoryConfig::from_reader(reader).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
        assert!(err.to_string().contains("`http`"));
    }

    #[test]
    fn test_invalid_timeout() {
        let reader = make_reader(HashMap::from([(ENV_CONNECT_TIMEOUT, "soon")]));
        let err = DirectoryConfig::from_reader(reader).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));

        let reader = make_reader(HashMap::from([(ENV_CONNECT_TIMEOUT, "0")]));
        let err = DirectoryConfig::from_reader(reader).unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_invalid_flag() {
        let reader = make_reader(HashMap::from([(ENV_TLS_VERIFY, "maybe")]));
        let err = DirectoryConfig::from_reader(reader).unwrap_err();
        assert!(err.to_string().contains(ENV_TLS_VERIFY));
    }

    #[test]
    fn test_password_redacted_in_debug() {
        let config = DirectoryConfig::new(
            "ldap://localhost:3389",
            "dc=test,dc=com",
            "cn=Directory Manager",
            "s3cr3t-value",
        )
        .unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("s3cr3t-value"));
    }

    #[test]
    fn test_builder_overrides() {
        let config = DirectoryConfig::new(
            "ldap://localhost:3389",
            "dc=test,dc=com",
            "cn=Directory Manager",
            "secret",
        )
        .unwrap()
        .with_instance("standalone1")
        .with_group_rdn("ou=Teams")
        .with_tls_verification(false)
        .with_operation_timeout_secs(5);

        assert_eq!(config.instance(), Some("standalone1"));
        assert_eq!(config.group_base_dn(), "ou=Teams,dc=test,dc=com");
        assert!(!config.tls_verify());
        assert_eq!(config.operation_timeout(), Duration::from_secs(5));
        match config.target() {
            ConnectionTarget::LocalInstance { socket_path, .. } => {
                assert_eq!(socket_path, PathBuf::from("/run/slapd-standalone1.socket"));
            }
            ConnectionTarget::Remote { .. } => panic!("expected a local instance target"),
        }
    }
}
