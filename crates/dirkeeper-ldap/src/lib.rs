//! Directory access and tool pipeline for DirKeeper.
//!
//! This crate turns high-level directory questions (list users, search by name, who is locked,
//! what does the monitor say) into LDAP searches against a 389 Directory Server, and shapes the
//! results into JSON-ready records. The wire protocol is handled by `ldap3`; everything here sits
//! behind the [`DirectoryConnector`] / [`DirectorySession`] traits so the pipeline can be driven by
//! mocks in tests.

#![deny(missing_docs)]

mod account;
mod client;
mod dn;
pub mod filter;
pub mod monitor;
mod normalize;
mod status;
pub mod tools;
mod value;

pub use account::{AccountPolicy, AccountState, RawAccountStatus, ACCOUNT_POLICY_CONFIG_DN};
pub use client::{
    DirectoryConnector, DirectorySession, Ldap3Connector, LdapEntry, SearchRequest, SearchScope,
};
pub use dn::{DistinguishedName, DistinguishedNameError, RelativeDistinguishedName};
pub use filter::{AdvancedFilters, SearchMode};
pub use normalize::{normalize_entry, NormalizedEntry};
pub use status::{classify, AccountStatus, SimpleStatus};
pub use tools::{
    AdvancedSearchRequest, DirectoryTools, HealthCheckResponse, LdapSearchRequest, MonitorResponse,
    ToolResponse, UserDetailsResponse,
};
pub use value::DirectoryValue;

/// Convenient result alias that reuses the core error type.
pub type Result<T> = dirkeeper_core::Result<T>;
