//! # dirkeeper-mcp
//!
//! Model Context Protocol front end for DirKeeper. The server speaks MCP over stdio and exposes
//! one tool per directory operation of [`dirkeeper_ldap::DirectoryTools`].

#![deny(missing_docs)]

pub mod params;
pub mod server;

pub use server::{ConfigLoader, DirKeeperServer};

use rmcp::ServiceExt;
use tracing::info;

/// Serves DirKeeper over stdin/stdout until the client disconnects.
///
/// # Errors
///
/// Returns an error if the MCP handshake or the transport fails.
pub async fn run_stdio_server() -> anyhow::Result<()> {
    info!("Starting DirKeeper MCP server on stdio");

    let service = DirKeeperServer::default()
        .serve(rmcp::transport::stdio())
        .await?;
    let quit_reason = service.waiting().await?;

    info!(?quit_reason, "DirKeeper MCP server stopped");
    Ok(())
}
