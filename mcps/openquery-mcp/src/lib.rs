//! OpenQuery MCP Library
//!
//! Exposes configured SQL databases (SQLite, Postgres) to a tool-calling
//! agent and registers ad-hoc queries as content-addressed live chart
//! plots. The renderer runs as a supervised in-process task per plot id;
//! the hosting process supplies the actual chart widget behind the
//! [`renderer::ChartSurface`] trait.
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use openquery_mcp::OpenQueryMcpServer;
//!
//! let server = OpenQueryMcpServer::new();
//! // Serve via stdio, or drive the registry/renderer directly
//! ```

pub mod adapter;
pub mod config;
pub mod directory;
pub mod error;
pub mod mediator;
pub mod normalize;
pub mod registry;
pub mod renderer;
pub mod server;
pub mod types;

mod store;

// Re-export main server type
pub use server::OpenQueryMcpServer;

// Re-export the pieces a hosting process wires together
pub use renderer::{ChartFrame, ChartSurface, RendererSupervisor};
