//! OpenQuery MCP Server
//!
//! Exposes configured SQL databases to a tool-calling agent and registers
//! ad-hoc queries as live chart plots. Read-only by convention.

mod adapter;
mod config;
mod directory;
mod error;
mod mediator;
mod normalize;
mod registry;
mod renderer;
mod server;
mod store;
mod types;

use server::OpenQueryMcpServer;

mcp_common::serve_stdio!(OpenQueryMcpServer, "openquery_mcp");
