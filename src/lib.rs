//! Client, reshaping helpers and MCP surface for the Power BI / Fabric Admin REST APIs.

pub mod config;
pub mod mcp;
pub mod output;
pub mod powerbi;
pub mod reporting;
pub mod server;
