pub mod activity;
pub mod apps;
pub mod auth;
pub mod capacities;
pub mod client;
pub mod dashboards;
pub mod dataflows;
pub mod datasets;
pub mod definitions;
pub mod lro;
pub mod models;
pub mod reports;
pub mod scanner;
pub mod tenant;
pub mod workspaces;

pub use auth::{AzureIdentityCredential, ClientSecretCredential, StaticToken, TokenProvider};
pub use client::{ClientSettings, PowerBiClient, PowerBiError, RetryPolicy};
pub use lro::PollSettings;
