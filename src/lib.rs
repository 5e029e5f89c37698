/// Umber - client library for the Umber URL shortener
///
/// Session management, link collection view-models, aggregate statistics and
/// QR asset loading on top of the shortener's HTTP API.

pub mod account;
pub mod clipboard;
pub mod config;
pub mod context;
pub mod dashboard;
pub mod error;
pub mod http;
pub mod links;
pub mod notify;
pub mod preferences;
pub mod qr;
pub mod session;
pub mod stats;
pub mod storage;

pub use config::ClientConfig;
pub use context::ClientContext;
pub use error::{ClientError, ClientResult};
