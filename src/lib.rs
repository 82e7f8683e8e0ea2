//! Checkr - Request execution core for credential checkers
//!
//! Builds one HTTP request per task, sends it through a rotating proxy pool
//! and retries until a usable response comes back.
//!
//! ## Features
//!
//! - GET/POST requests with headers, cookies and templated bodies
//! - HTTP, SOCKS4, SOCKS4a and SOCKS5 upstream proxies
//! - Round-robin and random proxy rotation with sticky selection
//! - Automatic retry on transport failures and empty responses
//! - Optional attempt and time bounds on the retry loop
//! - Shared run statistics and settings

pub mod config;
pub mod error;
pub mod models;
pub mod proxy;
pub mod request;
pub mod template;

pub use config::Config;
pub use error::{CheckrError, Result};
pub use request::{Engine, ExecuteOptions, ExecuteOutcome, Request};
