//! Request building, execution and retry
//!
//! This module provides:
//! - Staged request configuration (`RequestConfig`)
//! - The hyper transport behind the `HttpTransport` seam
//! - The execute-classify-retry engine
//! - The per-task `Request` handle and its response sink

pub mod client;
pub mod config;
pub mod engine;
pub mod handle;
pub mod retry;
pub mod sink;

pub use client::{HttpTransport, HyperTransport, DEFAULT_REQUEST_TIMEOUT};
pub use config::{
    ConfigOutcome, ContentType, HttpMethod, PreparedRequest, RequestConfig, Target,
    DEFAULT_CONNECT_TIMEOUT_MS,
};
pub use engine::{Engine, ExecuteOptions, ExecuteOutcome};
pub use handle::Request;
pub use retry::RetryPolicy;
pub use sink::ResponseSink;
