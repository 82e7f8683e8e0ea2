//! Task-local holder for the latest response

use std::sync::Arc;

use crate::models::HttpResponse;

/// Latest raw body, status and full response of one task.
///
/// The engine only ever overwrites it; downstream classification reads it.
#[derive(Debug, Clone, Default)]
pub struct ResponseSink {
    data: Option<String>,
    status: Option<String>,
    full: Option<Arc<HttpResponse>>,
}

impl ResponseSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Copy a response in without transforming it
    pub fn set(&mut self, response: HttpResponse) {
        self.data = Some(response.text());
        self.status = Some(response.status.as_u16().to_string());
        self.full = Some(Arc::new(response));
    }

    /// Body text of the last response
    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    /// Status code of the last response, as text
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn full(&self) -> Option<&Arc<HttpResponse>> {
        self.full.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.full.is_none()
    }

    /// Header of the last response, `None` if absent or nothing captured
    pub fn header(&self, name: &str) -> Option<String> {
        self.full.as_ref()?.header(name)
    }
}
