//! Per-request connection state and the buffered service response.

use std::collections::HashMap;

use bytes::Bytes;

use trellis_app::Cookie;

/// Everything a service may read from the incoming request, already parsed
/// out of the HTTP machinery.
#[derive(Debug, Default)]
pub struct Connection {
    pub query: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub body: Bytes,
}

impl Connection {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(|v| v.as_str())
    }

    pub fn service_id(&self) -> Option<&str> {
        self.param("serviceId")
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(|v| v.as_str())
    }
}

/// A fully buffered response a service hands back to the front controller,
/// which adds the caching-header policy and converts to the HTTP response.
#[derive(Debug)]
pub struct ServiceResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<Cookie>,
}

impl ServiceResponse {
    pub fn ok(content_type: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: content_type.into(),
            body,
            headers: Vec::new(),
            cookies: Vec::new(),
        }
    }

    pub fn json(body: Vec<u8>) -> Self {
        Self::ok("application/json", body)
    }

    pub fn html(body: impl Into<Vec<u8>>) -> Self {
        Self::ok("text/html; charset=utf-8", body.into())
    }

    pub fn bad_request(text: impl Into<String>) -> Self {
        Self {
            status: 400,
            content_type: "text/plain".into(),
            body: text.into().into_bytes(),
            headers: Vec::new(),
            cookies: Vec::new(),
        }
    }

    /// A 302 back to the given location (used after an upload POST).
    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            status: 302,
            content_type: "text/plain".into(),
            body: Vec::new(),
            headers: vec![("location".into(), location.into())],
            cookies: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_cookie(mut self, cookie: Cookie) -> Self {
        self.cookies.push(cookie);
        self
    }
}
