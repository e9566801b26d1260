//! Shared request/response types at the handler boundary.

use serde::Serialize;

/// Inbound request being answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub query: String,
}

impl Request {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        let method = method.into().to_ascii_uppercase();
        let target = path.into();
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), query.to_string()),
            None => (target, String::new()),
        };
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        Self {
            method,
            path,
            query,
        }
    }

    /// Reads use the view prompt; everything else uses the mutate prompt.
    pub fn is_read(&self) -> bool {
        self.method == "GET"
    }
}

/// Response body produced by the final turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseBody {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl ResponseBody {
    pub const HTML: &'static str = "text/html; charset=utf-8";
    pub const JSON: &'static str = "application/json";

    pub fn html(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: Self::HTML,
            body: body.into(),
        }
    }

    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: Self::JSON,
            body: body.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            status: 302,
            content_type: Self::HTML,
            body: location.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_normalizes_method_and_path() {
        let request = Request::new("post", "products/3?expand=1");
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/products/3");
        assert_eq!(request.query, "expand=1");
        assert!(!request.is_read());
    }

    #[test]
    fn get_is_a_read() {
        assert!(Request::new("GET", "/").is_read());
    }
}
