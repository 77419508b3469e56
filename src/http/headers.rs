//! HTTP headers abstraction for [`HttpRequest`](crate::http::request::HttpRequest) and
//! [`HttpResponse`](crate::http::response::HttpResponse)
//!
//! Headers are stored in an ordered map so that response headers are
//! emitted in the order the caller supplied them. Names and values are kept
//! as raw strings; the request parser lower-cases names before inserting
//! them, response headers keep the caller's spelling.

use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HttpHeaders {
    headers: IndexMap<String, String>,
}

impl HttpHeaders {
    pub fn new() -> Self {
        Self {
            headers: IndexMap::new(),
        }
    }

    /// Inserts or replaces a header. A replaced header keeps its position.
    pub fn set_raw(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_string(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&String> {
        self.headers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn stringify(&self) -> String {
        let mut result = String::new();
        for (name, value) in &self.headers {
            result.push_str(&format!("{}: {}\r\n", name, value));
        }
        result
    }
}

impl<'a> From<&[(&'a str, &'a str)]> for HttpHeaders {
    fn from(pairs: &[(&'a str, &'a str)]) -> Self {
        let mut headers = HttpHeaders::new();
        for (name, value) in pairs {
            headers.set_raw(name, value);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stringify_keeps_insertion_order() {
        let mut headers = HttpHeaders::new();
        headers.set_raw("X-First", "1");
        headers.set_raw("X-Second", "2");
        headers.set_raw("X-First", "3");
        assert_eq!(headers.stringify(), "X-First: 3\r\nX-Second: 2\r\n");
    }
}
