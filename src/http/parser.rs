//! Line-oriented HTTP/1.1 request parser.
//!
//! The parser is fed one line at a time (without having to care where the
//! bytes come from) and moves through `RequestLine -> Headers -> Done`.
//! Reading the body, if any, is left to the caller once
//! [`ParserOk::HeadersDone`] has been returned.

use thiserror::Error;

use crate::http::encoding::{parse_urlencoded, percent_decode};
use crate::http::request::HttpRequest;
use crate::http::status::HttpStatus;
use crate::http::*;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParserError {
    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),

    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    #[error("invalid content-length: {0:?}")]
    InvalidContentLength(String),

    #[error("request line longer than {0} bytes")]
    UriTooLong(usize),

    #[error("header line longer than {0} bytes")]
    HeaderTooLong(usize),

    #[error("declared body of {0} bytes exceeds the {1} byte limit")]
    PayloadTooLarge(usize, usize),

    #[error("body ended after {0} of {1} bytes")]
    TruncatedBody(usize, usize),

    #[error("request is not valid UTF-8")]
    InvalidEncoding,
}

impl ParserError {
    pub fn into_http_status(&self) -> HttpStatus {
        match self {
            ParserError::UriTooLong(_) => HttpStatus::UriTooLong,
            ParserError::PayloadTooLarge(..) => HttpStatus::PayloadTooLarge,
            _ => HttpStatus::BadRequest,
        }
    }
}

#[derive(PartialEq, Debug)]
pub enum ParserOk {
    /// More lines are needed.
    Incomplete,
    /// The empty line closing the header block was seen.
    HeadersDone,
}

#[derive(PartialEq, PartialOrd, Debug, Clone, Copy)]
enum RequestParserState {
    RequestLine,
    Headers,
    Done,
}

pub struct RequestParser {
    state: RequestParserState,
    request: HttpRequest,
    max_body_size: usize,
}

impl RequestParser {
    pub fn new(max_body_size: usize) -> Self {
        Self {
            state: RequestParserState::RequestLine,
            request: HttpRequest::new(),
            max_body_size,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == RequestParserState::Done
    }

    pub fn awaiting_request_line(&self) -> bool {
        self.state == RequestParserState::RequestLine
    }

    /// The error to report when the current line overflows `limit` bytes.
    pub fn line_too_long(&self, limit: usize) -> ParserError {
        match self.state {
            RequestParserState::RequestLine => ParserError::UriTooLong(limit),
            _ => ParserError::HeaderTooLong(limit),
        }
    }

    /// Consumes one line, with or without its trailing CRLF.
    pub fn feed_line(&mut self, line: &str) -> Result<ParserOk, ParserError> {
        match self.state {
            RequestParserState::RequestLine => {
                self.parse_request_line(line)?;
                self.state = RequestParserState::Headers;
                Ok(ParserOk::Incomplete)
            }
            RequestParserState::Headers => {
                if self.parse_header(line)? {
                    return Ok(ParserOk::Incomplete);
                }
                self.finish_headers()?;
                self.state = RequestParserState::Done;
                Ok(ParserOk::HeadersDone)
            }
            RequestParserState::Done => Ok(ParserOk::HeadersDone),
        }
    }

    pub fn into_request(self) -> HttpRequest {
        self.request
    }

    fn parse_request_line(&mut self, line: &str) -> Result<(), ParserError> {
        // Request line: METHOD PATH HTTP/VERSION
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(ParserError::MalformedRequestLine(line.trim().to_string()));
        }

        let req = &mut self.request;
        req.method = http_method_from_str(parts[0]);
        req.path = parts[1].to_string();
        req.http_version = parts[2].to_ascii_uppercase();

        let (resource, query) = match req.path.split_once('?') {
            Some((resource, query)) => (resource, Some(query)),
            None => (req.path.as_str(), None),
        };
        req.resource_path = percent_decode(resource);
        if let Some(query) = query {
            req.query_string = query.to_string();
            req.query_params = parse_urlencoded(query);
        }

        Ok(())
    }

    /// Returns `false` on the blank line that terminates the header block.
    fn parse_header(&mut self, line: &str) -> Result<bool, ParserError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(false);
        }

        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ParserError::MalformedHeader(line.to_string()))?;
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            return Err(ParserError::MalformedHeader(line.to_string()));
        }

        self.request.headers.set_raw(&name, value.trim());
        Ok(true)
    }

    fn finish_headers(&mut self) -> Result<(), ParserError> {
        let req = &mut self.request;
        if !req.method.carries_body() {
            return Ok(());
        }

        req.content_type = req.headers.get("content-type").cloned();
        req.content_length = match req.headers.get("content-length") {
            Some(value) => value
                .parse::<usize>()
                .map_err(|_| ParserError::InvalidContentLength(value.clone()))?,
            None => 0,
        };

        if req.content_length > self.max_body_size {
            return Err(ParserError::PayloadTooLarge(
                req.content_length,
                self.max_body_size,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(lines: &[&str]) -> Result<HttpRequest, ParserError> {
        let mut parser = RequestParser::new(1024);
        for line in lines {
            parser.feed_line(line)?;
        }
        assert!(parser.is_done());
        Ok(parser.into_request())
    }

    #[test]
    fn test_parses_request_line_and_query() {
        let req = parse(&[
            "get /a%20dir/file+name.txt?q=hello+world&x=%41%2 HTTP/1.1\r\n",
            "Host: device.local\r\n",
            "\r\n",
        ])
        .unwrap();

        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.path, "/a%20dir/file+name.txt?q=hello+world&x=%41%2");
        assert_eq!(req.resource_path, "/a dir/file+name.txt");
        assert_eq!(req.query_string, "q=hello+world&x=%41%2");
        assert_eq!(req.query_params["q"], "hello world");
        assert_eq!(req.query_params["x"], "A%2");
        assert_eq!(req.header("HOST"), Some("device.local"));
    }

    #[test]
    fn test_request_line_needs_three_tokens() {
        for line in ["GET /\r\n", "GET / HTTP/1.1 extra\r\n", "\r\n"] {
            let mut parser = RequestParser::new(1024);
            assert!(matches!(
                parser.feed_line(line),
                Err(ParserError::MalformedRequestLine(_))
            ));
        }
    }

    #[test]
    fn test_header_names_are_lowercased_and_trimmed() {
        let req = parse(&[
            "GET / HTTP/1.1",
            "  Content-TYPE :  text/plain ; charset=utf-8 ",
            "X-Time: 12:30:00",
            "",
        ])
        .unwrap();
        assert_eq!(
            req.headers.get("content-type").map(String::as_str),
            Some("text/plain ; charset=utf-8")
        );
        assert_eq!(req.header("x-time"), Some("12:30:00"));
        // only captured for POST/PUT
        assert_eq!(req.content_type, None);
    }

    #[test]
    fn test_header_without_colon_is_rejected() {
        let mut parser = RequestParser::new(1024);
        parser.feed_line("GET / HTTP/1.1").unwrap();
        let err = parser.feed_line("this is not a header").unwrap_err();
        assert_eq!(err.into_http_status(), HttpStatus::BadRequest);
    }

    #[test]
    fn test_post_captures_content_metadata() {
        let req = parse(&[
            "POST /test HTTP/1.1",
            "Content-Type: application/x-www-form-urlencoded",
            "Content-Length: 42",
            "",
        ])
        .unwrap();
        assert_eq!(
            req.content_type.as_deref(),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(req.content_length, 42);

        let req = parse(&["PUT /x HTTP/1.1", ""]).unwrap();
        assert_eq!(req.content_length, 0);
    }

    #[test]
    fn test_body_limits() {
        let err = parse(&["POST / HTTP/1.1", "Content-Length: 4096", ""]).unwrap_err();
        assert_eq!(err.into_http_status(), HttpStatus::PayloadTooLarge);

        let err = parse(&["POST / HTTP/1.1", "Content-Length: lots", ""]).unwrap_err();
        assert_eq!(err, ParserError::InvalidContentLength("lots".to_string()));
    }

    #[test]
    fn test_upgrade_detection() {
        let req = parse(&[
            "GET /ws HTTP/1.1",
            "Connection: keep-alive, Upgrade",
            "Upgrade: WebSocket",
            "",
        ])
        .unwrap();
        assert_eq!(req.upgrade().as_deref(), Some("websocket"));

        let req = parse(&["GET /ws HTTP/1.1", "Upgrade: websocket", ""]).unwrap();
        assert_eq!(req.upgrade(), None);

        let req = parse(&["GET / HTTP/1.1", "Connection: Upgrade", ""]).unwrap();
        assert_eq!(req.upgrade(), None);

        let req = parse(&["GET / HTTP/1.1", "Connection: Upgrade", "Upgrade:  ", ""]).unwrap();
        assert_eq!(req.upgrade(), None);
    }

    #[test]
    fn test_line_overflow_maps_to_state() {
        let mut parser = RequestParser::new(1024);
        assert_eq!(
            parser.line_too_long(8).into_http_status(),
            HttpStatus::UriTooLong
        );
        parser.feed_line("GET / HTTP/1.1").unwrap();
        assert_eq!(
            parser.line_too_long(8).into_http_status(),
            HttpStatus::BadRequest
        );
    }
}
