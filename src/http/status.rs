/// Status codes the server emits, with their reason phrase and the short
/// explanation shown on generated error pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatus {
    SwitchingProtocols = 101,

    Ok = 200,
    Created = 201,
    Accepted = 202,
    NoContent = 204,

    MovedPermanently = 301,
    Found = 302,
    SeeOther = 303,
    NotModified = 304,
    TemporaryRedirect = 307,

    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,
    RequestTimeout = 408,
    Conflict = 409,
    LengthRequired = 411,
    PayloadTooLarge = 413,
    UriTooLong = 414,
    UnsupportedMediaType = 415,

    InternalServerError = 500,
    NotImplemented = 501,
    ServiceUnavailable = 503,
    HttpVersionNotSupported = 505,
}

impl HttpStatus {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn reason(self) -> &'static str {
        match self {
            HttpStatus::SwitchingProtocols => "Switching Protocols",
            HttpStatus::Ok => "OK",
            HttpStatus::Created => "Created",
            HttpStatus::Accepted => "Accepted",
            HttpStatus::NoContent => "No Content",
            HttpStatus::MovedPermanently => "Moved Permanently",
            HttpStatus::Found => "Found",
            HttpStatus::SeeOther => "See Other",
            HttpStatus::NotModified => "Not Modified",
            HttpStatus::TemporaryRedirect => "Temporary Redirect",
            HttpStatus::BadRequest => "Bad Request",
            HttpStatus::Unauthorized => "Unauthorized",
            HttpStatus::Forbidden => "Forbidden",
            HttpStatus::NotFound => "Not Found",
            HttpStatus::MethodNotAllowed => "Method Not Allowed",
            HttpStatus::RequestTimeout => "Request Timeout",
            HttpStatus::Conflict => "Conflict",
            HttpStatus::LengthRequired => "Length Required",
            HttpStatus::PayloadTooLarge => "Payload Too Large",
            HttpStatus::UriTooLong => "URI Too Long",
            HttpStatus::UnsupportedMediaType => "Unsupported Media Type",
            HttpStatus::InternalServerError => "Internal Server Error",
            HttpStatus::NotImplemented => "Not Implemented",
            HttpStatus::ServiceUnavailable => "Service Unavailable",
            HttpStatus::HttpVersionNotSupported => "HTTP Version Not Supported",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            HttpStatus::SwitchingProtocols => "Switching to new protocol; obey Upgrade header",
            HttpStatus::Ok => "Request fulfilled, document follows",
            HttpStatus::Created => "Document created, URL follows",
            HttpStatus::Accepted => "Request accepted, processing continues off-line",
            HttpStatus::NoContent => "Request fulfilled, nothing follows",
            HttpStatus::MovedPermanently => "Object moved permanently",
            HttpStatus::Found | HttpStatus::TemporaryRedirect => "Object moved temporarily",
            HttpStatus::SeeOther => "Object moved",
            HttpStatus::NotModified => "Document has not changed since given time",
            HttpStatus::BadRequest => "Bad request syntax or unsupported method",
            HttpStatus::Unauthorized => "No permission",
            HttpStatus::Forbidden => "Request forbidden",
            HttpStatus::NotFound => "Nothing matches the given URI",
            HttpStatus::MethodNotAllowed => "Specified method is invalid for this resource",
            HttpStatus::RequestTimeout => "Request timed out; try again later",
            HttpStatus::Conflict => "Request conflict",
            HttpStatus::LengthRequired => "Client must specify Content-Length",
            HttpStatus::PayloadTooLarge => "Entity is too large",
            HttpStatus::UriTooLong => "URI is too long",
            HttpStatus::UnsupportedMediaType => "Entity body in unsupported format",
            HttpStatus::InternalServerError => "Server got itself in trouble",
            HttpStatus::NotImplemented => "Server does not support this operation",
            HttpStatus::ServiceUnavailable => "The server cannot process the request right now",
            HttpStatus::HttpVersionNotSupported => "Cannot fulfill request",
        }
    }
}
