//! Hand-rolled HTTP request-line and header parser.
//!
//! The request line and the handful of headers the writer cares about
//! (`Host`, `User-Agent`, `Accept-Language`) are parsed directly off the
//! TCP payload: bounds-checked, never panicking on truncated input, and
//! only recognizing a request that starts with one of a closed set of
//! verb tokens.

const METHODS: &[&str] = &[
    "GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH", "CONNECT", "TRACE", "PROPFIND",
    "PROPPATCH", "MKCOL", "COPY", "MOVE", "LOCK", "UNLOCK",
];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub host: Option<String>,
    pub user_agent: Option<String>,
    pub accept_language: Option<String>,
}

/// Parses `payload` as an HTTP/1.x request. Returns `None` if the payload
/// doesn't start with `METHOD SP path SP HTTP/x.y\r\n` for a recognized verb.
pub fn parse_request(payload: &[u8]) -> Option<HttpRequest> {
    let text = std::str::from_utf8(payload).ok()?;
    let mut lines = text.split("\r\n");
    let request_line = lines.next()?;

    let mut parts = request_line.split(' ');
    let method = parts.next()?;
    let path = parts.next()?;
    let version = parts.next()?;

    if !METHODS.contains(&method) || !version.starts_with("HTTP/") {
        return None;
    }

    let mut request = HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        host: None,
        user_agent: None,
        accept_language: None,
    };

    for line in lines {
        if line.is_empty() {
            break; // end of headers
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "host" => request.host = Some(value.to_string()),
            "user-agent" => request.user_agent = Some(value.to_string()),
            "accept-language" => request.accept_language = Some(value.to_string()),
            _ => {}
        }
    }

    Some(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_extracts_host_and_headers() {
        let raw = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\nUser-Agent: curl/8.0\r\nAccept-Language: en-US\r\n\r\n";
        let req = parse_request(raw).unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/index.html");
        assert_eq!(req.host.as_deref(), Some("example.com"));
        assert_eq!(req.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(req.accept_language.as_deref(), Some("en-US"));
    }

    #[test]
    fn test_parse_request_rejects_unknown_method() {
        assert!(parse_request(b"FROB / HTTP/1.1\r\n\r\n").is_none());
    }

    #[test]
    fn test_parse_request_rejects_non_utf8() {
        assert!(parse_request(&[0xff, 0xfe, 0x00]).is_none());
    }

    #[test]
    fn test_parse_request_truncated_never_panics() {
        let raw = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n";
        for cut in 0..raw.len() {
            let _ = parse_request(&raw[..cut]);
        }
    }

    #[test]
    fn test_parse_request_missing_headers_ok() {
        let raw = b"POST /submit HTTP/1.1\r\n\r\n";
        let req = parse_request(raw).unwrap();
        assert_eq!(req.method, "POST");
        assert!(req.host.is_none());
    }
}
