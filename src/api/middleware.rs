/// Request helpers and small middleware
use axum::{
    extract::{ConnectInfo, Request},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

/// Raw `authorization` header value, trimmed
pub fn extract_authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    extract_authorization(headers).and_then(|s| {
        s.strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    })
}

/// Client address: first `X-Forwarded-For` hop, else the socket peer
pub fn client_ip(parts: &Parts) -> Option<String> {
    let forwarded = parts
        .headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// Mark the response as uncacheable
pub async fn no_store(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    fn parts_with(headers: &[(&str, &str)]) -> Parts {
        let mut builder = HttpRequest::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_and_raw_authorization() {
        let parts = parts_with(&[("authorization", "Bearer abc")]);
        assert_eq!(extract_bearer_token(&parts.headers).as_deref(), Some("abc"));

        let parts = parts_with(&[("authorization", "query_id=1&hash=ff")]);
        assert_eq!(extract_bearer_token(&parts.headers), None);
        assert_eq!(
            extract_authorization(&parts.headers).as_deref(),
            Some("query_id=1&hash=ff")
        );

        let parts = parts_with(&[]);
        assert_eq!(extract_authorization(&parts.headers), None);
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let parts = parts_with(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1")]);
        assert_eq!(client_ip(&parts).as_deref(), Some("203.0.113.7"));

        let mut parts = parts_with(&[]);
        assert_eq!(client_ip(&parts), None);
        parts
            .extensions
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));
        assert_eq!(client_ip(&parts).as_deref(), Some("192.0.2.1"));
    }
}
