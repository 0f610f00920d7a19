use axum::http::{header, HeaderMap, HeaderValue};

use crate::{
    config::{CookieConfig, SessionConfig},
    error::{AppError, AppResult},
};

/// Returns the value of cookie `name` from the request headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn attrs(cookie: &CookieConfig) -> String {
    let mut s = String::from("; Path=/; SameSite=Lax");
    if cookie.http_only {
        s.push_str("; HttpOnly");
    }
    if cookie.secure {
        s.push_str("; Secure");
    }
    s
}

fn header_value(raw: String) -> AppResult<HeaderValue> {
    HeaderValue::from_str(&raw)
        .map_err(|e| AppError::storage(anyhow::anyhow!("bad Set-Cookie value: {e}")))
}

pub fn session_cookie(
    session: &SessionConfig,
    cookie: &CookieConfig,
    session_id: &str,
) -> AppResult<HeaderValue> {
    header_value(format!(
        "{}={}; Max-Age={}{}",
        session.name,
        session_id,
        session.ttl_secs,
        attrs(cookie)
    ))
}

pub fn clear_session_cookie(session: &SessionConfig, cookie: &CookieConfig) -> AppResult<HeaderValue> {
    header_value(format!("{}=; Max-Age=0{}", session.name, attrs(cookie)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionBackend;

    fn cfgs() -> (SessionConfig, CookieConfig) {
        (
            SessionConfig {
                name: "session-id".into(),
                ttl_secs: 3600,
                backend: SessionBackend::Memory,
                csrf_secret: String::new(),
            },
            CookieConfig {
                secure: true,
                http_only: true,
            },
        )
    }

    #[test]
    fn reads_named_cookie() {
        let mut h = HeaderMap::new();
        h.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session-id=abc-123; other=1"),
        );
        assert_eq!(read_cookie(&h, "session-id").as_deref(), Some("abc-123"));
        assert_eq!(read_cookie(&h, "missing"), None);
    }

    #[test]
    fn empty_cookie_is_absent() {
        let mut h = HeaderMap::new();
        h.insert(header::COOKIE, HeaderValue::from_static("session-id="));
        assert_eq!(read_cookie(&h, "session-id"), None);
    }

    #[test]
    fn builds_set_cookie() {
        let (s, c) = cfgs();
        let v = session_cookie(&s, &c, "abc").unwrap();
        assert_eq!(
            v.to_str().unwrap(),
            "session-id=abc; Max-Age=3600; Path=/; SameSite=Lax; HttpOnly; Secure"
        );
        let cleared = clear_session_cookie(&s, &c).unwrap();
        assert!(cleared.to_str().unwrap().starts_with("session-id=; Max-Age=0"));
    }

    #[test]
    fn unencodable_cookie_is_an_error() {
        let (s, c) = cfgs();
        let err = session_cookie(&s, &c, "abc\r\nX-Injected: 1").unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
    }
}
