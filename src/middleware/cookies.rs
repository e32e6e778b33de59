//! Cookie plumbing shared by the CSRF stage, authentication and the login/logout handlers.

use axum::http::header::{self, HeaderMap, HeaderValue, InvalidHeaderValue};

pub const SESSION_COOKIE: &str = "SESSION";
pub const CSRF_COOKIE: &str = "XSRF-TOKEN";

/// Value of the first cookie called `name`, if present and non-empty.
pub fn read(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` for the session id. HttpOnly; lives as long as the server-side entry.
pub fn session(id: &str, max_age_secs: u64, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    build(SESSION_COOKIE, id, Some(max_age_secs), true, secure)
}

/// `Set-Cookie` for the CSRF token. Readable by scripts so the SPA can echo it back.
pub fn csrf(token: &str, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    build(CSRF_COOKIE, token, None, false, secure)
}

/// `Set-Cookie` that removes `name` from the browser.
pub fn expire(name: &str, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    build(name, "", Some(0), true, secure)
}

fn build(
    name: &str,
    value: &str,
    max_age: Option<u64>,
    http_only: bool,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{}={}; Path=/; SameSite=Lax", name, value);
    if let Some(secs) = max_age {
        cookie.push_str(&format!("; Max-Age={}", secs));
    }
    if http_only {
        cookie.push_str("; HttpOnly");
    }
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(cookies: &[&str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for c in cookies {
            headers.append(header::COOKIE, HeaderValue::from_str(c).unwrap());
        }
        headers
    }

    #[test]
    fn reads_cookie_among_others() {
        let h = headers(&["theme=dark; SESSION=abc123; XSRF-TOKEN=t"]);
        assert_eq!(read(&h, SESSION_COOKIE).as_deref(), Some("abc123"));
        assert_eq!(read(&h, CSRF_COOKIE).as_deref(), Some("t"));
        assert_eq!(read(&h, "missing"), None);
    }

    #[test]
    fn reads_across_multiple_cookie_headers() {
        let h = headers(&["a=1", "SESSION=s"]);
        assert_eq!(read(&h, SESSION_COOKIE).as_deref(), Some("s"));
    }

    #[test]
    fn empty_value_is_absent() {
        let h = headers(&["SESSION="]);
        assert_eq!(read(&h, SESSION_COOKIE), None);
    }

    #[test]
    fn session_cookie_attributes() {
        let v = session("abc", 1800, true).unwrap();
        let s = v.to_str().unwrap();
        assert!(s.starts_with("SESSION=abc; Path=/"));
        assert!(s.contains("Max-Age=1800"));
        assert!(s.contains("HttpOnly"));
        assert!(s.contains("Secure"));
    }

    #[test]
    fn csrf_cookie_is_script_readable() {
        let v = csrf("tok", false).unwrap();
        let s = v.to_str().unwrap();
        assert!(!s.contains("HttpOnly"));
        assert!(!s.contains("Secure"));
    }

    #[test]
    fn expire_zeroes_max_age() {
        let v = expire(SESSION_COOKIE, false).unwrap();
        assert!(v.to_str().unwrap().starts_with("SESSION=; Path=/"));
        assert!(v.to_str().unwrap().contains("Max-Age=0"));
    }
}
