//! Cookie accessors handed to the session client.
//!
//! The client never touches HTTP directly; it reads and writes cookies through a
//! [`CookieStore`]. On the server each request gets its own [`RequestCookies`]
//! jar, whose writes turn into `Set-Cookie` headers on the response. A
//! [`BrowserCookies`] jar plays the browser's role: it keeps cookies between
//! requests and replays them in a `Cookie` header.

use axum::{
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue,
    },
    response::{IntoResponseParts, ResponseParts},
};
use std::{
    collections::BTreeMap,
    convert::Infallible,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::warn;
use url::Url;

/// 400 days, the longest lifetime browsers accept.
const DEFAULT_MAX_AGE_SECONDS: i64 = 400 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub path: String,
    pub max_age_seconds: i64,
    pub http_only: bool,
    pub secure: bool,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            max_age_seconds: DEFAULT_MAX_AGE_SECONDS,
            http_only: true,
            secure: false,
        }
    }
}

impl CookieOptions {
    /// Only mark cookies secure when the site is served over HTTPS.
    #[must_use]
    pub fn for_site(site_url: &Url) -> Self {
        Self {
            secure: site_url.scheme() == "https",
            ..Self::default()
        }
    }

    /// Render a `Set-Cookie` value.
    #[must_use]
    pub fn set_cookie(&self, name: &str, value: &str) -> String {
        self.render(name, value, self.max_age_seconds)
    }

    /// Render a `Set-Cookie` value that makes the browser drop the cookie.
    #[must_use]
    pub fn removal(&self, name: &str) -> String {
        self.render(name, "", 0)
    }

    fn render(&self, name: &str, value: &str, max_age: i64) -> String {
        let mut cookie = format!(
            "{name}={value}; Path={}; Max-Age={max_age}; SameSite=Lax",
            self.path
        );
        if self.http_only {
            cookie.push_str("; HttpOnly");
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Cookie accessor used by the session client.
pub trait CookieStore: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;

    /// Names of every cookie currently visible to the store.
    fn names(&self) -> Vec<String>;

    fn set(&self, name: &str, value: &str, options: &CookieOptions);

    fn remove(&self, name: &str, options: &CookieOptions);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Split a `Cookie` header value into name/value pairs.
pub(crate) fn parse_cookie_header(value: &str) -> Vec<(String, String)> {
    value
        .split(';')
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            let value = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

/// Parse a `Set-Cookie` value into `(name, value, removed)`.
///
/// `removed` is true when the cookie carries `Max-Age` of zero or less.
pub(crate) fn parse_set_cookie(value: &str) -> Option<(String, String, bool)> {
    let mut segments = value.split(';');
    let (name, value) = {
        let mut parts = segments.next()?.trim().splitn(2, '=');
        let name = parts.next()?.trim();
        let value = parts.next().unwrap_or("").trim();
        if name.is_empty() {
            return None;
        }
        (name.to_string(), value.to_string())
    };

    let removed = segments.any(|attribute| {
        let mut parts = attribute.trim().splitn(2, '=');
        let key = parts.next().unwrap_or("").trim();
        key.eq_ignore_ascii_case("max-age")
            && parts
                .next()
                .and_then(|v| v.trim().parse::<i64>().ok())
                .is_some_and(|max_age| max_age <= 0)
    });

    Some((name, value, removed))
}

#[derive(Debug, Default)]
struct RequestJar {
    values: BTreeMap<String, String>,
    // Set-Cookie lines in write order, one per cookie name.
    pending: Vec<(String, String)>,
}

impl RequestJar {
    fn queue(&mut self, name: &str, line: String) {
        self.pending.retain(|(pending, _)| pending != name);
        self.pending.push((name.to_string(), line));
    }
}

/// Request-scoped cookie jar.
///
/// Reads come from the incoming `Cookie` header; writes update the jar (so later
/// reads in the same request see them) and are queued as `Set-Cookie` lines.
#[derive(Debug, Default)]
pub struct RequestCookies {
    jar: Mutex<RequestJar>,
}

impl RequestCookies {
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let values = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(parse_cookie_header)
            .collect();
        Self {
            jar: Mutex::new(RequestJar {
                values,
                pending: Vec::new(),
            }),
        }
    }

    /// `Set-Cookie` lines queued so far, in write order.
    #[must_use]
    pub fn pending_set_cookies(&self) -> Vec<String> {
        lock(&self.jar)
            .pending
            .iter()
            .map(|(_, line)| line.clone())
            .collect()
    }

    /// Current cookies rendered as a `Cookie` header, if any remain.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        let jar = lock(&self.jar);
        if jar.values.is_empty() {
            return None;
        }
        Some(
            jar.values
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Queued writes as header values; lines that are not valid header values
    /// are dropped with a warning.
    #[must_use]
    pub fn set_cookie_headers(&self) -> Vec<HeaderValue> {
        self.pending_set_cookies()
            .into_iter()
            .filter_map(|line| match HeaderValue::from_str(&line) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!("Dropping invalid Set-Cookie value: {err}");
                    None
                }
            })
            .collect()
    }
}

impl CookieStore for RequestCookies {
    fn get(&self, name: &str) -> Option<String> {
        lock(&self.jar).values.get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        lock(&self.jar).values.keys().cloned().collect()
    }

    fn set(&self, name: &str, value: &str, options: &CookieOptions) {
        let mut jar = lock(&self.jar);
        jar.values.insert(name.to_string(), value.to_string());
        jar.queue(name, options.set_cookie(name, value));
    }

    fn remove(&self, name: &str, options: &CookieOptions) {
        let mut jar = lock(&self.jar);
        jar.values.remove(name);
        jar.queue(name, options.removal(name));
    }
}

impl IntoResponseParts for RequestCookies {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        for value in self.set_cookie_headers() {
            res.headers_mut().append(SET_COOKIE, value);
        }
        Ok(res)
    }
}

/// Persistent cookie jar standing in for the browser.
#[derive(Debug, Default)]
pub struct BrowserCookies {
    values: Mutex<BTreeMap<String, String>>,
}

impl BrowserCookies {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply every `Set-Cookie` header of a response, in order.
    pub fn store_response(&self, headers: &HeaderMap) {
        let mut values = lock(&self.values);
        for line in headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
        {
            if let Some((name, value, removed)) = parse_set_cookie(line) {
                if removed {
                    values.remove(&name);
                } else {
                    values.insert(name, value);
                }
            }
        }
    }

    /// Cookies to send with the next request.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        let values = lock(&self.values);
        if values.is_empty() {
            return None;
        }
        Some(
            values
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

impl CookieStore for BrowserCookies {
    fn get(&self, name: &str) -> Option<String> {
        lock(&self.values).get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        lock(&self.values).keys().cloned().collect()
    }

    fn set(&self, name: &str, value: &str, _options: &CookieOptions) {
        lock(&self.values).insert(name.to_string(), value.to_string());
    }

    fn remove(&self, name: &str, _options: &CookieOptions) {
        lock(&self.values).remove(name);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn headers_with_cookie(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn parse_cookie_header_splits_pairs() {
        let pairs = parse_cookie_header("a=1; b = two ; broken; =nameless; c=x=y");
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "two".to_string()),
                ("c".to_string(), "x=y".to_string()),
            ]
        );
    }

    #[test]
    fn parse_set_cookie_detects_removal() {
        let parsed = parse_set_cookie("sb=abc; Path=/; Max-Age=34560000; SameSite=Lax");
        assert_eq!(parsed, Some(("sb".to_string(), "abc".to_string(), false)));

        let parsed = parse_set_cookie("sb=; Path=/; max-age=0");
        assert_eq!(parsed, Some(("sb".to_string(), String::new(), true)));

        assert_eq!(parse_set_cookie("; Path=/"), None);
    }

    #[test]
    fn options_render_secure_only_for_https() {
        let http = CookieOptions::for_site(&Url::parse("http://localhost:8080").unwrap());
        assert_eq!(
            http.set_cookie("sb", "v"),
            "sb=v; Path=/; Max-Age=34560000; SameSite=Lax; HttpOnly"
        );

        let https = CookieOptions::for_site(&Url::parse("https://astewai.dev").unwrap());
        assert_eq!(
            https.removal("sb"),
            "sb=; Path=/; Max-Age=0; SameSite=Lax; HttpOnly; Secure"
        );
    }

    #[test]
    fn request_cookies_read_and_queue_writes() {
        let cookies = RequestCookies::from_headers(&headers_with_cookie("a=1; b=2"));
        let options = CookieOptions::default();

        assert_eq!(cookies.get("a").as_deref(), Some("1"));
        cookies.set("a", "3", &options);
        cookies.remove("b", &options);
        cookies.set("a", "4", &options);

        assert_eq!(cookies.get("a").as_deref(), Some("4"));
        assert_eq!(cookies.get("b"), None);
        assert_eq!(cookies.cookie_header().as_deref(), Some("a=4"));

        // Only the last write per name is kept, ordered by that last write.
        assert_eq!(
            cookies.pending_set_cookies(),
            vec![options.removal("b"), options.set_cookie("a", "4")]
        );
    }

    #[test]
    fn request_cookies_without_header_are_empty() {
        let cookies = RequestCookies::from_headers(&HeaderMap::new());
        assert!(cookies.names().is_empty());
        assert_eq!(cookies.cookie_header(), None);
        assert!(cookies.pending_set_cookies().is_empty());
    }

    #[test]
    fn browser_cookies_follow_set_cookie_headers() {
        let browser = BrowserCookies::new();
        let mut response = HeaderMap::new();
        response.append(SET_COOKIE, HeaderValue::from_static("a=1; Path=/"));
        response.append(SET_COOKIE, HeaderValue::from_static("b=2; Path=/"));
        browser.store_response(&response);
        assert_eq!(browser.cookie_header().as_deref(), Some("a=1; b=2"));

        let mut response = HeaderMap::new();
        response.append(SET_COOKIE, HeaderValue::from_static("a=; Path=/; Max-Age=0"));
        browser.store_response(&response);
        assert_eq!(browser.cookie_header().as_deref(), Some("b=2"));
    }
}
