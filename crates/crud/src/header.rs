//! Readers and writers for well known headers.

use crate::error::BoxError;
use crate::reader::HeaderReader;
use crate::writer::HeaderWriter;
use cookie::Cookie;
use http::header::{AUTHORIZATION, COOKIE, SET_COOKIE, USER_AGENT};
use http::{HeaderMap, HeaderValue};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::warn;

static BEARER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i:bearer\s+)([0-9A-Za-z\-_]+)").expect("bearer pattern is valid"));

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok()).filter(|v| !v.is_empty())
}

/// Reads cookie values by name from the `Cookie` headers.
///
/// Only declared names are read. A declared cookie that is absent keeps its previous value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieValues {
    values: BTreeMap<String, String>,
}

impl CookieValues {
    pub fn names<I, K>(names: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self { values: names.into_iter().map(|k| (k.into(), String::new())).collect() }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

impl HeaderReader for CookieValues {
    fn read_header(&mut self, headers: &HeaderMap) -> Result<(), BoxError> {
        let cookies: Vec<Cookie<'_>> = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .collect();

        for (name, value) in &mut self.values {
            if let Some(cookie) = cookies.iter().find(|c| c.name() == name) {
                cookie.value().clone_into(value);
            }
        }
        Ok(())
    }
}

/// Reads the client address from `X-Forwarded-For`, falling back to `X-Real-Ip`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpAddress(pub String);

impl HeaderReader for IpAddress {
    fn read_header(&mut self, headers: &HeaderMap) -> Result<(), BoxError> {
        if let Some(ip) = header_str(headers, "x-forwarded-for").or_else(|| header_str(headers, "x-real-ip")) {
            ip.clone_into(&mut self.0);
        }
        Ok(())
    }
}

/// Reads the `User-Agent` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserAgent(pub String);

impl HeaderReader for UserAgent {
    fn read_header(&mut self, headers: &HeaderMap) -> Result<(), BoxError> {
        if let Some(ua) = header_str(headers, USER_AGENT.as_str()) {
            ua.clone_into(&mut self.0);
        }
        Ok(())
    }
}

/// Reads the token of a `Authorization: Bearer <token>` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BearerToken(pub String);

impl HeaderReader for BearerToken {
    fn read_header(&mut self, headers: &HeaderMap) -> Result<(), BoxError> {
        let token = header_str(headers, AUTHORIZATION.as_str())
            .and_then(|auth| BEARER.captures(auth))
            .and_then(|captures| captures.get(1));

        if let Some(token) = token {
            token.as_str().clone_into(&mut self.0);
        }
        Ok(())
    }
}

/// Appends a `Set-Cookie` header for the cookie, unless the cookie has no name.
#[derive(Debug, Clone)]
pub struct SetCookie(pub Cookie<'static>);

impl HeaderWriter for SetCookie {
    fn write_header(&mut self, headers: &mut HeaderMap) {
        if self.0.name().is_empty() {
            return;
        }

        match HeaderValue::try_from(self.0.to_string()) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(e) => warn!(cookie = self.0.name(), "dropping cookie that is not a valid header value: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cookie::SameSite;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn cookie_values_by_name() {
        let h = headers(&[("cookie", "Cookie-1=v$1; c2=v2")]);

        let mut both = CookieValues::names(["Cookie-1", "c2"]);
        both.read_header(&h).unwrap();
        assert_eq!(both.get("Cookie-1"), Some("v$1"));
        assert_eq!(both.get("c2"), Some("v2"));

        let mut one = CookieValues::names(["c2"]);
        one.read_header(&h).unwrap();
        assert_eq!(one.get("c2"), Some("v2"));
        assert_eq!(one.get("Cookie-1"), None);
    }

    #[test]
    fn cookie_values_first_occurrence_wins() {
        let h = headers(&[("cookie", "a=1"), ("cookie", "a=2; b=3")]);

        let mut cookies = CookieValues::names(["a", "b", "c"]);
        cookies.read_header(&h).unwrap();

        assert_eq!(cookies.get("a"), Some("1"));
        assert_eq!(cookies.get("b"), Some("3"));
        assert_eq!(cookies.get("c"), Some(""));
    }

    #[test]
    fn ip_address_prefers_forwarded_for() {
        let mut ip = IpAddress::default();
        ip.read_header(&headers(&[("x-real-ip", "10.0.0.2"), ("x-forwarded-for", "10.0.0.1")])).unwrap();
        assert_eq!(ip.0, "10.0.0.1");

        let mut ip = IpAddress::default();
        ip.read_header(&headers(&[("x-real-ip", "10.0.0.2")])).unwrap();
        assert_eq!(ip.0, "10.0.0.2");

        let mut ip = IpAddress("unchanged".into());
        ip.read_header(&HeaderMap::new()).unwrap();
        assert_eq!(ip.0, "unchanged");
    }

    #[test]
    fn user_agent() {
        let mut ua = UserAgent::default();
        ua.read_header(&headers(&[("user-agent", "curl/8.0")])).unwrap();
        assert_eq!(ua.0, "curl/8.0");
    }

    #[test]
    fn bearer_token() {
        let mut token = BearerToken::default();
        token.read_header(&headers(&[("authorization", "Bearer abc-DEF_123")])).unwrap();
        assert_eq!(token.0, "abc-DEF_123");

        let mut token = BearerToken::default();
        token.read_header(&headers(&[("authorization", "bearer   xyz.rest")])).unwrap();
        assert_eq!(token.0, "xyz");

        let mut token = BearerToken::default();
        token.read_header(&headers(&[("authorization", "Basic dXNlcjpwYXNz")])).unwrap();
        assert_eq!(token.0, "");
    }

    #[test]
    fn set_cookie_appends() {
        let mut map = headers(&[("set-cookie", "first=1")]);

        let cookie = Cookie::build(("session", "abc")).path("/").same_site(SameSite::Lax).build();
        SetCookie(cookie).write_header(&mut map);

        let values: Vec<_> = map.get_all(SET_COOKIE).iter().map(|v| v.to_str().unwrap()).collect();
        assert_eq!(values, ["first=1", "session=abc; SameSite=Lax; Path=/"]);
    }

    #[test]
    fn set_cookie_without_name_is_skipped() {
        let mut map = HeaderMap::new();
        SetCookie(Cookie::new("", "value")).write_header(&mut map);
        assert!(map.is_empty());
    }
}
