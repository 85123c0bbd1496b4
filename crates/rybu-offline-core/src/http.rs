//! Request and response values passed between the host, the cache manager,
//! storage and the network.
//!
//! Bodies are `Bytes`, so cloning a `Response` hands out an independent read
//! view of the same buffer. That is all a cached snapshot needs.

use bytes::Bytes;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

/// Placeholder served for images when the network is unreachable
const PLACEHOLDER_SVG: &str = concat!(
    r##"<svg width="200" height="150" xmlns="http://www.w3.org/2000/svg">"##,
    r##"<rect width="100%" height="100%" fill="#f0f0f0"/>"##,
    r##"<text x="50%" y="50%" text-anchor="middle" dy=".3em" fill="#999">Image unavailable</text>"##,
    "</svg>"
);

pub const CONTENT_TYPE_SVG: &str = "image/svg+xml";

// ============================================================================
// Request
// ============================================================================

/// What the requesting page intends to do with the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// Fetches from script (XHR, fetch()) have no destination
    #[default]
    Empty,
    Document,
    Image,
    Script,
    Style,
    Font,
    Other,
}

impl Destination {
    pub fn from_str(s: Option<&str>) -> Self {
        match s.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") => Destination::Empty,
            Some("document") => Destination::Document,
            Some("image") => Destination::Image,
            Some("script") => Destination::Script,
            Some("style") => Destination::Style,
            Some("font") => Destination::Font,
            Some(_) => Destination::Other,
        }
    }

    /// Best guess from the path extension, used when a host has no better hint
    pub fn infer(url: &Url) -> Self {
        let path = url.path();
        if path.ends_with('/') || path.ends_with(".html") {
            return Destination::Document;
        }
        match path.rsplit('.').next().map(|ext| ext.to_ascii_lowercase()).as_deref() {
            Some("png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "avif" | "ico") => Destination::Image,
            Some("js" | "mjs") => Destination::Script,
            Some("css") => Destination::Style,
            Some("woff" | "woff2" | "ttf" | "otf") => Destination::Font,
            _ => Destination::Empty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub destination: Destination,
}

impl Request {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            destination: Destination::Empty,
        }
    }

    /// A full-page load
    pub fn navigate(url: Url) -> Self {
        Self::get(url).with_destination(Destination::Document)
    }

    pub fn parse(url: &str) -> CacheResult<Self> {
        let url = Url::parse(url).map_err(|e| CacheError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::get(url))
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.destination == Destination::Document
    }

    pub fn cache_key(&self) -> String {
        cache_key(&self.method, &self.url)
    }
}

/// Identity of a cached entry: method plus absolute URL
pub fn cache_key(method: &Method, url: &Url) -> String {
    format!("{} {}", method, url)
}

// ============================================================================
// Response
// ============================================================================

/// How the response relates to the worker's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response
    Basic,
    /// Cross-origin response with readable body
    Cors,
    /// Cross-origin response the page cannot read
    Opaque,
    /// Synthesised network error
    Error,
}

/// Ordered header list with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace any existing value for `name`
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.0.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.0.push((name, value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub response_type: ResponseType,
    pub headers: Headers,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, response_type: ResponseType, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            response_type,
            headers: Headers::new(),
            body: body.into(),
        }
    }

    /// 200 same-origin response, the common case in tests and fixtures
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(200, ResponseType::Basic, body)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Inline SVG returned for images while offline
    pub fn placeholder_image() -> Self {
        Self::new(200, ResponseType::Basic, Bytes::from_static(PLACEHOLDER_SVG.as_bytes()))
            .with_header("Content-Type", CONTENT_TYPE_SVG)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    /// 2xx, the batch population criterion
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Only exact 200 same-origin responses are stored at runtime
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.response_type == ResponseType::Basic
    }
}

// ============================================================================
// Scope
// ============================================================================

/// Font hosts whose requests are intercepted despite being cross-origin
pub const DEFAULT_FONT_HOSTS: &[&str] = &["fonts.googleapis.com", "fonts.gstatic.com"];

/// Which requests the worker intercepts: its own origin plus allow-listed font hosts.
#[derive(Debug, Clone)]
pub struct Scope {
    origin: Url,
    font_hosts: Vec<String>,
}

impl Scope {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            font_hosts: DEFAULT_FONT_HOSTS.iter().map(|h| h.to_string()).collect(),
        }
    }

    pub fn with_font_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.font_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin()
    }

    pub fn contains(&self, url: &Url) -> bool {
        if self.is_same_origin(url) {
            return true;
        }
        url.host_str()
            .map(|host| self.font_hosts.iter().any(|h| h.eq_ignore_ascii_case(host)))
            .unwrap_or(false)
    }

    /// Resolve a manifest path (or absolute URL) against the origin
    pub fn resolve(&self, path: &str) -> CacheResult<Url> {
        self.origin.join(path).map_err(|e| CacheError::InvalidUrl {
            url: path.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_headers_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "text/html");
        assert_eq!(headers.get("content-type"), Some("text/html"));

        headers.insert("CONTENT-TYPE", "text/css");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Content-Type"), Some("text/css"));
    }

    #[test]
    fn test_is_cacheable_requires_200_basic() {
        assert!(Response::ok("x").is_cacheable());
        assert!(!Response::new(201, ResponseType::Basic, "x").is_cacheable());
        assert!(!Response::new(200, ResponseType::Cors, "x").is_cacheable());
        assert!(!Response::new(0, ResponseType::Opaque, "").is_cacheable());
        assert!(!Response::new(404, ResponseType::Basic, "nope").is_cacheable());
    }

    #[test]
    fn test_placeholder_image() {
        let placeholder = Response::placeholder_image();
        assert_eq!(placeholder.content_type(), Some(CONTENT_TYPE_SVG));
        assert!(!placeholder.body.is_empty());
        assert!(placeholder.body.starts_with(b"<svg"));
    }

    #[test]
    fn test_cache_key_includes_method() {
        let req = Request::parse("https://rybuhome.com/style.css").unwrap();
        assert_eq!(req.cache_key(), "GET https://rybuhome.com/style.css");

        let post = req.with_method(Method::POST);
        assert_eq!(post.cache_key(), "POST https://rybuhome.com/style.css");
    }

    #[test]
    fn test_destination_from_str() {
        assert_eq!(Destination::from_str(None), Destination::Empty);
        assert_eq!(Destination::from_str(Some("Document")), Destination::Document);
        assert_eq!(Destination::from_str(Some("image")), Destination::Image);
        assert_eq!(Destination::from_str(Some("manifest")), Destination::Other);
    }

    #[test]
    fn test_destination_infer() {
        assert_eq!(Destination::infer(&url("https://a.com/")), Destination::Document);
        assert_eq!(Destination::infer(&url("https://a.com/privacy/index.html")), Destination::Document);
        assert_eq!(Destination::infer(&url("https://a.com/assets/img/hero.webp")), Destination::Image);
        assert_eq!(Destination::infer(&url("https://a.com/modules/slider.js")), Destination::Script);
        assert_eq!(Destination::infer(&url("https://a.com/api/contact")), Destination::Empty);
    }

    #[test]
    fn test_scope_contains() {
        let scope = Scope::new(url("https://rybuhome.com/"));
        assert!(scope.contains(&url("https://rybuhome.com/style.css")));
        assert!(scope.contains(&url("https://fonts.googleapis.com/css2?family=Poppins")));
        assert!(scope.contains(&url("https://fonts.gstatic.com/s/poppins.woff2")));
        assert!(!scope.contains(&url("https://cdn.example.com/lib.js")));
        // Different scheme is a different origin
        assert!(!scope.contains(&url("http://rybuhome.com/style.css")));
    }

    #[test]
    fn test_scope_font_host_match_is_exact() {
        let scope = Scope::new(url("https://rybuhome.com/"));
        assert!(!scope.contains(&url("https://evil.com/fonts.googleapis.com/x")));
    }

    #[test]
    fn test_scope_resolve() {
        let scope = Scope::new(url("https://rybuhome.com/"));
        assert_eq!(scope.resolve("/index.html").unwrap().as_str(), "https://rybuhome.com/index.html");
        assert_eq!(
            scope.resolve("https://fonts.googleapis.com/css2?family=Poppins").unwrap().host_str(),
            Some("fonts.googleapis.com")
        );
    }
}
