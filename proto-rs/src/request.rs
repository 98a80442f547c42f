use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Request mode as reported by the page (mirrors `Sec-Fetch-Mode`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    Navigate,
    SameOrigin,
    NoCors,
    Cors,
}

impl RequestMode {
    /// Parse a `Sec-Fetch-Mode` header value
    pub fn from_header(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "navigate" => Some(Self::Navigate),
            "same-origin" => Some(Self::SameOrigin),
            "no-cors" => Some(Self::NoCors),
            "cors" => Some(Self::Cors),
            _ => None,
        }
    }
}

/// What the requested resource will be used for (mirrors `Sec-Fetch-Dest`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Image,
    Style,
    Script,
    Font,
    Manifest,
    Empty,
    Other,
}

impl Destination {
    /// Parse a `Sec-Fetch-Dest` header value
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" | "iframe" | "frame" => Self::Document,
            "image" => Self::Image,
            "style" => Self::Style,
            "script" | "worker" | "sharedworker" | "serviceworker" => Self::Script,
            "font" => Self::Font,
            "manifest" => Self::Manifest,
            "empty" | "" => Self::Empty,
            _ => Self::Other,
        }
    }
}

/// Identity of a cached request: method plus normalized URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    /// Build a key, normalizing the method to upper case and dropping any fragment
    pub fn new(method: &str, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.to_ascii_uppercase(),
            url: url.into(),
        }
    }

    /// Key for a plain GET of `url`
    pub fn get(url: &Url) -> Self {
        Self::new("GET", url)
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// An intercepted request as seen by the cache manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method: String,
    pub url: Url,
    pub mode: RequestMode,
    pub destination: Destination,
    /// Headers forwarded to the network when the request is fetched
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RequestDescriptor {
    /// A sub-resource GET with no particular destination
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            mode: RequestMode::NoCors,
            destination: Destination::Empty,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// A top-level page load
    pub fn navigate(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            destination: Destination::Document,
            ..Self::get(url)
        }
    }

    #[must_use]
    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_ascii_uppercase();
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_drops_fragment_and_uppercases_method() {
        let url = Url::parse("https://site.example/about.html#team").unwrap();
        let key = RequestKey::new("get", &url);
        assert_eq!(key.method, "GET");
        assert_eq!(key.url, "https://site.example/about.html");
        assert_eq!(key.to_string(), "GET https://site.example/about.html");
    }

    #[test]
    fn header_parsing() {
        assert_eq!(RequestMode::from_header("Navigate"), Some(RequestMode::Navigate));
        assert_eq!(RequestMode::from_header("websocket"), None);
        assert_eq!(Destination::from_header("image"), Destination::Image);
        assert_eq!(Destination::from_header("iframe"), Destination::Document);
        assert_eq!(Destination::from_header("audio"), Destination::Other);
    }
}
