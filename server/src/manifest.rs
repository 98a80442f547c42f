//! Asset manifest and allowed origins of the portfolio site

use url::{Origin, Url};

/// Cache version of the current deploy; bump it to rotate the cache
pub const CACHE_VERSION: &str = "hpr-portfolio-v1.2";

/// Document served when a navigation fails and has no cached copy
pub const OFFLINE_URL: &str = "/offline.html";

/// Icon served when an image fails and has no cached copy
pub const FALLBACK_ICON: &str = "./icon-192x192.png";

/// Assets that must all be cached for install to succeed
pub const MANDATORY_ASSETS: &[&str] = &[
    "./",
    "./index.html",
    "./about.html",
    "./contact.html",
    "./offline.html",
    "./style.css",
    "./script.js",
    "./manifest.json",
];

/// Assets cached on a best-effort basis
pub const OPTIONAL_ASSETS: &[&str] = &[
    "./Hellome.jpg",
    "./Aboutme.jpg",
    "./icon-192x192.png",
    "./icon-512x512.png",
    "https://fonts.googleapis.com/css2?family=Inter:wght@400;500;600;700;800;900&display=swap",
    "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.0.0-beta3/css/all.min.css",
];

/// Third-party hosts whose requests are intercepted and cached
pub const ALLOWED_HOSTS: &[&str] = &[
    "googleapis.com",
    "gstatic.com",
    "cdnjs.cloudflare.com",
    "web3forms.com",
];

/// Fixed list of resources to pre-populate on install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetManifest {
    pub mandatory: Vec<String>,
    pub optional: Vec<String>,
}

/// Manifest with every locator resolved against the site origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedManifest {
    pub mandatory: Vec<Url>,
    pub optional: Vec<Url>,
}

impl AssetManifest {
    pub fn portfolio() -> Self {
        Self {
            mandatory: MANDATORY_ASSETS.iter().map(|s| s.to_string()).collect(),
            optional: OPTIONAL_ASSETS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Resolve relative locators against `origin`; absolute ones are kept
    pub fn resolve(&self, origin: &Url) -> Result<ResolvedManifest, url::ParseError> {
        let resolve_all = |locators: &[String]| {
            locators
                .iter()
                .map(|locator| origin.join(locator))
                .collect::<Result<Vec<_>, _>>()
        };

        Ok(ResolvedManifest {
            mandatory: resolve_all(&self.mandatory)?,
            optional: resolve_all(&self.optional)?,
        })
    }

    pub fn len(&self) -> usize {
        self.mandatory.len() + self.optional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AssetManifest {
    fn default() -> Self {
        Self::portfolio()
    }
}

/// Origins whose requests the manager intercepts
#[derive(Debug, Clone)]
pub struct AllowedOrigins {
    own: Origin,
    hosts: Vec<String>,
}

impl AllowedOrigins {
    pub fn new(own: &Url, hosts: &[String]) -> Self {
        Self {
            own: own.origin(),
            hosts: hosts.iter().map(|h| h.to_ascii_lowercase()).collect(),
        }
    }

    pub fn is_own(&self, url: &Url) -> bool {
        url.origin() == self.own
    }

    /// Own origin, or a host equal to / below an allow-listed domain
    pub fn allows(&self, url: &Url) -> bool {
        if self.is_own(url) {
            return true;
        }

        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.hosts.iter().any(|allowed| {
            host == *allowed
                || host
                    .strip_suffix(allowed.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}
