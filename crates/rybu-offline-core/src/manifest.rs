//! The fixed list of assets guaranteed to be cached after install.

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::CacheResult;
use crate::http::Scope;

/// Document served in place of any navigation while offline
pub const DEFAULT_ROOT_DOCUMENT: &str = "/index.html";

/// RybuHome deploy manifest. Bump the version tag whenever this changes.
const RYBUHOME_ASSETS: &[&str] = &[
    "/",
    "/index.html",
    "/style.css",
    "/normalize.css",
    "/script.js",
    "/privacy/",
    "/privacy/index.html",
    // Images
    "/assets/img/logo.svg",
    "/assets/img/hero.webp",
    "/assets/img/property-featured-building.webp",
    "/assets/img/client-1.webp",
    "/assets/img/client-2.webp",
    // Icons
    "/assets/icons/security-icon.svg",
    "/assets/icons/movers-icon.svg",
    "/assets/icons/air-conditioner-icon.svg",
    "/assets/icons/furniture-icon.svg",
    "/assets/icons/flower-garden-icon.svg",
    "/assets/icons/swimming-pool-icon.svg",
    "/assets/icons/quote.png",
    // Page modules
    "/modules/burger-menu.js",
    "/modules/modal.js",
    "/modules/slider.js",
    "/modules/form-validation.js",
    "/modules/lazy-loading.js",
    // Web font stylesheet
    "https://fonts.googleapis.com/css2?family=Poppins:wght@400;500;600;700&display=swap",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    assets: Vec<String>,
    #[serde(default = "default_root_document")]
    root_document: String,
}

fn default_root_document() -> String {
    DEFAULT_ROOT_DOCUMENT.to_string()
}

impl AssetManifest {
    pub fn new<I, S>(assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            assets: assets.into_iter().map(Into::into).collect(),
            root_document: default_root_document(),
        }
    }

    pub fn with_root_document(mut self, root: impl Into<String>) -> Self {
        self.root_document = root.into();
        self
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn root_document(&self) -> &str {
        &self.root_document
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Absolute URLs for every asset, in manifest order
    pub fn resolve(&self, scope: &Scope) -> CacheResult<Vec<Url>> {
        self.assets.iter().map(|asset| scope.resolve(asset)).collect()
    }
}

impl Default for AssetManifest {
    fn default() -> Self {
        Self::new(RYBUHOME_ASSETS.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Scope {
        Scope::new(Url::parse("https://rybuhome.com/").unwrap())
    }

    #[test]
    fn test_default_manifest_contains_root_document() {
        let manifest = AssetManifest::default();
        assert!(manifest.assets().iter().any(|a| a == manifest.root_document()));
        assert_eq!(manifest.len(), RYBUHOME_ASSETS.len());
    }

    #[test]
    fn test_resolve_keeps_order_and_cross_origin_fonts() {
        let manifest = AssetManifest::new(["/", "/style.css", "https://fonts.googleapis.com/css2?family=Poppins"]);
        let urls = manifest.resolve(&scope()).unwrap();
        assert_eq!(urls[0].as_str(), "https://rybuhome.com/");
        assert_eq!(urls[1].as_str(), "https://rybuhome.com/style.css");
        assert_eq!(urls[2].host_str(), Some("fonts.googleapis.com"));
    }

    #[test]
    fn test_every_default_asset_is_in_scope() {
        let scope = scope();
        for url in AssetManifest::default().resolve(&scope).unwrap() {
            assert!(scope.contains(&url), "{} should be in scope", url);
        }
    }

    #[test]
    fn test_deserialize_defaults_root_document() {
        let manifest: AssetManifest = serde_json::from_str(r#"{"assets": ["/", "/index.html"]}"#).unwrap();
        assert_eq!(manifest.root_document(), DEFAULT_ROOT_DOCUMENT);
        assert_eq!(manifest.len(), 2);
    }
}
