//! Decides which caching policy serves a request.
//!
//! Rules, first match wins:
//!
//! | # | Condition                                                    | Category      |
//! |---|--------------------------------------------------------------|---------------|
//! | 1 | method is not a read, or the scheme is not http(s)           | `PassThrough` |
//! | 2 | image destination, or a thumbnail path                       | `Images`      |
//! | 3 | the application's own origin                                 | `Static`      |
//! | 4 | archive host and a search or metadata path                   | `Dynamic`     |
//! | 5 | archive host, anything else (raw media and downloads)        | `PassThrough` |
//! | 6 | anything else                                                | `Dynamic`     |

use std::fmt;

use serde::Deserialize;
use url::{Origin, Url};

use crate::http::{RequestDescriptor, ResourceType};

/// Classification bucket driving which strategy applies to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Static,
    Dynamic,
    Images,
    PassThrough,
}

impl Category {
    /// Categories that own a store.
    pub const CACHED: [Category; 3] = [Category::Static, Category::Dynamic, Category::Images];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
            Self::Images => "images",
            Self::PassThrough => "passthrough",
        }
    }

    /// Returns `false` for `PassThrough`, which never touches a store.
    pub fn is_cached(self) -> bool {
        !matches!(self, Self::PassThrough)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pure function from a request descriptor to its [`Category`].
///
/// # Examples
///
/// ```
/// use reelcache::classify::{Category, Classifier};
/// use reelcache::http::RequestDescriptor;
/// use url::Url;
///
/// let classifier = Classifier::new(Url::parse("https://films.example").unwrap(), "archive.org");
///
/// let search = RequestDescriptor::get("https://archive.org/advancedsearch.php?q=noir").unwrap();
/// assert_eq!(classifier.classify(&search), Category::Dynamic);
///
/// let video = RequestDescriptor::get("https://archive.org/download/reel/reel.mp4").unwrap();
/// assert_eq!(classifier.classify(&video), Category::PassThrough);
/// ```
#[derive(Debug, Clone)]
pub struct Classifier {
    app_origin: Origin,
    archive_host: String,
    dynamic_paths: Vec<String>,
    thumbnail_paths: Vec<String>,
}

impl Classifier {
    /// Creates a classifier with the default archive path markers.
    pub fn new(app_origin: Url, archive_host: impl Into<String>) -> Self {
        Self {
            app_origin: app_origin.origin(),
            archive_host: archive_host.into().to_ascii_lowercase(),
            dynamic_paths: vec!["/advancedsearch.php".into(), "/metadata/".into()],
            thumbnail_paths: vec!["/img/".into()],
        }
    }

    /// Replaces the path fragments that mark archive search/metadata endpoints.
    #[must_use]
    pub fn with_dynamic_paths(mut self, paths: Vec<String>) -> Self {
        self.dynamic_paths = paths;
        self
    }

    /// Replaces the path fragments conventionally used for thumbnails.
    #[must_use]
    pub fn with_thumbnail_paths(mut self, paths: Vec<String>) -> Self {
        self.thumbnail_paths = paths;
        self
    }

    pub fn classify(&self, request: &RequestDescriptor) -> Category {
        let url = request.url();

        if !request.method().is_read() || !matches!(url.scheme(), "http" | "https") {
            return Category::PassThrough;
        }

        let path = url.path();

        if request.destination() == ResourceType::Image
            || self.thumbnail_paths.iter().any(|p| path.contains(p.as_str()))
        {
            return Category::Images;
        }

        if url.origin() == self.app_origin {
            return Category::Static;
        }

        if url.host_str() == Some(self.archive_host.as_str()) {
            if self.dynamic_paths.iter().any(|p| path.contains(p.as_str())) {
                return Category::Dynamic;
            }
            return Category::PassThrough;
        }

        Category::Dynamic
    }
}
