//! Image reference parsing.

use std::fmt;
use std::str::FromStr;

use crate::error::{RuntimeError, RuntimeResult};

/// A parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    /// Registry hostname.
    pub registry: String,
    /// Repository name.
    pub repository: String,
    /// Tag or digest.
    pub reference: ImageTag,
}

/// Image tag or digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageTag {
    /// A tag (e.g., "latest").
    Tag(String),
    /// A digest (e.g., "sha256:abc123...").
    Digest(String),
}

impl ImageReference {
    /// Default registry.
    pub const DEFAULT_REGISTRY: &'static str = "docker.io";
    /// Default tag.
    pub const DEFAULT_TAG: &'static str = "latest";

    /// Parse an image reference string.
    ///
    /// Examples:
    /// - `alpine` -> docker.io/library/alpine:latest
    /// - `ghcr.io/nokia/srlinux:24.10` -> ghcr.io/nokia/srlinux:24.10
    /// - `localhost:5000/ceos:4.32` -> localhost:5000/ceos:4.32
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidImageReference`] for empty references,
    /// embedded whitespace, upper-case repositories, or empty tags/digests.
    pub fn parse(reference: &str) -> RuntimeResult<Self> {
        let original = reference;
        let invalid = |reason: &str| RuntimeError::InvalidImageReference {
            reference: original.to_string(),
            reason: reason.to_string(),
        };

        let reference = reference.trim();
        if reference.is_empty() {
            return Err(invalid("reference is empty"));
        }
        if reference.chars().any(char::is_whitespace) {
            return Err(invalid("reference contains whitespace"));
        }

        let (name, tag) = if let Some((name, digest)) = reference.split_once('@') {
            if !digest.contains(':') || digest.ends_with(':') {
                return Err(invalid("digest must be <algorithm>:<hex>"));
            }
            (name, ImageTag::Digest(digest.to_string()))
        } else if let Some(idx) = reference.rfind(':') {
            let potential_tag = &reference[idx + 1..];
            if potential_tag.contains('/') {
                // registry:port/image without a tag
                (reference, ImageTag::Tag(Self::DEFAULT_TAG.to_string()))
            } else if potential_tag.is_empty() {
                return Err(invalid("tag is empty"));
            } else {
                (&reference[..idx], ImageTag::Tag(potential_tag.to_string()))
            }
        } else {
            (reference, ImageTag::Tag(Self::DEFAULT_TAG.to_string()))
        };

        if name.is_empty() || name.starts_with('/') || name.ends_with('/') || name.contains("//") {
            return Err(invalid("repository name is malformed"));
        }

        let (registry, repository) = match name.split_once('/') {
            Some((host, rest))
                if host.contains('.') || host.contains(':') || host == "localhost" =>
            {
                (host.to_string(), rest.to_string())
            }
            Some(_) => (Self::DEFAULT_REGISTRY.to_string(), name.to_string()),
            None => (Self::DEFAULT_REGISTRY.to_string(), format!("library/{name}")),
        };

        if repository.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(invalid("repository must be lowercase"));
        }

        Ok(Self {
            registry,
            repository,
            reference: tag,
        })
    }

    /// Get the full reference string.
    #[must_use]
    pub fn full_reference(&self) -> String {
        match &self.reference {
            ImageTag::Tag(t) => format!("{}/{}:{}", self.registry, self.repository, t),
            ImageTag::Digest(d) => format!("{}/{}@{}", self.registry, self.repository, d),
        }
    }
}

impl FromStr for ImageReference {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_reference())
    }
}
