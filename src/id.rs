//! Identifier resolution for RO-Crate graphs
//!
//! Every graph owns a private base URI under the `arcp:` scheme, built
//! from a fresh ULID. Local and relative identifiers are resolved
//! against that base to obtain one canonical form per graph instance,
//! which serves as the entity map key. Canonical ids are not portable
//! across graphs.

use ulid::Ulid;
use url::Url;

/// Check whether an identifier is an absolute URI
pub fn is_url(id: &str) -> bool {
    id.starts_with("http://")
        || id.starts_with("https://")
        || id.starts_with("ftp://")
        || id.starts_with("urn:")
        || id.starts_with("mailto:")
        || id.starts_with("arcp:")
}

/// Normalize a directory-like identifier to end with a single '/'
///
/// "data", "data/" and "data//" all converge on "data/".
pub fn dir_id(id: &str) -> String {
    format!("{}/", id.trim_end_matches('/'))
}

/// Per-graph identifier resolver
#[derive(Debug, Clone)]
pub struct IdResolver {
    base: Url,
}

impl IdResolver {
    pub fn new() -> Self {
        let ulid = Ulid::new().to_string().to_lowercase();
        let base = Url::parse(&format!("arcp://ulid,{}/", ulid))
            .expect("arcp base URI is well-formed");
        Self { base }
    }

    /// The graph's private base URI
    pub fn base_uri(&self) -> &str {
        self.base.as_str()
    }

    /// Convert an arbitrary identifier to its canonical form
    ///
    /// Absolute URIs pass through unchanged; everything else is joined
    /// against the graph base, which also normalizes "./" and "../"
    /// segments. Trailing slashes are stripped in both cases.
    pub fn canonicalize(&self, id: &str) -> String {
        let resolved = if is_url(id) {
            id.to_string()
        } else {
            match self.base.join(id) {
                Ok(url) => url.to_string(),
                // Unjoinable ids are kept verbatim rather than rejected
                Err(_) => id.to_string(),
            }
        };
        resolved.trim_end_matches('/').to_string()
    }
}

impl Default for IdResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://orcid.org/0000-0001"));
        assert!(is_url("http://example.org"));
        assert!(is_url("urn:uuid:1234"));
        assert!(is_url("arcp://uuid,deadbeef/"));
        assert!(!is_url("./data.csv"));
        assert!(!is_url("data/"));
        assert!(!is_url("#person1"));
        assert!(!is_url("ro-crate-metadata.json"));
    }

    #[test]
    fn test_dir_id() {
        assert_eq!(dir_id("data"), "data/");
        assert_eq!(dir_id("data/"), "data/");
        assert_eq!(dir_id("data//"), "data/");
        assert_eq!(dir_id("./"), "./");
    }

    #[test]
    fn test_canonicalize_converges() {
        let resolver = IdResolver::new();
        let a = resolver.canonicalize("data");
        let b = resolver.canonicalize("data/");
        let c = resolver.canonicalize("./data/");
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn test_canonicalize_absolute_passthrough() {
        let resolver = IdResolver::new();
        assert_eq!(
            resolver.canonicalize("https://example.org/crate/"),
            "https://example.org/crate"
        );
        assert_eq!(
            resolver.canonicalize("https://orcid.org/0000-0001"),
            "https://orcid.org/0000-0001"
        );
    }

    #[test]
    fn test_canonicalize_fragment() {
        let resolver = IdResolver::new();
        let id = resolver.canonicalize("#person1");
        assert!(id.ends_with("#person1"));
        assert!(id.starts_with("arcp://"));
    }

    #[test]
    fn test_bases_are_private() {
        let a = IdResolver::new();
        let b = IdResolver::new();
        assert_ne!(a.canonicalize("data.csv"), b.canonicalize("data.csv"));
    }
}
