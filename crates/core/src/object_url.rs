//! Object-storage URL resolution.
//!
//! Submissions for image evaluations store only an object key. Presenting them
//! requires joining the configured endpoint, bucket and key into a URL. The
//! join follows URL path-join rules: the endpoint's existing path is kept,
//! empty and `.` segments are dropped, `..` climbs one level, a trailing slash
//! on the last element survives, and existing percent-escapes are left alone.
//! Escaped dots such as `%2e%2e` are literal text, never path navigation.

use std::fmt::Write as _;

use thiserror::Error;
use url::{Position, Url};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ObjectUrlError {
    #[error("object storage endpoint cannot be empty")]
    EmptyEndpoint,

    #[error("object storage bucket cannot be empty")]
    EmptyBucket,

    #[error("invalid object storage endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("invalid percent-escape in {segment:?}")]
    InvalidEscape { segment: String },
}

//
// ─── RESOLVER SEAM ─────────────────────────────────────────────────────────────
//

/// Turns a stored object key into a displayable URL.
pub trait ObjectUrlResolver: Send + Sync {
    /// # Errors
    ///
    /// Returns `ObjectUrlError` if the key cannot be joined onto the
    /// configured location.
    fn resolve(&self, key: &str) -> Result<String, ObjectUrlError>;
}

/// Endpoint + bucket pair of an S3-compatible object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStore {
    endpoint: String,
    bucket: String,
}

impl ObjectStore {
    /// Validate and build the store location.
    ///
    /// # Errors
    ///
    /// Returns `EmptyEndpoint`/`EmptyBucket` for blank values and
    /// `InvalidEndpoint` when the endpoint is not an absolute URL.
    pub fn new(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Result<Self, ObjectUrlError> {
        let endpoint = endpoint.into().trim().to_owned();
        let bucket = bucket.into().trim().to_owned();
        if endpoint.is_empty() {
            return Err(ObjectUrlError::EmptyEndpoint);
        }
        if bucket.is_empty() {
            return Err(ObjectUrlError::EmptyBucket);
        }
        parse_base(&endpoint)?;
        Ok(Self { endpoint, bucket })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl ObjectUrlResolver for ObjectStore {
    fn resolve(&self, key: &str) -> Result<String, ObjectUrlError> {
        join_object_url(&self.endpoint, &self.bucket, key)
    }
}

//
// ─── JOIN ──────────────────────────────────────────────────────────────────────
//

/// Join `endpoint`, `bucket` and `key` into a single URL.
///
/// ```
/// # use course_core::object_url::join_object_url;
/// let url = join_object_url("https://store.example", "bucket1", "abc.png").unwrap();
/// assert_eq!(url, "https://store.example/bucket1/abc.png");
/// ```
///
/// # Errors
///
/// Returns `InvalidEndpoint` if the endpoint does not parse as a base URL and
/// `InvalidEscape` if the bucket or key carries a malformed `%` sequence.
pub fn join_object_url(endpoint: &str, bucket: &str, key: &str) -> Result<String, ObjectUrlError> {
    let url = parse_base(endpoint)?;
    check_escapes(bucket)?;
    check_escapes(key)?;

    let elements = [url.path(), bucket, key];
    let mut path = clean_rooted(&elements);
    if key.ends_with('/') && !path.ends_with('/') {
        path.push('/');
    }

    // `Url::set_path` would decode `%2e` into dot segments, so the escaped
    // path is spliced between the authority and any query instead.
    Ok(format!(
        "{}{}{}",
        &url[..Position::BeforePath],
        escape_path(&path),
        &url[Position::AfterPath..]
    ))
}

fn parse_base(endpoint: &str) -> Result<Url, ObjectUrlError> {
    let invalid = |reason: String| ObjectUrlError::InvalidEndpoint {
        endpoint: endpoint.to_owned(),
        reason,
    };
    let url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(invalid("endpoint cannot carry a path".into()));
    }
    Ok(url)
}

/// Lexically clean the joined elements into an absolute path.
fn clean_rooted(elements: &[&str]) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in elements.iter().flat_map(|e| e.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Percent-encode bytes outside the path character set.
///
/// `%` passes through untouched: every escape was validated beforehand.
fn escape_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for byte in path.bytes() {
        let keep = byte.is_ascii_alphanumeric()
            || matches!(
                byte,
                b'-' | b'.'
                    | b'_'
                    | b'~'
                    | b'/'
                    | b'%'
                    | b'!'
                    | b'$'
                    | b'&'
                    | b'\''
                    | b'('
                    | b')'
                    | b'*'
                    | b'+'
                    | b','
                    | b';'
                    | b'='
                    | b':'
                    | b'@'
            );
        if keep {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

fn check_escapes(segment: &str) -> Result<(), ObjectUrlError> {
    let bytes = segment.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .is_some_and(|pair| pair.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return Err(ObjectUrlError::InvalidEscape {
                    segment: segment.to_owned(),
                });
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_endpoint_bucket_and_key() {
        let url = join_object_url("https://store.example", "bucket1", "abc.png").unwrap();
        assert_eq!(url, "https://store.example/bucket1/abc.png");
    }

    #[test]
    fn avoids_double_slashes() {
        let url = join_object_url("https://store.example/", "/bucket1/", "/abc.png").unwrap();
        assert_eq!(url, "https://store.example/bucket1/abc.png");
    }

    #[test]
    fn keeps_endpoint_path_prefix() {
        let url = join_object_url("http://localhost:9000/minio", "media", "a/b.png").unwrap();
        assert_eq!(url, "http://localhost:9000/minio/media/a/b.png");
    }

    #[test]
    fn cleans_dot_segments() {
        let url = join_object_url("https://store.example", "bucket1", "./x/../abc.png").unwrap();
        assert_eq!(url, "https://store.example/bucket1/abc.png");
    }

    #[test]
    fn preserves_existing_percent_escapes() {
        let url = join_object_url("https://store.example", "bucket1", "my%20photo.png").unwrap();
        assert_eq!(url, "https://store.example/bucket1/my%20photo.png");
    }

    #[test]
    fn escaped_dots_stay_inside_the_bucket() {
        let url =
            join_object_url("https://store.example", "bucket1", "%2e%2e/secret.png").unwrap();
        assert_eq!(url, "https://store.example/bucket1/%2e%2e/secret.png");

        let url = join_object_url("https://store.example", "bucket1", "%2E/x.png").unwrap();
        assert_eq!(url, "https://store.example/bucket1/%2E/x.png");
    }

    #[test]
    fn escapes_backslash_and_reserved_characters() {
        let url = join_object_url("https://store.example", "bucket1", "a\\b.png").unwrap();
        assert_eq!(url, "https://store.example/bucket1/a%5Cb.png");

        let url = join_object_url("https://store.example", "bucket1", "a?b #1.png").unwrap();
        assert_eq!(url, "https://store.example/bucket1/a%3Fb%20%231.png");
    }

    #[test]
    fn keeps_endpoint_query() {
        let url = join_object_url("https://store.example/base?sig=1", "bucket1", "abc.png").unwrap();
        assert_eq!(url, "https://store.example/base/bucket1/abc.png?sig=1");
    }

    #[test]
    fn keeps_trailing_slash_of_key() {
        let url = join_object_url("https://store.example", "bucket1", "folder/").unwrap();
        assert_eq!(url, "https://store.example/bucket1/folder/");
    }

    #[test]
    fn rejects_malformed_escape() {
        let err = join_object_url("https://store.example", "bucket1", "bad%zz.png").unwrap_err();
        assert!(matches!(err, ObjectUrlError::InvalidEscape { .. }));

        let err = join_object_url("https://store.example", "bucket1", "trailing%2").unwrap_err();
        assert!(matches!(err, ObjectUrlError::InvalidEscape { .. }));
    }

    #[test]
    fn rejects_unparseable_endpoint() {
        let err = join_object_url("not a url", "bucket1", "abc.png").unwrap_err();
        assert!(matches!(err, ObjectUrlError::InvalidEndpoint { .. }));
    }

    #[test]
    fn store_requires_endpoint_and_bucket() {
        assert_eq!(
            ObjectStore::new("  ", "bucket1").unwrap_err(),
            ObjectUrlError::EmptyEndpoint
        );
        assert_eq!(
            ObjectStore::new("https://store.example", "").unwrap_err(),
            ObjectUrlError::EmptyBucket
        );
        assert!(matches!(
            ObjectStore::new("mailto:ops@example.com", "bucket1").unwrap_err(),
            ObjectUrlError::InvalidEndpoint { .. }
        ));
    }

    #[test]
    fn store_resolves_through_the_trait() {
        let store = ObjectStore::new("https://store.example", "bucket1").unwrap();
        let resolver: &dyn ObjectUrlResolver = &store;
        assert_eq!(
            resolver.resolve("abc.png").unwrap(),
            "https://store.example/bucket1/abc.png"
        );
    }
}
