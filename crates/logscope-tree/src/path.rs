use logscope_types::{MAX_SCOPE_PATH_LEN, SCOPE_ALL, SCOPE_SEPARATOR};

use crate::ScopeError;

/// A scope path split into its segment names
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScopePath {
    segments: Vec<String>,
    wildcard: bool,
}

impl ScopePath {
    /// Split a raw path such as `Svc::Comp::Init` or `Svc::Comp::*`.
    ///
    /// Empty input yields an empty path. A trailing wildcard is stripped and
    /// remembered; empty segments and oversized paths are rejected.
    pub fn parse(raw: &str) -> Result<Self, ScopeError> {
        if raw.is_empty() {
            return Ok(Self::default());
        }

        if raw.len() > MAX_SCOPE_PATH_LEN {
            return Err(ScopeError::malformed(raw, "path exceeds the scope name buffer"));
        }

        let (body, wildcard) = match raw.strip_suffix(SCOPE_ALL) {
            Some(body) => (body.strip_suffix(SCOPE_SEPARATOR).unwrap_or(body), true),
            None => (raw, false),
        };

        if wildcard && body.ends_with(':') {
            return Err(ScopeError::malformed(raw, "wildcard must follow a separator"));
        }

        if body.is_empty() {
            return Ok(Self {
                segments: Vec::new(),
                wildcard,
            });
        }

        let mut segments = Vec::new();
        for segment in body.split(SCOPE_SEPARATOR) {
            if segment.is_empty() {
                return Err(ScopeError::malformed(raw, "empty segment"));
            }
            if segment.contains(SCOPE_ALL) {
                return Err(ScopeError::malformed(raw, "wildcard is only allowed at the end"));
            }
            segments.push(segment.to_string());
        }

        Ok(Self { segments, wildcard })
    }

    /// Segment names in order from the root
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Consume the path, returning its segments
    pub fn into_segments(self) -> Vec<String> {
        self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when the path addresses a node and all of its descendants
    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Join segments back into a scope path
    pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
        segments
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(SCOPE_SEPARATOR)
    }

    /// Append the subtree wildcard to a node path
    pub fn wildcard_of(path: &str) -> String {
        if path.is_empty() {
            SCOPE_ALL.to_string()
        } else {
            format!("{}{}{}", path, SCOPE_SEPARATOR, SCOPE_ALL)
        }
    }
}

impl std::fmt::Display for ScopePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = Self::join(&self.segments);
        if self.wildcard {
            f.write_str(&Self::wildcard_of(&joined))
        } else {
            f.write_str(&joined)
        }
    }
}

/// Split a raw scope path, see [`ScopePath::parse`]
pub fn split_scope_path(raw: &str) -> Result<ScopePath, ScopeError> {
    ScopePath::parse(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_path() {
        let path = split_scope_path("Svc::Comp::Init").unwrap();
        assert_eq!(path.segments(), ["Svc", "Comp", "Init"]);
        assert!(!path.is_wildcard());
    }

    #[test]
    fn test_empty_input_is_empty_path() {
        let path = split_scope_path("").unwrap();
        assert!(path.is_empty());
        assert!(!path.is_wildcard());
    }

    #[test]
    fn test_wildcard_forms() {
        let separated = split_scope_path("Svc::Comp::*").unwrap();
        let bare = split_scope_path("Svc::Comp*").unwrap();
        assert_eq!(separated, bare);
        assert!(separated.is_wildcard());
        assert_eq!(separated.segments(), ["Svc", "Comp"]);
        assert_eq!(separated.to_string(), "Svc::Comp::*");

        let everything = split_scope_path("*").unwrap();
        assert!(everything.is_empty());
        assert!(everything.is_wildcard());
    }

    #[test]
    fn test_empty_segment_rejected() {
        for raw in ["Svc::::Init", "::Init", "Svc::", "Svc::Comp::::*"] {
            assert!(
                matches!(split_scope_path(raw), Err(ScopeError::MalformedPath { .. })),
                "{raw} should be malformed"
            );
        }
    }

    #[test]
    fn test_wildcard_after_single_colon_rejected() {
        for raw in ["Svc:*", "Svc::Comp:*", "Svc:::*"] {
            assert!(
                matches!(split_scope_path(raw), Err(ScopeError::MalformedPath { .. })),
                "{raw} should be malformed"
            );
        }
        assert!(split_scope_path("Svc:Comp::*").unwrap().is_wildcard());
    }

    #[test]
    fn test_inner_wildcard_rejected() {
        assert!(split_scope_path("Svc::*::Init").is_err());
    }

    #[test]
    fn test_oversized_path_rejected() {
        let raw = vec!["a"; MAX_SCOPE_PATH_LEN].join(SCOPE_SEPARATOR);
        assert!(split_scope_path(&raw).is_err());
    }

    #[test]
    fn test_single_colon_stays_in_segment() {
        let path = split_scope_path("Svc:Comp::Init").unwrap();
        assert_eq!(path.segments(), ["Svc:Comp", "Init"]);
    }
}
