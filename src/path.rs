//! Absolute and relative paths into the composed tree (spec §3, §4.3).
//!
//! Scopes are directories, resources are files — the union-filesystem
//! analogy from spec §9. A [`Path`] is the address; [`crate::proxy::Proxy`]
//! is the lazy handle that carries one around.

use std::fmt;

/// A path into the composed tree.
///
/// Absolute paths are resolved from the composed root; relative paths climb
/// `up` scopes from the current position and then descend `suffix`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path {
    /// `None` for a relative path, `Some(segments)` for an absolute one.
    absolute: Option<Vec<String>>,
    /// Number of ancestor steps to climb before applying `suffix`. Only
    /// meaningful when `absolute` is `None`.
    up: usize,
    /// Segments to descend after resolving the base (root, or the scope
    /// `up` ancestors above the current one).
    suffix: Vec<String>,
}

impl Path {
    /// The empty absolute path — the composed root itself.
    pub fn root() -> Self {
        Path {
            absolute: Some(Vec::new()),
            up: 0,
            suffix: Vec::new(),
        }
    }

    /// An absolute path built from root-relative segments.
    pub fn absolute(segments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Path {
            absolute: Some(segments.into_iter().map(Into::into).collect()),
            up: 0,
            suffix: Vec::new(),
        }
    }

    /// A relative path: climb `up` ancestors, then descend `suffix`.
    pub fn relative(up: usize, suffix: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Path {
            absolute: None,
            up,
            suffix: suffix.into_iter().map(Into::into).collect(),
        }
    }

    /// A relative path with no climb, just a single child step.
    pub fn child(name: impl Into<String>) -> Self {
        Path::relative(0, [name.into()])
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute.is_some()
    }

    pub fn up_count(&self) -> usize {
        self.up
    }

    pub fn suffix(&self) -> &[String] {
        if let Some(segments) = &self.absolute {
            segments
        } else {
            &self.suffix
        }
    }

    /// Return a new path extended with one more descending step.
    pub fn join(&self, name: impl Into<String>) -> Path {
        let mut next = self.clone();
        if let Some(segments) = &mut next.absolute {
            segments.push(name.into());
        } else {
            next.suffix.push(name.into());
        }
        next
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(segments) = &self.absolute {
            write!(f, "/{}", segments.join("/"))
        } else {
            write!(f, "{}{}", "../".repeat(self.up), self.suffix.join("/"))
        }
    }
}
