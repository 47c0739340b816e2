//! Canonical, comparable paths with 1-based same-name-sibling (SNS)
//! indexes, and the `PathFactory` element algebra used to build and walk
//! them (spec §4.6 and the "PathFactory & Path algebra" component of §2).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::name::Name;

/// A single step of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathElement {
    /// The absolute-path marker; only ever the first element of a `Path`.
    Root,
    /// A named step with its 1-based same-name-sibling index.
    Named(Name, u32),
    /// The `.` marker.
    CurrentDir,
    /// The `..` marker.
    ParentDir,
}

impl PathElement {
    pub fn named(name: Name, index: u32) -> Self {
        debug_assert!(index >= 1, "SNS index is 1-based");
        PathElement::Named(name, index)
    }

    pub fn name(&self) -> Option<&Name> {
        match self {
            PathElement::Named(name, _) => Some(name),
            _ => None,
        }
    }

    pub fn index(&self) -> Option<u32> {
        match self {
            PathElement::Named(_, index) => Some(*index),
            _ => None,
        }
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::Root => Ok(()),
            PathElement::Named(name, index) if *index <= 1 => write!(f, "{}", name),
            PathElement::Named(name, index) => write!(f, "{}[{}]", name, index),
            PathElement::CurrentDir => write!(f, "."),
            PathElement::ParentDir => write!(f, ".."),
        }
    }
}

/// A value-equal, totally ordered sequence of [`PathElement`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path {
    elements: Vec<PathElement>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid path: {0}")]
pub struct PathParseError(String);

impl Path {
    /// The absolute root path, `/`.
    pub fn root() -> Self {
        Path {
            elements: vec![PathElement::Root],
        }
    }

    /// The empty relative path (zero elements).
    pub fn empty_relative() -> Self {
        Path { elements: vec![] }
    }

    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    pub fn is_absolute(&self) -> bool {
        matches!(self.elements.first(), Some(PathElement::Root))
    }

    pub fn is_root(&self) -> bool {
        self.elements.len() == 1 && matches!(self.elements[0], PathElement::Root)
    }

    pub fn last_element(&self) -> Option<&PathElement> {
        self.elements.last()
    }

    /// Appends a named step with the given SNS index, returning a new path.
    pub fn append(&self, name: Name, index: u32) -> Path {
        let mut elements = self.elements.clone();
        elements.push(PathElement::named(name, index));
        Path { elements }
    }

    /// Returns the path `degree` levels up from `self`, or `None` if that
    /// would go above the root (for absolute paths) or past the start (for
    /// relative paths).
    pub fn ancestor(&self, degree: usize) -> Option<Path> {
        if degree == 0 {
            return Some(self.clone());
        }
        let keep = self.elements.len().checked_sub(degree)?;
        if self.is_absolute() && keep == 0 {
            // Would strip away the Root marker itself.
            return None;
        }
        Some(Path {
            elements: self.elements[..keep].to_vec(),
        })
    }

    pub fn parent(&self) -> Option<Path> {
        self.ancestor(1)
    }

    /// Returns the relative path from `ancestor` to `self`, or `None` if
    /// `ancestor` is not a prefix of `self`.
    pub fn relativize(&self, ancestor: &Path) -> Option<Path> {
        if self.elements.len() < ancestor.elements.len() {
            return None;
        }
        if self.elements[..ancestor.elements.len()] != ancestor.elements[..] {
            return None;
        }
        Some(Path {
            elements: self.elements[ancestor.elements.len()..].to_vec(),
        })
    }

    /// Returns whether `self` is `ancestor`, or a descendant of it.
    pub fn is_descendant_of_or_self(&self, ancestor: &Path) -> bool {
        self.elements.len() >= ancestor.elements.len()
            && self.elements[..ancestor.elements.len()] == ancestor.elements[..]
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let absolute = self.is_absolute();
        let segs: Vec<String> = self
            .elements
            .iter()
            .filter(|e| !matches!(e, PathElement::Root))
            .map(|e| e.to_string())
            .collect();
        if absolute {
            write!(f, "/{}", segs.join("/"))
        } else {
            write!(f, "{}", segs.join("/"))
        }
    }
}

fn parse_segment(s: &str) -> Result<PathElement, PathParseError> {
    if s.is_empty() {
        return Err(PathParseError("empty path segment".to_string()));
    }
    if s == "." {
        return Ok(PathElement::CurrentDir);
    }
    if s == ".." {
        return Ok(PathElement::ParentDir);
    }
    if let Some(open) = s.find('[') {
        if !s.ends_with(']') {
            return Err(PathParseError(format!("malformed SNS index in {:?}", s)));
        }
        let local_name = &s[..open];
        let index_str = &s[open + 1..s.len() - 1];
        let index: u32 = index_str
            .parse()
            .map_err(|_| PathParseError(format!("malformed SNS index in {:?}", s)))?;
        if index == 0 {
            return Err(PathParseError("SNS index must be >= 1".to_string()));
        }
        if local_name.is_empty() {
            return Err(PathParseError("empty local name".to_string()));
        }
        Ok(PathElement::named(Name::in_default_ns(local_name), index))
    } else {
        Ok(PathElement::named(Name::in_default_ns(s), 1))
    }
}

impl FromStr for Path {
    type Err = PathParseError;

    /// Parses JCR-style path strings: `/a/b[2]` (absolute), `a/b` (relative),
    /// `.`/`..` segments, and the empty string (the empty relative path).
    fn from_str(s: &str) -> Result<Path, Self::Err> {
        if s.is_empty() {
            return Ok(Path::empty_relative());
        }
        let absolute = s.starts_with('/');
        let body = if absolute { &s[1..] } else { s };
        if absolute && body.is_empty() {
            return Ok(Path::root());
        }
        let mut elements = Vec::new();
        if absolute {
            elements.push(PathElement::Root);
        }
        for seg in body.split('/') {
            elements.push(parse_segment(seg)?);
        }
        Ok(Path { elements })
    }
}

/// A namespace for the path-element algebra named in spec §2: building
/// canonical paths from a parent plus a step, and relativizing a
/// descendant against an ancestor. `Path` itself carries the bulk of this
/// behavior; `PathFactory` exists as the stable entry point callers (in
/// particular the hierarchy manager) are expected to go through.
pub struct PathFactory;

impl PathFactory {
    pub fn root() -> Path {
        Path::root()
    }

    pub fn create(parent: &Path, name: Name, index: u32) -> Path {
        parent.append(name, index)
    }

    pub fn relativize(ancestor: &Path, descendant: &Path) -> Option<Path> {
        descendant.relativize(ancestor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/", true)]
    #[case("/a/b", true)]
    #[case("a/b", false)]
    #[case("", false)]
    fn absoluteness(#[case] s: &str, #[case] expected: bool) {
        let p: Path = s.parse().unwrap();
        assert_eq!(p.is_absolute(), expected);
    }

    #[rstest]
    #[case("/a/b[2]", "/a/b[2]")]
    #[case("/a/b[1]", "/a/b")]
    #[case("/a/b", "/a/b")]
    #[case("/", "/")]
    #[case("a/b", "a/b")]
    fn display_round_trips_to_canonical_form(#[case] s: &str, #[case] expected: &str) {
        let p: Path = s.parse().unwrap();
        assert_eq!(p.to_string(), expected);
    }

    #[test]
    fn parent_of_child_is_root() {
        let p: Path = "/a".parse().unwrap();
        assert_eq!(p.parent().unwrap(), Path::root());
    }

    #[test]
    fn root_has_no_parent() {
        assert_eq!(Path::root().parent(), None);
    }

    #[test]
    fn append_adds_a_named_step() {
        let base: Path = "/a".parse().unwrap();
        let child = base.append(Name::in_default_ns("b"), 2);
        assert_eq!(child.to_string(), "/a/b[2]");
    }

    #[test]
    fn relativize_strips_common_prefix() {
        let ancestor: Path = "/a".parse().unwrap();
        let descendant: Path = "/a/b/c".parse().unwrap();
        let rel = descendant.relativize(&ancestor).unwrap();
        assert_eq!(rel.to_string(), "b/c");
    }

    #[test]
    fn relativize_fails_when_not_a_prefix() {
        let ancestor: Path = "/x".parse().unwrap();
        let descendant: Path = "/a/b".parse().unwrap();
        assert_eq!(descendant.relativize(&ancestor), None);
    }

    #[test]
    fn ordering_is_by_element_sequence() {
        let a: Path = "/a".parse().unwrap();
        let b: Path = "/b".parse().unwrap();
        assert!(a < b);
    }

    #[rstest]
    #[case("/a/b/")]
    #[case("a//b")]
    #[case("a/b[0]")]
    #[case("a/b[x]")]
    fn rejects_malformed_paths(#[case] s: &str) {
        assert!(s.parse::<Path>().is_err());
    }
}
