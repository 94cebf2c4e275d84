//! Graph paths
//!
//! A [`GraphPath`] names a position in a tree of nested graphs: the ids of
//! the subgraph nodes entered from the root, optionally prefixed by the
//! root graph's id. Two nodes called `"summarize"` in different subgraphs
//! are told apart by the path they run under.
//!
//! Every segment is non-empty. [`GraphPath::of`] and parsing skip empty
//! segments (so `"a//b"` is `a/b`), while [`GraphPath::append`] rejects
//! one.
//!
//! ```rust
//! use stepgraph_core::GraphPath;
//!
//! let path = GraphPath::of(["graph01", "subgraph1"]).unwrap();
//! let nested = path.append("subgraph2").unwrap();
//!
//! assert_eq!(nested.to_string(), "graph01/subgraph1/subgraph2");
//! assert_eq!(nested.parent(), path);
//! assert!(nested.starts_with(&path));
//! assert_eq!(nested.last(), Some("subgraph2"));
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Separator between path segments
pub const DELIMITER: char = '/';

/// Deepest nesting a path may describe
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path segment must not be empty")]
    EmptySegment,

    #[error("path segment '{0}' must not contain '/'")]
    Delimiter(String),

    #[error("graph nesting exceeds the maximum depth of 64")]
    TooDeep,
}

/// Ordered, immutable sequence of path segments
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GraphPath {
    segments: Vec<String>,
}

impl GraphPath {
    /// The empty (root) path
    pub fn root_path() -> Self {
        Self::default()
    }

    /// Build a path from segments; empty segments are skipped
    pub fn of<I, S>(segments: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut path = Self::default();
        for segment in segments {
            let segment = segment.as_ref();
            if !segment.is_empty() {
                path = path.append(segment)?;
            }
        }
        Ok(path)
    }

    /// A new path with `segment` added at the end
    pub fn append(&self, segment: &str) -> Result<Self, PathError> {
        if segment.is_empty() {
            return Err(PathError::EmptySegment);
        }
        if segment.contains(DELIMITER) {
            return Err(PathError::Delimiter(segment.to_string()));
        }
        if self.segments.len() >= MAX_DEPTH {
            return Err(PathError::TooDeep);
        }
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }

    /// Path without its last segment; empty for paths of length 0 or 1
    pub fn parent(&self) -> Self {
        match self.segments.len() {
            0 | 1 => Self::default(),
            n => Self {
                segments: self.segments[..n - 1].to_vec(),
            },
        }
    }

    /// Path holding only the first segment
    pub fn root(&self) -> Self {
        Self {
            segments: self.segments.iter().take(1).cloned().collect(),
        }
    }

    pub fn starts_with(&self, prefix: &GraphPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.segments.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }
}

impl fmt::Display for GraphPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{DELIMITER}")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl FromStr for GraphPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::of(s.split(DELIMITER))
    }
}

impl Serialize for GraphPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GraphPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
