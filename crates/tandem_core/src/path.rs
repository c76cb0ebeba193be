//! Paths into the document tree and local edit requests.

use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{Result, TandemError};

/// One step of a path: a map property or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(untagged)]
pub enum PathSegment {
    /// List index.
    Index(usize),
    /// Map property.
    Key(String),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "{i}"),
            PathSegment::Key(k) => f.write_str(k),
        }
    }
}

/// Render a path in the dotted form accepted by [`parse_path`].
pub fn format_path(path: &[PathSegment]) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// Parse a dotted path such as `todos.0.title`.
///
/// Purely numeric segments become list indexes. `.` or an empty string is
/// the root.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>> {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == "." {
        return Ok(Vec::new());
    }
    trimmed
        .split('.')
        .map(|segment| {
            if segment.is_empty() {
                return Err(TandemError::InvalidPath(format!(
                    "empty segment in '{path}'"
                )));
            }
            if segment.chars().all(|c| c.is_ascii_digit()) {
                segment
                    .parse::<usize>()
                    .map(PathSegment::Index)
                    .map_err(|_| TandemError::InvalidPath(format!("index out of range in '{path}'")))
            } else {
                Ok(PathSegment::Key(segment.to_string()))
            }
        })
        .collect()
}

/// A local edit request, translated into operations by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Mutation {
    /// Assign a value at a map property or an existing list index.
    Set {
        /// Target location.
        path: Vec<PathSegment>,
        /// New value; objects and arrays become nested maps and lists.
        value: serde_json::Value,
    },
    /// Remove a map property or list element.
    Delete {
        /// Target location.
        path: Vec<PathSegment>,
    },
    /// Insert a new list element before `path`'s final index.
    Insert {
        /// Target location; the last segment must be an index.
        path: Vec<PathSegment>,
        /// Inserted value.
        value: serde_json::Value,
    },
}

impl Mutation {
    /// Build a `Set` mutation.
    pub fn set<P: Into<PathSegment>>(
        path: impl IntoIterator<Item = P>,
        value: serde_json::Value,
    ) -> Self {
        Mutation::Set {
            path: path.into_iter().map(Into::into).collect(),
            value,
        }
    }

    /// Build a `Delete` mutation.
    pub fn delete<P: Into<PathSegment>>(path: impl IntoIterator<Item = P>) -> Self {
        Mutation::Delete {
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    /// Build an `Insert` mutation.
    pub fn insert<P: Into<PathSegment>>(
        path: impl IntoIterator<Item = P>,
        value: serde_json::Value,
    ) -> Self {
        Mutation::Insert {
            path: path.into_iter().map(Into::into).collect(),
            value,
        }
    }

    /// The path this mutation targets.
    pub fn path(&self) -> &[PathSegment] {
        match self {
            Mutation::Set { path, .. } | Mutation::Delete { path } | Mutation::Insert { path, .. } => {
                path
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_path() {
        let path = parse_path("todos.0.title").unwrap();
        assert_eq!(
            path,
            vec![
                PathSegment::Key("todos".into()),
                PathSegment::Index(0),
                PathSegment::Key("title".into()),
            ]
        );
        assert!(parse_path(".").unwrap().is_empty());
        assert!(parse_path("").unwrap().is_empty());
        assert!(parse_path("a..b").is_err());
    }

    #[test]
    fn test_format_path() {
        let path = parse_path("a.2.b").unwrap();
        assert_eq!(format_path(&path), "a.2.b");
        assert_eq!(format_path(&[]), ".");
    }

    #[test]
    fn test_segment_wire_format() {
        let path = vec![PathSegment::Key("a".into()), PathSegment::Index(3)];
        assert_eq!(serde_json::to_value(&path).unwrap(), json!(["a", 3]));
        let back: Vec<PathSegment> = serde_json::from_value(json!(["a", 3])).unwrap();
        assert_eq!(back, path);
    }

    #[test]
    fn test_mutation_builders() {
        let m = Mutation::set(["config", "theme"], json!("dark"));
        assert_eq!(m.path().len(), 2);
        let m = Mutation::insert([PathSegment::from("items"), PathSegment::from(0)], json!(1));
        assert_eq!(m.path()[1], PathSegment::Index(0));
    }
}
