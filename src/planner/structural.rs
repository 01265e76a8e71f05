//! Path-addressed structural diff between two JSON trees.
//!
//! The left side is always the observed value and the right side the
//! desired value. Entries follow the familiar `N`/`D`/`E`/`A` shape so
//! reports stay readable for operators used to object-diff output.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// One step of a path into a JSON tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Array index.
    Index(usize),
    /// Object key.
    Key(String),
}

/// A single structural difference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Change {
    /// A value present only on the desired side.
    #[serde(rename = "N")]
    Added {
        /// Location of the value.
        path: Vec<PathSegment>,
        /// The new value.
        rhs: Value,
    },

    /// A value present only on the observed side.
    #[serde(rename = "D")]
    Removed {
        /// Location of the value.
        path: Vec<PathSegment>,
        /// The removed value.
        lhs: Value,
    },

    /// A value present on both sides with different content.
    #[serde(rename = "E")]
    Edited {
        /// Location of the value.
        path: Vec<PathSegment>,
        /// The observed value.
        lhs: Value,
        /// The desired value.
        rhs: Value,
    },

    /// An array grew or shrank at `index`.
    #[serde(rename = "A")]
    Array {
        /// Location of the array.
        path: Vec<PathSegment>,
        /// Index of the added or removed item.
        index: usize,
        /// The added or removed item.
        item: ArrayItem,
    },
}

/// Item of an array length change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ArrayItem {
    /// Item appended on the desired side.
    #[serde(rename = "N")]
    Added {
        /// The new item.
        rhs: Value,
    },
    /// Item dropped from the observed side.
    #[serde(rename = "D")]
    Removed {
        /// The removed item.
        lhs: Value,
    },
}

impl Change {
    /// Returns the path this change points at.
    #[must_use]
    pub fn path(&self) -> &[PathSegment] {
        match self {
            Self::Added { path, .. }
            | Self::Removed { path, .. }
            | Self::Edited { path, .. }
            | Self::Array { path, .. } => path,
        }
    }

    /// Returns the path rendered with dots, e.g. `plugins.key-auth.key`.
    #[must_use]
    pub fn dotted_path(&self) -> String {
        let mut segments: Vec<String> = self.path().iter().map(ToString::to_string).collect();
        if let Self::Array { index, .. } = self {
            segments.push(index.to_string());
        }
        segments.join(".")
    }
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Key(k) => write!(f, "{k}"),
        }
    }
}

/// Computes the structural difference from `observed` to `desired`.
///
/// Object keys are visited in sorted order: first every observed key, then
/// the keys only the desired side has. Arrays are compared index by index;
/// surplus items become [`Change::Array`] entries.
#[must_use]
pub fn diff_values(observed: &Value, desired: &Value) -> Vec<Change> {
    let mut changes = Vec::new();
    let mut path = Vec::new();
    walk(observed, desired, &mut path, &mut changes);
    changes
}

fn walk(lhs: &Value, rhs: &Value, path: &mut Vec<PathSegment>, out: &mut Vec<Change>) {
    match (lhs, rhs) {
        (Value::Object(left), Value::Object(right)) => {
            let mut left_keys: Vec<&String> = left.keys().collect();
            left_keys.sort();
            for key in left_keys {
                path.push(PathSegment::Key(key.clone()));
                match right.get(key) {
                    Some(r) => walk(&left[key], r, path, out),
                    None => out.push(Change::Removed {
                        path: path.clone(),
                        lhs: left[key].clone(),
                    }),
                }
                path.pop();
            }

            let mut right_only: Vec<&String> =
                right.keys().filter(|k| !left.contains_key(*k)).collect();
            right_only.sort();
            for key in right_only {
                path.push(PathSegment::Key(key.clone()));
                out.push(Change::Added {
                    path: path.clone(),
                    rhs: right[key].clone(),
                });
                path.pop();
            }
        }
        (Value::Array(left), Value::Array(right)) => {
            for (index, l) in left.iter().enumerate() {
                if let Some(r) = right.get(index) {
                    path.push(PathSegment::Index(index));
                    walk(l, r, path, out);
                    path.pop();
                } else {
                    out.push(Change::Array {
                        path: path.clone(),
                        index,
                        item: ArrayItem::Removed { lhs: l.clone() },
                    });
                }
            }
            for (index, r) in right.iter().enumerate().skip(left.len()) {
                out.push(Change::Array {
                    path: path.clone(),
                    index,
                    item: ArrayItem::Added { rhs: r.clone() },
                });
            }
        }
        (Value::Number(l), Value::Number(r)) => {
            if !numbers_equal(l, r) {
                out.push(edited(path, lhs, rhs));
            }
        }
        _ => {
            if lhs != rhs {
                out.push(edited(path, lhs, rhs));
            }
        }
    }
}

fn edited(path: &[PathSegment], lhs: &Value, rhs: &Value) -> Change {
    Change::Edited {
        path: path.to_vec(),
        lhs: lhs.clone(),
        rhs: rhs.clone(),
    }
}

/// Numbers compare by value, so `1` and `1.0` are equal.
fn numbers_equal(l: &Number, r: &Number) -> bool {
    if l == r {
        return true;
    }
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => a.total_cmp(&b).is_eq(),
        _ => false,
    }
}
