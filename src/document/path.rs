//! Absolute node paths

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::Error;

/// Absolute, `/`-separated path addressing a node in a document.
///
/// `/` is the pseudo-root; every other path names a node by its chain of
/// identifier components.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodePath(String);

/// True if `name` is a valid node identifier.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Turn an arbitrary label (file stem, asset name) into a valid identifier.
pub fn sanitize_name(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

impl NodePath {
    /// The pseudo-root `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Parse an absolute path, trimming surrounding whitespace.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let raw = raw.trim();
        if raw == "/" {
            return Ok(Self::root());
        }
        if !raw.starts_with('/') {
            return Err(Error::invalid(format!("Node path must be absolute: '{}'", raw)));
        }
        let trimmed = raw.trim_end_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        for part in trimmed[1..].split('/') {
            if !is_valid_name(part) {
                return Err(Error::invalid(format!(
                    "Invalid node path '{}': bad component '{}'",
                    raw, part
                )));
            }
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name components from the root down. Empty for `/`.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Number of components (`/` has depth 0).
    pub fn depth(&self) -> usize {
        self.components().count()
    }

    /// Last component; empty for `/`.
    pub fn name(&self) -> &str {
        self.components().last().unwrap_or("")
    }

    /// Parent path; `None` for `/`.
    pub fn parent(&self) -> Option<NodePath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(i) => Some(Self(self.0[..i].to_string())),
            None => None,
        }
    }

    /// Append a child component.
    pub fn child(&self, name: &str) -> Result<NodePath, Error> {
        if !is_valid_name(name) {
            return Err(Error::invalid(format!("Invalid node name '{}'", name)));
        }
        if self.is_root() {
            Ok(Self(format!("/{}", name)))
        } else {
            Ok(Self(format!("{}/{}", self.0, name)))
        }
    }

    /// Every non-root path from the top-level ancestor down to `self`.
    pub fn prefixes(&self) -> Vec<NodePath> {
        let mut out = Vec::new();
        let mut current = String::new();
        for part in self.components() {
            current.push('/');
            current.push_str(part);
            out.push(Self(current.clone()));
        }
        out
    }

    /// True if `self` equals `prefix` or lies beneath it.
    pub fn has_prefix(&self, prefix: &NodePath) -> bool {
        if prefix.is_root() || self == prefix {
            return true;
        }
        self.0.starts_with(&prefix.0) && self.0[prefix.0.len()..].starts_with('/')
    }

    /// Re-root `self` from under `from` to under `to`.
    pub fn replace_prefix(&self, from: &NodePath, to: &NodePath) -> Option<NodePath> {
        if !self.has_prefix(from) {
            return None;
        }
        let rest: Vec<&str> = self.components().skip(from.depth()).collect();
        let mut out = to.clone();
        for part in rest {
            out = Self(if out.is_root() {
                format!("/{}", part)
            } else {
                format!("{}/{}", out.0, part)
            });
        }
        Some(out)
    }
}

impl TryFrom<String> for NodePath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<NodePath> for String {
    fn from(path: NodePath) -> Self {
        path.0
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodePath({})", self.0)
    }
}
