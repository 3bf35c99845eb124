//! Namespace-qualified property names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A property name qualified by a namespace.
///
/// The empty namespace is the public namespace. An empty `name` marks an
/// unnamed slot.
///
/// # Examples
///
/// ```
/// use core_types::QualifiedName;
///
/// let plain = QualifiedName::parse("length");
/// assert!(plain.is_public());
///
/// let private = QualifiedName::parse("internal::count");
/// assert_eq!(&*private.space, "internal");
/// assert_eq!(&*private.name, "count");
/// assert_eq!(private.to_string(), "internal::count");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Namespace; empty for the public namespace
    #[serde(default = "public_space", skip_serializing_if = "is_public_space")]
    pub space: Arc<str>,
    /// Unqualified name
    pub name: Arc<str>,
}

impl QualifiedName {
    /// Creates a name in the given namespace.
    pub fn new(space: impl AsRef<str>, name: impl AsRef<str>) -> Self {
        QualifiedName {
            space: Arc::from(space.as_ref()),
            name: Arc::from(name.as_ref()),
        }
    }

    /// Creates a name in the public namespace.
    pub fn public(name: impl AsRef<str>) -> Self {
        QualifiedName::new("", name)
    }

    /// Parses `"space::name"` or a bare `"name"`.
    pub fn parse(text: &str) -> Self {
        match text.rsplit_once("::") {
            Some((space, name)) => QualifiedName::new(space, name),
            None => QualifiedName::public(text),
        }
    }

    /// True when this entry names nothing.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// True when the name lives in the public namespace.
    pub fn is_public(&self) -> bool {
        self.space.is_empty()
    }
}

impl Default for QualifiedName {
    fn default() -> Self {
        QualifiedName::public("")
    }
}

fn public_space() -> Arc<str> {
    Arc::from("")
}

fn is_public_space(space: &Arc<str>) -> bool {
    space.is_empty()
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.space.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}::{}", self.space, self.name)
        }
    }
}

impl From<&str> for QualifiedName {
    fn from(text: &str) -> Self {
        QualifiedName::parse(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uses_last_separator() {
        let name = QualifiedName::parse("a::b::c");
        assert_eq!(&*name.space, "a::b");
        assert_eq!(&*name.name, "c");
    }

    #[test]
    fn test_empty_name() {
        assert!(QualifiedName::default().is_empty());
        assert!(!QualifiedName::public("x").is_empty());
    }

    #[test]
    fn test_serde_omits_public_space() {
        let json = serde_json::to_string(&QualifiedName::public("x")).unwrap();
        assert_eq!(json, r#"{"name":"x"}"#);
        let back: QualifiedName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, QualifiedName::public("x"));
    }
}
