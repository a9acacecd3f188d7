//! ContentType - The document type a node is built from

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A published content type.
///
/// Aliases compare case-insensitively, so lookups go through
/// [`ContentType::alias_matches`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentType {
    id: i32,
    key: Uuid,
    alias: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    property_aliases: Vec<String>,
}

impl ContentType {
    pub fn new(id: i32, key: Uuid, alias: impl Into<String>) -> Self {
        Self {
            id,
            key,
            alias: alias.into(),
            name: String::new(),
            property_aliases: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_property(mut self, alias: impl Into<String>) -> Self {
        self.property_aliases.push(alias.into());
        self
    }

    #[inline]
    pub fn id(&self) -> i32 {
        self.id
    }

    #[inline]
    pub fn key(&self) -> Uuid {
        self.key
    }

    #[inline]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Aliases of the properties a node of this type carries, in declaration order.
    #[inline]
    pub fn property_aliases(&self) -> &[String] {
        &self.property_aliases
    }

    pub fn alias_matches(&self, alias: &str) -> bool {
        self.alias.eq_ignore_ascii_case(alias)
    }
}
