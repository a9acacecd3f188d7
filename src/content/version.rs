//! ContentNodeVersion - Immutable per-culture content version
//!
//! A version is created when content is saved or published and is never
//! modified afterwards. A later save or publish produces a new version that
//! replaces it inside a new `ContentNode`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PropertyPayload;

/// Culture code used by content that does not vary by culture.
pub const INVARIANT_CULTURE: &str = "";

/// Whether a version is the live published one or a pending draft.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishState {
    /// Visible to the front end
    Published,
    /// Only visible in preview
    Draft,
}

impl PublishState {
    /// Wire tag used by the record codec
    pub fn as_u8(&self) -> u8 {
        match self {
            PublishState::Published => 1,
            PublishState::Draft => 2,
        }
    }

    /// Parses a wire tag
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(PublishState::Published),
            2 => Some(PublishState::Draft),
            _ => None,
        }
    }
}

impl fmt::Display for PublishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishState::Published => write!(f, "published"),
            PublishState::Draft => write!(f, "draft"),
        }
    }
}

/// A single immutable version of a content node for one culture.
///
/// All fields are private; timestamps are truncated to millisecond
/// precision on construction, which is the precision the codec stores.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentNodeVersion {
    culture: String,
    state: PublishState,
    version_id: i32,
    name: String,
    url_segment: String,
    template_id: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    payload: PropertyPayload,
}

impl ContentNodeVersion {
    /// Creates a version with a url segment derived from `name` and the
    /// current time for both timestamps.
    pub fn new(
        culture: impl Into<String>,
        state: PublishState,
        name: impl Into<String>,
        payload: PropertyPayload,
    ) -> Self {
        let name = name.into();
        let now = truncate_millis(Utc::now());
        Self {
            culture: culture.into(),
            state,
            version_id: 0,
            url_segment: default_url_segment(&name),
            name,
            template_id: None,
            created_at: now,
            updated_at: now,
            payload,
        }
    }

    /// Sets the relational version id.
    pub fn with_version_id(mut self, version_id: i32) -> Self {
        self.version_id = version_id;
        self
    }

    /// Overrides the derived url segment.
    pub fn with_url_segment(mut self, url_segment: impl Into<String>) -> Self {
        self.url_segment = url_segment.into();
        self
    }

    /// Sets the template reference.
    pub fn with_template(mut self, template_id: Option<i32>) -> Self {
        self.template_id = template_id;
        self
    }

    /// Sets both timestamps.
    pub fn with_timestamps(mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        self.created_at = truncate_millis(created_at);
        self.updated_at = truncate_millis(updated_at);
        self
    }

    #[inline]
    pub fn culture(&self) -> &str {
        &self.culture
    }

    #[inline]
    pub fn state(&self) -> PublishState {
        self.state
    }

    #[inline]
    pub fn is_published(&self) -> bool {
        self.state == PublishState::Published
    }

    #[inline]
    pub fn version_id(&self) -> i32 {
        self.version_id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn url_segment(&self) -> &str {
        &self.url_segment
    }

    #[inline]
    pub fn template_id(&self) -> Option<i32> {
        self.template_id
    }

    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[inline]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the encoded property values.
    #[inline]
    pub fn payload(&self) -> &PropertyPayload {
        &self.payload
    }

    /// Decodes the property values.
    pub fn properties(&self) -> crate::codec::CodecResult<super::Properties> {
        self.payload.decode()
    }
}

/// Derives a url segment from a content name.
///
/// Lowercases, keeps ASCII alphanumerics and collapses every other run of
/// characters into a single `-`.
pub fn default_url_segment(name: &str) -> String {
    let mut segment = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !segment.is_empty() {
                segment.push('-');
            }
            pending_dash = false;
            segment.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    segment
}

pub(crate) fn truncate_millis(value: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(value.timestamp_millis()).unwrap_or(value)
}
