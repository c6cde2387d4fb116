//! Roster types and normalisation of the upstream `studio/user` payload.

use serde::{Deserialize, Serialize};

/// Literal the upstream API uses for "no avatar set".
pub const AVATAR_SENTINEL: &str = "None";

/// A member's avatar: an upstream asset identifier or the built-in placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Avatar {
    Asset(String),
    Placeholder,
}

impl Avatar {
    /// Interpret the raw `head` field. The sentinel, an empty string and a
    /// missing value all mean "no avatar".
    pub fn from_head(head: Option<&str>) -> Self {
        match head.map(str::trim) {
            None | Some("") | Some(AVATAR_SENTINEL) => Self::Placeholder,
            Some(id) => Self::Asset(id.to_string()),
        }
    }

    pub fn asset_id(&self) -> Option<&str> {
        match self {
            Self::Asset(id) => Some(id),
            Self::Placeholder => None,
        }
    }
}

/// One community member as displayed on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub name: String,
    pub avatar: Avatar,
    pub profile_id: i64,
}

/// Ordered member list. Order is the upstream response order and is the
/// display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn new(entries: Vec<RosterEntry>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RosterEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<RosterEntry> for Roster {
    fn from_iter<I: IntoIterator<Item = RosterEntry>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Roster {
    type Item = &'a RosterEntry;
    type IntoIter = std::slice::Iter<'a, RosterEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Wire format of `GET /studio/user?id=...`.
#[derive(Debug, Deserialize)]
pub struct RosterResponse {
    pub data: Vec<RawMember>,
}

#[derive(Debug, Deserialize)]
pub struct RawMember {
    pub nickname: String,
    #[serde(default)]
    pub head: Option<String>,
    pub id: i64,
}

impl From<RawMember> for RosterEntry {
    fn from(raw: RawMember) -> Self {
        Self {
            avatar: Avatar::from_head(raw.head.as_deref()),
            name: raw.nickname,
            profile_id: raw.id,
        }
    }
}

impl From<RosterResponse> for Roster {
    fn from(response: RosterResponse) -> Self {
        response.data.into_iter().map(RosterEntry::from).collect()
    }
}
