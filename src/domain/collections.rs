//! Collection identities, keys and localized titles.

use std::{borrow::Borrow, collections::BTreeMap, fmt, str::FromStr};

use serde::{
    Deserialize, Deserializer, Serialize,
    de::{self, MapAccess, SeqAccess, Visitor, value::SeqAccessDeserializer},
};
use uuid::Uuid;

use super::error::DomainError;

/// Store key of the collection every system collection hangs below.
pub const ROOT_NAMESPACE: &str = "system_collections";

/// Map key under which the root collection is published.
pub const ROOT_MAP_KEY: &str = "root";

/// Title given to the root collection.
pub const ROOT_TITLE: &str = "System";

const KEY_SEPARATOR: char = '.';

/// Opaque identifier assigned by the collection store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(Uuid);

impl CollectionId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CollectionId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value).map(Self)
    }
}

/// Identifier of the user a write is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A single path component of a collection key, e.g. `articles`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeySegment(String);

impl KeySegment {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        if raw.is_empty() {
            return Err(DomainError::invalid_key(raw, "segment must not be empty"));
        }
        if raw.contains(KEY_SEPARATOR) {
            return Err(DomainError::invalid_key(
                raw,
                "segment must not contain the `.` separator",
            ));
        }
        if !raw
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
        {
            return Err(DomainError::invalid_key(
                raw,
                "segment may only contain ASCII letters, digits, `_` and `-`",
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for KeySegment {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<KeySegment> for String {
    fn from(segment: KeySegment) -> Self {
        segment.0
    }
}

/// Dotted path key of a collection, unique across the store.
///
/// Built from ancestor segments joined by `.`; a top-level node's key is its
/// own segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionKey(String);

impl CollectionKey {
    /// Parse a full dotted key, validating every segment.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        if raw.is_empty() {
            return Err(DomainError::invalid_key(raw, "key must not be empty"));
        }
        for segment in raw.split(KEY_SEPARATOR) {
            KeySegment::parse(segment)
                .map_err(|_| DomainError::invalid_key(raw, "key contains an invalid segment"))?;
        }
        Ok(Self(raw.to_string()))
    }

    pub fn root_namespace() -> Self {
        Self(ROOT_NAMESPACE.to_string())
    }

    pub fn top_level(segment: &KeySegment) -> Self {
        Self(segment.as_str().to_string())
    }

    /// Key of `segment` nested below `namespace`, or a top-level key when no
    /// namespace is given.
    pub fn nested(namespace: Option<&CollectionKey>, segment: &KeySegment) -> Self {
        match namespace {
            Some(parent) => parent.child(segment),
            None => Self::top_level(segment),
        }
    }

    pub fn child(&self, segment: &KeySegment) -> Self {
        Self(format!("{}{KEY_SEPARATOR}{}", self.0, segment.as_str()))
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(KEY_SEPARATOR)
    }

    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for CollectionKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Locale code such as `en` or `de_at`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locale(String);

impl Locale {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_locale(raw, "locale must not be empty"));
        }
        if !trimmed
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
        {
            return Err(DomainError::invalid_locale(
                raw,
                "locale may only contain ASCII letters, digits, `_` and `-`",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Locale {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Locale {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Locale> for String {
    fn from(locale: Locale) -> Self {
        locale.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedTitle {
    pub locale: Locale,
    pub title: String,
}

impl LocalizedTitle {
    pub fn new(locale: Locale, title: impl Into<String>) -> Self {
        Self {
            locale,
            title: title.into(),
        }
    }
}

/// Ordered, non-empty list of titles; the first entry is the primary locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "Vec<LocalizedTitle>")]
pub struct LocalizedTitles(Vec<LocalizedTitle>);

impl LocalizedTitles {
    pub fn new(titles: Vec<LocalizedTitle>) -> Result<Self, DomainError> {
        if titles.is_empty() {
            return Err(DomainError::validation(
                "meta_title must list at least one locale",
            ));
        }
        for (index, entry) in titles.iter().enumerate() {
            if entry.title.trim().is_empty() {
                return Err(DomainError::validation(format!(
                    "title for locale `{}` must not be empty",
                    entry.locale
                )));
            }
            if titles[..index]
                .iter()
                .any(|earlier| earlier.locale == entry.locale)
            {
                return Err(DomainError::validation(format!(
                    "locale `{}` is listed more than once",
                    entry.locale
                )));
            }
        }
        Ok(Self(titles))
    }

    pub fn single(locale: Locale, title: impl Into<String>) -> Self {
        Self(vec![LocalizedTitle::new(locale, title)])
    }

    pub fn primary(&self) -> &LocalizedTitle {
        // Non-empty by construction.
        &self.0[0]
    }

    /// Titles after the primary one, in configuration order.
    pub fn variants(&self) -> &[LocalizedTitle] {
        &self.0[1..]
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalizedTitle> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for LocalizedTitles {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TitlesVisitor;

        impl<'de> Visitor<'de> for TitlesVisitor {
            type Value = Vec<LocalizedTitle>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an ordered list of `{ locale, title }` entries")
            }

            fn visit_seq<A>(self, seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                Vec::deserialize(SeqAccessDeserializer::new(seq))
            }

            fn visit_map<A>(self, _map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                Err(de::Error::custom(
                    "meta_title must be an ordered list such as \
                     `[{ locale = \"en\", title = \"News\" }]`, not a map keyed by locale; \
                     the first entry is the primary locale",
                ))
            }
        }

        let titles = deserializer.deserialize_any(TitlesVisitor)?;
        Self::new(titles).map_err(de::Error::custom)
    }
}

impl From<LocalizedTitles> for Vec<LocalizedTitle> {
    fn from(titles: LocalizedTitles) -> Self {
        titles.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    System,
    User,
}

impl CollectionType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
        }
    }
}

impl FromStr for CollectionType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            other => Err(DomainError::validation(format!(
                "unknown collection type `{other}`"
            ))),
        }
    }
}

/// A collection as seen through one locale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRecord {
    pub id: CollectionId,
    pub key: Option<CollectionKey>,
    pub collection_type: CollectionType,
    pub parent_id: Option<CollectionId>,
    pub locale: Locale,
    pub title: Option<String>,
}

/// Write payload for the collection store.
///
/// Without an `id` the store creates a new collection; with one it updates
/// the locale projection of that collection in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDraft {
    pub id: Option<CollectionId>,
    pub key: CollectionKey,
    pub title: String,
    pub locale: Locale,
    pub parent_id: Option<CollectionId>,
    pub collection_type: CollectionType,
}

/// Resolved key → identifier mapping for all system collections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SystemCollectionMap {
    entries: BTreeMap<String, CollectionId>,
}

impl SystemCollectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, id: CollectionId) {
        self.entries.insert(key.into(), id);
    }

    /// Merge `other` into `self`; entries from `other` win on equal keys.
    pub fn extend(&mut self, other: SystemCollectionMap) {
        self.entries.extend(other.entries);
    }

    pub fn get(&self, key: &str) -> Option<CollectionId> {
        self.entries.get(key).copied()
    }

    pub fn root(&self) -> Option<CollectionId> {
        self.get(ROOT_MAP_KEY)
    }

    pub fn contains_id(&self, id: CollectionId) -> bool {
        self.entries.values().any(|candidate| *candidate == id)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, CollectionId)> {
        self.entries.iter().map(|(key, id)| (key.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
