//! Declarative tree of system collections.

use std::{collections::HashSet, fmt};

use serde::{
    Deserialize, Deserializer,
    de::{self, MapAccess, SeqAccess, Visitor, value::SeqAccessDeserializer},
};

use super::{
    collections::{CollectionKey, KeySegment, LocalizedTitles, ROOT_MAP_KEY},
    error::DomainError,
};

/// One configured collection and its nested children.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CollectionSpec {
    pub key: KeySegment,
    pub meta_title: LocalizedTitles,
    #[serde(default, deserialize_with = "deserialize_nodes")]
    pub collections: Vec<CollectionSpec>,
}

impl CollectionSpec {
    pub fn new(key: KeySegment, meta_title: LocalizedTitles) -> Self {
        Self {
            key,
            meta_title,
            collections: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_child(mut self, child: CollectionSpec) -> Self {
        self.collections.push(child);
        self
    }
}

/// Validated collection tree.
///
/// Full keys are unique across the whole tree and never collide with the
/// `root` map entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<CollectionSpec>")]
pub struct CollectionTree {
    nodes: Vec<CollectionSpec>,
}

impl CollectionTree {
    pub fn new(nodes: Vec<CollectionSpec>) -> Result<Self, DomainError> {
        let mut seen = HashSet::new();
        check_nodes(&nodes, None, &mut seen)?;
        Ok(Self { nodes })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[CollectionSpec] {
        &self.nodes
    }

    /// Every full key in depth-first configuration order.
    pub fn keys(&self) -> Vec<CollectionKey> {
        let mut keys = Vec::new();
        collect_keys(&self.nodes, None, &mut keys);
        keys
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl TryFrom<Vec<CollectionSpec>> for CollectionTree {
    type Error = DomainError;

    fn try_from(nodes: Vec<CollectionSpec>) -> Result<Self, Self::Error> {
        Self::new(nodes)
    }
}

const KEYED_NODES_HINT: &str = "collections must be a list of tables such as \
`[[collections.tree]]` with `key = \"news\"` and `meta_title = [...]`, \
not a map keyed by collection name";

/// Deserialize a list of nodes, rejecting the keyed-map layout with a message
/// that shows the list form.
pub fn deserialize_nodes<'de, D>(deserializer: D) -> Result<Vec<CollectionSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    struct NodesVisitor;

    impl<'de> Visitor<'de> for NodesVisitor {
        type Value = Vec<CollectionSpec>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a list of collections with `key` and `meta_title`")
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
            Err(de::Error::custom(KEYED_NODES_HINT))
        }
    }

    deserializer.deserialize_any(NodesVisitor)
}

fn check_nodes(
    nodes: &[CollectionSpec],
    namespace: Option<&CollectionKey>,
    seen: &mut HashSet<CollectionKey>,
) -> Result<(), DomainError> {
    for node in nodes {
        let key = CollectionKey::nested(namespace, &node.key);
        if key.as_str() == ROOT_MAP_KEY {
            return Err(DomainError::invalid_key(
                key.as_str(),
                "`root` is reserved for the root collection",
            ));
        }
        if !seen.insert(key.clone()) {
            return Err(DomainError::invalid_key(
                key.as_str(),
                "key is configured more than once",
            ));
        }
        check_nodes(&node.collections, Some(&key), seen)?;
    }
    Ok(())
}

fn collect_keys(
    nodes: &[CollectionSpec],
    namespace: Option<&CollectionKey>,
    keys: &mut Vec<CollectionKey>,
) {
    for node in nodes {
        let key = CollectionKey::nested(namespace, &node.key);
        keys.push(key.clone());
        collect_keys(&node.collections, Some(&key), keys);
    }
}
