//! A single associative memory record.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::{Embedding, SimTime, Triple, serde_time};

/// Process-wide node identifier, 1-based.
///
/// Serialized as `"node_{n}"`, the key format of memory snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    /// Zero-based arena slot.
    #[must_use]
    pub fn slot(self) -> usize {
        self.0.saturating_sub(1)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

impl std::str::FromStr for NodeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("node_")
            .and_then(|n| n.parse().ok())
            .filter(|&n| n > 0)
            .map(Self)
            .ok_or_else(|| format!("invalid node id: {s}"))
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// What a node records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Something perceived.
    Event,
    /// Something concluded.
    Thought,
    /// A conversation.
    Chat,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Event => "event",
            Self::Thought => "thought",
            Self::Chat => "chat",
        })
    }
}

/// One transcript row: `(speaker, utterance)`.
pub type Utterance = (String, String);

/// A conversation transcript.
pub type Transcript = Vec<Utterance>;

/// Node payload: evidence node ids, or a chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Filling {
    /// Referenced nodes (thought evidence, or the chat node of a chat event).
    Nodes(Vec<NodeId>),
    /// Transcript rows of a chat node.
    Transcript(Transcript),
}

impl Default for Filling {
    fn default() -> Self {
        Self::Nodes(Vec::new())
    }
}

impl Filling {
    /// Referenced node ids, empty for transcripts.
    #[must_use]
    pub fn node_ids(&self) -> &[NodeId] {
        match self {
            Self::Nodes(ids) => ids,
            Self::Transcript(_) => &[],
        }
    }
}

/// Everything needed to append a node, minus the bookkeeping the store assigns.
#[derive(Debug, Clone)]
pub struct NodeDraft {
    /// Creation time.
    pub created: SimTime,
    /// Optional expiry.
    pub expiration: Option<SimTime>,
    /// Subject/predicate/object.
    pub spo: Triple,
    /// Natural-language description.
    pub description: String,
    /// Keywords for the reverse index.
    pub keywords: BTreeSet<String>,
    /// Salience.
    pub poignancy: u32,
    /// Embedding cache key.
    pub embedding_key: String,
    /// Vector for `embedding_key`.
    pub embedding: Embedding,
    /// Payload.
    pub filling: Filling,
}

/// An immutable memory record. Only `last_accessed` changes after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryNode {
    /// Store-wide id.
    pub id: NodeId,
    /// Kind tag.
    pub kind: NodeKind,
    /// 1-based position among nodes of the same kind.
    pub type_count: usize,
    /// 0 for events and chats; thoughts sit one above their deepest evidence.
    pub depth: u32,
    /// Creation time.
    pub created: SimTime,
    /// Optional expiry.
    pub expiration: Option<SimTime>,
    /// Last time retrieval selected this node.
    pub last_accessed: SimTime,
    /// Subject/predicate/object.
    pub spo: Triple,
    /// Natural-language description.
    pub description: String,
    /// Embedding cache key.
    pub embedding_key: String,
    /// Salience.
    pub poignancy: u32,
    /// Keywords as given (not lower-cased).
    pub keywords: BTreeSet<String>,
    /// Payload.
    pub filling: Filling,
}

impl MemoryNode {
    /// Whether predicate and object read "is idle".
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.spo.predicate == "is" && self.spo.object == "idle"
    }

    /// The snapshot record of this node.
    #[must_use]
    pub fn to_record(&self) -> NodeRecord {
        NodeRecord {
            node_count: self.id.0,
            type_count: self.type_count,
            kind: self.kind,
            depth: self.depth,
            created: self.created,
            expiration: self.expiration,
            last_accessed: Some(self.last_accessed),
            subject: self.spo.subject.clone(),
            predicate: self.spo.predicate.clone(),
            object: self.spo.object.clone(),
            description: self.description.clone(),
            embedding_key: self.embedding_key.clone(),
            poignancy: self.poignancy,
            keywords: self.keywords.iter().cloned().collect(),
            filling: self.filling.clone(),
        }
    }
}

/// Serialized form of a node inside `nodes.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node id as a number.
    pub node_count: usize,
    /// Per-kind counter.
    pub type_count: usize,
    /// Kind tag.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Depth.
    pub depth: u32,
    /// Creation time.
    #[serde(with = "serde_time::node")]
    pub created: SimTime,
    /// Expiry.
    #[serde(with = "serde_time::node_opt", default)]
    pub expiration: Option<SimTime>,
    /// Last access, when recorded.
    #[serde(with = "serde_time::node_opt", default)]
    pub last_accessed: Option<SimTime>,
    /// Subject.
    pub subject: String,
    /// Predicate.
    pub predicate: String,
    /// Object.
    pub object: String,
    /// Description.
    pub description: String,
    /// Embedding cache key.
    pub embedding_key: String,
    /// Salience.
    pub poignancy: u32,
    /// Keywords.
    pub keywords: Vec<String>,
    /// Payload; `null` reads as no references.
    #[serde(default, deserialize_with = "filling_or_empty")]
    pub filling: Filling,
}

fn filling_or_empty<'de, D: Deserializer<'de>>(d: D) -> Result<Filling, D::Error> {
    Ok(Option::<Filling>::deserialize(d)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_text_form() {
        assert_eq!(NodeId(12).to_string(), "node_12");
        assert_eq!("node_7".parse::<NodeId>(), Ok(NodeId(7)));
        assert!("node_0".parse::<NodeId>().is_err());
        assert!("7".parse::<NodeId>().is_err());
    }

    #[test]
    fn filling_deserializes_both_shapes() {
        let ids: Filling = serde_json::from_str(r#"["node_1","node_4"]"#).expect("ids");
        assert_eq!(ids.node_ids(), &[NodeId(1), NodeId(4)]);
        let chat: Filling =
            serde_json::from_str(r#"[["Isabella","Hi"],["Klaus","Hello"]]"#).expect("chat");
        assert!(matches!(chat, Filling::Transcript(ref rows) if rows.len() == 2));
        let empty: Filling = serde_json::from_str("[]").expect("empty");
        assert_eq!(empty, Filling::default());
    }
}
