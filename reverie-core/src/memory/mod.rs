//! Associative memory: the per-agent store of events, thoughts and chats.
//!
//! Nodes live in an arena indexed by [`NodeId`]. Per-kind sequences and
//! keyword indices hold ids newest-first. Nothing is ever deleted during a
//! run; a store is only replaced wholesale when a snapshot is loaded.

pub mod node;
pub mod spatial;

pub use node::{Filling, MemoryNode, NodeDraft, NodeId, NodeKind, NodeRecord, Transcript, Utterance};
pub use spatial::SpatialMemory;

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ReverieError};
use crate::types::{Embedding, SimTime, Triple};

/// Keyword lookups are indexed per kind.
#[derive(Debug, Clone, Default)]
struct KindIndex {
    seq: VecDeque<NodeId>,
    by_keyword: HashMap<String, VecDeque<NodeId>>,
}

impl KindIndex {
    fn push_front(&mut self, id: NodeId, keywords: &[String]) {
        self.seq.push_front(id);
        for kw in keywords {
            self.by_keyword.entry(kw.clone()).or_default().push_front(id);
        }
    }
}

/// One agent's associative memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    nodes: Vec<MemoryNode>,
    events: KindIndex,
    thoughts: KindIndex,
    chats: KindIndex,
    kw_strength_event: BTreeMap<String, u32>,
    kw_strength_thought: BTreeMap<String, u32>,
    embeddings: HashMap<String, Embedding>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------

    /// Record a perceived event.
    ///
    /// A description containing `(` is shortened to its first three words
    /// followed by the text inside the last parentheses.
    pub fn add_event(&mut self, mut draft: NodeDraft) -> NodeId {
        if draft.description.contains('(') {
            draft.description = condense_description(&draft.description);
        }
        self.insert(NodeKind::Event, 0, draft)
    }

    /// Record a derived thought. Its depth is one above its deepest evidence.
    pub fn add_thought(&mut self, draft: NodeDraft) -> NodeId {
        let depth = 1 + draft
            .filling
            .node_ids()
            .iter()
            .filter_map(|id| self.get(*id))
            .map(|n| n.depth)
            .max()
            .unwrap_or(0);
        self.insert(NodeKind::Thought, depth, draft)
    }

    /// Record a conversation. Chats never touch keyword strength.
    pub fn add_chat(&mut self, draft: NodeDraft) -> NodeId {
        self.insert(NodeKind::Chat, 0, draft)
    }

    fn insert(&mut self, kind: NodeKind, depth: u32, draft: NodeDraft) -> NodeId {
        let id = NodeId(self.nodes.len() + 1);
        let keywords: Vec<String> = draft.keywords.iter().map(|k| k.to_lowercase()).collect();
        let idle = format!("{} {}", draft.spo.predicate, draft.spo.object) == "is idle";

        let (index, strength) = match kind {
            NodeKind::Event => (&mut self.events, Some(&mut self.kw_strength_event)),
            NodeKind::Thought => (&mut self.thoughts, Some(&mut self.kw_strength_thought)),
            NodeKind::Chat => (&mut self.chats, None),
        };
        let type_count = index.seq.len() + 1;
        index.push_front(id, &keywords);
        if let Some(strength) = strength
            && !idle
        {
            for kw in &keywords {
                *strength.entry(kw.clone()).or_insert(0) += 1;
            }
        }

        self.embeddings
            .insert(draft.embedding_key.clone(), draft.embedding);

        debug!(node = %id, %kind, description = %draft.description, "Memory node added");
        self.nodes.push(MemoryNode {
            id,
            kind,
            type_count,
            depth,
            created: draft.created,
            expiration: draft.expiration,
            last_accessed: draft.created,
            spo: draft.spo,
            description: draft.description,
            embedding_key: draft.embedding_key,
            poignancy: draft.poignancy,
            keywords: draft.keywords,
            filling: draft.filling,
        });
        id
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Total node count across all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node by id.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&MemoryNode> {
        self.nodes.get(id.slot()).filter(|n| n.id == id)
    }

    /// Set `last_accessed` on every listed node that exists.
    pub fn touch(&mut self, ids: &[NodeId], now: SimTime) {
        for id in ids {
            if let Some(node) = self.nodes.get_mut(id.slot()) {
                node.last_accessed = now;
            }
        }
    }

    /// Events, newest first.
    pub fn events(&self) -> impl Iterator<Item = &MemoryNode> {
        self.events.seq.iter().filter_map(|id| self.get(*id))
    }

    /// Thoughts, newest first.
    pub fn thoughts(&self) -> impl Iterator<Item = &MemoryNode> {
        self.thoughts.seq.iter().filter_map(|id| self.get(*id))
    }

    /// Chats, newest first.
    pub fn chats(&self) -> impl Iterator<Item = &MemoryNode> {
        self.chats.seq.iter().filter_map(|id| self.get(*id))
    }

    /// Cached vector for an embedding key.
    #[must_use]
    pub fn embedding(&self, key: &str) -> Option<&Embedding> {
        self.embeddings.get(key)
    }

    /// How often a keyword has appeared in non-idle events.
    #[must_use]
    pub fn event_keyword_strength(&self, keyword: &str) -> u32 {
        self.kw_strength_event.get(keyword).copied().unwrap_or(0)
    }

    /// How often a keyword has appeared in non-idle thoughts.
    #[must_use]
    pub fn thought_keyword_strength(&self, keyword: &str) -> u32 {
        self.kw_strength_thought.get(keyword).copied().unwrap_or(0)
    }

    /// Events sharing a keyword with any of the three strings, deduplicated.
    #[must_use]
    pub fn retrieve_relevant_events(&self, subject: &str, predicate: &str, object: &str) -> Vec<NodeId> {
        lookup(&self.events, [subject, predicate, object])
    }

    /// Thoughts sharing a keyword with any of the three strings, deduplicated.
    #[must_use]
    pub fn retrieve_relevant_thoughts(
        &self,
        subject: &str,
        predicate: &str,
        object: &str,
    ) -> Vec<NodeId> {
        lookup(&self.thoughts, [subject, predicate, object])
    }

    /// Triples of the `n` most recent events.
    #[must_use]
    pub fn summarized_latest_events(&self, n: usize) -> HashSet<Triple> {
        self.events().take(n).map(|e| e.spo.clone()).collect()
    }

    /// The most recent chat with `name`.
    #[must_use]
    pub fn last_chat_with(&self, name: &str) -> Option<&MemoryNode> {
        self.chats
            .by_keyword
            .get(&name.to_lowercase())
            .and_then(|ids| ids.front())
            .and_then(|id| self.get(*id))
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Everything needed to rebuild this store.
    #[must_use]
    pub fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            nodes: self
                .nodes
                .iter()
                .map(|n| (n.id.to_string(), n.to_record()))
                .collect(),
            kw_strength: KeywordStrength {
                kw_strength_event: self.kw_strength_event.clone(),
                kw_strength_thought: self.kw_strength_thought.clone(),
            },
            embeddings: self.embeddings.clone(),
        }
    }

    /// Rebuild a store by replaying nodes in id order.
    ///
    /// # Errors
    /// Returns `ReverieError::NodeNotFound` if the node ids are not the
    /// contiguous range `1..=n`.
    pub fn from_snapshot(snapshot: MemorySnapshot) -> Result<Self> {
        let MemorySnapshot {
            nodes,
            kw_strength,
            embeddings,
        } = snapshot;

        let mut records: Vec<NodeRecord> = nodes.into_values().collect();
        records.sort_by_key(|r| r.node_count);

        let mut store = Self::new();
        for (i, record) in records.into_iter().enumerate() {
            if record.node_count != i + 1 {
                return Err(ReverieError::NodeNotFound(i + 1));
            }
            let embedding = embeddings.get(&record.embedding_key).cloned().unwrap_or_default();
            let last_accessed = record.last_accessed;
            let draft = NodeDraft {
                created: record.created,
                expiration: record.expiration,
                spo: Triple::new(record.subject, record.predicate, record.object),
                description: record.description,
                keywords: record.keywords.into_iter().collect(),
                poignancy: record.poignancy,
                embedding_key: record.embedding_key,
                embedding,
                filling: record.filling,
            };
            let id = match record.kind {
                NodeKind::Event => store.add_event(draft),
                NodeKind::Thought => store.add_thought(draft),
                NodeKind::Chat => store.add_chat(draft),
            };
            if let Some(t) = last_accessed {
                store.touch(&[id], t);
            }
        }

        // Saved counters win over the ones rebuilt by replay.
        store.kw_strength_event = kw_strength.kw_strength_event;
        store.kw_strength_thought = kw_strength.kw_strength_thought;
        store.embeddings.extend(embeddings);
        Ok(store)
    }

    /// Write `nodes.json`, `kw_strength.json` and `embeddings.json` into `dir`.
    ///
    /// # Errors
    /// Returns an I/O or serialization error.
    pub fn save_dir(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let snap = self.snapshot();
        std::fs::write(dir.join("nodes.json"), serde_json::to_string(&snap.nodes)?)?;
        std::fs::write(
            dir.join("kw_strength.json"),
            serde_json::to_string(&snap.kw_strength)?,
        )?;
        std::fs::write(
            dir.join("embeddings.json"),
            serde_json::to_string(&snap.embeddings)?,
        )?;
        Ok(())
    }

    /// Load a store written by [`MemoryStore::save_dir`].
    ///
    /// # Errors
    /// Returns an I/O error for missing files, or a serialization error.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let nodes = serde_json::from_str(&std::fs::read_to_string(dir.join("nodes.json"))?)?;
        let kw_strength =
            serde_json::from_str(&std::fs::read_to_string(dir.join("kw_strength.json"))?)?;
        let embeddings =
            serde_json::from_str(&std::fs::read_to_string(dir.join("embeddings.json"))?)?;
        Self::from_snapshot(MemorySnapshot {
            nodes,
            kw_strength,
            embeddings,
        })
    }
}

fn lookup(index: &KindIndex, terms: [&str; 3]) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for term in terms {
        if let Some(ids) = index.by_keyword.get(&term.to_lowercase()) {
            for id in ids {
                if seen.insert(*id) {
                    out.push(*id);
                }
            }
        }
    }
    out
}

fn condense_description(description: &str) -> String {
    let head: Vec<&str> = description.split_whitespace().take(3).collect();
    let mut tail = description.rsplit('(').next().unwrap_or_default().to_string();
    tail.pop();
    format!("{} {tail}", head.join(" "))
}

/// Keyword strength counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordStrength {
    /// Per-keyword count over non-idle events.
    #[serde(default)]
    pub kw_strength_event: BTreeMap<String, u32>,
    /// Per-keyword count over non-idle thoughts.
    #[serde(default)]
    pub kw_strength_thought: BTreeMap<String, u32>,
}

/// Serializable image of a [`MemoryStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemorySnapshot {
    /// `node_N` → record.
    pub nodes: BTreeMap<String, NodeRecord>,
    /// Keyword counters.
    pub kw_strength: KeywordStrength,
    /// Embedding key → vector.
    pub embeddings: HashMap<String, Embedding>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
