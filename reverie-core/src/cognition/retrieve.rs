//! Memory lookups used while planning and reflecting.

use tracing::warn;

use crate::agent::Agent;
use crate::memory::{MemoryStore, NodeId};
use crate::types::Triple;

use super::CognitionEngine;

/// Memories associated with one perceived event.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieved {
    /// Description of the perceived event.
    pub description: String,
    /// Its triple.
    pub event: Triple,
    /// The stored event node.
    pub curr_event: NodeId,
    /// Related events, sharing a keyword with the triple.
    pub events: Vec<NodeId>,
    /// Related thoughts, sharing a keyword with the triple.
    pub thoughts: Vec<NodeId>,
}

/// Keyword recall for each perceived node.
///
/// Entries are keyed by description; a later percept with the same
/// description replaces the earlier one in place.
pub(super) fn around_perceptions(memory: &MemoryStore, perceived: &[NodeId]) -> Vec<Retrieved> {
    let mut out: Vec<Retrieved> = Vec::new();
    for &id in perceived {
        let Some(node) = memory.get(id) else {
            continue;
        };
        let Triple {
            subject,
            predicate,
            object,
        } = &node.spo;
        let entry = Retrieved {
            description: node.description.clone(),
            event: node.spo.clone(),
            curr_event: id,
            events: memory.retrieve_relevant_events(subject, predicate, object),
            thoughts: memory.retrieve_relevant_thoughts(subject, predicate, object),
        };
        match out.iter_mut().find(|r| r.description == entry.description) {
            Some(slot) => *slot = entry,
            None => out.push(entry),
        }
    }
    out
}

impl CognitionEngine {
    /// Scored retrieval for `focal` points, flattened in focal order
    /// without repeats. Selected nodes are touched.
    ///
    /// Embedding failures are logged and yield nothing.
    pub(super) fn focal_nodes(&self, agent: &mut Agent, focal: &[String]) -> Vec<NodeId> {
        let Some(now) = agent.scratch.curr_time else {
            return Vec::new();
        };
        let weights = agent.scratch.weights();
        let results = match self.retrieval.retrieve(
            &mut agent.memory,
            self.embedder.as_ref(),
            weights,
            focal,
            self.retrieval.top_n(),
            now,
        ) {
            Ok(results) => results,
            Err(e) => {
                warn!(agent = %agent.scratch.name, error = %e, "Focal retrieval failed");
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        for point in focal {
            for r in results.get(point).into_iter().flatten() {
                if !out.contains(&r.node) {
                    out.push(r.node);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tests::{draft, t};

    #[test]
    fn recall_follows_shared_keywords() {
        let mut mem = MemoryStore::new();
        let old = mem.add_event(draft("Klaus", "is", "reading", "Klaus is reading", t(8, 0)));
        mem.add_event(draft("Maria", "is", "coding", "Maria is coding", t(8, 30)));
        let now = mem.add_event(draft("Klaus", "is", "writing", "Klaus is writing", t(9, 0)));

        let retrieved = around_perceptions(&mem, &[now]);
        assert_eq!(retrieved.len(), 1);
        assert_eq!(retrieved[0].curr_event, now);
        assert_eq!(retrieved[0].events, vec![now, old]);
        assert!(retrieved[0].thoughts.is_empty());
    }

    #[test]
    fn duplicate_descriptions_keep_the_latest() {
        let mut mem = MemoryStore::new();
        let a = mem.add_event(draft("bed", "is", "idle", "bed is idle", t(8, 0)));
        let b = mem.add_event(draft("desk", "is", "used", "desk is used", t(8, 0)));
        let c = mem.add_event(draft("bed", "is", "idle", "bed is idle", t(9, 0)));
        let retrieved = around_perceptions(&mem, &[a, b, c]);
        let ids: Vec<_> = retrieved.iter().map(|r| r.curr_event).collect();
        assert_eq!(ids, vec![c, b]);
    }
}
