//! Reflection: turning accumulated experience into thoughts.

use std::collections::BTreeSet;

use chrono::Duration;
use tracing::info;

use crate::agent::Agent;
use crate::memory::{Filling, MemoryNode, NodeDraft, NodeId};
use crate::oracle::{Decision, PoignancyKind};
use crate::types::Triple;

use super::CognitionEngine;

/// Focal points asked for per reflection.
const FOCAL_POINTS: usize = 3;

impl CognitionEngine {
    /// Reflect once enough poignancy has been perceived.
    ///
    /// Recent statements yield focal points, focal points retrieve evidence,
    /// and evidence yields insights stored as thoughts. The trigger budget is
    /// refilled afterwards whether or not anything was learned.
    pub(super) fn reflect(&self, agent: &mut Agent) {
        if agent.scratch.importance_trigger_curr > 0 || agent.memory.is_empty() {
            return;
        }
        let Some(now) = agent.scratch.curr_time else {
            return;
        };

        let recent = usize::try_from(agent.scratch.importance_ele_n)
            .unwrap_or(usize::MAX)
            .max(FOCAL_POINTS);
        let statements = recent_statements(agent, recent);
        let fallback: Vec<String> = statements.iter().take(FOCAL_POINTS).cloned().collect();
        let focal = self.ask(Decision::ReflectionFocus, fallback, |o| {
            o.reflection_focal_points(&agent.scratch, &statements, FOCAL_POINTS)
        });

        let evidence: Vec<(NodeId, String)> = self
            .focal_nodes(agent, &focal)
            .into_iter()
            .filter_map(|id| agent.memory.get(id).map(|n| (id, n.embedding_key.clone())))
            .collect();
        let insights = self.ask(Decision::ReflectionInsight, Vec::new(), |o| {
            o.reflection_insights(&agent.scratch, &evidence, agent.scratch.thought_count)
        });

        let mut stored = 0;
        for insight in insights {
            let scratch = &agent.scratch;
            let spo = self.ask(
                Decision::EventTriple,
                Triple::new(scratch.name.clone(), "is", insight.text.clone()),
                |o| o.event_triple(scratch, &insight.text),
            );
            let poignancy = self.ask(Decision::Poignancy, 1, |o| {
                o.poignancy(scratch, PoignancyKind::Thought, &insight.text)
            });
            let keywords: BTreeSet<String> =
                [spo.subject.clone(), spo.predicate.clone(), spo.object.clone()].into();
            let supporting: Vec<NodeId> = insight
                .evidence
                .into_iter()
                .filter(|id| agent.memory.get(*id).is_some())
                .collect();
            let embedding = self.embed(&agent.memory, &insight.text);
            agent.memory.add_thought(NodeDraft {
                created: now,
                expiration: Some(now + Duration::days(30)),
                spo,
                description: insight.text.clone(),
                keywords,
                poignancy,
                embedding_key: insight.text,
                embedding,
                filling: Filling::Nodes(supporting),
            });
            stored += 1;
        }

        info!(agent = %agent.scratch.name, focal = focal.len(), stored, "Reflected");
        agent.scratch.importance_trigger_curr = agent.scratch.importance_trigger_max;
        agent.scratch.importance_ele_n = 0;
    }
}

/// Embedding keys of the `n` most recent non-idle events and thoughts.
fn recent_statements(agent: &Agent, n: usize) -> Vec<String> {
    let mut nodes: Vec<&MemoryNode> = agent
        .memory
        .events()
        .chain(agent.memory.thoughts())
        .filter(|node| !node.embedding_key.contains("idle"))
        .collect();
    nodes.sort_by_key(|node| std::cmp::Reverse((node.created, node.id)));
    nodes
        .into_iter()
        .take(n)
        .map(|node| node.embedding_key.clone())
        .collect()
}
