//! Associative memory graph.
//!
//! Nodes are keyed by a deterministic id derived from content and creation
//! time. Every insertion scans all existing nodes once to form links: two
//! nodes link when they share a tag or their weights are within
//! `link_weight_threshold`. The scan is O(n) per insertion, which is fine
//! because n is bounded by `capacity`; an index is an optional optimization,
//! not a correctness requirement.
//!
//! Links are always mutual. Weight is reinforced by recall, eroded by decay
//! (only for nodes that have been recalled at least once), and the weakest,
//! oldest nodes are pruned when the graph overflows.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use elchymin_core::MemoryConfig;

pub type MemoryId = Uuid;

/// Namespace for content-derived memory ids.
const MEMORY_NAMESPACE: Uuid = Uuid::from_u128(0x5e1c_4d1a_9b7f_4c2e_8a61_0f3b_2d9e_7c15);

/// Deterministic id from content and creation timestamp (microseconds).
pub fn memory_id(content: &str, created_at: DateTime<Utc>) -> MemoryId {
    let name = format!("{}|{}", created_at.timestamp_micros(), content);
    Uuid::new_v5(&MEMORY_NAMESPACE, name.as_bytes())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryNode {
    pub id: MemoryId,
    pub content: String,
    /// Emotional weight in [min_weight, max_weight].
    pub weight: f32,
    /// Scalar captured at creation; carried for display only.
    pub resonance: f32,
    pub tags: BTreeSet<String>,
    pub links: BTreeSet<MemoryId>,
    pub recalled_count: u32,
    pub last_recalled: Option<DateTime<Utc>>,
    /// Up to when decay has already been charged.
    #[serde(default)]
    pub last_decayed: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub decay_rate: f32,
}

impl MemoryNode {
    /// First `max_chars` characters of the content.
    pub fn excerpt(&self, max_chars: usize) -> String {
        let mut chars = self.content.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{}…", head)
        } else {
            head
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryGraph {
    nodes: BTreeMap<MemoryId, MemoryNode>,
    /// Most recent ids, oldest first.
    recent: VecDeque<MemoryId>,
    #[serde(skip)]
    config: MemoryConfig,
}

impl MemoryGraph {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            nodes: BTreeMap::new(),
            recent: VecDeque::new(),
            config,
        }
    }

    /// Swap in a new configuration (e.g. after loading a snapshot).
    pub fn reconfigure(&mut self, config: MemoryConfig) {
        self.config = config;
        self.trim_recent();
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Insert a memory and link it to similar nodes. Returns its id.
    ///
    /// An identical content+timestamp collision is treated as an upsert of
    /// nothing: the existing node is kept and its id returned.
    pub fn insert(
        &mut self,
        content: impl Into<String>,
        weight: f32,
        resonance: f32,
        tags: impl IntoIterator<Item = String>,
    ) -> MemoryId {
        self.insert_at(content, weight, resonance, tags, Utc::now())
    }

    pub fn insert_at(
        &mut self,
        content: impl Into<String>,
        weight: f32,
        resonance: f32,
        tags: impl IntoIterator<Item = String>,
        created_at: DateTime<Utc>,
    ) -> MemoryId {
        let content = content.into();
        let id = memory_id(&content, created_at);
        if self.nodes.contains_key(&id) {
            tracing::debug!("Memory {} already exists, ignoring duplicate insert", id);
            return id;
        }

        let weight = self.clamp_weight(weight, self.config.min_weight);
        let mut node = MemoryNode {
            id,
            content,
            weight,
            resonance: if resonance.is_finite() { resonance } else { 0.0 },
            tags: tags.into_iter().map(|t| t.to_lowercase()).collect(),
            links: BTreeSet::new(),
            recalled_count: 0,
            last_recalled: None,
            last_decayed: None,
            created_at,
            decay_rate: self.config.decay_rate,
        };

        let threshold = self.config.link_weight_threshold;
        let linked: Vec<MemoryId> = self
            .nodes
            .values()
            .filter(|other| {
                !other.tags.is_disjoint(&node.tags) || (other.weight - weight).abs() < threshold
            })
            .map(|other| other.id)
            .collect();

        for other_id in &linked {
            if let Some(other) = self.nodes.get_mut(other_id) {
                other.links.insert(id);
            }
            node.links.insert(*other_id);
        }

        tracing::trace!("Memory {} inserted with {} links", id, linked.len());
        self.nodes.insert(id, node);
        self.recent.push_back(id);
        self.trim_recent();
        self.enforce_capacity();
        id
    }

    /// Reinforce a node. Returns the new weight.
    pub fn recall(&mut self, id: &MemoryId) -> Option<f32> {
        self.recall_at(id, Utc::now())
    }

    pub fn recall_at(&mut self, id: &MemoryId, now: DateTime<Utc>) -> Option<f32> {
        let reinforcement = self.config.reinforcement;
        let max = self.config.max_weight;
        let node = self.nodes.get_mut(id)?;
        node.recalled_count = node.recalled_count.saturating_add(1);
        node.last_recalled = Some(now);
        node.weight = (node.weight + reinforcement).min(max);
        Some(node.weight)
    }

    /// Erode a recalled node by `decay_rate` per day, floored at
    /// `min_weight`. Only the time since the later of the last recall and
    /// the last decay is charged, so repeated calls never double-count.
    /// Never-recalled nodes are left untouched.
    pub fn decay(&mut self, id: &MemoryId, now: DateTime<Utc>) -> Option<f32> {
        let min = self.config.min_weight;
        let node = self.nodes.get_mut(id)?;
        if let Some(recalled) = node.last_recalled {
            let since = node.last_decayed.map_or(recalled, |d| d.max(recalled));
            if now > since {
                let days = (now - since).num_milliseconds() as f32 / 86_400_000.0;
                node.weight = (node.weight - node.decay_rate * days).max(min);
                node.last_decayed = Some(now);
            }
        }
        Some(node.weight)
    }

    /// Decay every node. Returns how many weights changed.
    pub fn decay_all(&mut self, now: DateTime<Utc>) -> usize {
        let ids: Vec<MemoryId> = self.nodes.keys().copied().collect();
        let mut changed = 0;
        for id in ids {
            let before = self.nodes.get(&id).map(|n| n.weight);
            let after = self.decay(&id, now);
            if before != after {
                changed += 1;
            }
        }
        changed
    }

    /// Prune if the graph is over capacity. Returns how many nodes were removed.
    pub fn enforce_capacity(&mut self) -> usize {
        if self.nodes.len() <= self.config.capacity {
            return 0;
        }
        let removed = self.prune();
        if self.nodes.len() > self.config.capacity {
            tracing::debug!(
                "Memory graph still over capacity after prune ({} > {}); waiting for more weak nodes",
                self.nodes.len(),
                self.config.capacity
            );
        }
        removed
    }

    /// Remove up to `prune_batch` of the oldest nodes weaker than
    /// `prune_weight_threshold`.
    pub fn prune(&mut self) -> usize {
        let threshold = self.config.prune_weight_threshold;
        let mut candidates: Vec<(DateTime<Utc>, MemoryId)> = self
            .nodes
            .values()
            .filter(|n| n.weight < threshold)
            .map(|n| (n.created_at, n.id))
            .collect();
        candidates.sort();
        candidates.truncate(self.config.prune_batch);

        for (_, id) in &candidates {
            self.remove(id);
        }
        if !candidates.is_empty() {
            tracing::debug!("Pruned {} weak memories", candidates.len());
        }
        candidates.len()
    }

    /// Case-insensitive substring search. Every match is recalled; results
    /// are sorted by weight, strongest first.
    pub fn search(&mut self, query: &str) -> Vec<MemoryNode> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        let ids: Vec<MemoryId> = self
            .nodes
            .values()
            .filter(|n| n.content.to_lowercase().contains(&query))
            .map(|n| n.id)
            .collect();

        let now = Utc::now();
        let mut results: Vec<MemoryNode> = ids
            .iter()
            .filter_map(|id| {
                self.recall_at(id, now)?;
                self.nodes.get(id).cloned()
            })
            .collect();
        results.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        results
    }

    pub fn get(&self, id: &MemoryId) -> Option<&MemoryNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &MemoryNode> {
        self.nodes.values()
    }

    /// Most recent nodes, newest first.
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &MemoryNode> {
        self.recent
            .iter()
            .rev()
            .filter_map(|id| self.nodes.get(id))
            .take(count)
    }

    /// Diagnostic pass: clamp weights, drop dangling links, restore
    /// mutuality, forget stale recent ids. Returns the number of repairs.
    pub fn repair(&mut self) -> usize {
        let mut repairs = 0;
        let (min, max) = (self.config.min_weight, self.config.max_weight);
        let ids: BTreeSet<MemoryId> = self.nodes.keys().copied().collect();

        let mut missing_back_links = Vec::new();
        for node in self.nodes.values_mut() {
            let fixed = if node.weight.is_finite() {
                node.weight.clamp(min, max)
            } else {
                min
            };
            if fixed != node.weight {
                node.weight = fixed;
                repairs += 1;
            }
            let before = node.links.len();
            node.links.retain(|l| ids.contains(l) && *l != node.id);
            repairs += before - node.links.len();
            for link in &node.links {
                missing_back_links.push((*link, node.id));
            }
        }
        for (holder, target) in missing_back_links {
            if let Some(node) = self.nodes.get_mut(&holder) {
                if node.links.insert(target) {
                    repairs += 1;
                }
            }
        }

        let before = self.recent.len();
        self.recent.retain(|id| ids.contains(id));
        repairs += before - self.recent.len();

        if repairs > 0 {
            tracing::warn!("Memory graph: {} repairs applied", repairs);
        }
        repairs
    }

    fn remove(&mut self, id: &MemoryId) -> Option<MemoryNode> {
        let node = self.nodes.remove(id)?;
        for link in &node.links {
            if let Some(other) = self.nodes.get_mut(link) {
                other.links.remove(id);
            }
        }
        self.recent.retain(|r| r != id);
        Some(node)
    }

    fn trim_recent(&mut self) {
        while self.recent.len() > self.config.recent_window {
            self.recent.pop_front();
        }
    }

    fn clamp_weight(&self, weight: f32, fallback: f32) -> f32 {
        let w = if weight.is_finite() { weight } else { fallback };
        w.clamp(self.config.min_weight, self.config.max_weight)
    }
}
