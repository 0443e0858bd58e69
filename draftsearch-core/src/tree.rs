// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Search tree of answer drafts.
//!
//! Nodes live in a single arena owned by [`SearchTree`]. Forward edges
//! (`children`) are the only ownership relation; the `parent` back-pointer is
//! a plain index used for backpropagation. Nodes are never removed, so an
//! index handed out by the tree stays valid for the tree's lifetime.
//!
//! UCT score of a visited node:
//!
//! ```text
//! value / visits + exploration_weight * sqrt(ln(parent.visits) / visits)
//! ```
//!
//! Unvisited nodes score `+inf`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeIndex(pub usize);

/// Short opaque display identifier (four lowercase letters).
///
/// Collisions are possible and harmless; the arena index is the real key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub const LEN: usize = 4;

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(
            (0..Self::LEN)
                .map(|_| rng.gen_range(b'a'..=b'z') as char)
                .collect(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-node copy of the search parameters, taken when the node is created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeSettings {
    pub exploration_weight: f64,
    pub max_children: usize,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            exploration_weight: 1.414,
            max_children: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    content: String,
    parent: Option<NodeIndex>,
    children: Vec<NodeIndex>,
    visits: u32,
    value: f64,
    settings: NodeSettings,
}

impl Node {
    fn new(id: NodeId, content: String, parent: Option<NodeIndex>, settings: NodeSettings) -> Self {
        Self {
            id,
            content,
            parent,
            children: Vec::new(),
            visits: 0,
            value: 0.0,
            settings,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    /// Children in creation order
    pub fn children(&self) -> &[NodeIndex] {
        &self.children
    }

    pub fn visits(&self) -> u32 {
        self.visits
    }

    /// Sum of every score backpropagated through this node
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn settings(&self) -> NodeSettings {
        self.settings
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_fully_expanded(&self) -> bool {
        self.children.len() >= self.settings.max_children
    }

    /// Mean backpropagated score, 0 when unvisited
    pub fn mean_score(&self) -> f64 {
        if self.visits == 0 {
            0.0
        } else {
            self.value / self.visits as f64
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchTree {
    nodes: Vec<Node>,
}

impl SearchTree {
    pub const ROOT: NodeIndex = NodeIndex(0);

    pub fn new<R: Rng + ?Sized>(
        root_content: impl Into<String>,
        settings: NodeSettings,
        rng: &mut R,
    ) -> Self {
        let root = Node::new(NodeId::random(rng), root_content.into(), None, settings);
        Self { nodes: vec![root] }
    }

    pub fn root(&self) -> &Node {
        &self.nodes[Self::ROOT.0]
    }

    /// Node at `index`. Indices are only ever produced by this tree.
    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index.0]
    }

    pub fn get(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get(index.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: a tree holds at least its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in creation order
    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeIndex(i), node))
    }

    /// Create a node under `parent` and attach it as the last child.
    ///
    /// The caller must ensure `parent` is not fully expanded.
    pub fn add_child<R: Rng + ?Sized>(
        &mut self,
        parent: NodeIndex,
        content: impl Into<String>,
        settings: NodeSettings,
        rng: &mut R,
    ) -> NodeIndex {
        debug_assert!(
            !self.is_fully_expanded(parent),
            "add_child on a fully expanded node"
        );

        let index = NodeIndex(self.nodes.len());
        self.nodes.push(Node::new(
            NodeId::random(rng),
            content.into(),
            Some(parent),
            settings,
        ));
        self.nodes[parent.0].children.push(index);
        index
    }

    pub fn is_fully_expanded(&self, index: NodeIndex) -> bool {
        self.node(index).is_fully_expanded()
    }

    pub fn mean_score(&self, index: NodeIndex) -> f64 {
        self.node(index).mean_score()
    }

    pub fn uct_score(&self, index: NodeIndex) -> f64 {
        let node = self.node(index);
        if node.visits == 0 {
            return f64::INFINITY;
        }

        let visits = node.visits as f64;
        let exploitation = node.value / visits;

        // Backpropagation bumps the parent whenever the child is bumped, so a
        // visited node always has a visited parent. The root has no
        // exploration term.
        let exploration = match node.parent {
            Some(parent) => {
                let parent_visits = self.node(parent).visits as f64;
                node.settings.exploration_weight * (parent_visits.ln() / visits).sqrt()
            }
            None => 0.0,
        };

        exploitation + exploration
    }

    /// Follow the most-visited child down to a leaf. Ties go to the earliest
    /// child.
    pub fn best_child(&self, from: NodeIndex) -> NodeIndex {
        let mut current = from;
        loop {
            let children = self.node(current).children();
            let Some(&first) = children.first() else {
                return current;
            };

            let mut best = first;
            for &child in &children[1..] {
                if self.node(child).visits > self.node(best).visits {
                    best = child;
                }
            }
            current = best;
        }
    }

    /// Descend by maximum UCT while the current node is fully expanded and
    /// has children. Ties go to the earliest child.
    pub fn select_leaf(&self, from: NodeIndex) -> NodeIndex {
        let mut current = from;
        loop {
            let node = self.node(current);
            if !node.is_fully_expanded() || node.is_leaf() {
                return current;
            }

            let mut best = node.children[0];
            let mut best_score = self.uct_score(best);
            for &child in &node.children[1..] {
                let score = self.uct_score(child);
                if score > best_score {
                    best = child;
                    best_score = score;
                }
            }
            current = best;
        }
    }

    /// Add one visit and `score` to `index` and every ancestor up to the root.
    pub fn backpropagate(&mut self, index: NodeIndex, score: f64) {
        let mut current = Some(index);
        while let Some(i) = current {
            let node = &mut self.nodes[i.0];
            node.visits += 1;
            node.value += score;
            current = node.parent;
        }
    }

    /// Number of edges between `index` and the root
    pub fn depth(&self, index: NodeIndex) -> usize {
        let mut depth = 0;
        let mut current = self.node(index).parent;
        while let Some(parent) = current {
            depth += 1;
            current = self.node(parent).parent;
        }
        depth
    }

    /// `index` followed by each ancestor, ending at the root
    pub fn path_to_root(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut path = vec![index];
        let mut current = self.node(index).parent;
        while let Some(parent) = current {
            path.push(parent);
            current = self.node(parent).parent;
        }
        path
    }

    /// Mermaid `graph LR` diagram of the whole tree.
    ///
    /// Each node is labelled `id:visits - preview`; the `selected` node gets a
    /// highlighted stroke.
    pub fn to_mermaid(&self, selected: Option<NodeIndex>) -> String {
        let mut out = String::from("graph LR\n");
        self.write_mermaid(Self::ROOT, 0, selected, &mut out);
        out
    }

    fn write_mermaid(
        &self,
        index: NodeIndex,
        offset: usize,
        selected: Option<NodeIndex>,
        out: &mut String,
    ) {
        let node = self.node(index);
        let padding = " ".repeat(offset);
        out.push_str(&format!(
            "{}{}[{}:{} - {}]\n",
            padding,
            node.id,
            node.id,
            node.visits,
            content_preview(&node.content)
        ));

        if selected == Some(index) {
            out.push_str(&format!("{}style {} stroke:#0ff\n", padding, node.id));
        }

        for &child in &node.children {
            self.write_mermaid(child, offset + 4, selected, out);
            out.push_str(&format!("{}{} --> {}\n", padding, node.id, self.node(child).id));
        }
    }

    pub fn snapshot(&self) -> TreeSnapshot {
        let nodes = self
            .iter()
            .map(|(index, node)| NodeSnapshot {
                index: index.0,
                id: node.id.to_string(),
                parent: node.parent.map(|p| p.0),
                content: node.content.clone(),
                visits: node.visits,
                value: node.value,
                depth: self.depth(index),
            })
            .collect();

        TreeSnapshot {
            nodes,
            best: self.best_child(Self::ROOT).0,
        }
    }
}

/// First 25 characters of the content with quotes removed and newlines
/// flattened, for diagram labels.
pub fn content_preview(content: &str) -> String {
    content
        .replace('"', "")
        .replace('\n', " ")
        .chars()
        .take(25)
        .collect()
}

/// Serializable copy of a tree, e.g. for API responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub nodes: Vec<NodeSnapshot>,
    /// Arena index of `best_child(root)`
    pub best: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub index: usize,
    pub id: String,
    pub parent: Option<usize>,
    pub content: String,
    pub visits: u32,
    pub value: f64,
    pub depth: usize,
}
