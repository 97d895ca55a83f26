// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Algebra trees as tagged-variant enums over an arena, addressed by index
//! rather than a class hierarchy with mutable parent pointers (spec §9).
//! `PlanBuilder::replace_top` is therefore a controlled index rewrite: push
//! a new node, repoint the builder's current-root index at it.

use std::collections::HashMap;

use crate::catalog::{Distribution, TableId};

/// Index of a node in either arena. The same numeric space is reused for
/// logical scan-node ids, since query-info keys on those ids (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlanId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOpKind {
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedKind {
    Dml,
    ConditionalExecute,
}

/// The input tree: nodes relevant to routing (`Scan`, `Values`, `SetOp`) and
/// everything else treated structurally only (`Opaque`), per spec §6.
#[derive(Debug, Clone)]
pub enum LogicalNode {
    Scan { table: TableId },
    Values { row_count: usize },
    SetOp { kind: SetOpKind, left: PlanId, right: PlanId },
    /// Filter/project/aggregate/... — the router never inspects `label`, it
    /// only duplicates the node's shape into every in-flight builder.
    Opaque { children: Vec<PlanId>, label: String },
    /// A DML or conditional-execute node reaching the DQL router is a fatal
    /// misuse (spec §4.7 preconditions), never a routable node.
    Unsupported { kind: UnsupportedKind },
}

#[derive(Debug, Clone, Default)]
pub struct LogicalArena {
    nodes: Vec<LogicalNode>,
}

impl LogicalArena {
    pub fn push(&mut self, node: LogicalNode) -> PlanId {
        let id = PlanId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: PlanId) -> &LogicalNode {
        &self.nodes[id.0]
    }
}

/// The physical tree the router produces: scans reference concrete column
/// placements on concrete partitions, joined/unioned back together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhysicalNode {
    /// A scan of every column placement in `distribution` for one
    /// partition, as emitted by the joined-scan cache (spec §4.3).
    JoinedScan { partition: crate::catalog::PartitionId, columns: Vec<crate::catalog::ColumnPlacement> },
    /// Per-partition joined scans unioned in partition-id order.
    Union { inputs: Vec<PlanId> },
    SetOp { kind: SetOpKind, left: PlanId, right: PlanId },
    Values { row_count: usize },
    Opaque { children: Vec<PlanId>, label: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanArena {
    nodes: Vec<PhysicalNode>,
}

impl PlanArena {
    pub fn push(&mut self, node: PhysicalNode) -> PlanId {
        let id = PlanId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: PlanId) -> &PhysicalNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    Open,
    Extended,
    Frozen,
}

/// A mutable handle wrapping a partially built physical algebra plus a
/// record of which physical placements each logical node was routed to.
/// Forkable by deep structural clone so set operations and multi-distribution
/// strategies can explore alternatives independently (spec §3).
///
/// `node_map` tracks, per *logical* node already processed, the physical
/// node it was routed to — this is what lets a later opaque or set-op node
/// look up "the top" of each of its already-built children, including nodes
/// with more than one child (a plain "current top" scalar cannot represent
/// that; `node_map` is the arena-indexed generalization of it).
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    arena: PlanArena,
    node_map: HashMap<PlanId, PlanId>,
    state: BuilderState,
    routed: HashMap<PlanId, Distribution>,
}

impl Default for PlanBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self {
            arena: PlanArena::default(),
            node_map: HashMap::new(),
            state: BuilderState::Open,
            routed: HashMap::new(),
        }
    }

    /// Append a node to the arena without associating it with any logical
    /// node — used for the internal scaffolding of a subtree (e.g. the
    /// per-partition scans under a `Union`) whose only externally-visible
    /// identity is the subtree's own root.
    pub fn push_raw(&mut self, node: PhysicalNode) -> PlanId {
        debug_assert!(self.state != BuilderState::Frozen, "push on a frozen builder");
        let id = self.arena.push(node);
        self.state = BuilderState::Extended;
        id
    }

    /// Record `physical` as the routed counterpart of `logical`, without
    /// appending anything (the node was already pushed, e.g. via `push_raw`).
    pub fn set_physical(&mut self, logical: PlanId, physical: PlanId) {
        self.node_map.insert(logical, physical);
    }

    /// Append a node and record it as the physical counterpart of `logical`.
    /// First-time routing of a logical node.
    pub fn push(&mut self, logical: PlanId, node: PhysicalNode) -> PlanId {
        let id = self.push_raw(node);
        self.set_physical(logical, id);
        id
    }

    /// Re-route `logical` to a newly appended node — the arena-index
    /// analogue of pointer surgery (spec §9): the old physical subtree stays
    /// in the arena, unreachable, while `logical` now maps to the new node.
    /// Used when a set operation wraps its already-built left child in a
    /// fresh `SetOp` node.
    pub fn replace_top(&mut self, logical: PlanId, node: PhysicalNode) -> PlanId {
        self.push(logical, node)
    }

    pub fn physical_for(&self, logical: PlanId) -> Option<PlanId> {
        self.node_map.get(&logical).copied()
    }

    pub fn arena(&self) -> &PlanArena {
        &self.arena
    }

    pub fn record_routing(&mut self, logical_node: PlanId, distribution: Distribution) {
        self.routed.insert(logical_node, distribution);
    }

    pub fn routed_distribution(&self, logical_node: PlanId) -> Option<&Distribution> {
        self.routed.get(&logical_node)
    }

    /// Deep structural clone, used whenever a set operation or a strategy
    /// with multiple feasible distributions needs an independent copy to
    /// keep extending.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Copy the physical subtree rooted at `physical_root` in `other`'s arena
    /// into `self`'s arena, returning the new root's id in `self`. Needed
    /// because a set operation's right-hand build lives in its own builder
    /// (spec §9: "fork a fresh single-builder list for the right child") —
    /// its physical ids are meaningless inside a left-hand builder's arena
    /// until copied over, the same splicing idea `ScanSubtree::splice_into`
    /// uses for cached scan subtrees.
    pub fn merge_subtree(&mut self, other: &PlanBuilder, physical_root: PlanId) -> PlanId {
        let id = self.copy_node(&other.arena, physical_root);
        self.routed.extend(other.routed.iter().map(|(k, v)| (*k, v.clone())));
        id
    }

    fn copy_node(&mut self, source: &PlanArena, id: PlanId) -> PlanId {
        match source.get(id).clone() {
            PhysicalNode::JoinedScan { partition, columns } => self.push_raw(PhysicalNode::JoinedScan { partition, columns }),
            PhysicalNode::Union { inputs } => {
                let copied = inputs.into_iter().map(|i| self.copy_node(source, i)).collect();
                self.push_raw(PhysicalNode::Union { inputs: copied })
            }
            PhysicalNode::SetOp { kind, left, right } => {
                let left = self.copy_node(source, left);
                let right = self.copy_node(source, right);
                self.push_raw(PhysicalNode::SetOp { kind, left, right })
            }
            PhysicalNode::Values { row_count } => self.push_raw(PhysicalNode::Values { row_count }),
            PhysicalNode::Opaque { children, label } => {
                let copied = children.into_iter().map(|c| self.copy_node(source, c)).collect();
                self.push_raw(PhysicalNode::Opaque { children: copied, label })
            }
        }
    }

    pub fn freeze(self, logical_root: PlanId) -> RoutingPlan {
        RoutingPlan {
            arena: self.arena,
            root: self.node_map.get(&logical_root).copied(),
            routed: self.routed,
            state: BuilderState::Frozen,
        }
    }
}

/// A builder frozen after the traversal completes.
#[derive(Debug, Clone)]
pub struct RoutingPlan {
    arena: PlanArena,
    root: Option<PlanId>,
    routed: HashMap<PlanId, Distribution>,
    state: BuilderState,
}

impl RoutingPlan {
    pub fn arena(&self) -> &PlanArena {
        &self.arena
    }

    pub fn root(&self) -> Option<PlanId> {
        self.root
    }

    pub fn routed_distribution(&self, logical_node: PlanId) -> Option<&Distribution> {
        self.routed.get(&logical_node)
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }
}
