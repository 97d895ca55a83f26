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

//! Joined-scan cache (C3): turns a (table, column-placements-per-partition)
//! selection into a physical scan subtree, memoized by a stable fingerprint
//! of the distribution, with at-most-one concurrent build per key.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use twox_hash::XxHash64;

use crate::algebra::{PhysicalNode, PlanBuilder, PlanId};
use crate::catalog::{ColumnPlacement, Distribution, PartitionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

fn fingerprint(distribution: &Distribution) -> Fingerprint {
    let mut hasher = XxHash64::default();
    // `Distribution` is a `BTreeMap`, so this iterates in ascending
    // `PartitionId` order regardless of insertion order — two distributions
    // with the same partition->placement-list mapping always fingerprint
    // equal, per the cache boundary contract (spec §6).
    for (partition, placements) in distribution {
        partition.0.hash(&mut hasher);
        placements.len().hash(&mut hasher);
        for placement in placements {
            placement.column.0.hash(&mut hasher);
            placement.store.0.hash(&mut hasher);
        }
    }
    Fingerprint(hasher.finish())
}

/// A physical scan subtree, independent of any particular `PlanArena` —
/// `splice_into` copies it into the caller's builder, since builders each
/// own a private arena (forkable by deep clone, spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
enum ScanSubtree {
    JoinedScan { partition: PartitionId, columns: Vec<ColumnPlacement> },
    Union(Vec<ScanSubtree>),
}

impl ScanSubtree {
    fn splice_into(&self, builder: &mut PlanBuilder) -> PlanId {
        match self {
            ScanSubtree::JoinedScan { partition, columns } => builder.push_raw(PhysicalNode::JoinedScan {
                partition: *partition,
                columns: columns.clone(),
            }),
            ScanSubtree::Union(parts) => {
                let inputs = parts.iter().map(|p| p.splice_into(builder)).collect();
                builder.push_raw(PhysicalNode::Union { inputs })
            }
        }
    }
}

fn build_subtree(distribution: &Distribution) -> ScanSubtree {
    // Short-circuit: exactly one placement per partition, all covering the
    // same column set — this is a single multi-column scan per partition,
    // still unioned across partitions if there is more than one (spec §4.3
    // "short-circuits to a single multi-column scan" applies per partition;
    // the cross-partition union is unconditional).
    let mut per_partition: Vec<ScanSubtree> = distribution
        .iter()
        .map(|(partition, columns)| ScanSubtree::JoinedScan {
            partition: *partition,
            columns: columns.clone(),
        })
        .collect();

    if per_partition.len() == 1 {
        per_partition.remove(0)
    } else {
        ScanSubtree::Union(per_partition)
    }
}

type CellSlot = Arc<OnceCell<Arc<ScanSubtree>>>;

/// Process-wide concurrent cache. Readers/writers for distinct keys proceed
/// in parallel; concurrent requests for the same key serialize on that
/// key's `OnceCell` so only one build runs and all callers observe its
/// result (spec §5).
#[derive(Default)]
pub struct ScanCache {
    entries: Mutex<HashMap<Fingerprint, CellSlot>>,
}

impl ScanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build (or reuse a concurrently in-flight/previously cached build of)
    /// the physical scan subtree for `distribution`, splicing a copy into
    /// `builder` as the routed counterpart of the logical scan `logical`,
    /// and returning the new root's id.
    pub async fn build_scan(&self, logical: PlanId, distribution: &Distribution, builder: &mut PlanBuilder) -> PlanId {
        let fp = fingerprint(distribution);
        let cell = {
            let mut entries = self.entries.lock();
            entries.entry(fp).or_insert_with(|| Arc::new(OnceCell::new())).clone()
        };

        let subtree = cell
            .get_or_init(|| async {
                debug!("joined-scan cache miss, building fingerprint {:?}", fp);
                Arc::new(build_subtree(distribution))
            })
            .await
            .clone();
        trace!("splicing cached scan subtree for fingerprint {:?}", fp);
        let id = subtree.splice_into(builder);
        builder.set_physical(logical, id);
        id
    }

    /// Drop all entries atomically. Per spec §9's open question on ordering:
    /// in-flight builds already hold their own `Arc<OnceCell<_>>` clone (taken
    /// before the map swap below), so they run to completion and populate a
    /// cell nobody can look up anymore — their result is never inserted into
    /// a fresh lookup, and any lookup racing the swap either sees the old
    /// entry (pre-swap) or creates a brand new cell (post-swap). Either way
    /// no result computed "during" an invalidation survives it.
    pub fn invalidate_all(&self) {
        let mut entries = self.entries.lock();
        *entries = HashMap::new();
    }

    #[cfg(test)]
    pub(crate) fn entry_count(&self) -> usize {
        self.entries.lock().len()
    }
}
