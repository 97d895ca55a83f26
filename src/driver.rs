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

//! DQL router driver (C7): post-order traversal over the logical algebra,
//! dispatching each scan through freshness (C4) or locking+strategy (C5/C6),
//! forking builders through set operations.

use std::collections::{BTreeSet, HashSet};

use futures::future::{BoxFuture, FutureExt};
use log::{debug, trace};

use crate::algebra::{LogicalArena, LogicalNode, PhysicalNode, PlanBuilder, PlanId};
use crate::catalog::{ordered_partitions, CatalogView, PartitionId, TableId};
use crate::error::{RoutingError, RoutingResult};
use crate::freshness::FreshnessResolver;
use crate::locking::{acquire_read_locks, LockAcquirer};
use crate::query_info::QueryInformation;
use crate::scan_cache::ScanCache;
use crate::strategy::{self, PlacementStrategy, ScanContext, StrategyOutcome};
use crate::transaction::TransactionContext;

/// Entry point. `logical_root` must not be a DML or conditional-execute node
/// (spec §4.7 precondition) — anything else is routed into a non-empty list
/// of candidate physical algebra trees, or an empty list if every strategy
/// reached along the way cooperatively aborted.
///
/// `async fn` even though the traversal itself is single-threaded recursion
/// (spec §5): the two genuine suspension points, C4's freshness lookups and
/// C5's lock acquisition, live inside `.await`s a few calls down, and Rust
/// requires the call chain down to them to be async.
#[allow(clippy::too_many_arguments)]
pub async fn route(
    logical_root: PlanId,
    logical: &LogicalArena,
    txn: &mut dyn TransactionContext,
    query_info: &QueryInformation,
    catalog: &dyn CatalogView,
    freshness: &dyn FreshnessResolver,
    locks: &dyn LockAcquirer,
    cache: &ScanCache,
    strategy: &dyn PlacementStrategy,
) -> RoutingResult<Vec<PlanBuilder>> {
    if matches!(logical.get(logical_root), LogicalNode::Unsupported { .. }) {
        return Err(RoutingError::RoutingMisuse);
    }
    build(logical_root, vec![PlanBuilder::new()], logical, txn, query_info, catalog, freshness, locks, cache, strategy).await
}

/// Post-order traversal over a single node, carrying (and sometimes forking)
/// the builder list threaded in from the caller. Recursion is expressed via
/// a boxed future since `async fn` cannot call itself directly.
#[allow(clippy::too_many_arguments)]
fn build<'a>(
    node: PlanId,
    builders: Vec<PlanBuilder>,
    logical: &'a LogicalArena,
    txn: &'a mut dyn TransactionContext,
    query_info: &'a QueryInformation,
    catalog: &'a dyn CatalogView,
    freshness: &'a dyn FreshnessResolver,
    locks: &'a dyn LockAcquirer,
    cache: &'a ScanCache,
    strategy: &'a dyn PlacementStrategy,
) -> BoxFuture<'a, RoutingResult<Vec<PlanBuilder>>> {
    async move {
        // Checked before descending into this node's children, per spec §5.
        // There is no dedicated error variant for cancellation (spec §7 lists
        // exactly three externally-visible errors); a cancelled traversal is
        // treated like a cooperative abort and unwinds as an empty plan list.
        if txn.cancel_flag() {
            trace!("routing cancelled, unwinding with an empty plan list");
            return Ok(Vec::new());
        }
        if builders.is_empty() {
            return Ok(builders);
        }

        match logical.get(node).clone() {
            LogicalNode::Unsupported { .. } => Err(RoutingError::RoutingMisuse),

            LogicalNode::Values { row_count } => {
                let mut builders = builders;
                for builder in &mut builders {
                    builder.push(node, PhysicalNode::Values { row_count });
                }
                Ok(builders)
            }

            LogicalNode::Scan { table } => {
                build_scan(node, table, builders, query_info, txn, catalog, freshness, locks, cache, strategy).await
            }

            LogicalNode::SetOp { kind, left, right } => {
                let left_builders =
                    build(left, builders, logical, &mut *txn, query_info, catalog, freshness, locks, cache, strategy).await?;
                if left_builders.is_empty() {
                    return Ok(left_builders);
                }

                // "Fork a fresh single-builder list for the right child,
                // build it fully" (spec §4.7) — right-side alternatives are
                // never expanded combinatorially, exactly one build is used.
                let right_builders = build(
                    right,
                    vec![PlanBuilder::new()],
                    logical,
                    &mut *txn,
                    query_info,
                    catalog,
                    freshness,
                    locks,
                    cache,
                    strategy,
                )
                .await?;
                if right_builders.is_empty() {
                    return Ok(Vec::new());
                }
                let right_builder = right_builders.into_iter().next().expect("checked non-empty above");
                let right_top = right_builder
                    .physical_for(right)
                    .ok_or_else(|| RoutingError::CatalogInconsistency("set-op right child produced no physical root".into()))?;

                let mut out = Vec::with_capacity(left_builders.len());
                for mut builder in left_builders {
                    let left_top = builder
                        .physical_for(left)
                        .ok_or_else(|| RoutingError::CatalogInconsistency("set-op left child produced no physical root".into()))?;
                    let right_copy = builder.merge_subtree(&right_builder, right_top);
                    builder.replace_top(node, PhysicalNode::SetOp { kind, left: left_top, right: right_copy });
                    out.push(builder);
                }
                Ok(out)
            }

            LogicalNode::Opaque { children, label } => {
                let mut current = builders;
                for child in &children {
                    current = build(*child, current, logical, &mut *txn, query_info, catalog, freshness, locks, cache, strategy).await?;
                    if current.is_empty() {
                        return Ok(current);
                    }
                }
                for builder in &mut current {
                    let routed_children = children
                        .iter()
                        .map(|c| {
                            builder
                                .physical_for(*c)
                                .ok_or_else(|| RoutingError::CatalogInconsistency("opaque node child was not routed".into()))
                        })
                        .collect::<RoutingResult<Vec<PlanId>>>()?;
                    builder.push(node, PhysicalNode::Opaque { children: routed_children, label: label.clone() });
                }
                Ok(current)
            }
        }
    }
    .boxed()
}

#[allow(clippy::too_many_arguments)]
async fn build_scan(
    scan: PlanId,
    table_id: TableId,
    builders: Vec<PlanBuilder>,
    query_info: &QueryInformation,
    txn: &mut dyn TransactionContext,
    catalog: &dyn CatalogView,
    freshness: &dyn FreshnessResolver,
    locks: &dyn LockAcquirer,
    cache: &ScanCache,
    strategy: &dyn PlacementStrategy,
) -> RoutingResult<Vec<PlanBuilder>> {
    let table = catalog.get_table(table_id)?;
    let columns_used: HashSet<_> = query_info.columns_used(table_id);
    let partitions_needed: BTreeSet<PartitionId> = match query_info.partitions_accessed(scan) {
        Some(set) => set,
        None => ordered_partitions(catalog, table_id, &BTreeSet::new())?.into_iter().map(|p| p.id).collect(),
    };

    if table.supports_outdated && txn.accepts_outdated() {
        if let Some(out) = try_freshness_path(scan, table_id, &partitions_needed, &columns_used, &builders, txn, freshness, cache).await? {
            return Ok(out);
        }
        trace!("scan {:?}: freshness path insufficient, falling back to locking", scan);
    }

    let mut entities: Vec<(TableId, PartitionId)> = partitions_needed.iter().map(|p| (table_id, *p)).collect();
    entities.sort_by_key(|(t, p)| (t.0, p.0));
    let _guards = acquire_read_locks(locks, &entities).await?;

    let ctx = ScanContext { scan, table: table.clone(), query_info, catalog, cache };
    let outcome = if table.partitioning.is_horizontal() {
        strategy::handle_horizontal(strategy, &ctx, builders).await
    } else if table.data_placements.len() > 1 {
        strategy::handle_vertical_or_replicated(strategy, &ctx, builders).await
    } else {
        strategy::handle_none(&ctx, builders).await
    };

    match outcome {
        StrategyOutcome::Plans(builders) => {
            debug!("scan {:?}: routed {} builder(s) via {}", scan, builders.len(), strategy.name());
            Ok(builders)
        }
        StrategyOutcome::Decline => {
            debug!("scan {:?}: strategy {} cooperatively aborted", scan, strategy.name());
            Ok(Vec::new())
        }
        StrategyOutcome::Error(e) => Err(e),
    }
}

/// Attempts the freshness path for one scan. Returns `Ok(None)` when no
/// distribution satisfies the bound for some builder (caller falls through
/// to locking), `Ok(Some(builders))` on success.
async fn try_freshness_path(
    scan: PlanId,
    table_id: TableId,
    partitions_needed: &BTreeSet<PartitionId>,
    columns_used: &HashSet<crate::catalog::ColumnId>,
    builders: &[PlanBuilder],
    txn: &mut dyn TransactionContext,
    freshness: &dyn FreshnessResolver,
    cache: &ScanCache,
) -> RoutingResult<Option<Vec<PlanBuilder>>> {
    let candidate_map = match freshness.candidate_partition_placements(table_id, partitions_needed, txn.freshness_spec())? {
        Ok(map) => map,
        Err(_insufficient) => return Ok(None),
    };
    let distributions = match freshness.candidate_column_distributions(&candidate_map, columns_used)? {
        Ok(d) => d,
        Err(_insufficient) => return Ok(None),
    };

    // Freshness-tolerant reads bypass the result cache (spec §4.4/§4.7).
    txn.set_use_cache(false);

    let mut out = Vec::with_capacity(builders.len() * distributions.len());
    for base in builders {
        for distribution in &distributions {
            let mut forked = base.fork();
            cache.build_scan(scan, distribution, &mut forked).await;
            forked.record_routing(scan, distribution.clone());
            out.push(forked);
        }
    }
    Ok(Some(out))
}
