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

//! End-to-end seed scenarios for the DQL router driver.

use pretty_assertions::assert_eq;

use polystore_router::algebra::{LogicalArena, LogicalNode, PhysicalNode, PlanBuilder, SetOpKind};
use polystore_router::catalog::fixture::FixtureCatalog;
use polystore_router::catalog::{Column, ColumnId, ColumnPlacement, Partition, PartitionId, PartitioningKind, PlacementRole, PartitionPlacement, StoreId, Table, TableId};
use polystore_router::freshness::CatalogFreshnessResolver;
use polystore_router::locking::fixture::FixtureLockAcquirer;
use polystore_router::query_info::QueryInformation;
use polystore_router::scan_cache::ScanCache;
use polystore_router::strategy::{FullReplication, MinCost};
use polystore_router::transaction::fixture::FixtureTransaction;
use polystore_router::transaction::FreshnessBound;
use polystore_router::{route, RoutingPlan};

type TestResult<T> = std::result::Result<T, anyhow::Error>;

fn freeze(builder: PlanBuilder, root: polystore_router::PlanId) -> RoutingPlan {
    builder.freeze(root)
}

#[tokio::test]
async fn single_placement_scan_projects_only_used_columns() -> TestResult<()> {
    let table = TableId(1);
    let (col_a, col_b) = (ColumnId(1), ColumnId(2));
    let partition = PartitionId(1);
    let store = StoreId(1);

    let mut catalog = FixtureCatalog::default();
    catalog.tables.insert(
        table,
        Table {
            id: table,
            columns: vec![col_a, col_b],
            partitioning: PartitioningKind::None,
            data_placements: vec![store],
            supports_outdated: false,
            preferred_stores: vec![store],
        },
    );
    catalog.columns.insert(col_a, Column { id: col_a, table, declared_type: "int".into() });
    catalog.partitions.insert(table, vec![Partition { id: partition, table }]);
    catalog.partition_placements.insert(
        partition,
        vec![PartitionPlacement { partition, store, role: PlacementRole::Primary, staleness: FreshnessBound::Version(0) }],
    );
    catalog.column_placements.insert((col_a, partition), vec![ColumnPlacement { column: col_a, store }]);

    let mut logical = LogicalArena::default();
    let scan = logical.push(LogicalNode::Scan { table });

    let query_info = QueryInformation::new().with_columns_used(table, [col_a]);
    let mut txn = FixtureTransaction::default();
    let freshness = CatalogFreshnessResolver { catalog: &catalog };
    let locks = FixtureLockAcquirer::new();
    let cache = ScanCache::new();
    let strategy = FullReplication;

    let builders = route(scan, &logical, &mut txn, &query_info, &catalog, &freshness, &locks, &cache, &strategy).await?;
    assert_eq!(builders.len(), 1);

    let plan = freeze(builders.into_iter().next().unwrap(), scan);
    let root = plan.root().expect("scan produced a physical root");
    match plan.arena().get(root) {
        PhysicalNode::JoinedScan { partition: p, columns } => {
            assert_eq!(*p, partition);
            assert_eq!(columns, &vec![ColumnPlacement { column: col_a, store }]);
        }
        other => panic!("expected JoinedScan, got {:?}", other),
    }
    assert!(locks.taken_entities().contains(&(table, partition)));
    Ok(())
}

#[tokio::test]
async fn vertical_split_joins_every_column_into_one_scan_node() -> TestResult<()> {
    let table = TableId(2);
    let (col_a, col_b) = (ColumnId(1), ColumnId(2));
    let partition = PartitionId(1);
    let (store_x, store_y) = (StoreId(10), StoreId(20));

    let mut catalog = FixtureCatalog::default();
    catalog.tables.insert(
        table,
        Table {
            id: table,
            columns: vec![col_a, col_b],
            partitioning: PartitioningKind::Vertical,
            data_placements: vec![store_x, store_y],
            supports_outdated: false,
            preferred_stores: vec![store_x, store_y],
        },
    );
    catalog.partitions.insert(table, vec![Partition { id: partition, table }]);
    catalog.partition_placements.insert(
        partition,
        vec![
            PartitionPlacement { partition, store: store_x, role: PlacementRole::Primary, staleness: FreshnessBound::Version(0) },
            PartitionPlacement { partition, store: store_y, role: PlacementRole::Primary, staleness: FreshnessBound::Version(0) },
        ],
    );
    catalog.column_placements.insert((col_a, partition), vec![ColumnPlacement { column: col_a, store: store_x }]);
    catalog.column_placements.insert((col_b, partition), vec![ColumnPlacement { column: col_b, store: store_y }]);

    let mut logical = LogicalArena::default();
    let scan = logical.push(LogicalNode::Scan { table });

    let query_info = QueryInformation::new().with_columns_used(table, [col_a, col_b]);
    let mut txn = FixtureTransaction::default();
    let freshness = CatalogFreshnessResolver { catalog: &catalog };
    let locks = FixtureLockAcquirer::new();
    let cache = ScanCache::new();
    let strategy = FullReplication;

    let builders = route(scan, &logical, &mut txn, &query_info, &catalog, &freshness, &locks, &cache, &strategy).await?;
    assert_eq!(builders.len(), 1);

    let plan = freeze(builders.into_iter().next().unwrap(), scan);
    let root = plan.root().expect("scan produced a physical root");
    match plan.arena().get(root) {
        PhysicalNode::JoinedScan { partition: p, columns } => {
            assert_eq!(*p, partition);
            assert_eq!(
                columns,
                &vec![
                    ColumnPlacement { column: col_a, store: store_x },
                    ColumnPlacement { column: col_b, store: store_y },
                ]
            );
        }
        other => panic!("expected a single joined scan spanning both stores, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn horizontal_partitioning_unions_only_the_accessed_partitions_in_order() {
    let table = TableId(3);
    let col_a = ColumnId(1);
    let (p1, p2, p3) = (PartitionId(1), PartitionId(2), PartitionId(3));
    let (store_x, store_y, store_z) = (StoreId(10), StoreId(20), StoreId(30));

    let mut catalog = FixtureCatalog::default();
    catalog.tables.insert(
        table,
        Table {
            id: table,
            columns: vec![col_a],
            partitioning: PartitioningKind::HorizontalHash,
            data_placements: vec![store_x, store_y, store_z],
            supports_outdated: false,
            preferred_stores: vec![],
        },
    );
    catalog.partitions.insert(table, vec![Partition { id: p1, table }, Partition { id: p2, table }, Partition { id: p3, table }]);
    for (p, s) in [(p1, store_x), (p2, store_y), (p3, store_z)] {
        catalog
            .partition_placements
            .insert(p, vec![PartitionPlacement { partition: p, store: s, role: PlacementRole::Primary, staleness: FreshnessBound::Version(0) }]);
    }
    catalog.column_placements.insert((col_a, p1), vec![ColumnPlacement { column: col_a, store: store_x }]);
    catalog.column_placements.insert((col_a, p3), vec![ColumnPlacement { column: col_a, store: store_z }]);

    let mut logical = LogicalArena::default();
    let scan = logical.push(LogicalNode::Scan { table });

    let query_info = QueryInformation::new()
        .with_columns_used(table, [col_a])
        .with_partitions_accessed(scan, [p1, p3]);
    let mut txn = FixtureTransaction::default();
    let freshness = CatalogFreshnessResolver { catalog: &catalog };
    let locks = FixtureLockAcquirer::new();
    let cache = ScanCache::new();
    let strategy = MinCost;

    let builders = route(scan, &logical, &mut txn, &query_info, &catalog, &freshness, &locks, &cache, &strategy)
        .await
        .expect("routing succeeds");
    assert_eq!(builders.len(), 1);

    let plan = freeze(builders.into_iter().next().unwrap(), scan);
    let root = plan.root().expect("scan produced a physical root");
    match plan.arena().get(root) {
        PhysicalNode::Union { inputs } => {
            let partitions: Vec<PartitionId> = inputs
                .iter()
                .map(|i| match plan.arena().get(*i) {
                    PhysicalNode::JoinedScan { partition, .. } => *partition,
                    other => panic!("expected JoinedScan, got {:?}", other),
                })
                .collect();
            assert_eq!(partitions, vec![p1, p3]);
        }
        other => panic!("expected Union, got {:?}", other),
    }

    let taken = locks.taken_entities();
    assert!(taken.contains(&(table, p1)));
    assert!(taken.contains(&(table, p3)));
    assert!(!taken.contains(&(table, p2)), "partition not accessed by the query must not be locked");
}

#[tokio::test]
async fn freshness_success_picks_tolerant_placements_and_disables_the_cache() {
    let table = TableId(4);
    let col_a = ColumnId(1);
    let (p1, p2) = (PartitionId(1), PartitionId(2));
    let (s1, s2, s3, s4, s5) = (StoreId(1), StoreId(2), StoreId(3), StoreId(4), StoreId(5));

    let mut catalog = FixtureCatalog::default();
    catalog.tables.insert(
        table,
        Table {
            id: table,
            columns: vec![col_a],
            partitioning: PartitioningKind::Replicated,
            data_placements: vec![s1, s2, s3, s4, s5],
            supports_outdated: true,
            preferred_stores: vec![s1, s2, s3, s4, s5],
        },
    );
    catalog.partitions.insert(table, vec![Partition { id: p1, table }, Partition { id: p2, table }]);
    catalog.partition_placements.insert(
        p1,
        vec![
            PartitionPlacement { partition: p1, store: s1, role: PlacementRole::Refreshable, staleness: FreshnessBound::Version(5) },
            PartitionPlacement { partition: p1, store: s2, role: PlacementRole::Refreshable, staleness: FreshnessBound::Version(8) },
            PartitionPlacement { partition: p1, store: s3, role: PlacementRole::Primary, staleness: FreshnessBound::Version(20) },
        ],
    );
    catalog.partition_placements.insert(
        p2,
        vec![
            PartitionPlacement { partition: p2, store: s4, role: PlacementRole::Refreshable, staleness: FreshnessBound::Version(3) },
            PartitionPlacement { partition: p2, store: s5, role: PlacementRole::Primary, staleness: FreshnessBound::Version(50) },
        ],
    );
    catalog.column_placements.insert((col_a, p1), vec![ColumnPlacement { column: col_a, store: s1 }, ColumnPlacement { column: col_a, store: s2 }]);
    catalog.column_placements.insert((col_a, p2), vec![ColumnPlacement { column: col_a, store: s4 }]);

    let mut logical = LogicalArena::default();
    let scan = logical.push(LogicalNode::Scan { table });

    let query_info = QueryInformation::new().with_columns_used(table, [col_a]);
    let mut txn = FixtureTransaction { accepts_outdated: true, freshness_spec: FreshnessBound::Version(10), ..Default::default() };
    let freshness = CatalogFreshnessResolver { catalog: &catalog };
    let locks = FixtureLockAcquirer::new();
    let cache = ScanCache::new();
    let strategy = FullReplication;

    let builders = route(scan, &logical, &mut txn, &query_info, &catalog, &freshness, &locks, &cache, &strategy)
        .await
        .expect("routing succeeds");

    assert!(!builders.is_empty(), "at least one freshness-tolerant builder must be produced");
    assert!(!txn.use_cache, "freshness-tolerant reads must disable the result cache");
    assert_eq!(locks.schema_lock_count(), 0, "the freshness path never takes locks");

    let found_best = builders.iter().any(|b| {
        let root = b.physical_for(scan).unwrap();
        matches!(
            b.arena().get(root),
            PhysicalNode::Union { .. } | PhysicalNode::JoinedScan { .. }
        )
    });
    assert!(found_best);
}

#[tokio::test]
async fn freshness_fallback_locks_and_uses_primary_placements() {
    let table = TableId(4);
    let col_a = ColumnId(1);
    let (p1, p2) = (PartitionId(1), PartitionId(2));
    let (s1, s3, s5) = (StoreId(1), StoreId(3), StoreId(5));

    let mut catalog = FixtureCatalog::default();
    catalog.tables.insert(
        table,
        Table {
            id: table,
            columns: vec![col_a],
            partitioning: PartitioningKind::Replicated,
            data_placements: vec![s1, s3, s5],
            supports_outdated: true,
            preferred_stores: vec![s3, s5],
        },
    );
    catalog.partitions.insert(table, vec![Partition { id: p1, table }, Partition { id: p2, table }]);
    catalog.partition_placements.insert(
        p1,
        vec![
            PartitionPlacement { partition: p1, store: s1, role: PlacementRole::Refreshable, staleness: FreshnessBound::Version(5) },
            PartitionPlacement { partition: p1, store: s3, role: PlacementRole::Primary, staleness: FreshnessBound::Version(20) },
        ],
    );
    // p2 has no placement within the tolerated bound — InsufficientFreshness.
    catalog.partition_placements.insert(
        p2,
        vec![PartitionPlacement { partition: p2, store: s5, role: PlacementRole::Primary, staleness: FreshnessBound::Version(50) }],
    );
    catalog.column_placements.insert((col_a, p1), vec![ColumnPlacement { column: col_a, store: s1 }, ColumnPlacement { column: col_a, store: s3 }]);
    catalog.column_placements.insert((col_a, p2), vec![ColumnPlacement { column: col_a, store: s5 }]);

    let mut logical = LogicalArena::default();
    let scan = logical.push(LogicalNode::Scan { table });

    let query_info = QueryInformation::new().with_columns_used(table, [col_a]);
    let mut txn = FixtureTransaction { accepts_outdated: true, freshness_spec: FreshnessBound::Version(10), ..Default::default() };
    let freshness = CatalogFreshnessResolver { catalog: &catalog };
    let locks = FixtureLockAcquirer::new();
    let cache = ScanCache::new();
    let strategy = FullReplication;

    let builders = route(scan, &logical, &mut txn, &query_info, &catalog, &freshness, &locks, &cache, &strategy)
        .await
        .expect("routing succeeds");
    assert_eq!(builders.len(), 1);
    assert!(txn.use_cache, "falling back to locking must leave the cache enabled");
    assert_eq!(locks.schema_lock_count(), 1);
    let taken = locks.taken_entities();
    assert!(taken.contains(&(table, p1)));
    assert!(taken.contains(&(table, p2)));

    let plan = freeze(builders.into_iter().next().unwrap(), scan);
    let root = plan.root().expect("scan produced a physical root");
    let stores_used: Vec<StoreId> = match plan.arena().get(root) {
        PhysicalNode::Union { inputs } => inputs
            .iter()
            .flat_map(|i| match plan.arena().get(*i) {
                PhysicalNode::JoinedScan { columns, .. } => columns.iter().map(|c| c.store).collect::<Vec<_>>(),
                other => panic!("expected JoinedScan, got {:?}", other),
            })
            .collect(),
        other => panic!("expected Union, got {:?}", other),
    };
    assert_eq!(stores_used, vec![s3, s5], "the locking fallback must use each partition's PRIMARY store");
}

#[tokio::test]
async fn set_operation_forks_the_right_child_and_unions_two_copies() {
    let table = TableId(1);
    let col_a = ColumnId(1);
    let partition = PartitionId(1);
    let store = StoreId(1);

    let mut catalog = FixtureCatalog::default();
    catalog.tables.insert(
        table,
        Table {
            id: table,
            columns: vec![col_a],
            partitioning: PartitioningKind::None,
            data_placements: vec![store],
            supports_outdated: false,
            preferred_stores: vec![store],
        },
    );
    catalog.partitions.insert(table, vec![Partition { id: partition, table }]);
    catalog.partition_placements.insert(
        partition,
        vec![PartitionPlacement { partition, store, role: PlacementRole::Primary, staleness: FreshnessBound::Version(0) }],
    );
    catalog.column_placements.insert((col_a, partition), vec![ColumnPlacement { column: col_a, store }]);

    let mut logical = LogicalArena::default();
    let left = logical.push(LogicalNode::Scan { table });
    let right = logical.push(LogicalNode::Scan { table });
    let union = logical.push(LogicalNode::SetOp { kind: SetOpKind::Union, left, right });

    let query_info = QueryInformation::new().with_columns_used(table, [col_a]);
    let mut txn = FixtureTransaction::default();
    let freshness = CatalogFreshnessResolver { catalog: &catalog };
    let locks = FixtureLockAcquirer::new();
    let cache = ScanCache::new();
    let strategy = FullReplication;

    let builders = route(union, &logical, &mut txn, &query_info, &catalog, &freshness, &locks, &cache, &strategy)
        .await
        .expect("routing succeeds");
    assert_eq!(builders.len(), 1);

    let plan = freeze(builders.into_iter().next().unwrap(), union);
    let root = plan.root().expect("set-op produced a physical root");
    match plan.arena().get(root) {
        PhysicalNode::SetOp { kind: SetOpKind::Union, left: l, right: r } => {
            for id in [*l, *r] {
                assert!(matches!(plan.arena().get(id), PhysicalNode::JoinedScan { .. }));
            }
        }
        other => panic!("expected SetOp(Union, ..), got {:?}", other),
    }
}

#[tokio::test]
async fn a_dml_root_is_rejected_before_any_traversal() {
    let mut logical = LogicalArena::default();
    let root = logical.push(LogicalNode::Unsupported { kind: polystore_router::UnsupportedKind::Dml });

    let catalog = FixtureCatalog::default();
    let query_info = QueryInformation::new();
    let mut txn = FixtureTransaction::default();
    let freshness = CatalogFreshnessResolver { catalog: &catalog };
    let locks = FixtureLockAcquirer::new();
    let cache = ScanCache::new();
    let strategy = FullReplication;

    let err = route(root, &logical, &mut txn, &query_info, &catalog, &freshness, &locks, &cache, &strategy)
        .await
        .expect_err("a DML root must be rejected");
    assert!(matches!(err, polystore_router::RoutingError::RoutingMisuse));
}

#[tokio::test]
async fn deadlock_on_an_entity_lock_surfaces_as_a_fatal_error() {
    let table = TableId(1);
    let col_a = ColumnId(1);
    let partition = PartitionId(1);
    let store = StoreId(1);

    let mut catalog = FixtureCatalog::default();
    catalog.tables.insert(
        table,
        Table {
            id: table,
            columns: vec![col_a],
            partitioning: PartitioningKind::None,
            data_placements: vec![store],
            supports_outdated: false,
            preferred_stores: vec![store],
        },
    );
    catalog.partitions.insert(table, vec![Partition { id: partition, table }]);
    catalog.partition_placements.insert(
        partition,
        vec![PartitionPlacement { partition, store, role: PlacementRole::Primary, staleness: FreshnessBound::Version(0) }],
    );
    catalog.column_placements.insert((col_a, partition), vec![ColumnPlacement { column: col_a, store }]);

    let mut logical = LogicalArena::default();
    let scan = logical.push(LogicalNode::Scan { table });

    let query_info = QueryInformation::new().with_columns_used(table, [col_a]);
    let mut txn = FixtureTransaction::default();
    let freshness = CatalogFreshnessResolver { catalog: &catalog };
    let locks = FixtureLockAcquirer::with_deadlock_on(table, partition);
    let cache = ScanCache::new();
    let strategy = FullReplication;

    let err = route(scan, &logical, &mut txn, &query_info, &catalog, &freshness, &locks, &cache, &strategy)
        .await
        .expect_err("a deadlocked lock acquisition is fatal");
    assert!(matches!(err, polystore_router::RoutingError::Deadlock));
}
