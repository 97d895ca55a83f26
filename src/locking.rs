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

//! Lock acquirer (C5), used only on the non-freshness path: a shared global
//! schema lock, then a shared lock per `(table_id, partition_id)` entity the
//! query will read, acquired in ascending order to avoid deadlocks among
//! routers (spec §5).

use async_trait::async_trait;

use crate::catalog::{PartitionId, TableId};
use crate::error::RoutingResult;

/// An opaque RAII token. The router never inspects it further; release is
/// the transaction layer's job (spec §5's cancellation note), so this trait
/// carries no `release`/`drop` contract of its own.
pub trait LockGuard: Send {}

#[async_trait]
pub trait LockAcquirer: Send + Sync {
    async fn acquire_schema_shared(&self) -> RoutingResult<Box<dyn LockGuard>>;
    async fn acquire_entity_shared(&self, table: TableId, partition: PartitionId) -> RoutingResult<Box<dyn LockGuard>>;
}

/// Acquire the global schema lock followed by every `(table, partition)`
/// entity lock in ascending order. Entities are deduplicated and sorted
/// before acquisition so concurrent routers converge on the same order,
/// satisfying the lock-minimality and deadlock-avoidance requirements of
/// spec §5 and §8.
pub async fn acquire_read_locks(
    locks: &dyn LockAcquirer,
    entities: &[(TableId, PartitionId)],
) -> RoutingResult<Vec<Box<dyn LockGuard>>> {
    let mut sorted: Vec<(TableId, PartitionId)> = entities.to_vec();
    sorted.sort_by_key(|(t, p)| (t.0, p.0));
    sorted.dedup();

    let mut guards = Vec::with_capacity(sorted.len() + 1);
    guards.push(locks.acquire_schema_shared().await?);
    for (table, partition) in sorted {
        guards.push(locks.acquire_entity_shared(table, partition).await?);
    }
    Ok(guards)
}

pub mod fixture {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;
    use crate::error::RoutingError;

    pub struct RecordingGuard;
    impl LockGuard for RecordingGuard {}

    /// A lock manager fixture for tests: records every entity lock taken,
    /// and can be told to report a deadlock on a chosen entity.
    #[derive(Default)]
    pub struct FixtureLockAcquirer {
        pub deadlock_on: Option<(TableId, PartitionId)>,
        taken: Mutex<Vec<(TableId, PartitionId)>>,
        schema_locks_taken: Mutex<u32>,
    }

    impl FixtureLockAcquirer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_deadlock_on(table: TableId, partition: PartitionId) -> Self {
            Self { deadlock_on: Some((table, partition)), ..Self::default() }
        }

        pub fn taken_entities(&self) -> HashSet<(TableId, PartitionId)> {
            self.taken.lock().unwrap().iter().copied().collect()
        }

        pub fn schema_lock_count(&self) -> u32 {
            *self.schema_locks_taken.lock().unwrap()
        }
    }

    #[async_trait]
    impl LockAcquirer for FixtureLockAcquirer {
        async fn acquire_schema_shared(&self) -> RoutingResult<Box<dyn LockGuard>> {
            *self.schema_locks_taken.lock().unwrap() += 1;
            Ok(Box::new(RecordingGuard))
        }

        async fn acquire_entity_shared(&self, table: TableId, partition: PartitionId) -> RoutingResult<Box<dyn LockGuard>> {
            if self.deadlock_on == Some((table, partition)) {
                return Err(RoutingError::Deadlock);
            }
            self.taken.lock().unwrap().push((table, partition));
            Ok(Box::new(RecordingGuard))
        }
    }
}
