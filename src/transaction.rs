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

//! Transaction-side contract the router consumes: whether outdated copies
//! are acceptable, the tolerated-staleness bound, cache-use, cancellation.

use std::time::Duration;

/// A tolerated-staleness bound, or a placement's actual staleness metric.
/// Comparisons are only meaningful within the same variant; comparing a
/// `Duration` bound against a `Version` staleness is a caller bug and is
/// surfaced as `RoutingError::CatalogInconsistency` rather than coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessBound {
    Duration(Duration),
    Version(u64),
    RecordCount(u64),
}

impl FreshnessBound {
    /// `true` if `self` (an actual staleness) is within `bound` (a
    /// tolerated bound). Both must be the same variant.
    pub fn within(&self, bound: &FreshnessBound) -> Option<bool> {
        match (self, bound) {
            (FreshnessBound::Duration(actual), FreshnessBound::Duration(limit)) => {
                Some(actual <= limit)
            }
            (FreshnessBound::Version(actual), FreshnessBound::Version(limit)) => {
                Some(actual <= limit)
            }
            (FreshnessBound::RecordCount(actual), FreshnessBound::RecordCount(limit)) => {
                Some(actual <= limit)
            }
            _ => None,
        }
    }

    /// Total order used to pick the staleness-minimal candidate among those
    /// already known to satisfy the bound. Only meaningful same-variant.
    pub fn magnitude(&self) -> u128 {
        match self {
            FreshnessBound::Duration(d) => d.as_nanos(),
            FreshnessBound::Version(v) => *v as u128,
            FreshnessBound::RecordCount(c) => *c as u128,
        }
    }
}

/// Per-transaction state the router reads and (in one place) writes:
/// `set_use_cache` is flipped off when a freshness-tolerant plan is chosen,
/// since freshness bypasses the result cache (spec §4.4).
pub trait TransactionContext: Send {
    fn accepts_outdated(&self) -> bool;
    fn freshness_spec(&self) -> FreshnessBound;
    fn set_use_cache(&mut self, use_cache: bool);
    fn cancel_flag(&self) -> bool;
}

pub mod fixture {
    use super::*;

    #[derive(Debug, Clone)]
    pub struct FixtureTransaction {
        pub accepts_outdated: bool,
        pub freshness_spec: FreshnessBound,
        pub use_cache: bool,
        pub cancelled: bool,
    }

    impl Default for FixtureTransaction {
        fn default() -> Self {
            Self {
                accepts_outdated: false,
                freshness_spec: FreshnessBound::Version(0),
                use_cache: true,
                cancelled: false,
            }
        }
    }

    impl TransactionContext for FixtureTransaction {
        fn accepts_outdated(&self) -> bool {
            self.accepts_outdated
        }

        fn freshness_spec(&self) -> FreshnessBound {
            self.freshness_spec
        }

        fn set_use_cache(&mut self, use_cache: bool) {
            self.use_cache = use_cache;
        }

        fn cancel_flag(&self) -> bool {
            self.cancelled
        }
    }
}
