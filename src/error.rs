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

use thiserror::Error;

pub type RoutingResult<T> = std::result::Result<T, RoutingError>;

/// The three externally-visible error kinds from the router core.
///
/// `InsufficientFreshness` is deliberately not a variant here: it never
/// escapes the `freshness` module, the driver always catches it and falls
/// back to the locking path.
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("deadlock acquiring locks for routing")]
    Deadlock,

    #[error("DQL router received a DML or conditional-execute node")]
    RoutingMisuse,

    #[error("catalog inconsistency: {0}")]
    CatalogInconsistency(String),
}
