// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
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

//! Penalty ledger and user standing.
//!
//! Penalties accumulate against a user; the third one suspends renting
//! privileges in the same atomic update, so a user is never observed with
//! three penalties and `is_active_renter` still true. Resolving an
//! individual record is a separate, once-only transition that deliberately
//! does not restore privileges; reinstatement is its own administrative
//! action.

use crate::RentalError;
use crate::base::{PenaltyId, UserId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Penalty count at which renting privileges are suspended.
pub const SUSPENSION_THRESHOLD: u32 = 3;

#[derive(Debug)]
struct StandingData {
    is_verified: bool,
    is_active_renter: bool,
    penalty_count: u32,
}

#[derive(Debug)]
struct PenaltyData {
    id: PenaltyId,
    user: UserId,
    reason: String,
    created_at: DateTime<Utc>,
    resolved: bool,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<UserId>,
}

/// Point-in-time view of a user's standing counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingSnapshot {
    pub user: UserId,
    pub is_verified: bool,
    pub is_active_renter: bool,
    pub penalty_count: u32,
}

/// Point-in-time view of a penalty record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltySnapshot {
    pub id: PenaltyId,
    pub user: UserId,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<UserId>,
}

/// Accumulates penalty events and derives the eligibility counters.
#[derive(Debug)]
pub struct PenaltyLedger {
    standings: DashMap<UserId, Mutex<StandingData>>,
    records: DashMap<PenaltyId, Mutex<PenaltyData>>,
    next_id: AtomicU64,
}

impl PenaltyLedger {
    pub fn new() -> Self {
        Self {
            standings: DashMap::new(),
            records: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a user with the ledger. Idempotent; an existing standing
    /// is left untouched.
    pub fn register_user(&self, user: UserId, is_verified: bool) {
        self.standings.entry(user).or_insert_with(|| {
            Mutex::new(StandingData {
                is_verified,
                is_active_renter: true,
                penalty_count: 0,
            })
        });
    }

    /// Administrative verification toggle (ID check).
    pub fn set_verified(&self, user: UserId, is_verified: bool) -> Result<(), RentalError> {
        let standing = self.standings.get(&user).ok_or(RentalError::UserNotFound)?;
        standing.lock().is_verified = is_verified;
        Ok(())
    }

    /// Appends a penalty record and bumps the user's count; reaching the
    /// suspension threshold flips `is_active_renter` in the same critical
    /// section. Unknown users are registered unverified on the spot so a
    /// late return is never lost.
    pub fn add(&self, user: UserId, reason: &str, now: DateTime<Utc>) -> PenaltySnapshot {
        let standing = self.standings.entry(user).or_insert_with(|| {
            Mutex::new(StandingData {
                is_verified: false,
                is_active_renter: true,
                penalty_count: 0,
            })
        });
        let mut data = standing.lock();
        data.penalty_count += 1;
        if data.penalty_count >= SUSPENSION_THRESHOLD {
            data.is_active_renter = false;
        }
        drop(data);
        drop(standing);

        let id = PenaltyId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let record = PenaltyData {
            id,
            user,
            reason: reason.to_owned(),
            created_at: now,
            resolved: false,
            resolved_at: None,
            resolved_by: None,
        };
        let snapshot = PenaltySnapshot {
            id,
            user,
            reason: record.reason.clone(),
            created_at: now,
            resolved: false,
            resolved_at: None,
            resolved_by: None,
        };
        self.records.insert(id, Mutex::new(record));
        snapshot
    }

    /// Marks a record resolved, exactly once. Does not decrement the
    /// user's count or restore `is_active_renter`; see [`Self::reinstate`].
    pub fn resolve(
        &self,
        record: PenaltyId,
        resolved_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), RentalError> {
        let entry = self.records.get(&record).ok_or(RentalError::PenaltyNotFound)?;
        let mut data = entry.lock();
        if data.resolved {
            return Err(RentalError::AlreadyResolved);
        }
        data.resolved = true;
        data.resolved_at = Some(now);
        data.resolved_by = Some(resolved_by);
        Ok(())
    }

    /// Administrative reinstatement after suspension: clears the count and
    /// re-enables renting. Distinct from resolving records on purpose.
    pub fn reinstate(&self, user: UserId) -> Result<(), RentalError> {
        let standing = self.standings.get(&user).ok_or(RentalError::UserNotFound)?;
        let mut data = standing.lock();
        data.penalty_count = 0;
        data.is_active_renter = true;
        Ok(())
    }

    pub fn penalty_count(&self, user: UserId) -> u32 {
        self.standings
            .get(&user)
            .map(|standing| standing.lock().penalty_count)
            .unwrap_or(0)
    }

    /// The ledger's half of the eligibility gate:
    /// `is_verified ∧ is_active_renter ∧ penalty_count < threshold`.
    /// The engine adds the no-active-rental check from its own indexes.
    pub fn is_eligible_to_rent(&self, user: UserId) -> bool {
        match self.standings.get(&user) {
            Some(standing) => {
                let data = standing.lock();
                data.is_verified
                    && data.is_active_renter
                    && data.penalty_count < SUSPENSION_THRESHOLD
            }
            None => false,
        }
    }

    pub fn standing(&self, user: UserId) -> Result<StandingSnapshot, RentalError> {
        let standing = self.standings.get(&user).ok_or(RentalError::UserNotFound)?;
        let data = standing.lock();
        Ok(StandingSnapshot {
            user,
            is_verified: data.is_verified,
            is_active_renter: data.is_active_renter,
            penalty_count: data.penalty_count,
        })
    }

    pub fn record(&self, id: PenaltyId) -> Result<PenaltySnapshot, RentalError> {
        let entry = self.records.get(&id).ok_or(RentalError::PenaltyNotFound)?;
        let data = entry.lock();
        Ok(PenaltySnapshot {
            id: data.id,
            user: data.user,
            reason: data.reason.clone(),
            created_at: data.created_at,
            resolved: data.resolved,
            resolved_at: data.resolved_at,
            resolved_by: data.resolved_by,
        })
    }

    /// All penalty records for one user, oldest first.
    pub fn records_for(&self, user: UserId) -> Vec<PenaltySnapshot> {
        let mut records: Vec<PenaltySnapshot> = self
            .records
            .iter()
            .filter_map(|entry| {
                let data = entry.lock();
                (data.user == user).then(|| PenaltySnapshot {
                    id: data.id,
                    user: data.user,
                    reason: data.reason.clone(),
                    created_at: data.created_at,
                    resolved: data.resolved,
                    resolved_at: data.resolved_at,
                    resolved_by: data.resolved_by,
                })
            })
            .collect();
        records.sort_by_key(|record| record.id.0);
        records
    }
}

impl Default for PenaltyLedger {
    fn default() -> Self {
        Self::new()
    }
}
