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

//! Fleet registry.
//!
//! The registry is the single writer of bicycle status. Every lifecycle
//! transition routes through [`Registry::try_transition`], an atomic
//! compare-and-set keyed on the current status:
//!
//! `Available -> Reserved -> InUse -> Available`
//!
//! Losing the compare-and-set is an ordinary, recoverable outcome
//! ([`RentalError::StatusConflict`]), not a fault.

use crate::RentalError;
use crate::base::{BicycleId, StationId};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bicycle availability status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BicycleStatus {
    Available,
    Reserved,
    InUse,
    Maintenance,
    Retired,
}

impl fmt::Display for BicycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Available => "available",
            Self::Reserved => "reserved",
            Self::InUse => "in-use",
            Self::Maintenance => "maintenance",
            Self::Retired => "retired",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug)]
struct BicycleData {
    id: BicycleId,
    serial_number: String,
    status: BicycleStatus,
    current_station: StationId,
    hourly_rate: Decimal,
    /// Monotonic counters; safe to bump without a status precondition.
    total_rentals: u64,
    total_distance_km: Decimal,
}

impl BicycleData {
    fn assert_invariants(&self) {
        debug_assert!(
            self.total_distance_km >= Decimal::ZERO,
            "Invariant violated: total distance went negative: {}",
            self.total_distance_km
        );
        debug_assert!(
            self.hourly_rate >= Decimal::ZERO,
            "Invariant violated: hourly rate went negative: {}",
            self.hourly_rate
        );
    }
}

/// A bicycle row. All mutation goes through the registry's atomic
/// operations; direct status writes are not exposed.
#[derive(Debug)]
pub struct Bicycle {
    inner: Mutex<BicycleData>,
}

impl Bicycle {
    const DECIMAL_PRECISION: u32 = 2;

    fn new(id: BicycleId, serial_number: String, station: StationId, hourly_rate: Decimal) -> Self {
        Self {
            inner: Mutex::new(BicycleData {
                id,
                serial_number,
                status: BicycleStatus::Available,
                current_station: station,
                hourly_rate,
                total_rentals: 0,
                total_distance_km: Decimal::ZERO,
            }),
        }
    }

    pub fn status(&self) -> BicycleStatus {
        self.inner.lock().status
    }

    pub fn current_station(&self) -> StationId {
        self.inner.lock().current_station
    }

    /// Current rate; copied into a rental at creation, so later changes
    /// never affect in-flight or historical rentals.
    pub fn hourly_rate(&self) -> Decimal {
        self.inner.lock().hourly_rate
    }

    pub fn total_rentals(&self) -> u64 {
        self.inner.lock().total_rentals
    }

    pub fn snapshot(&self) -> BicycleSnapshot {
        let data = self.inner.lock();
        BicycleSnapshot {
            id: data.id,
            serial_number: data.serial_number.clone(),
            status: data.status,
            current_station: data.current_station,
            hourly_rate: data.hourly_rate.round_dp(Self::DECIMAL_PRECISION),
            total_rentals: data.total_rentals,
            total_distance_km: data.total_distance_km.round_dp(Self::DECIMAL_PRECISION),
        }
    }

    fn try_transition(
        &self,
        expected: BicycleStatus,
        new: BicycleStatus,
    ) -> Result<(), RentalError> {
        let mut data = self.inner.lock();
        if data.status != expected {
            return Err(RentalError::StatusConflict);
        }
        data.status = new;
        Ok(())
    }

    fn increment_rental_count(&self) {
        let mut data = self.inner.lock();
        data.total_rentals += 1;
        data.assert_invariants();
    }

    fn add_distance(&self, km: Decimal) -> Result<(), RentalError> {
        if km < Decimal::ZERO {
            return Err(RentalError::InvalidAmount);
        }
        let mut data = self.inner.lock();
        data.total_distance_km += km;
        data.assert_invariants();
        Ok(())
    }

    fn set_station(&self, station: StationId) {
        self.inner.lock().current_station = station;
    }

    fn set_hourly_rate(&self, rate: Decimal) -> Result<(), RentalError> {
        if rate < Decimal::ZERO {
            return Err(RentalError::InvalidAmount);
        }
        let mut data = self.inner.lock();
        data.hourly_rate = rate;
        data.assert_invariants();
        Ok(())
    }
}

/// Point-in-time view of a bicycle, safe to hand to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BicycleSnapshot {
    pub id: BicycleId,
    pub serial_number: String,
    pub status: BicycleStatus,
    pub current_station: StationId,
    pub hourly_rate: Decimal,
    pub total_rentals: u64,
    pub total_distance_km: Decimal,
}

/// Concurrent registry of the bicycle fleet.
///
/// Serial numbers are unique; registration uses the map entry API for an
/// atomic check-and-insert.
#[derive(Debug)]
pub struct Registry {
    bicycles: DashMap<BicycleId, Bicycle>,
    serials: DashMap<String, BicycleId>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            bicycles: DashMap::new(),
            serials: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Adds a bicycle to the fleet, initially `Available` at `station`.
    ///
    /// # Errors
    ///
    /// - [`RentalError::DuplicateSerial`] - serial number already registered.
    /// - [`RentalError::InvalidAmount`] - negative hourly rate.
    pub fn register(
        &self,
        serial_number: &str,
        station: StationId,
        hourly_rate: Decimal,
    ) -> Result<BicycleId, RentalError> {
        if hourly_rate < Decimal::ZERO {
            return Err(RentalError::InvalidAmount);
        }
        match self.serials.entry(serial_number.to_owned()) {
            Entry::Occupied(_) => Err(RentalError::DuplicateSerial),
            Entry::Vacant(entry) => {
                let id = BicycleId(self.next_id.fetch_add(1, Ordering::Relaxed));
                self.bicycles.insert(
                    id,
                    Bicycle::new(id, serial_number.to_owned(), station, hourly_rate),
                );
                entry.insert(id);
                Ok(id)
            }
        }
    }

    /// Atomically moves a bicycle from `expected` to `new` status.
    ///
    /// Two concurrent callers expecting the same status observe exactly one
    /// success; the loser gets [`RentalError::StatusConflict`] and must
    /// re-read and retry or abort.
    pub fn try_transition(
        &self,
        id: BicycleId,
        expected: BicycleStatus,
        new: BicycleStatus,
    ) -> Result<(), RentalError> {
        self.bicycles
            .get(&id)
            .ok_or(RentalError::BicycleNotFound)?
            .try_transition(expected, new)
    }

    pub fn status(&self, id: BicycleId) -> Result<BicycleStatus, RentalError> {
        Ok(self
            .bicycles
            .get(&id)
            .ok_or(RentalError::BicycleNotFound)?
            .status())
    }

    pub fn current_station(&self, id: BicycleId) -> Result<StationId, RentalError> {
        Ok(self
            .bicycles
            .get(&id)
            .ok_or(RentalError::BicycleNotFound)?
            .current_station())
    }

    pub fn hourly_rate(&self, id: BicycleId) -> Result<Decimal, RentalError> {
        Ok(self
            .bicycles
            .get(&id)
            .ok_or(RentalError::BicycleNotFound)?
            .hourly_rate())
    }

    /// Updates the rate charged for future rentals of this bicycle.
    pub fn set_hourly_rate(&self, id: BicycleId, rate: Decimal) -> Result<(), RentalError> {
        self.bicycles
            .get(&id)
            .ok_or(RentalError::BicycleNotFound)?
            .set_hourly_rate(rate)
    }

    pub fn increment_rental_count(&self, id: BicycleId) -> Result<(), RentalError> {
        self.bicycles
            .get(&id)
            .ok_or(RentalError::BicycleNotFound)?
            .increment_rental_count();
        Ok(())
    }

    pub fn add_distance(&self, id: BicycleId, km: Decimal) -> Result<(), RentalError> {
        self.bicycles
            .get(&id)
            .ok_or(RentalError::BicycleNotFound)?
            .add_distance(km)
    }

    pub fn set_station(&self, id: BicycleId, station: StationId) -> Result<(), RentalError> {
        self.bicycles
            .get(&id)
            .ok_or(RentalError::BicycleNotFound)?
            .set_station(station);
        Ok(())
    }

    pub fn snapshot(&self, id: BicycleId) -> Result<BicycleSnapshot, RentalError> {
        Ok(self
            .bicycles
            .get(&id)
            .ok_or(RentalError::BicycleNotFound)?
            .snapshot())
    }

    /// Snapshots of every bicycle, ordered by id for stable output.
    pub fn snapshots(&self) -> Vec<BicycleSnapshot> {
        let mut all: Vec<BicycleSnapshot> =
            self.bicycles.iter().map(|entry| entry.snapshot()).collect();
        all.sort_by_key(|snapshot| snapshot.id.0);
        all
    }

    pub fn len(&self) -> usize {
        self.bicycles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bicycles.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
