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

//! Reservation holds.
//!
//! A reservation is a time-boxed soft lock on one bicycle between booking
//! and pickup. State machine:
//!
//! `Active -> PickedUp | Cancelled | Expired`
//!
//! All three targets are terminal. The status word is the commit point:
//! transitions check-and-mutate under the row mutex, so of any racing
//! `pick_up`/`cancel`/`expire` exactly one wins and the losers observe a
//! terminal status. A reservation is never treated as expired from a
//! wall-clock comparison alone; only the explicit `expire` transition
//! records it.

use crate::RentalError;
use crate::base::{BicycleId, ReservationId, StationId, UserId};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reservation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReservationStatus {
    Active,
    PickedUp,
    Expired,
    Cancelled,
}

impl ReservationStatus {
    pub fn is_terminal(self) -> bool {
        self != Self::Active
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Active => "active",
            Self::PickedUp => "picked-up",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug)]
struct ReservationData {
    id: ReservationId,
    user: UserId,
    bicycle: BicycleId,
    /// Station the bicycle was at when reserved; pickup happens here.
    station: StationId,
    status: ReservationStatus,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    picked_up_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

/// A reservation row.
#[derive(Debug)]
pub struct Reservation {
    inner: Mutex<ReservationData>,
}

impl Reservation {
    pub(crate) fn new(
        id: ReservationId,
        user: UserId,
        bicycle: BicycleId,
        station: StationId,
        created_at: DateTime<Utc>,
        hold_duration: Duration,
    ) -> Self {
        Self {
            inner: Mutex::new(ReservationData {
                id,
                user,
                bicycle,
                station,
                status: ReservationStatus::Active,
                created_at,
                expires_at: created_at + hold_duration,
                picked_up_at: None,
                cancelled_at: None,
            }),
        }
    }

    pub fn status(&self) -> ReservationStatus {
        self.inner.lock().status
    }

    pub fn user(&self) -> UserId {
        self.inner.lock().user
    }

    pub fn bicycle(&self) -> BicycleId {
        self.inner.lock().bicycle
    }

    pub fn station(&self) -> StationId {
        self.inner.lock().station
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.inner.lock().expires_at
    }

    /// Advisory read: the hold window has elapsed but the authoritative
    /// expiry transition has not yet run.
    pub fn is_expiry_due(&self, now: DateTime<Utc>) -> bool {
        let data = self.inner.lock();
        data.status == ReservationStatus::Active && now >= data.expires_at
    }

    /// Seconds left on an active hold; zero once terminal or elapsed.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        let data = self.inner.lock();
        if data.status != ReservationStatus::Active {
            return Duration::zero();
        }
        (data.expires_at - now).max(Duration::zero())
    }

    /// `Active -> Cancelled`, owner only.
    pub(crate) fn cancel(&self, user: UserId, now: DateTime<Utc>) -> Result<(), RentalError> {
        let mut data = self.inner.lock();
        if data.status != ReservationStatus::Active {
            return Err(RentalError::AlreadyTerminal);
        }
        if data.user != user {
            return Err(RentalError::NotOwner);
        }
        data.status = ReservationStatus::Cancelled;
        data.cancelled_at = Some(now);
        Ok(())
    }

    /// `Active -> Expired`. The single place where "expired" is recorded.
    pub(crate) fn expire(&self) -> Result<(), RentalError> {
        let mut data = self.inner.lock();
        if data.status != ReservationStatus::Active {
            return Err(RentalError::AlreadyTerminal);
        }
        data.status = ReservationStatus::Expired;
        Ok(())
    }

    /// `Active -> PickedUp`, owner only, rejected once the hold window has
    /// elapsed. On [`RentalError::ReservationExpired`] the row stays
    /// `Active` so the caller can drive the expire transition.
    pub(crate) fn pick_up(&self, user: UserId, now: DateTime<Utc>) -> Result<(), RentalError> {
        let mut data = self.inner.lock();
        if data.status != ReservationStatus::Active {
            return Err(RentalError::AlreadyTerminal);
        }
        if data.user != user {
            return Err(RentalError::NotOwner);
        }
        if now >= data.expires_at {
            return Err(RentalError::ReservationExpired);
        }
        data.status = ReservationStatus::PickedUp;
        data.picked_up_at = Some(now);
        Ok(())
    }

    pub fn snapshot(&self) -> ReservationSnapshot {
        let data = self.inner.lock();
        ReservationSnapshot {
            id: data.id,
            user: data.user,
            bicycle: data.bicycle,
            station: data.station,
            status: data.status,
            created_at: data.created_at,
            expires_at: data.expires_at,
            picked_up_at: data.picked_up_at,
            cancelled_at: data.cancelled_at,
        }
    }
}

/// Point-in-time view of a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationSnapshot {
    pub id: ReservationId,
    pub user: UserId,
    pub bicycle: BicycleId,
    pub station: StationId,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}
