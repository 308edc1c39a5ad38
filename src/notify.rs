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

//! Notification sink.
//!
//! Best-effort, fire-and-forget. The engine dispatches these after a
//! transition commits; a failing sink is logged and swallowed, never
//! unwinding the transition.

use crate::error::NotifyError;
use crate::rental::RentalSnapshot;
use crate::reservation::ReservationSnapshot;
use std::fmt;

/// Receiver of lifecycle events (email, push, webhook...).
///
/// Ordering across events is not guaranteed.
pub trait NotificationSink: Send + Sync + fmt::Debug {
    fn reservation_created(&self, reservation: &ReservationSnapshot) -> Result<(), NotifyError>;
    fn rental_started(&self, rental: &RentalSnapshot) -> Result<(), NotifyError>;
    fn rental_completed(&self, rental: &RentalSnapshot) -> Result<(), NotifyError>;
    fn rental_overdue(&self, rental: &RentalSnapshot) -> Result<(), NotifyError>;
}

/// Sink that drops every event. The default when no delivery channel is
/// wired up.
#[derive(Debug, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn reservation_created(&self, _reservation: &ReservationSnapshot) -> Result<(), NotifyError> {
        Ok(())
    }

    fn rental_started(&self, _rental: &RentalSnapshot) -> Result<(), NotifyError> {
        Ok(())
    }

    fn rental_completed(&self, _rental: &RentalSnapshot) -> Result<(), NotifyError> {
        Ok(())
    }

    fn rental_overdue(&self, _rental: &RentalSnapshot) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Sink that logs events through `tracing`.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn reservation_created(&self, reservation: &ReservationSnapshot) -> Result<(), NotifyError> {
        tracing::info!(
            reservation = %reservation.id,
            user = %reservation.user,
            bicycle = %reservation.bicycle,
            expires_at = %reservation.expires_at,
            "reservation created"
        );
        Ok(())
    }

    fn rental_started(&self, rental: &RentalSnapshot) -> Result<(), NotifyError> {
        tracing::info!(
            rental = %rental.id,
            user = %rental.user,
            bicycle = %rental.bicycle,
            hourly_rate = %rental.hourly_rate,
            "rental started"
        );
        Ok(())
    }

    fn rental_completed(&self, rental: &RentalSnapshot) -> Result<(), NotifyError> {
        tracing::info!(
            rental = %rental.id,
            user = %rental.user,
            total_cost = %rental.total_cost,
            late_fee = %rental.late_fee,
            "rental completed"
        );
        Ok(())
    }

    fn rental_overdue(&self, rental: &RentalSnapshot) -> Result<(), NotifyError> {
        tracing::warn!(
            rental = %rental.id,
            user = %rental.user,
            started = %rental.start_time,
            "rental overdue"
        );
        Ok(())
    }
}
