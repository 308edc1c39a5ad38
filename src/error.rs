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

//! Error types for the reservation/rental lifecycle.

use thiserror::Error;

/// Lifecycle rejection and conflict errors.
///
/// Every expected business condition is a named variant; callers match on
/// them rather than parsing messages. Store-level faults are not modeled
/// here because the engine keeps all state in process memory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RentalError {
    /// User failed the eligibility gate (unverified, suspended, penalty
    /// threshold reached, or already riding)
    #[error("user is not eligible to rent")]
    NotEligible,

    /// User already holds an active reservation
    #[error("user already has an active reservation")]
    AlreadyReserved,

    /// Bicycle is not available, or another caller won the race for it
    #[error("bicycle is not available")]
    BicycleUnavailable,

    /// Reservation hold window has elapsed
    #[error("reservation has expired")]
    ReservationExpired,

    /// Referenced bicycle does not exist
    #[error("bicycle not found")]
    BicycleNotFound,

    /// Referenced reservation does not exist
    #[error("reservation not found")]
    ReservationNotFound,

    /// Referenced rental does not exist
    #[error("rental not found")]
    RentalNotFound,

    /// Referenced penalty record does not exist
    #[error("penalty record not found")]
    PenaltyNotFound,

    /// Referenced user is not registered with the ledger
    #[error("user not found")]
    UserNotFound,

    /// Caller does not own the referenced reservation
    #[error("caller does not own this reservation")]
    NotOwner,

    /// Reservation or rental already reached a terminal status
    #[error("already in a terminal state")]
    AlreadyTerminal,

    /// Registry compare-and-set lost to a concurrent transition.
    /// Recoverable: callers re-read state and map this to a business
    /// rejection; it is never surfaced raw.
    #[error("bicycle status changed concurrently")]
    StatusConflict,

    /// Monetary amount or distance was negative
    #[error("invalid amount (must be non-negative)")]
    InvalidAmount,

    /// Penalty record was already resolved
    #[error("penalty already resolved")]
    AlreadyResolved,

    /// A bicycle with this serial number is already registered
    #[error("duplicate serial number")]
    DuplicateSerial,
}

/// Failure reported by a [`NotificationSink`](crate::NotificationSink).
///
/// Notification dispatch is best-effort: the engine logs these and never
/// propagates them into a lifecycle transition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("notification sink error: {0}")]
pub struct NotifyError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        assert_eq!(
            RentalError::NotEligible.to_string(),
            "user is not eligible to rent"
        );
        assert_eq!(
            RentalError::AlreadyReserved.to_string(),
            "user already has an active reservation"
        );
        assert_eq!(
            RentalError::BicycleUnavailable.to_string(),
            "bicycle is not available"
        );
        assert_eq!(
            RentalError::ReservationExpired.to_string(),
            "reservation has expired"
        );
        assert_eq!(
            RentalError::NotOwner.to_string(),
            "caller does not own this reservation"
        );
        assert_eq!(
            RentalError::AlreadyTerminal.to_string(),
            "already in a terminal state"
        );
        assert_eq!(
            RentalError::StatusConflict.to_string(),
            "bicycle status changed concurrently"
        );
        assert_eq!(
            RentalError::DuplicateSerial.to_string(),
            "duplicate serial number"
        );
    }

    #[test]
    fn errors_are_cloneable() {
        let error = RentalError::BicycleUnavailable;
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }

    #[test]
    fn notify_error_carries_message() {
        let error = NotifyError("smtp timeout".into());
        assert_eq!(error.to_string(), "notification sink error: smtp timeout");
    }
}
