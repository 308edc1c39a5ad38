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

//! # Bike Rental Engine
//!
//! This library provides the lifecycle engine of a shared bicycle fleet:
//! time-boxed reservation holds, rentals with cost accrual and late fees,
//! and account-level penalties, kept consistent under concurrent access.
//!
//! ## Core Components
//!
//! - [`Engine`]: Central coordinator for reservations, rentals, and returns
//! - [`Registry`]: Fleet registry with atomic bicycle status transitions
//! - [`PenaltyLedger`]: Penalty records and user standing counters
//! - [`Sweeper`]: Background task expiring abandoned holds
//! - [`RentalError`]: Named rejection for every expected business condition
//!
//! ## Example
//!
//! ```
//! use bike_rental_rs::{Engine, StationId, UserId};
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::new();
//! engine.ledger().register_user(UserId(1), true);
//! let bike = engine
//!     .registry()
//!     .register("MMU-0001", StationId(1), dec!(50.00))
//!     .unwrap();
//!
//! // Hold the bicycle, then pick it up.
//! let reservation = engine.reserve(UserId(1), bike).unwrap();
//! let rental = engine.promote(reservation.id, UserId(1)).unwrap();
//! assert_eq!(rental.hourly_rate, dec!(50.00));
//! ```
//!
//! ## Thread Safety
//!
//! All operations take `&self` and are safe to call from any number of
//! request-handling workers; the bicycle status word is the single point of
//! contention and only ever moves through the registry's compare-and-set.

pub mod base;
pub mod bicycle;
pub mod clock;
pub mod config;
mod engine;
pub mod error;
pub mod notify;
pub mod penalty;
mod rental;
mod reservation;
mod sweeper;

pub use base::{BicycleId, PenaltyId, RentalId, ReservationId, StationId, UserId};
pub use bicycle::{BicycleSnapshot, BicycleStatus, Registry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{Engine, SweepReport};
pub use error::{NotifyError, RentalError};
pub use notify::{LogSink, NotificationSink, NullSink};
pub use penalty::{PenaltyLedger, PenaltySnapshot, StandingSnapshot, SUSPENSION_THRESHOLD};
pub use rental::{Rental, RentalSnapshot, RentalStatus};
pub use reservation::{Reservation, ReservationSnapshot, ReservationStatus};
pub use sweeper::Sweeper;
