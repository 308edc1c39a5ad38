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

//! Reservation/rental lifecycle engine.
//!
//! The [`Engine`] is the central component that drives bicycles, reservation
//! holds, and rentals through their chained state machines:
//!
//! - **Reserve**: soft-lock an available bicycle for one user for the hold
//!   window (30 minutes by default).
//! - **Promote**: convert an active reservation into a rental at pickup.
//! - **Complete**: return the bicycle, settle the cost (with late fees
//!   beyond the overdue threshold), and post penalties for late returns.
//! - **Cancel / expire**: release the bicycle without cost.
//!
//! # Consistency
//!
//! The bicycle `status` field is the single point of contention and is only
//! ever written through the registry's compare-and-set. Reservation and
//! rental rows guard their own status word under a mutex; that word is the
//! commit point of every transition, so of two racing operations on the
//! same row exactly one succeeds and the loser gets a normal rejection,
//! never a raw conflict.
//!
//! Per-user uniqueness (at most one active reservation and one active
//! rental) is enforced with atomic check-and-insert on index maps.
//!
//! # Notifications
//!
//! Sink dispatch happens after a transition commits and is best-effort:
//! failures are logged at `warn` and swallowed.

use crate::base::{BicycleId, RentalId, ReservationId, StationId, UserId};
use crate::bicycle::{BicycleStatus, Registry};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{NotifyError, RentalError};
use crate::notify::{NotificationSink, NullSink};
use crate::penalty::PenaltyLedger;
use crate::rental::{Rental, RentalSnapshot};
use crate::reservation::{Reservation, ReservationSnapshot};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters produced by one sweeper pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    /// Reservations driven through the expire transition.
    pub expired_reservations: usize,
    /// Overdue rentals reminded about for the first time.
    pub overdue_rentals: usize,
}

/// Lifecycle engine over the bicycle fleet.
///
/// # Invariants
///
/// - A bicycle has at most one outstanding reservation or rental, never
///   both, and its status matches that fact exactly.
/// - A user has at most one active reservation and one active rental.
/// - Terminal reservation/rental rows never mutate again.
/// - `total_cost` is always `hourly_rate × duration_hours + late_fee +
///   damage_fee` for completed rentals.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn NotificationSink>,
    registry: Registry,
    ledger: PenaltyLedger,
    /// Reservation rows indexed by id.
    reservations: DashMap<ReservationId, Reservation>,
    /// Rental rows indexed by id.
    rentals: DashMap<RentalId, Rental>,
    /// Active-hold uniqueness index, one entry per holding user.
    active_reservation_by_user: DashMap<UserId, ReservationId>,
    /// Active-rental uniqueness index, one entry per riding user.
    active_rental_by_user: DashMap<UserId, RentalId>,
    next_reservation_id: AtomicU64,
    next_rental_id: AtomicU64,
}

impl Engine {
    /// Creates an engine with default policy, the system clock, and no
    /// notification delivery.
    pub fn new() -> Self {
        Self::with_parts(
            EngineConfig::default(),
            Arc::new(SystemClock),
            Arc::new(NullSink),
        )
    }

    /// Creates an engine with explicit policy, clock, and sink.
    pub fn with_parts(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Engine {
            config,
            clock,
            sink,
            registry: Registry::new(),
            ledger: PenaltyLedger::new(),
            reservations: DashMap::new(),
            rentals: DashMap::new(),
            active_reservation_by_user: DashMap::new(),
            active_rental_by_user: DashMap::new(),
            next_reservation_id: AtomicU64::new(1),
            next_rental_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn ledger(&self) -> &PenaltyLedger {
        &self.ledger
    }

    /// Places a hold on `bicycle` for `user`.
    ///
    /// # Errors
    ///
    /// - [`RentalError::NotEligible`] - eligibility gate failed (unverified,
    ///   suspended, too many penalties, or an active rental).
    /// - [`RentalError::AlreadyReserved`] - user already holds a bicycle.
    /// - [`RentalError::BicycleUnavailable`] - bicycle not available, or a
    ///   concurrent caller won the race for it.
    /// - [`RentalError::BicycleNotFound`] - unknown bicycle.
    pub fn reserve(
        &self,
        user: UserId,
        bicycle: BicycleId,
    ) -> Result<ReservationSnapshot, RentalError> {
        let now = self.clock.now();
        if !self.ledger.is_eligible_to_rent(user) || self.active_rental_by_user.contains_key(&user)
        {
            return Err(RentalError::NotEligible);
        }

        // Atomic check-and-insert: losing this entry race means the user
        // reserved on another worker.
        let snapshot = match self.active_reservation_by_user.entry(user) {
            Entry::Occupied(_) => return Err(RentalError::AlreadyReserved),
            Entry::Vacant(entry) => {
                // The registry compare-and-set decides the bicycle race:
                // exactly one of two concurrent reserves sees Available.
                match self.registry.try_transition(
                    bicycle,
                    BicycleStatus::Available,
                    BicycleStatus::Reserved,
                ) {
                    Ok(()) => {}
                    Err(RentalError::BicycleNotFound) => return Err(RentalError::BicycleNotFound),
                    Err(_) => return Err(RentalError::BicycleUnavailable),
                }

                let station = self.registry.current_station(bicycle)?;
                let id = ReservationId(self.next_reservation_id.fetch_add(1, Ordering::Relaxed));
                let reservation = Reservation::new(
                    id,
                    user,
                    bicycle,
                    station,
                    now,
                    self.config.hold_duration,
                );
                let snapshot = reservation.snapshot();
                self.reservations.insert(id, reservation);
                entry.insert(id);
                snapshot
            }
        };

        self.dispatch("reservation_created", self.sink.reservation_created(&snapshot));
        Ok(snapshot)
    }

    /// Cancels an active reservation owned by `user` and releases the
    /// bicycle.
    ///
    /// # Errors
    ///
    /// - [`RentalError::ReservationNotFound`] - unknown reservation.
    /// - [`RentalError::AlreadyTerminal`] - reservation is no longer active;
    ///   re-cancelling is rejected, not silently accepted.
    /// - [`RentalError::NotOwner`] - caller does not own the reservation.
    pub fn cancel_reservation(
        &self,
        id: ReservationId,
        user: UserId,
    ) -> Result<ReservationSnapshot, RentalError> {
        let now = self.clock.now();
        let reservation = self
            .reservations
            .get(&id)
            .ok_or(RentalError::ReservationNotFound)?;
        reservation.cancel(user, now)?;
        let bicycle = reservation.bicycle();
        let snapshot = reservation.snapshot();
        drop(reservation);

        self.release_bicycle(bicycle, BicycleStatus::Reserved);
        self.active_reservation_by_user
            .remove_if(&user, |_, held| *held == id);
        Ok(snapshot)
    }

    /// Drives an active reservation through the authoritative expire
    /// transition and releases the bicycle.
    ///
    /// This is the only place "expired" is recorded; a reservation past its
    /// window but not yet expired here still occupies the bicycle.
    ///
    /// # Errors
    ///
    /// - [`RentalError::ReservationNotFound`] - unknown reservation.
    /// - [`RentalError::AlreadyTerminal`] - lost the race to a concurrent
    ///   promote/cancel/expire; the winner already settled the row.
    pub fn expire_reservation(&self, id: ReservationId) -> Result<(), RentalError> {
        let reservation = self
            .reservations
            .get(&id)
            .ok_or(RentalError::ReservationNotFound)?;
        reservation.expire()?;
        let user = reservation.user();
        let bicycle = reservation.bicycle();
        drop(reservation);

        self.release_bicycle(bicycle, BicycleStatus::Reserved);
        self.active_reservation_by_user
            .remove_if(&user, |_, held| *held == id);
        Ok(())
    }

    /// Converts an active reservation into a rental at pickup time.
    ///
    /// The rental copies the bicycle's hourly rate at this instant; later
    /// rate changes never reprice it.
    ///
    /// # Errors
    ///
    /// - [`RentalError::ReservationExpired`] - hold window elapsed; the
    ///   reservation is expired internally before rejecting.
    /// - [`RentalError::NotOwner`] - caller does not own the reservation.
    /// - [`RentalError::AlreadyTerminal`] - reservation already settled.
    /// - [`RentalError::ReservationNotFound`] - unknown reservation.
    pub fn promote(
        &self,
        id: ReservationId,
        user: UserId,
    ) -> Result<RentalSnapshot, RentalError> {
        let now = self.clock.now();
        let reservation = self
            .reservations
            .get(&id)
            .ok_or(RentalError::ReservationNotFound)?;

        match reservation.pick_up(user, now) {
            Ok(()) => {}
            Err(RentalError::ReservationExpired) => {
                let owner = reservation.user();
                let bicycle = reservation.bicycle();
                // Lazy expiry: make it durable before rejecting. A racing
                // sweeper may have won; either way exactly one release runs.
                if reservation.expire().is_ok() {
                    drop(reservation);
                    self.release_bicycle(bicycle, BicycleStatus::Reserved);
                    self.active_reservation_by_user
                        .remove_if(&owner, |_, held| *held == id);
                }
                return Err(RentalError::ReservationExpired);
            }
            Err(error) => return Err(error),
        }

        let bicycle = reservation.bicycle();
        let station = reservation.station();
        drop(reservation);

        // The reservation is PickedUp, so no other transition touches this
        // bicycle's Reserved status anymore.
        if let Err(error) =
            self.registry
                .try_transition(bicycle, BicycleStatus::Reserved, BicycleStatus::InUse)
        {
            tracing::warn!(%bicycle, %error, "pickup status transition skipped");
        }

        let hourly_rate = self.registry.hourly_rate(bicycle)?;
        let rental_id = RentalId(self.next_rental_id.fetch_add(1, Ordering::Relaxed));
        let rental = Rental::new(
            rental_id,
            user,
            bicycle,
            Some(id),
            station,
            hourly_rate,
            String::new(),
            now,
        );
        let snapshot = rental.snapshot();
        self.rentals.insert(rental_id, rental);
        self.active_rental_by_user.insert(user, rental_id);
        self.active_reservation_by_user
            .remove_if(&user, |_, held| *held == id);

        self.dispatch("rental_started", self.sink.rental_started(&snapshot));
        Ok(snapshot)
    }

    /// Live cost estimate for an active rental. Pure and side-effect free.
    ///
    /// # Errors
    ///
    /// - [`RentalError::RentalNotFound`] - unknown rental.
    /// - [`RentalError::AlreadyTerminal`] - rental already settled; read
    ///   `total_cost` from its snapshot instead.
    pub fn current_cost(&self, id: RentalId) -> Result<Decimal, RentalError> {
        let rental = self.rentals.get(&id).ok_or(RentalError::RentalNotFound)?;
        rental.current_cost(self.clock.now())
    }

    /// Completes an active rental: settles the cost, returns the bicycle to
    /// `return_station`, bumps fleet counters, and posts a penalty if the
    /// return was late.
    ///
    /// # Errors
    ///
    /// - [`RentalError::RentalNotFound`] - unknown rental.
    /// - [`RentalError::AlreadyTerminal`] - rental already settled.
    /// - [`RentalError::InvalidAmount`] - negative distance or damage fee.
    pub fn complete_rental(
        &self,
        id: RentalId,
        return_station: StationId,
        return_notes: &str,
        distance_km: Decimal,
        damage_fee: Decimal,
    ) -> Result<RentalSnapshot, RentalError> {
        let now = self.clock.now();
        let rental = self.rentals.get(&id).ok_or(RentalError::RentalNotFound)?;
        let outcome = rental.complete(
            now,
            return_station,
            return_notes,
            distance_km,
            damage_fee,
            self.config.overdue_threshold_hours(),
            self.config.late_fee_multiplier,
        )?;
        let snapshot = rental.snapshot();
        drop(rental);

        if let Err(error) =
            self.registry
                .try_transition(outcome.bicycle, BicycleStatus::InUse, BicycleStatus::Available)
        {
            tracing::warn!(bicycle = %outcome.bicycle, %error, "return status transition skipped");
        }
        self.registry.set_station(outcome.bicycle, outcome.return_station)?;
        self.registry.increment_rental_count(outcome.bicycle)?;
        self.registry.add_distance(outcome.bicycle, outcome.distance_km)?;
        self.active_rental_by_user
            .remove_if(&outcome.user, |_, riding| *riding == id);

        if outcome.overdue {
            let reason = format!("Late return of rental #{id}");
            self.ledger.add(outcome.user, &reason, now);
        }

        self.dispatch("rental_completed", self.sink.rental_completed(&snapshot));
        Ok(snapshot)
    }

    /// Cancels an active rental without computing cost: no fees, no rental
    /// count, no station change.
    ///
    /// # Errors
    ///
    /// - [`RentalError::RentalNotFound`] - unknown rental.
    /// - [`RentalError::AlreadyTerminal`] - rental already settled.
    pub fn cancel_rental(&self, id: RentalId) -> Result<RentalSnapshot, RentalError> {
        let now = self.clock.now();
        let rental = self.rentals.get(&id).ok_or(RentalError::RentalNotFound)?;
        rental.cancel(now)?;
        let user = rental.user();
        let bicycle = rental.bicycle();
        let snapshot = rental.snapshot();
        drop(rental);

        self.release_bicycle(bicycle, BicycleStatus::InUse);
        self.active_rental_by_user
            .remove_if(&user, |_, riding| *riding == id);
        Ok(snapshot)
    }

    /// One sweeper pass: expire every reservation past its window and
    /// remind (once) about each overdue rental. Rentals are never forced
    /// through a return; overdue is a derived flag only.
    pub fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        let due: Vec<ReservationId> = self
            .reservations
            .iter()
            .filter(|row| row.is_expiry_due(now))
            .map(|row| *row.key())
            .collect();
        for id in due {
            match self.expire_reservation(id) {
                Ok(()) => report.expired_reservations += 1,
                // A promote or cancel won in between; nothing to do.
                Err(RentalError::AlreadyTerminal) | Err(RentalError::ReservationNotFound) => {}
                Err(error) => {
                    tracing::warn!(reservation = %id, %error, "expiry sweep skipped a hold")
                }
            }
        }

        let threshold = self.config.overdue_threshold_hours();
        let newly_overdue: Vec<RentalId> = self
            .rentals
            .iter()
            .filter(|row| row.note_overdue(now, threshold))
            .map(|row| *row.key())
            .collect();
        for id in newly_overdue {
            if let Some(rental) = self.rentals.get(&id) {
                let snapshot = rental.snapshot();
                drop(rental);
                self.dispatch("rental_overdue", self.sink.rental_overdue(&snapshot));
                report.overdue_rentals += 1;
            }
        }

        report
    }

    pub fn reservation(&self, id: ReservationId) -> Option<ReservationSnapshot> {
        self.reservations.get(&id).map(|row| row.snapshot())
    }

    pub fn rental(&self, id: RentalId) -> Option<RentalSnapshot> {
        self.rentals.get(&id).map(|row| row.snapshot())
    }

    /// The reservation currently held by `user`, if any.
    pub fn active_reservation_for(&self, user: UserId) -> Option<ReservationSnapshot> {
        let id = *self.active_reservation_by_user.get(&user)?;
        self.reservation(id)
    }

    /// The rental `user` is currently riding, if any.
    pub fn active_rental_for(&self, user: UserId) -> Option<RentalSnapshot> {
        let id = *self.active_rental_by_user.get(&user)?;
        self.rental(id)
    }

    /// Releases a bicycle back to Available from `from`.
    ///
    /// The row status word is the commit point, so only the transition
    /// winner ever calls this for a given hold/rental; a conflict here
    /// means an administrative action raced us and is logged, not fatal.
    fn release_bicycle(&self, bicycle: BicycleId, from: BicycleStatus) {
        if let Err(error) = self
            .registry
            .try_transition(bicycle, from, BicycleStatus::Available)
        {
            tracing::warn!(%bicycle, %error, "bicycle release skipped");
        }
    }

    fn dispatch(&self, event: &'static str, result: Result<(), NotifyError>) {
        if let Err(error) = result {
            tracing::warn!(event, %error, "notification dropped");
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
