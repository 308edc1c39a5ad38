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

//! Engine public API integration tests.

use bike_rental_rs::{
    BicycleId, BicycleStatus, Clock, Engine, EngineConfig, ManualClock, NotificationSink,
    NotifyError,
    NullSink, RentalError, RentalSnapshot, RentalStatus, ReservationSnapshot, ReservationStatus,
    StationId, UserId,
};
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use std::sync::Arc;

// === Helper Functions ===

fn setup() -> (Arc<ManualClock>, Engine, BicycleId) {
    setup_with_sink(Arc::new(NullSink))
}

fn setup_with_sink(
    sink: Arc<dyn NotificationSink>,
) -> (Arc<ManualClock>, Engine, BicycleId) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = Engine::with_parts(EngineConfig::default(), clock.clone(), sink);
    engine.ledger().register_user(UserId(1), true);
    engine.ledger().register_user(UserId(2), true);
    let bike = engine
        .registry()
        .register("MMU-0001", StationId(1), dec!(50.00))
        .unwrap();
    (clock, engine, bike)
}

/// Sink that records event names, for asserting dispatch.
#[derive(Debug, Default)]
struct RecordingSink {
    events: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn push(&self, event: &str) {
        self.events.lock().push(event.to_owned());
    }
}

impl NotificationSink for RecordingSink {
    fn reservation_created(&self, _: &ReservationSnapshot) -> Result<(), NotifyError> {
        self.push("reservation_created");
        Ok(())
    }

    fn rental_started(&self, _: &RentalSnapshot) -> Result<(), NotifyError> {
        self.push("rental_started");
        Ok(())
    }

    fn rental_completed(&self, _: &RentalSnapshot) -> Result<(), NotifyError> {
        self.push("rental_completed");
        Ok(())
    }

    fn rental_overdue(&self, _: &RentalSnapshot) -> Result<(), NotifyError> {
        self.push("rental_overdue");
        Ok(())
    }
}

/// Sink where every delivery fails, for asserting failures never unwind a
/// transition.
#[derive(Debug, Default)]
struct BrokenSink;

impl NotificationSink for BrokenSink {
    fn reservation_created(&self, _: &ReservationSnapshot) -> Result<(), NotifyError> {
        Err(NotifyError("smtp down".into()))
    }

    fn rental_started(&self, _: &RentalSnapshot) -> Result<(), NotifyError> {
        Err(NotifyError("smtp down".into()))
    }

    fn rental_completed(&self, _: &RentalSnapshot) -> Result<(), NotifyError> {
        Err(NotifyError("smtp down".into()))
    }

    fn rental_overdue(&self, _: &RentalSnapshot) -> Result<(), NotifyError> {
        Err(NotifyError("smtp down".into()))
    }
}

// === Reservation Tests ===

#[test]
fn reserve_creates_active_hold() {
    let (clock, engine, bike) = setup();
    let reservation = engine.reserve(UserId(1), bike).unwrap();

    assert_eq!(reservation.status, ReservationStatus::Active);
    assert_eq!(reservation.user, UserId(1));
    assert_eq!(reservation.bicycle, bike);
    assert_eq!(reservation.station, StationId(1));
    assert_eq!(reservation.expires_at, clock.now() + Duration::minutes(30));
    assert_eq!(engine.registry().status(bike), Ok(BicycleStatus::Reserved));
}

#[test]
fn reserve_requires_eligibility() {
    let (_clock, engine, bike) = setup();
    let result = engine.reserve(UserId(99), bike);
    assert_eq!(result, Err(RentalError::NotEligible));
    assert_eq!(engine.registry().status(bike), Ok(BicycleStatus::Available));
}

#[test]
fn reserve_rejects_unverified_user() {
    let (_clock, engine, bike) = setup();
    engine.ledger().register_user(UserId(3), false);
    assert_eq!(engine.reserve(UserId(3), bike), Err(RentalError::NotEligible));
}

#[test]
fn reserve_rejects_second_hold_for_same_user() {
    let (_clock, engine, bike) = setup();
    let other = engine
        .registry()
        .register("MMU-0002", StationId(1), dec!(40.00))
        .unwrap();

    engine.reserve(UserId(1), bike).unwrap();
    let result = engine.reserve(UserId(1), other);
    assert_eq!(result, Err(RentalError::AlreadyReserved));
    // The second bicycle was never touched.
    assert_eq!(engine.registry().status(other), Ok(BicycleStatus::Available));
}

#[test]
fn reserve_rejects_held_bicycle() {
    let (_clock, engine, bike) = setup();
    engine.reserve(UserId(1), bike).unwrap();

    let result = engine.reserve(UserId(2), bike);
    assert_eq!(result, Err(RentalError::BicycleUnavailable));
}

#[test]
fn reserve_rejects_unknown_bicycle() {
    let (_clock, engine, _bike) = setup();
    let result = engine.reserve(UserId(1), BicycleId(777));
    assert_eq!(result, Err(RentalError::BicycleNotFound));
}

#[test]
fn reserve_rejected_while_riding() {
    let (_clock, engine, bike) = setup();
    let other = engine
        .registry()
        .register("MMU-0002", StationId(1), dec!(40.00))
        .unwrap();

    let reservation = engine.reserve(UserId(1), bike).unwrap();
    engine.promote(reservation.id, UserId(1)).unwrap();

    assert_eq!(engine.reserve(UserId(1), other), Err(RentalError::NotEligible));
}

#[test]
fn cancel_restores_availability_without_penalty() {
    let (_clock, engine, bike) = setup();
    let reservation = engine.reserve(UserId(1), bike).unwrap();

    let cancelled = engine.cancel_reservation(reservation.id, UserId(1)).unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(engine.registry().status(bike), Ok(BicycleStatus::Available));
    assert_eq!(engine.ledger().penalty_count(UserId(1)), 0);
    assert!(engine.active_reservation_for(UserId(1)).is_none());
}

#[test]
fn cancel_requires_ownership() {
    let (_clock, engine, bike) = setup();
    let reservation = engine.reserve(UserId(1), bike).unwrap();

    let result = engine.cancel_reservation(reservation.id, UserId(2));
    assert_eq!(result, Err(RentalError::NotOwner));
    assert_eq!(engine.registry().status(bike), Ok(BicycleStatus::Reserved));
}

#[test]
fn recancel_is_rejected_not_silently_accepted() {
    let (_clock, engine, bike) = setup();
    let reservation = engine.reserve(UserId(1), bike).unwrap();
    engine.cancel_reservation(reservation.id, UserId(1)).unwrap();

    let result = engine.cancel_reservation(reservation.id, UserId(1));
    assert_eq!(result, Err(RentalError::AlreadyTerminal));
}

#[test]
fn cancelled_hold_frees_the_user_to_reserve_again() {
    let (_clock, engine, bike) = setup();
    let first = engine.reserve(UserId(1), bike).unwrap();
    engine.cancel_reservation(first.id, UserId(1)).unwrap();

    let second = engine.reserve(UserId(1), bike).unwrap();
    assert_eq!(second.status, ReservationStatus::Active);
}

// === Promotion Tests ===

#[test]
fn promote_within_window_starts_rental() {
    let (clock, engine, bike) = setup();
    let reservation = engine.reserve(UserId(1), bike).unwrap();
    clock.advance(Duration::minutes(29));

    let rental = engine.promote(reservation.id, UserId(1)).unwrap();
    assert_eq!(rental.status, RentalStatus::Active);
    assert_eq!(rental.user, UserId(1));
    assert_eq!(rental.reservation, Some(reservation.id));
    assert_eq!(rental.pickup_station, StationId(1));
    assert_eq!(rental.hourly_rate, dec!(50.00));
    assert_eq!(rental.start_time, clock.now());

    assert_eq!(engine.registry().status(bike), Ok(BicycleStatus::InUse));
    assert_eq!(
        engine.reservation(reservation.id).unwrap().status,
        ReservationStatus::PickedUp
    );
    assert!(engine.active_reservation_for(UserId(1)).is_none());
    assert_eq!(engine.active_rental_for(UserId(1)).unwrap().id, rental.id);
}

#[test]
fn promote_after_window_expires_the_hold() {
    let (clock, engine, bike) = setup();
    let reservation = engine.reserve(UserId(1), bike).unwrap();
    clock.advance(Duration::minutes(31));

    let result = engine.promote(reservation.id, UserId(1));
    assert_eq!(result, Err(RentalError::ReservationExpired));

    // The lazy expiry is durable: terminal row, bicycle released.
    assert_eq!(
        engine.reservation(reservation.id).unwrap().status,
        ReservationStatus::Expired
    );
    assert_eq!(engine.registry().status(bike), Ok(BicycleStatus::Available));
    assert!(engine.active_reservation_for(UserId(1)).is_none());
}

#[test]
fn promote_requires_ownership() {
    let (_clock, engine, bike) = setup();
    let reservation = engine.reserve(UserId(1), bike).unwrap();

    let result = engine.promote(reservation.id, UserId(2));
    assert_eq!(result, Err(RentalError::NotOwner));
    assert_eq!(engine.registry().status(bike), Ok(BicycleStatus::Reserved));
}

#[test]
fn promote_after_cancel_is_rejected() {
    let (_clock, engine, bike) = setup();
    let reservation = engine.reserve(UserId(1), bike).unwrap();
    engine.cancel_reservation(reservation.id, UserId(1)).unwrap();

    let result = engine.promote(reservation.id, UserId(1));
    assert_eq!(result, Err(RentalError::AlreadyTerminal));
}

#[test]
fn rate_changes_never_reprice_inflight_rentals() {
    let (clock, engine, bike) = setup();
    let reservation = engine.reserve(UserId(1), bike).unwrap();
    let rental = engine.promote(reservation.id, UserId(1)).unwrap();

    engine.registry().set_hourly_rate(bike, dec!(500.00)).unwrap();
    clock.advance(Duration::hours(1));

    assert_eq!(engine.current_cost(rental.id), Ok(dec!(50.00)));
}

// === Rental Tests ===

#[test]
fn current_cost_tracks_elapsed_time() {
    let (clock, engine, bike) = setup();
    let reservation = engine.reserve(UserId(1), bike).unwrap();
    let rental = engine.promote(reservation.id, UserId(1)).unwrap();

    clock.advance(Duration::minutes(90));
    assert_eq!(engine.current_cost(rental.id), Ok(dec!(75.00)));

    // Pure read: asking twice changes nothing.
    assert_eq!(engine.current_cost(rental.id), Ok(dec!(75.00)));
}

#[test]
fn complete_settles_cost_and_returns_bicycle() {
    let (clock, engine, bike) = setup();
    let reservation = engine.reserve(UserId(1), bike).unwrap();
    let rental = engine.promote(reservation.id, UserId(1)).unwrap();
    clock.advance(Duration::hours(2));

    let completed = engine
        .complete_rental(rental.id, StationId(2), "all good", dec!(7.5), dec!(0))
        .unwrap();

    assert_eq!(completed.status, RentalStatus::Completed);
    assert_eq!(completed.total_cost, dec!(100.00));
    assert_eq!(completed.late_fee, dec!(0));
    assert_eq!(completed.return_station, Some(StationId(2)));
    assert_eq!(completed.return_notes, "all good");
    assert_eq!(completed.end_time, Some(clock.now()));

    let fleet = engine.registry().snapshot(bike).unwrap();
    assert_eq!(fleet.status, BicycleStatus::Available);
    assert_eq!(fleet.current_station, StationId(2));
    assert_eq!(fleet.total_rentals, 1);
    assert_eq!(fleet.total_distance_km, dec!(7.5));

    assert!(engine.active_rental_for(UserId(1)).is_none());
    assert_eq!(engine.ledger().penalty_count(UserId(1)), 0);
}

#[test]
fn late_return_charges_half_rate_overtime_and_posts_penalty() {
    let (clock, engine, bike) = setup();
    let reservation = engine.reserve(UserId(1), bike).unwrap();
    let rental = engine.promote(reservation.id, UserId(1)).unwrap();
    clock.advance(Duration::hours(25));

    let completed = engine
        .complete_rental(rental.id, StationId(1), "", dec!(0), dec!(10.00))
        .unwrap();

    // late_fee = 50 × 1 × 0.5 = 25; total = 50×25 + 25 + 10
    assert_eq!(completed.late_fee, dec!(25.00));
    assert_eq!(completed.total_cost, dec!(1285.00));

    assert_eq!(engine.ledger().penalty_count(UserId(1)), 1);
    let records = engine.ledger().records_for(UserId(1));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reason, format!("Late return of rental #{}", rental.id));
}

#[test]
fn fractional_overtime_is_not_truncated() {
    let (clock, engine, bike) = setup();
    let reservation = engine.reserve(UserId(1), bike).unwrap();
    let rental = engine.promote(reservation.id, UserId(1)).unwrap();
    // 25.1 hours
    clock.advance(Duration::seconds(90_360));

    let completed = engine
        .complete_rental(rental.id, StationId(1), "", dec!(0), dec!(0))
        .unwrap();

    // 1.1 overtime hours at half of 50/h.
    assert_eq!(completed.late_fee, dec!(27.50));
    assert_eq!(completed.total_cost, dec!(1282.50));
}

#[test]
fn complete_is_cost_idempotent() {
    let (clock, engine, bike) = setup();
    let reservation = engine.reserve(UserId(1), bike).unwrap();
    let rental = engine.promote(reservation.id, UserId(1)).unwrap();
    clock.advance(Duration::hours(3));
    engine
        .complete_rental(rental.id, StationId(1), "", dec!(0), dec!(0))
        .unwrap();

    clock.advance(Duration::hours(48));
    let first = engine.rental(rental.id).unwrap().total_cost;
    let second = engine.rental(rental.id).unwrap().total_cost;
    assert_eq!(first, dec!(150.00));
    assert_eq!(first, second);
}

#[test]
fn complete_twice_is_rejected() {
    let (_clock, engine, bike) = setup();
    let reservation = engine.reserve(UserId(1), bike).unwrap();
    let rental = engine.promote(reservation.id, UserId(1)).unwrap();
    engine
        .complete_rental(rental.id, StationId(1), "", dec!(0), dec!(0))
        .unwrap();

    let again = engine.complete_rental(rental.id, StationId(2), "", dec!(0), dec!(0));
    assert_eq!(again, Err(RentalError::AlreadyTerminal));
}

#[test]
fn complete_rejects_negative_damage_fee() {
    let (_clock, engine, bike) = setup();
    let reservation = engine.reserve(UserId(1), bike).unwrap();
    let rental = engine.promote(reservation.id, UserId(1)).unwrap();

    let result = engine.complete_rental(rental.id, StationId(1), "", dec!(0), dec!(-5));
    assert_eq!(result, Err(RentalError::InvalidAmount));
    assert_eq!(engine.rental(rental.id).unwrap().status, RentalStatus::Active);
}

#[test]
fn cancel_rental_computes_nothing() {
    let (clock, engine, bike) = setup();
    let reservation = engine.reserve(UserId(1), bike).unwrap();
    let rental = engine.promote(reservation.id, UserId(1)).unwrap();
    clock.advance(Duration::hours(30));

    let cancelled = engine.cancel_rental(rental.id).unwrap();
    assert_eq!(cancelled.status, RentalStatus::Cancelled);
    assert_eq!(cancelled.late_fee, dec!(0));
    assert_eq!(cancelled.total_cost, dec!(0));
    assert_eq!(cancelled.end_time, Some(clock.now()));

    let fleet = engine.registry().snapshot(bike).unwrap();
    assert_eq!(fleet.status, BicycleStatus::Available);
    // No station change, no rental count, no penalty.
    assert_eq!(fleet.current_station, StationId(1));
    assert_eq!(fleet.total_rentals, 0);
    assert_eq!(engine.ledger().penalty_count(UserId(1)), 0);
}

// === Penalty Escalation Tests ===

#[test]
fn third_late_return_suspends_renting() {
    let (clock, engine, bike) = setup();

    for round in 1u32..=3 {
        let reservation = engine.reserve(UserId(1), bike).unwrap();
        let rental = engine.promote(reservation.id, UserId(1)).unwrap();
        clock.advance(Duration::hours(25));
        engine
            .complete_rental(rental.id, StationId(1), "", dec!(0), dec!(0))
            .unwrap();

        let standing = engine.ledger().standing(UserId(1)).unwrap();
        assert_eq!(standing.penalty_count, round);
        // Suspension lands exactly on the third event, not before.
        assert_eq!(standing.is_active_renter, round < 3);
    }

    assert_eq!(engine.reserve(UserId(1), bike), Err(RentalError::NotEligible));
}

#[test]
fn reinstated_user_can_reserve_again() {
    let (clock, engine, bike) = setup();
    for _ in 0..3 {
        let reservation = engine.reserve(UserId(1), bike).unwrap();
        let rental = engine.promote(reservation.id, UserId(1)).unwrap();
        clock.advance(Duration::hours(25));
        engine
            .complete_rental(rental.id, StationId(1), "", dec!(0), dec!(0))
            .unwrap();
    }
    assert_eq!(engine.reserve(UserId(1), bike), Err(RentalError::NotEligible));

    engine.ledger().reinstate(UserId(1)).unwrap();
    assert!(engine.reserve(UserId(1), bike).is_ok());
}

// === Notification Tests ===

#[test]
fn lifecycle_events_reach_the_sink() {
    let sink = Arc::new(RecordingSink::default());
    let (clock, engine, bike) = setup_with_sink(sink.clone());

    let reservation = engine.reserve(UserId(1), bike).unwrap();
    let rental = engine.promote(reservation.id, UserId(1)).unwrap();
    clock.advance(Duration::hours(25));
    engine.sweep();
    engine
        .complete_rental(rental.id, StationId(1), "", dec!(0), dec!(0))
        .unwrap();

    assert_eq!(
        sink.events(),
        vec![
            "reservation_created",
            "rental_started",
            "rental_overdue",
            "rental_completed"
        ]
    );
}

#[test]
fn sink_failures_never_unwind_transitions() {
    let (clock, engine, bike) = setup_with_sink(Arc::new(BrokenSink));

    let reservation = engine.reserve(UserId(1), bike).unwrap();
    let rental = engine.promote(reservation.id, UserId(1)).unwrap();
    clock.advance(Duration::hours(1));
    let completed = engine
        .complete_rental(rental.id, StationId(2), "", dec!(0), dec!(0))
        .unwrap();

    assert_eq!(completed.status, RentalStatus::Completed);
    assert_eq!(engine.registry().status(bike), Ok(BicycleStatus::Available));
}

// === Consistency Tests ===

#[test]
fn expiry_is_never_implied_by_the_clock_alone() {
    let (clock, engine, bike) = setup();
    let reservation = engine.reserve(UserId(1), bike).unwrap();
    clock.advance(Duration::hours(2));

    // Past the window, but nothing has driven the expire transition yet:
    // the bicycle stays locked and the row stays active.
    assert_eq!(
        engine.reservation(reservation.id).unwrap().status,
        ReservationStatus::Active
    );
    assert_eq!(engine.registry().status(bike), Ok(BicycleStatus::Reserved));

    let report = engine.sweep();
    assert_eq!(report.expired_reservations, 1);
    assert_eq!(
        engine.reservation(reservation.id).unwrap().status,
        ReservationStatus::Expired
    );
    assert_eq!(engine.registry().status(bike), Ok(BicycleStatus::Available));
}

#[test]
fn one_outstanding_hold_or_rental_per_bicycle() {
    let (_clock, engine, bike) = setup();
    let reservation = engine.reserve(UserId(1), bike).unwrap();

    // While reserved: nobody else can reserve.
    assert_eq!(engine.reserve(UserId(2), bike), Err(RentalError::BicycleUnavailable));

    engine.promote(reservation.id, UserId(1)).unwrap();
    // While in use: still nobody.
    assert_eq!(engine.reserve(UserId(2), bike), Err(RentalError::BicycleUnavailable));
}
