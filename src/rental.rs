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

//! Rentals and cost accrual.
//!
//! A rental is the active usage period between pickup and return. State
//! machine:
//!
//! `Active -> Completed | Cancelled`
//!
//! Duration is exact elapsed seconds divided by 3600, never truncated to
//! whole hours. The cost formula is deterministic over
//! `(start_time, end_time, hourly_rate, damage_fee)`:
//!
//! ```text
//! late_fee   = hourly_rate × max(0, hours − threshold) × multiplier
//! total_cost = hourly_rate × hours + late_fee + damage_fee
//! ```
//!
//! `hourly_rate` is copied from the bicycle at creation; later rate changes
//! never reprice an in-flight or historical rental.

use crate::RentalError;
use crate::base::{BicycleId, RentalId, ReservationId, StationId, UserId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Currency values are kept at two fractional digits.
const MONEY_PRECISION: u32 = 2;

/// Rental lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RentalStatus {
    Active,
    Completed,
    Cancelled,
}

impl RentalStatus {
    pub fn is_terminal(self) -> bool {
        self != Self::Active
    }
}

impl fmt::Display for RentalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{label}")
    }
}

/// Elapsed time between `start` and `end` in decimal hours.
pub(crate) fn duration_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> Decimal {
    Decimal::from((end - start).num_seconds().max(0)) / dec!(3600)
}

/// Overtime surcharge for hours beyond the threshold.
pub(crate) fn late_fee(
    hourly_rate: Decimal,
    hours: Decimal,
    threshold_hours: Decimal,
    multiplier: Decimal,
) -> Decimal {
    if hours > threshold_hours {
        hourly_rate * (hours - threshold_hours) * multiplier
    } else {
        Decimal::ZERO
    }
}

#[derive(Debug)]
struct RentalData {
    id: RentalId,
    user: UserId,
    bicycle: BicycleId,
    reservation: Option<ReservationId>,
    pickup_station: StationId,
    return_station: Option<StationId>,
    status: RentalStatus,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    /// Rate at time of rental.
    hourly_rate: Decimal,
    late_fee: Decimal,
    damage_fee: Decimal,
    total_cost: Decimal,
    pickup_notes: String,
    return_notes: String,
    distance_km: Decimal,
    /// Latch so the sweeper reminds about an overdue rental once.
    overdue_notified: bool,
}

impl RentalData {
    fn assert_invariants(&self) {
        debug_assert!(
            self.late_fee >= Decimal::ZERO && self.damage_fee >= Decimal::ZERO,
            "Invariant violated: negative fee on rental {}",
            self.id
        );
        debug_assert!(
            self.total_cost >= Decimal::ZERO,
            "Invariant violated: negative total cost on rental {}",
            self.id
        );
    }
}

/// Outcome of a completed return, consumed by the engine to drive the
/// registry updates and penalty posting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompletionOutcome {
    pub user: UserId,
    pub bicycle: BicycleId,
    pub return_station: StationId,
    pub distance_km: Decimal,
    pub total_cost: Decimal,
    pub overdue: bool,
}

/// A rental row.
#[derive(Debug)]
pub struct Rental {
    inner: Mutex<RentalData>,
}

impl Rental {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: RentalId,
        user: UserId,
        bicycle: BicycleId,
        reservation: Option<ReservationId>,
        pickup_station: StationId,
        hourly_rate: Decimal,
        pickup_notes: String,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            inner: Mutex::new(RentalData {
                id,
                user,
                bicycle,
                reservation,
                pickup_station,
                return_station: None,
                status: RentalStatus::Active,
                start_time,
                end_time: None,
                hourly_rate,
                late_fee: Decimal::ZERO,
                damage_fee: Decimal::ZERO,
                total_cost: Decimal::ZERO,
                pickup_notes,
                return_notes: String::new(),
                distance_km: Decimal::ZERO,
                overdue_notified: false,
            }),
        }
    }

    pub fn status(&self) -> RentalStatus {
        self.inner.lock().status
    }

    pub fn user(&self) -> UserId {
        self.inner.lock().user
    }

    pub fn bicycle(&self) -> BicycleId {
        self.inner.lock().bicycle
    }

    pub fn hourly_rate(&self) -> Decimal {
        self.inner.lock().hourly_rate
    }

    /// Live cost estimate for an active rental: rate times elapsed hours,
    /// no late fee (that only finalizes at return). Side-effect free.
    pub fn current_cost(&self, now: DateTime<Utc>) -> Result<Decimal, RentalError> {
        let data = self.inner.lock();
        if data.status != RentalStatus::Active {
            return Err(RentalError::AlreadyTerminal);
        }
        let hours = duration_hours(data.start_time, now);
        Ok((data.hourly_rate * hours).round_dp(MONEY_PRECISION))
    }

    /// Derived flag: active beyond the overdue threshold. Never stored.
    pub fn is_overdue(&self, now: DateTime<Utc>, threshold_hours: Decimal) -> bool {
        let data = self.inner.lock();
        data.status == RentalStatus::Active
            && duration_hours(data.start_time, now) > threshold_hours
    }

    /// `Active -> Completed`: records the return, fixes `end_time`, and
    /// settles the deterministic cost formula.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn complete(
        &self,
        now: DateTime<Utc>,
        return_station: StationId,
        return_notes: &str,
        distance_km: Decimal,
        damage_fee: Decimal,
        threshold_hours: Decimal,
        late_fee_multiplier: Decimal,
    ) -> Result<CompletionOutcome, RentalError> {
        if distance_km < Decimal::ZERO || damage_fee < Decimal::ZERO {
            return Err(RentalError::InvalidAmount);
        }
        let mut data = self.inner.lock();
        if data.status != RentalStatus::Active {
            return Err(RentalError::AlreadyTerminal);
        }

        let hours = duration_hours(data.start_time, now);
        data.end_time = Some(now);
        data.return_station = Some(return_station);
        data.return_notes = return_notes.to_owned();
        data.distance_km = distance_km;
        data.damage_fee = damage_fee;
        data.late_fee = late_fee(data.hourly_rate, hours, threshold_hours, late_fee_multiplier)
            .round_dp(MONEY_PRECISION);
        data.total_cost = (data.hourly_rate * hours + data.late_fee + data.damage_fee)
            .round_dp(MONEY_PRECISION);
        data.status = RentalStatus::Completed;
        data.assert_invariants();

        Ok(CompletionOutcome {
            user: data.user,
            bicycle: data.bicycle,
            return_station,
            distance_km,
            total_cost: data.total_cost,
            overdue: hours > threshold_hours,
        })
    }

    /// `Active -> Cancelled`: fixes `end_time`, computes no cost.
    pub(crate) fn cancel(&self, now: DateTime<Utc>) -> Result<(), RentalError> {
        let mut data = self.inner.lock();
        if data.status != RentalStatus::Active {
            return Err(RentalError::AlreadyTerminal);
        }
        data.end_time = Some(now);
        data.status = RentalStatus::Cancelled;
        Ok(())
    }

    /// Returns true the first time an overdue rental is observed, so the
    /// sweeper emits a single reminder per rental.
    pub(crate) fn note_overdue(&self, now: DateTime<Utc>, threshold_hours: Decimal) -> bool {
        let mut data = self.inner.lock();
        if data.status != RentalStatus::Active
            || data.overdue_notified
            || duration_hours(data.start_time, now) <= threshold_hours
        {
            return false;
        }
        data.overdue_notified = true;
        true
    }

    pub fn snapshot(&self) -> RentalSnapshot {
        let data = self.inner.lock();
        RentalSnapshot {
            id: data.id,
            user: data.user,
            bicycle: data.bicycle,
            reservation: data.reservation,
            pickup_station: data.pickup_station,
            return_station: data.return_station,
            status: data.status,
            start_time: data.start_time,
            end_time: data.end_time,
            hourly_rate: data.hourly_rate,
            late_fee: data.late_fee,
            damage_fee: data.damage_fee,
            total_cost: data.total_cost,
            pickup_notes: data.pickup_notes.clone(),
            return_notes: data.return_notes.clone(),
            distance_km: data.distance_km,
        }
    }
}

/// Point-in-time view of a rental.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalSnapshot {
    pub id: RentalId,
    pub user: UserId,
    pub bicycle: BicycleId,
    pub reservation: Option<ReservationId>,
    pub pickup_station: StationId,
    pub return_station: Option<StationId>,
    pub status: RentalStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub hourly_rate: Decimal,
    pub late_fee: Decimal,
    pub damage_fee: Decimal,
    pub total_cost: Decimal,
    pub pickup_notes: String,
    pub return_notes: String,
    pub distance_km: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn rental_at(start: DateTime<Utc>) -> Rental {
        Rental::new(
            RentalId(1),
            UserId(1),
            BicycleId(1),
            Some(ReservationId(1)),
            StationId(1),
            dec!(50.00),
            String::new(),
            start,
        )
    }

    // === Cost helper tests ===

    #[test]
    fn duration_is_exact_seconds_over_3600() {
        let start = Utc::now();
        assert_eq!(
            duration_hours(start, start + Duration::minutes(90)),
            dec!(1.5)
        );
        // 25.1 hours = 90360 seconds
        assert_eq!(
            duration_hours(start, start + Duration::seconds(90_360)),
            dec!(25.1)
        );
    }

    #[test]
    fn duration_never_goes_negative() {
        let start = Utc::now();
        assert_eq!(
            duration_hours(start, start - Duration::minutes(5)),
            Decimal::ZERO
        );
    }

    #[test]
    fn no_late_fee_at_or_under_threshold() {
        assert_eq!(
            late_fee(dec!(50), dec!(24), dec!(24), dec!(0.5)),
            Decimal::ZERO
        );
        assert_eq!(
            late_fee(dec!(50), dec!(12), dec!(24), dec!(0.5)),
            Decimal::ZERO
        );
    }

    #[test]
    fn late_fee_scales_with_fractional_overtime() {
        // 25 hours: one overtime hour at half rate.
        assert_eq!(late_fee(dec!(50), dec!(25), dec!(24), dec!(0.5)), dec!(25));
        // 25.1 hours: 1.1 overtime hours, not a flat one-hour surcharge.
        assert_eq!(
            late_fee(dec!(50), dec!(25.1), dec!(24), dec!(0.5)),
            dec!(27.5)
        );
    }

    // === Rental row tests ===

    #[test]
    fn current_cost_accrues_with_elapsed_time() {
        let start = Utc::now();
        let rental = rental_at(start);
        assert_eq!(
            rental.current_cost(start + Duration::minutes(90)),
            Ok(dec!(75.00))
        );
    }

    #[test]
    fn current_cost_never_includes_late_fee() {
        let start = Utc::now();
        let rental = rental_at(start);
        // 25h at 50/h: base 1250 only; the 25 surcharge waits for return.
        assert_eq!(
            rental.current_cost(start + Duration::hours(25)),
            Ok(dec!(1250.00))
        );
    }

    #[test]
    fn current_cost_rejected_on_terminal_rental() {
        let start = Utc::now();
        let rental = rental_at(start);
        rental.cancel(start + Duration::hours(1)).unwrap();
        assert_eq!(
            rental.current_cost(start + Duration::hours(2)),
            Err(RentalError::AlreadyTerminal)
        );
    }

    #[test]
    fn complete_settles_the_cost_formula() {
        let start = Utc::now();
        let rental = rental_at(start);
        let outcome = rental
            .complete(
                start + Duration::hours(25),
                StationId(2),
                "scratched fender",
                dec!(10.0),
                dec!(5.00),
                dec!(24),
                dec!(0.5),
            )
            .unwrap();

        // late_fee = 50 × 1 × 0.5 = 25; total = 50×25 + 25 + 5 = 1280
        assert_eq!(outcome.total_cost, dec!(1280.00));
        assert!(outcome.overdue);

        let snapshot = rental.snapshot();
        assert_eq!(snapshot.status, RentalStatus::Completed);
        assert_eq!(snapshot.late_fee, dec!(25.00));
        assert_eq!(snapshot.damage_fee, dec!(5.00));
        assert_eq!(snapshot.total_cost, dec!(1280.00));
        assert_eq!(snapshot.end_time, Some(start + Duration::hours(25)));
        assert_eq!(snapshot.return_station, Some(StationId(2)));
        assert_eq!(snapshot.return_notes, "scratched fender");
    }

    #[test]
    fn complete_under_threshold_has_no_late_fee() {
        let start = Utc::now();
        let rental = rental_at(start);
        let outcome = rental
            .complete(
                start + Duration::hours(2),
                StationId(1),
                "",
                Decimal::ZERO,
                Decimal::ZERO,
                dec!(24),
                dec!(0.5),
            )
            .unwrap();
        assert_eq!(outcome.total_cost, dec!(100.00));
        assert!(!outcome.overdue);
        assert_eq!(rental.snapshot().late_fee, Decimal::ZERO);
    }

    #[test]
    fn complete_rejects_negative_inputs() {
        let start = Utc::now();
        let rental = rental_at(start);
        let result = rental.complete(
            start + Duration::hours(1),
            StationId(1),
            "",
            dec!(-1),
            Decimal::ZERO,
            dec!(24),
            dec!(0.5),
        );
        assert_eq!(result, Err(RentalError::InvalidAmount));
        assert_eq!(rental.status(), RentalStatus::Active);
    }

    #[test]
    fn complete_twice_is_rejected() {
        let start = Utc::now();
        let rental = rental_at(start);
        rental
            .complete(
                start + Duration::hours(1),
                StationId(1),
                "",
                Decimal::ZERO,
                Decimal::ZERO,
                dec!(24),
                dec!(0.5),
            )
            .unwrap();

        let again = rental.complete(
            start + Duration::hours(2),
            StationId(1),
            "",
            Decimal::ZERO,
            Decimal::ZERO,
            dec!(24),
            dec!(0.5),
        );
        assert_eq!(again, Err(RentalError::AlreadyTerminal));
    }

    #[test]
    fn cancel_computes_no_cost() {
        let start = Utc::now();
        let rental = rental_at(start);
        rental.cancel(start + Duration::hours(30)).unwrap();

        let snapshot = rental.snapshot();
        assert_eq!(snapshot.status, RentalStatus::Cancelled);
        assert_eq!(snapshot.total_cost, Decimal::ZERO);
        assert_eq!(snapshot.late_fee, Decimal::ZERO);
        assert_eq!(snapshot.end_time, Some(start + Duration::hours(30)));
    }

    #[test]
    fn overdue_is_a_derived_flag() {
        let start = Utc::now();
        let rental = rental_at(start);
        assert!(!rental.is_overdue(start + Duration::hours(24), dec!(24)));
        assert!(rental.is_overdue(start + Duration::hours(24) + Duration::seconds(1), dec!(24)));
    }

    #[test]
    fn terminal_rental_is_never_overdue() {
        let start = Utc::now();
        let rental = rental_at(start);
        rental.cancel(start + Duration::hours(30)).unwrap();
        assert!(!rental.is_overdue(start + Duration::hours(48), dec!(24)));
    }

    #[test]
    fn note_overdue_latches_once() {
        let start = Utc::now();
        let rental = rental_at(start);
        let late = start + Duration::hours(25);
        assert!(rental.note_overdue(late, dec!(24)));
        assert!(!rental.note_overdue(late, dec!(24)));
    }

    #[test]
    fn note_overdue_false_before_threshold() {
        let start = Utc::now();
        let rental = rental_at(start);
        assert!(!rental.note_overdue(start + Duration::hours(23), dec!(24)));
    }
}
