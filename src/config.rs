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

//! Engine configuration.
//!
//! All timing and pricing policy lives here as explicit named parameters
//! passed to the engine and sweeper at construction.

use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Tunable policy for the reservation/rental lifecycle.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a reservation holds a bicycle before it forfeits it.
    pub hold_duration: Duration,

    /// Rental duration after which late fees accrue and the rental is
    /// flagged overdue.
    pub overdue_threshold: Duration,

    /// Fraction of the hourly rate charged per overtime hour.
    pub late_fee_multiplier: Decimal,

    /// Pause between sweeper runs.
    pub sweep_interval: std::time::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hold_duration: Duration::minutes(30),
            overdue_threshold: Duration::hours(24),
            late_fee_multiplier: dec!(0.5),
            sweep_interval: std::time::Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// Overdue threshold expressed in decimal hours, the unit the cost
    /// formula works in.
    pub fn overdue_threshold_hours(&self) -> Decimal {
        Decimal::from(self.overdue_threshold.num_seconds()) / dec!(3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let config = EngineConfig::default();
        assert_eq!(config.hold_duration, Duration::minutes(30));
        assert_eq!(config.overdue_threshold, Duration::hours(24));
        assert_eq!(config.late_fee_multiplier, dec!(0.5));
        assert_eq!(config.sweep_interval.as_secs(), 60);
    }

    #[test]
    fn threshold_converts_to_hours() {
        let config = EngineConfig::default();
        assert_eq!(config.overdue_threshold_hours(), dec!(24));

        let short = EngineConfig {
            overdue_threshold: Duration::minutes(90),
            ..EngineConfig::default()
        };
        assert_eq!(short.overdue_threshold_hours(), dec!(1.5));
    }
}
