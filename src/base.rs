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

//! Core identifier types for users, bicycles, stations, and lifecycle rows.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type! {
    /// Unique identifier for a user.
    ///
    /// Users are owned by the identity collaborator; the engine only ever
    /// references them by id.
    UserId
}

id_type! {
    /// Unique identifier for a bicycle in the fleet registry.
    BicycleId
}

id_type! {
    /// Unique identifier for a station.
    ///
    /// Stations themselves (capacity, location) are external; the engine
    /// tracks them only as the bicycle's current location pointer.
    StationId
}

id_type! {
    /// Unique identifier for a reservation hold.
    ReservationId
}

id_type! {
    /// Unique identifier for a rental.
    RentalId
}

id_type! {
    /// Unique identifier for a penalty record.
    PenaltyId
}
