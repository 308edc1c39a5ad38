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

use bike_rental_rs::{
    BicycleId, Engine, EngineConfig, LogSink, ManualClock, RentalError, StationId, UserId,
};
use chrono::{Duration, Utc};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// Bike Rental Engine - Replay rental scenario CSV files
///
/// Reads a scenario from a CSV file, replays it against the lifecycle
/// engine on a simulated clock, and outputs the final fleet state to
/// stdout.
#[derive(Parser, Debug)]
#[command(name = "bike-rental-rs")]
#[command(about = "Replays bicycle rental scenarios from CSV", long_about = None)]
struct Args {
    /// Path to CSV file with the scenario
    ///
    /// Expected format: op,at,user,bicycle,station,amount,distance,note
    /// The `at` column is the minutes offset from scenario start and
    /// drives the simulated clock.
    #[arg(value_name = "FILE")]
    input: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let engine = match run_scenario(BufReader::new(file)) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error replaying scenario: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = write_fleet(&engine, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the scenario format.
///
/// Fields: `op, at, user, bicycle, station, amount, distance, note`
#[derive(Debug, Deserialize)]
struct ScenarioRecord {
    op: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    at: Option<i64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    user: Option<u64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    bicycle: Option<u64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    station: Option<u64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    distance: Option<Decimal>,
    #[serde(default)]
    note: Option<String>,
}

/// A parsed scenario step.
#[derive(Debug)]
enum ScenarioOp {
    AddBicycle {
        serial: String,
        station: StationId,
        hourly_rate: Decimal,
    },
    RegisterUser {
        user: UserId,
    },
    Reserve {
        user: UserId,
        bicycle: BicycleId,
    },
    CancelReservation {
        user: UserId,
    },
    Pickup {
        user: UserId,
    },
    Return {
        user: UserId,
        station: StationId,
        distance_km: Decimal,
        damage_fee: Decimal,
        notes: String,
    },
    CancelRental {
        user: UserId,
    },
    Sweep,
}

impl ScenarioRecord {
    /// Converts a CSV record to a scenario step.
    ///
    /// Returns `None` for unknown ops or missing required fields.
    fn into_op(self) -> Option<ScenarioOp> {
        match self.op.to_lowercase().as_str() {
            "add-bicycle" => Some(ScenarioOp::AddBicycle {
                serial: self.note?,
                station: StationId(self.station?),
                hourly_rate: self.amount.unwrap_or(dec!(50.00)),
            }),
            "register-user" => Some(ScenarioOp::RegisterUser {
                user: UserId(self.user?),
            }),
            "reserve" => Some(ScenarioOp::Reserve {
                user: UserId(self.user?),
                bicycle: BicycleId(self.bicycle?),
            }),
            "cancel-reservation" => Some(ScenarioOp::CancelReservation {
                user: UserId(self.user?),
            }),
            "pickup" => Some(ScenarioOp::Pickup {
                user: UserId(self.user?),
            }),
            "return" => Some(ScenarioOp::Return {
                user: UserId(self.user?),
                station: StationId(self.station?),
                distance_km: self.distance.unwrap_or(Decimal::ZERO),
                damage_fee: self.amount.unwrap_or(Decimal::ZERO),
                notes: self.note.unwrap_or_default(),
            }),
            "cancel-rental" => Some(ScenarioOp::CancelRental {
                user: UserId(self.user?),
            }),
            "sweep" => Some(ScenarioOp::Sweep),
            _ => None,
        }
    }
}

/// Applies one scenario step to the engine.
fn apply(engine: &Engine, op: ScenarioOp) -> Result<(), RentalError> {
    match op {
        ScenarioOp::AddBicycle {
            serial,
            station,
            hourly_rate,
        } => {
            engine.registry().register(&serial, station, hourly_rate)?;
            Ok(())
        }
        ScenarioOp::RegisterUser { user } => {
            engine.ledger().register_user(user, true);
            Ok(())
        }
        ScenarioOp::Reserve { user, bicycle } => engine.reserve(user, bicycle).map(|_| ()),
        ScenarioOp::CancelReservation { user } => {
            let held = engine
                .active_reservation_for(user)
                .ok_or(RentalError::ReservationNotFound)?;
            engine.cancel_reservation(held.id, user).map(|_| ())
        }
        ScenarioOp::Pickup { user } => {
            let held = engine
                .active_reservation_for(user)
                .ok_or(RentalError::ReservationNotFound)?;
            engine.promote(held.id, user).map(|_| ())
        }
        ScenarioOp::Return {
            user,
            station,
            distance_km,
            damage_fee,
            notes,
        } => {
            let riding = engine
                .active_rental_for(user)
                .ok_or(RentalError::RentalNotFound)?;
            engine
                .complete_rental(riding.id, station, &notes, distance_km, damage_fee)
                .map(|_| ())
        }
        ScenarioOp::CancelRental { user } => {
            let riding = engine
                .active_rental_for(user)
                .ok_or(RentalError::RentalNotFound)?;
            engine.cancel_rental(riding.id).map(|_| ())
        }
        ScenarioOp::Sweep => {
            engine.sweep();
            Ok(())
        }
    }
}

/// Replays a scenario from a CSV reader against a fresh engine.
///
/// This function uses streaming parsing, so scenarios of any length work.
/// Malformed rows and rejected steps are skipped; the scenario is
/// best-effort like a replayed request log.
///
/// # CSV Format
///
/// Expected columns: `op, at, user, bicycle, station, amount, distance, note`
/// - `op`: add-bicycle, register-user, reserve, cancel-reservation, pickup,
///   return, cancel-rental, sweep
/// - `at`: minutes offset from scenario start (simulated clock)
/// - `amount`: hourly rate for add-bicycle, damage fee for return
/// - `note`: serial number for add-bicycle, return notes for return
///
/// # Example
///
/// ```csv
/// op,at,user,bicycle,station,amount,distance,note
/// add-bicycle,0,,,1,50.00,,MMU-0001
/// register-user,0,1,,,,,
/// reserve,0,1,1,,,,
/// pickup,10,1,,,,,
/// return,130,1,2,,,5.5,all good
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
/// Individual step rejections are logged in debug mode but don't stop the
/// replay.
pub fn run_scenario<R: Read>(reader: R) -> Result<Engine, csv::Error> {
    let start = Utc::now();
    let clock = Arc::new(ManualClock::new(start));
    let engine = Engine::with_parts(
        EngineConfig::default(),
        Arc::clone(&clock) as Arc<dyn bike_rental_rs::Clock>,
        Arc::new(LogSink),
    );

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true) // Allow missing trailing fields
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<ScenarioRecord>() {
        match result {
            Ok(record) => {
                if let Some(minutes) = record.at {
                    clock.set(start + Duration::minutes(minutes));
                }
                let Some(op) = record.into_op() else {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping invalid scenario record");
                    continue;
                };
                if let Err(e) = apply(&engine, op) {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping rejected step: {}", e);
                }
            }
            Err(e) => {
                // Skip malformed rows
                #[cfg(debug_assertions)]
                eprintln!("Skipping malformed row: {}", e);
                continue;
            }
        }
    }

    Ok(engine)
}

/// Write fleet state to a CSV writer.
///
/// Outputs all bicycles in CSV format, ordered by id.
///
/// # CSV Format
///
/// Columns: `id, serial_number, status, current_station, hourly_rate,
/// total_rentals, total_distance_km`
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_fleet<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for bicycle in engine.registry().snapshots() {
        wtr.serialize(&bicycle)?;
    }

    wtr.flush()?;
    Ok(())
}
