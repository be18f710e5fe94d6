#![allow(dead_code)]

use oes_core::linedb::{LineDatabase, MemoryLineStore, Transition, UpperState};
use rusqlite::{Connection, params};
use std::path::Path;

pub const MAX_V: i64 = 3;
pub const MAX_J: i64 = 30;

/// Diatomic-like ladder: `E_v = 2000·v`, `E_J = 10·J(J+1)` cm⁻¹, one line
/// per upper state at `300 + 0.045·J + 1.5·v` nm, constant emission
/// coefficient.
pub fn ladder() -> (Vec<UpperState>, Vec<Transition>) {
    let mut states = Vec::new();
    let mut transitions = Vec::new();
    for v in 0..=MAX_V {
        for j in 0..=MAX_J {
            let id = v * (MAX_J + 1) + j + 1;
            let j = j as f64;
            states.push(UpperState {
                id,
                j,
                e_j: 10.0 * j * (j + 1.0),
                e_v: 2000.0 * v as f64,
                v,
                component: 1,
            });
            let wavelength = 300.0 + 0.045 * j + 1.5 * v as f64;
            transitions.push(Transition {
                id,
                upper_state: id,
                lower_state: 0,
                a: 1.0,
                air_wavelength: wavelength,
                vacuum_wavelength: wavelength + 0.09,
                wavenumber: 1.0e7 / wavelength,
                branch: Some("R".to_string()),
            });
        }
    }
    (states, transitions)
}

pub fn ladder_database(species: &str) -> LineDatabase {
    let (states, transitions) = ladder();
    let store = MemoryLineStore::new(states, transitions).expect("store");
    LineDatabase::from_store(species, Box::new(store)).expect("database")
}

/// Writes the ladder as an SQLite line list at `path`.
pub fn write_ladder_sqlite(path: &Path) {
    let (states, transitions) = ladder();
    let conn = Connection::open(path).expect("sqlite file");
    conn.execute_batch(
        "CREATE TABLE upper_states (
            id INTEGER PRIMARY KEY, J REAL, E_J REAL, E_v REAL, v INTEGER, component INTEGER
        );
        CREATE TABLE lines (
            id INTEGER PRIMARY KEY, upper_state INTEGER, lower_state INTEGER, A REAL,
            air_wavelength REAL, vacuum_wavelength REAL, wavenumber REAL, branch TEXT
        );",
    )
    .expect("schema");
    for state in &states {
        conn.execute(
            "INSERT INTO upper_states (id, J, E_J, E_v, v, component) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![state.id, state.j, state.e_j, state.e_v, state.v, state.component],
        )
        .expect("state row");
    }
    for line in &transitions {
        conn.execute(
            "INSERT INTO lines (id, upper_state, lower_state, A, air_wavelength, vacuum_wavelength, wavenumber, branch)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                line.id,
                line.upper_state,
                line.lower_state,
                line.a,
                line.air_wavelength,
                line.vacuum_wavelength,
                line.wavenumber,
                line.branch
            ],
        )
        .expect("line row");
    }
}

/// Uniform measurement grid covering every ladder line.
pub fn measurement_axis() -> Vec<f64> {
    (0..=350).map(|index| 299.5 + index as f64 * 0.02).collect()
}
