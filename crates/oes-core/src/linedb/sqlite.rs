use super::store::{LineRecord, LineStore, Transition, UpperState, WavelengthWindow};
use crate::domain::{OesError, OesResult, WavelengthMedium};
use rusqlite::{Connection, OpenFlags, Row, params};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";
const SQLITE_HEADER_SIZE: u64 = 100;

const STATES_QUERY: &str = "SELECT id, J, E_J, E_v, CAST(v AS INTEGER), \
     COALESCE(CAST(component AS INTEGER), 0) FROM upper_states";

/// True when `path` is a regular file carrying the SQLite 3 header.
pub fn is_sqlite3(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    let Ok(metadata) = path.metadata() else {
        return false;
    };
    if !metadata.is_file() || metadata.len() < SQLITE_HEADER_SIZE {
        return false;
    }

    let mut header = [0_u8; 16];
    File::open(path)
        .and_then(|mut file| file.read_exact(&mut header))
        .is_ok()
        && &header == SQLITE_HEADER
}

/// Line list stored in an SQLite file with `upper_states` and `lines` tables.
#[derive(Debug)]
pub struct SqliteLineStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteLineStore {
    pub fn open(path: impl AsRef<Path>) -> OesResult<Self> {
        let path = path.as_ref();
        if !is_sqlite3(path) {
            return Err(OesError::data_source(
                "DATA.NOT_SQLITE",
                format!("'{}' is not a valid line-list database", path.display()),
            ));
        }

        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|error| query_error(path, &error))?;
        debug!(path = %path.display(), "opened line-list database");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lines_query(window: WavelengthWindow, medium: WavelengthMedium) -> String {
        let column = medium.column();
        let filter = if window.is_bounded() {
            format!(" WHERE lines.{column} BETWEEN ?1 AND ?2")
        } else {
            String::new()
        };
        format!(
            "SELECT lines.id, upper_state, lower_state, A, air_wavelength, vacuum_wavelength, \
             wavenumber, CAST(branch AS TEXT), \
             upper_states.id, J, E_J, E_v, CAST(v AS INTEGER), \
             COALESCE(CAST(component AS INTEGER), 0) \
             FROM lines INNER JOIN upper_states ON upper_state = upper_states.id\
             {filter} ORDER BY lines.{column}"
        )
    }
}

impl LineStore for SqliteLineStore {
    fn states(&self) -> OesResult<Vec<UpperState>> {
        let mut statement = self
            .conn
            .prepare(STATES_QUERY)
            .map_err(|error| query_error(&self.path, &error))?;
        let rows = statement
            .query_map([], |row| state_from_row(row, 0))
            .map_err(|error| query_error(&self.path, &error))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|error| query_error(&self.path, &error))
    }

    fn lines(&self, window: WavelengthWindow, medium: WavelengthMedium) -> OesResult<Vec<LineRecord>> {
        let sql = Self::lines_query(window, medium);
        let mut statement = self
            .conn
            .prepare(&sql)
            .map_err(|error| query_error(&self.path, &error))?;

        let rows = if window.is_bounded() {
            statement.query_map(params![window.min, window.max], record_from_row)
        } else {
            statement.query_map([], record_from_row)
        }
        .map_err(|error| query_error(&self.path, &error))?;

        let records = rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| query_error(&self.path, &error))?;
        debug!(
            path = %self.path.display(),
            min = window.min,
            max = window.max,
            count = records.len(),
            "fetched line table"
        );
        Ok(records)
    }
}

fn state_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<UpperState> {
    Ok(UpperState {
        id: row.get(offset)?,
        j: row.get(offset + 1)?,
        e_j: row.get(offset + 2)?,
        e_v: row.get(offset + 3)?,
        v: row.get(offset + 4)?,
        component: row.get(offset + 5)?,
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<LineRecord> {
    Ok(LineRecord {
        transition: Transition {
            id: row.get(0)?,
            upper_state: row.get(1)?,
            lower_state: row.get(2)?,
            a: row.get(3)?,
            air_wavelength: row.get(4)?,
            vacuum_wavelength: row.get(5)?,
            wavenumber: row.get(6)?,
            branch: row.get(7)?,
        },
        state: state_from_row(row, 8)?,
    })
}

fn query_error(path: &Path, error: &rusqlite::Error) -> OesError {
    OesError::data_source(
        "DATA.QUERY",
        format!("line-list query on '{}' failed: {error}", path.display()),
    )
}
