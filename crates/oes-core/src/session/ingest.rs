//! Measured spectra from delimited text: a wavelength column followed by one
//! intensity column per spectrum.

use crate::domain::{OesError, OesResult};
use crate::numerics::is_strictly_increasing;
use crate::spectrum::SpectrumBuffer;
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const DEFAULT_DELIMITER: u8 = b',';

/// Reads every intensity column as its own spectrum sharing the first
/// column as wavelength axis. Blank lines and `#` comments are skipped.
pub fn read_delimited<R: Read>(reader: R, delimiter: u8) -> OesResult<Vec<SpectrumBuffer>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut columns: Vec<Vec<f64>> = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        if columns.is_empty() {
            if record.len() < 2 {
                return Err(OesError::input_validation(
                    "INGEST.COLUMNS",
                    format!(
                        "measured data needs a wavelength column and at least one intensity column, found {} column(s)",
                        record.len()
                    ),
                ));
            }
            columns = vec![Vec::new(); record.len()];
        }

        for (column, field) in columns.iter_mut().zip(record.iter()) {
            let value = field.parse::<f64>().map_err(|_| {
                OesError::input_validation(
                    "INGEST.NUMBER",
                    format!("row {}: '{field}' is not a number", row + 1),
                )
            })?;
            column.push(value);
        }
    }

    let Some((axis, intensities)) = columns.split_first() else {
        return Err(OesError::input_validation("INGEST.EMPTY", "measured data has no rows"));
    };
    if axis.len() < 2 {
        return Err(OesError::input_validation(
            "INGEST.TOO_SHORT",
            "measured data needs at least two wavelength samples",
        ));
    }
    if !is_strictly_increasing(axis) {
        return Err(OesError::axis_mismatch(
            "INGEST.AXIS_ORDER",
            "wavelength column must be strictly ascending",
        ));
    }

    intensities
        .iter()
        .map(|y| SpectrumBuffer::new(axis.clone(), y.clone()))
        .collect()
}

pub fn read_delimited_path(path: impl AsRef<Path>, delimiter: u8) -> OesResult<Vec<SpectrumBuffer>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| {
        OesError::io_system(
            "IO.READ",
            format!("failed to open measured data '{}': {source}", path.display()),
        )
    })?;
    read_delimited(file, delimiter)
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_DELIMITER, read_delimited};
    use crate::domain::OesErrorCategory;

    #[test]
    fn each_intensity_column_becomes_a_spectrum() {
        let source = "# wavelength, first, second\n300.0, 1.0, 5.0\n300.5, 2.0, 6.0\n\n301.0, 3.0, 7.0\n";
        let spectra = read_delimited(source.as_bytes(), DEFAULT_DELIMITER).expect("ingest");

        assert_eq!(spectra.len(), 2);
        assert_eq!(spectra[0].x(), &[300.0, 300.5, 301.0]);
        assert_eq!(spectra[0].y(), &[1.0, 2.0, 3.0]);
        assert_eq!(spectra[1].y(), &[5.0, 6.0, 7.0]);
    }

    #[test]
    fn descending_axis_is_rejected() {
        let source = "301.0,1.0\n300.0,2.0\n";
        let error = read_delimited(source.as_bytes(), DEFAULT_DELIMITER).expect_err("order");
        assert_eq!(error.placeholder(), "INGEST.AXIS_ORDER");
        assert_eq!(error.category(), OesErrorCategory::AxisMismatch);
        assert_eq!(error.exit_code(), 5);
    }

    #[test]
    fn non_numeric_fields_name_their_row() {
        let source = "300.0,1.0\n300.5,abc\n";
        let error = read_delimited(source.as_bytes(), DEFAULT_DELIMITER).expect_err("number");
        assert_eq!(error.placeholder(), "INGEST.NUMBER");
        assert!(error.message().contains("row 2"));
    }

    #[test]
    fn single_column_and_empty_input_are_rejected() {
        let single = read_delimited("300.0\n301.0\n".as_bytes(), DEFAULT_DELIMITER).expect_err("columns");
        assert_eq!(single.placeholder(), "INGEST.COLUMNS");

        let empty = read_delimited("# nothing\n".as_bytes(), DEFAULT_DELIMITER).expect_err("empty");
        assert_eq!(empty.placeholder(), "INGEST.EMPTY");
    }

    #[test]
    fn tab_delimited_input_is_supported() {
        let spectra = read_delimited("300\t1\n301\t2\n".as_bytes(), b'\t').expect("ingest");
        assert_eq!(spectra[0].len(), 2);
    }
}
