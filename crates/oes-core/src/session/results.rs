use crate::domain::{OesError, OesResult};
use crate::params::{SpeciesBlock, SpeciesParameter};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Fitted value and standard error of one species parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    pub value: f64,
    pub stderr: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeciesResult {
    pub trot: Estimate,
    pub tvib: Estimate,
    pub intensity: Estimate,
}

impl SpeciesResult {
    pub fn from_block(block: &SpeciesBlock) -> Self {
        let estimate = |kind| {
            let parameter = block.get(kind);
            Estimate {
                value: parameter.value,
                stderr: parameter.stderr,
            }
        };
        Self {
            trot: estimate(SpeciesParameter::Trot),
            tvib: estimate(SpeciesParameter::Tvib),
            intensity: estimate(SpeciesParameter::Intensity),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub spectrum: String,
    /// NaN when the spectrum has no species or its signal does not sum to a
    /// positive value.
    pub reduced_sumsq: f64,
    /// One entry per session species, `None` where the species is not
    /// attached to this spectrum.
    pub species: Vec<Option<SpeciesResult>>,
}

/// Per-spectrum fit summary with one column group per session species.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ResultsTable {
    pub species: Vec<String>,
    pub rows: Vec<ResultRow>,
}

impl ResultsTable {
    pub fn headers(&self) -> Vec<String> {
        let mut headers = vec!["spectrum".to_string(), "reduced_sumsq".to_string()];
        for name in &self.species {
            for kind in SpeciesParameter::ALL {
                let column = format!("{name}{}", kind.suffix());
                headers.push(column.clone());
                headers.push(format!("{column}_dev"));
            }
        }
        headers
    }

    pub fn row(&self, spectrum: &str) -> Option<&ResultRow> {
        self.rows.iter().find(|row| row.spectrum == spectrum)
    }

    /// Writes the table as CSV. Missing and NaN values are left empty.
    pub fn write_csv<W: Write>(&self, writer: W) -> OesResult<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(self.headers())?;
        for row in &self.rows {
            let mut record = vec![row.spectrum.clone(), format_cell(Some(row.reduced_sumsq))];
            for result in &row.species {
                match result {
                    Some(result) => {
                        for estimate in [result.trot, result.tvib, result.intensity] {
                            record.push(format_cell(Some(estimate.value)));
                            record.push(format_cell(estimate.stderr));
                        }
                    }
                    None => record.extend(std::iter::repeat_n(String::new(), 6)),
                }
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn save_csv(&self, path: impl AsRef<Path>) -> OesResult<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| {
            OesError::io_system(
                "IO.WRITE",
                format!("failed to create results file '{}': {source}", path.display()),
            )
        })?;
        self.write_csv(file)
    }
}

fn format_cell(value: Option<f64>) -> String {
    match value {
        Some(value) if !value.is_nan() => value.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Estimate, ResultRow, ResultsTable, SpeciesResult};

    fn estimate(value: f64, stderr: Option<f64>) -> Estimate {
        Estimate { value, stderr }
    }

    #[test]
    fn headers_group_value_and_deviation_per_species() {
        let table = ResultsTable {
            species: vec!["OH".to_string()],
            rows: Vec::new(),
        };
        assert_eq!(
            table.headers(),
            vec![
                "spectrum",
                "reduced_sumsq",
                "OH_Trot",
                "OH_Trot_dev",
                "OH_Tvib",
                "OH_Tvib_dev",
                "OH_intensity",
                "OH_intensity_dev",
            ]
        );
    }

    #[test]
    fn missing_species_and_nan_are_written_empty() {
        let table = ResultsTable {
            species: vec!["OH".to_string(), "N2".to_string()],
            rows: vec![ResultRow {
                spectrum: "1".to_string(),
                reduced_sumsq: f64::NAN,
                species: vec![
                    Some(SpeciesResult {
                        trot: estimate(3000.0, Some(12.5)),
                        tvib: estimate(4000.0, None),
                        intensity: estimate(2.0, Some(0.25)),
                    }),
                    None,
                ],
            }],
        };

        let mut buffer = Vec::new();
        table.write_csv(&mut buffer).expect("write");
        let text = String::from_utf8(buffer).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "1,,3000,12.5,4000,,2,0.25,,,,,,");
    }
}
