use std::error::Error;
use std::fmt::{Display, Formatter};

pub type OesResult<T> = Result<T, OesError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OesErrorCategory {
    InputValidation,
    DataSource,
    AxisMismatch,
    InvalidSpecies,
    EmptyModel,
    NumericDegeneracy,
    IoSystem,
    Internal,
}

impl OesErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::InputValidation | Self::InvalidSpecies => 2,
            Self::IoSystem => 3,
            Self::DataSource => 4,
            Self::AxisMismatch => 5,
            Self::EmptyModel | Self::NumericDegeneracy => 6,
            Self::Internal => 7,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InputValidation => "InputValidationError",
            Self::DataSource => "DataSourceError",
            Self::AxisMismatch => "AxisMismatchError",
            Self::InvalidSpecies => "InvalidSpeciesError",
            Self::EmptyModel => "EmptyModelError",
            Self::NumericDegeneracy => "NumericDegeneracyError",
            Self::IoSystem => "IoSystemError",
            Self::Internal => "InternalError",
        }
    }

    /// Recoverable categories are signaled to the caller and the operation is
    /// skipped; everything else aborts the current request.
    pub const fn is_recoverable(self) -> bool {
        matches!(
            self,
            Self::InvalidSpecies | Self::EmptyModel | Self::NumericDegeneracy
        )
    }
}

impl Display for OesErrorCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OesError {
    category: OesErrorCategory,
    placeholder: &'static str,
    message: String,
}

impl OesError {
    pub fn new(
        category: OesErrorCategory,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder,
            message: message.into(),
        }
    }

    pub fn input_validation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(OesErrorCategory::InputValidation, placeholder, message)
    }

    pub fn data_source(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(OesErrorCategory::DataSource, placeholder, message)
    }

    pub fn axis_mismatch(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(OesErrorCategory::AxisMismatch, placeholder, message)
    }

    pub fn invalid_species(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(OesErrorCategory::InvalidSpecies, placeholder, message)
    }

    pub fn empty_model(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(OesErrorCategory::EmptyModel, placeholder, message)
    }

    pub fn numeric_degeneracy(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(OesErrorCategory::NumericDegeneracy, placeholder, message)
    }

    pub fn io_system(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(OesErrorCategory::IoSystem, placeholder, message)
    }

    pub fn internal(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(OesErrorCategory::Internal, placeholder, message)
    }

    pub const fn category(&self) -> OesErrorCategory {
        self.category
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        let severity = if self.category.is_recoverable() {
            "WARNING"
        } else {
            "ERROR"
        };
        format!("{}: [{}] {}", severity, self.placeholder, self.message)
    }
}

impl Display for OesError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.as_str(),
            self.placeholder,
            self.message
        )
    }
}

impl Error for OesError {}

impl From<std::io::Error> for OesError {
    fn from(source: std::io::Error) -> Self {
        Self::io_system("IO.SYSTEM", source.to_string())
    }
}

impl From<serde_json::Error> for OesError {
    fn from(source: serde_json::Error) -> Self {
        Self::input_validation("INPUT.JSON", source.to_string())
    }
}

impl From<csv::Error> for OesError {
    fn from(source: csv::Error) -> Self {
        Self::input_validation("INPUT.DELIMITED", source.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{OesError, OesErrorCategory};

    #[test]
    fn exit_mapping_is_stable() {
        let cases = [
            (OesErrorCategory::InputValidation, 2, "InputValidationError"),
            (OesErrorCategory::InvalidSpecies, 2, "InvalidSpeciesError"),
            (OesErrorCategory::IoSystem, 3, "IoSystemError"),
            (OesErrorCategory::DataSource, 4, "DataSourceError"),
            (OesErrorCategory::AxisMismatch, 5, "AxisMismatchError"),
            (OesErrorCategory::EmptyModel, 6, "EmptyModelError"),
            (OesErrorCategory::NumericDegeneracy, 6, "NumericDegeneracyError"),
            (OesErrorCategory::Internal, 7, "InternalError"),
        ];

        for (category, exit_code, name) in cases {
            assert_eq!(category.exit_code(), exit_code);
            assert_eq!(category.as_str(), name);
        }
    }

    #[test]
    fn diagnostic_line_reflects_recoverability() {
        let fatal = OesError::data_source("DATA.NOT_SQLITE", "OH.db is not a line-list store");
        assert_eq!(
            fatal.diagnostic_line(),
            "ERROR: [DATA.NOT_SQLITE] OH.db is not a line-list store"
        );

        let signaled =
            OesError::invalid_species("SPECIES.DUPLICATE", "species 'OH' already attached");
        assert_eq!(
            signaled.diagnostic_line(),
            "WARNING: [SPECIES.DUPLICATE] species 'OH' already attached"
        );
        assert_eq!(
            signaled.to_string(),
            "InvalidSpeciesError [SPECIES.DUPLICATE] species 'OH' already attached"
        );
    }
}
