use thiserror::Error;

use tickerboard_core::{CoreError, FatalError};

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Fatal(#[from] FatalError),

    #[error("invalid log filter '{filter}': {message}")]
    LogFilter { filter: String, message: String },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Core(CoreError::Validation(_)) => 2,
            Self::Core(CoreError::Serialization(_)) => 2,
            Self::Core(CoreError::Fatal(_)) | Self::Fatal(_) => 1,
            Self::Core(CoreError::ExchangeRate { .. }) => 3,
            Self::Core(CoreError::ConfigIo { .. }) => 10,
            Self::LogFilter { .. } => 2,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickerboard_core::{InstrumentKind, ValidationError};

    #[test]
    fn fatal_errors_exit_with_one() {
        let error = CliError::from(FatalError::Configuration {
            kind: InstrumentKind::Equity,
            symbol: String::from("AAPL"),
            min_len: 32,
        });

        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn config_errors_exit_with_two() {
        let error = CliError::from(CoreError::from(ValidationError::ZeroUpdateRate));

        assert_eq!(error.exit_code(), 2);
    }
}
