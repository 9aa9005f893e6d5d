//! Domain error types.

/// Top-level error type for stratsearch.
#[derive(Debug, thiserror::Error)]
pub enum StratsearchError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("unknown optimization method '{name}' (valid methods: {valid})")]
    UnknownMethod { name: String, valid: String },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("no data for {asset}")]
    NoData { asset: String },

    #[error("invalid series for {asset}: {reason}")]
    InvalidSeries { asset: String, reason: String },

    #[error("analysis failed for {asset}: {reason}")]
    Analysis { asset: String, reason: String },

    #[error("trade rejected for {asset}: {reason}")]
    TradeRejected { asset: String, reason: String },

    #[error("candidate evaluation failed: {reason}")]
    Evaluation { reason: String },

    #[error("no viable candidate found ({failures} evaluations failed)")]
    NoViableCandidate { failures: usize },

    #[error("run aborted")]
    Aborted,

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&StratsearchError> for std::process::ExitCode {
    fn from(err: &StratsearchError) -> Self {
        let code: u8 = match err {
            StratsearchError::Io(_) | StratsearchError::Report { .. } => 1,
            StratsearchError::ConfigParse { .. }
            | StratsearchError::ConfigMissing { .. }
            | StratsearchError::ConfigInvalid { .. }
            | StratsearchError::UnknownMethod { .. }
            | StratsearchError::InvalidParameter { .. } => 2,
            StratsearchError::NoData { .. }
            | StratsearchError::InvalidSeries { .. }
            | StratsearchError::Data { .. }
            | StratsearchError::Analysis { .. } => 3,
            StratsearchError::TradeRejected { .. }
            | StratsearchError::Evaluation { .. }
            | StratsearchError::NoViableCandidate { .. }
            | StratsearchError::Aborted => 4,
        };
        std::process::ExitCode::from(code)
    }
}
