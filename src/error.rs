use thiserror::Error;

// ---------------------------------------------------------------------------
// AnalysisError – every way a run can be aborted
// ---------------------------------------------------------------------------

/// Fatal outcome of an analysis run. A run either produces a complete result
/// or one of these, never a partial result.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("run directory is missing expected trace files: {}", missing.join(", "))]
    FileStructure { missing: Vec<String> },

    #[error("trace {label}: {shortfall}")]
    DataLength {
        label: String,
        shortfall: LengthShortfall,
    },

    #[error("{percent:.2}% {kind} anomalies detected in {label} (limit {limit}%)")]
    DataQuality {
        label: String,
        kind: AnomalyKind,
        percent: f64,
        limit: f64,
    },

    #[error("configuration mismatch: {0}")]
    ConfigMismatch(String),

    #[error("trace {label}: {transitions} transitions are too few for one comparison")]
    InsufficientCycles { label: String, transitions: usize },

    #[error("weighted fit failed: {0}")]
    Fit(String),

    #[error(transparent)]
    Load(#[from] anyhow::Error),
}

/// Why a capture failed the length check.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum LengthShortfall {
    #[error("{len} usable samples, at least {limit} required")]
    Samples { len: usize, limit: usize },
    #[error("final timestamp {last:.3} does not exceed {bound}")]
    Timestamp { last: f64, bound: f64 },
}

/// Which statistical screen raised a [`AnalysisError::DataQuality`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyKind {
    Level,
    Period,
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalyKind::Level => write!(f, "level"),
            AnomalyKind::Period => write!(f, "period"),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
