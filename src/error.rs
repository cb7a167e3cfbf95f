#[derive(Debug, thiserror::Error)]
pub enum EmicastError {
    #[error("Failed to read source file {path}: {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Required columns missing from CSV: {}", missing.join(", "))]
    Schema { missing: Vec<String> },
    #[error("CSV file is empty or contains no usable rows")]
    EmptySource,
    #[error("No rows remained after filtering null features/target")]
    EmptyDatasetAfterFiltering,
    #[error("None of the candidate feature columns are present in the data")]
    NoFeaturesAvailable,
    #[error("Feature column '{column}' is constant (standard deviation is zero)")]
    DegenerateFeature { column: String },
    #[error("No trained model available. Train the model first.")]
    ModelUnavailable,
    #[error("Data not processed. Load the dataset first.")]
    DataUnavailable,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Fit error: {0}")]
    Fit(String),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Serde YAML Error: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    #[error("Shape Error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("Model encode error: {0}")]
    ModelEncode(#[from] bincode::error::EncodeError),
}

impl EmicastError {
    /// Whether the failure is the caller's to fix (HTTP 400) rather than an
    /// internal pipeline failure (HTTP 500).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EmicastError::ModelUnavailable
                | EmicastError::DataUnavailable
                | EmicastError::Config(_)
        )
    }
}
