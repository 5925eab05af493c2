use thiserror::Error;

/// Top-level error taxonomy for the compliance core. Variants are grouped by
/// kind, not by originating subsystem, so callers can classify retryability
/// without string-matching in the common case.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    #[error("determinism violation: {0}")]
    DeterminismViolation(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("provider transient error: {0}")]
    ProviderTransient(String),

    #[error("provider request invalid: {0}")]
    ProviderRequestInvalid(String),

    #[error("llm schema parse error: {0}")]
    SchemaParseError(String),

    #[error("llm schema validation error: {0}")]
    SchemaValidationError(String),

    #[error("quality gate failed: {0}")]
    QualityGateFailed(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("zip error: {0}")]
    Zip(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Coarse failure classification used to decide retryability, mirroring the
/// taxonomy a control-plane caller needs without exposing internal error
/// variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    ProviderTransient,
    ProviderRequestInvalid,
    SchemaParseError,
    SchemaValidationError,
    ConfigError,
    BundleNotFound,
    CompiledPlanEmpty,
    ChunkPrerequisiteMissing,
    QualityGateFailed,
    InternalError,
}

impl FailureCategory {
    pub fn retryable(self) -> bool {
        matches!(self, FailureCategory::ProviderTransient)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureCategory::ProviderTransient => "provider_transient",
            FailureCategory::ProviderRequestInvalid => "provider_request_invalid",
            FailureCategory::SchemaParseError => "schema_parse_error",
            FailureCategory::SchemaValidationError => "schema_validation_error",
            FailureCategory::ConfigError => "config_error",
            FailureCategory::BundleNotFound => "bundle_not_found",
            FailureCategory::CompiledPlanEmpty => "compiled_plan_empty",
            FailureCategory::ChunkPrerequisiteMissing => "chunk_prerequisite_missing",
            FailureCategory::QualityGateFailed => "quality_gate_failed",
            FailureCategory::InternalError => "internal_error",
        }
    }
}

/// Maps an error into `(failure_category, retryable)` for the run worker's
/// terminal event. Typed variants classify directly; anything else falls
/// back to matching on the rendered message, mirroring the boundary-mapping
/// the legacy system needed for exceptions raised outside its own taxonomy.
pub fn classify_failure(err: &CoreError) -> (FailureCategory, bool) {
    let category = match err {
        CoreError::ProviderTransient(_) => FailureCategory::ProviderTransient,
        CoreError::ProviderRequestInvalid(_) => FailureCategory::ProviderRequestInvalid,
        CoreError::SchemaParseError(_) => FailureCategory::SchemaParseError,
        CoreError::SchemaValidationError(_) => FailureCategory::SchemaValidationError,
        CoreError::Config(_) => FailureCategory::ConfigError,
        CoreError::QualityGateFailed(_) => FailureCategory::QualityGateFailed,
        CoreError::Integrity(msg) => classify_integrity_message(msg),
        other => classify_message(&other.to_string()),
    };
    (category, category.retryable())
}

fn classify_integrity_message(msg: &str) -> FailureCategory {
    if msg.contains("Bundle not found") {
        FailureCategory::BundleNotFound
    } else if msg.contains("compiled_obligations_empty_for_csrd_entity") {
        FailureCategory::CompiledPlanEmpty
    } else if msg.contains("chunk_table_empty_for_run") {
        FailureCategory::ChunkPrerequisiteMissing
    } else {
        FailureCategory::InternalError
    }
}

fn classify_message(msg: &str) -> FailureCategory {
    if msg.contains("timeout") || msg.contains("connect") {
        FailureCategory::ProviderTransient
    } else {
        FailureCategory::InternalError
    }
}
