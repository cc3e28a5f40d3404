/// Failures reported when validating or comparing boot scripts.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("Found unexpected occurrence of `root=` in '{script}'\n{line_number}:{line}")]
    RootAssignment {
        script: String,
        line_number: usize,
        line: String,
    },

    #[error("Expected content ({marker}) not found in '{script}'")]
    MissingMarker { script: String, marker: String },

    #[error("Block '{block}' opened on line {line_number} of '{script}' is never closed")]
    UnterminatedBlock {
        script: String,
        block: String,
        line_number: usize,
    },

    #[error("'{baseline}' and '{candidate}' differ after normalization:\n{diff}")]
    Divergence {
        baseline: String,
        candidate: String,
        diff: String,
    },

    #[error("Invalid pattern '{pattern}'")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl CheckError {
    /// Whether this error says something about the checked scripts, as
    /// opposed to the way the check was configured.
    pub fn is_validation_failure(&self) -> bool {
        !matches!(self, Self::InvalidPattern { .. })
    }
}
