/// Errors raised by the numeric transforms.
///
/// "Nothing found" outcomes (empty peak lists, undetermined charge, all-zero
/// arrays) are not errors and are returned as regular values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProcessingError {
    /// A configuration value is outside its valid domain
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// A mode name that is not part of the accepted set
    #[error("unknown {kind} mode `{value}`")]
    UnknownMode { kind: &'static str, value: String },

    /// The ORIGAMI-MS voltage map needs more scans than the data holds
    #[error("insufficient scans: voltage map expects {expected} scans but only {available} are available")]
    InsufficientScans { expected: usize, available: usize },

    /// A user-defined voltage list leaves scans of the data unassigned
    #[error("uncovered scans: user-defined list ends at scan {expected} but the data has {available} scans")]
    UncoveredScans { expected: usize, available: usize },

    /// Peak detection produced more peaks than the configured limit
    #[error("too many peaks: found {found}, limit is {limit}; consider raising the threshold or widening the window")]
    TooManyPeaks { found: usize, limit: usize },

    /// Array dimensions disagree with each other
    #[error("shape mismatch for {what}: expected {expected}, found {found}")]
    ShapeMismatch { what: &'static str, expected: usize, found: usize },

    /// The rayon pool for batch processing could not be built
    #[error("failed to build thread pool: {0}")]
    ThreadPool(String),
}

impl ProcessingError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ProcessingError::InvalidParameter { name, reason: reason.into() }
    }

    pub fn unknown_mode(kind: &'static str, value: impl Into<String>) -> Self {
        ProcessingError::UnknownMode { kind, value: value.into() }
    }
}

pub type Result<T> = std::result::Result<T, ProcessingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_scans_message_names_both_counts() {
        let err = ProcessingError::InsufficientScans { expected: 15, available: 10 };
        let msg = err.to_string();
        assert!(msg.contains("15"));
        assert!(msg.contains("10"));
    }

    #[test]
    fn test_invalid_helper() {
        let err = ProcessingError::invalid("bin_size", "must be positive");
        assert_eq!(
            err,
            ProcessingError::InvalidParameter { name: "bin_size", reason: "must be positive".to_string() }
        );
    }
}
