//! # Thread Keys
//!
//! Groups human-collaboration events into a conversation per subject.

use crate::domain::errors::{DomainError, DomainResult};

/// Derives the conversation key of a subject: `"{subject_type}:{subject_id}"`.
///
/// # Errors
///
/// Returns `DomainError::InvalidArgument` if `subject_type` is blank or
/// `subject_id` is not positive.
///
/// # Examples
///
/// ```
/// use rfq_dispatch::domain::services::thread::thread_key_for;
///
/// assert_eq!(thread_key_for("rfq", 123).unwrap(), "rfq:123");
/// assert!(thread_key_for("", 1).is_err());
/// assert!(thread_key_for("rfq", 0).is_err());
/// ```
pub fn thread_key_for(subject_type: &str, subject_id: i64) -> DomainResult<String> {
    let subject_type = subject_type.trim();
    if subject_type.is_empty() {
        return Err(DomainError::invalid_argument("subject_type is required"));
    }
    if subject_id <= 0 {
        return Err(DomainError::invalid_argument(format!(
            "subject_id must be positive, got {subject_id}"
        )));
    }
    Ok(format!("{subject_type}:{subject_id}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        for _ in 0..3 {
            assert_eq!(thread_key_for("rfq", 123).unwrap(), "rfq:123");
        }
    }

    #[test]
    fn rejects_blank_subject_type() {
        assert!(thread_key_for("", 1).unwrap_err().is_invalid_argument());
        assert!(thread_key_for("   ", 1).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn rejects_non_positive_id() {
        assert!(thread_key_for("rfq", 0).unwrap_err().is_invalid_argument());
        assert!(thread_key_for("rfq", -4).unwrap_err().is_invalid_argument());
    }
}
