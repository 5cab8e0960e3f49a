//! Form validation. A failed check blocks submission and nothing is written.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),
    #[error("{0} must not be negative")]
    Negative(&'static str),
    #[error("due date {0} is in the past")]
    PastDueDate(NaiveDate),
    #[error("occurrences must be at least 1")]
    ZeroOccurrences,
}

pub fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required(field));
    }
    Ok(())
}

/// A required amount that must be zero or more
pub fn require_non_negative(field: &'static str, value: Option<f64>) -> Result<f64, ValidationError> {
    let value = value.ok_or(ValidationError::Required(field))?;
    if value < 0.0 || value.is_nan() {
        return Err(ValidationError::Negative(field));
    }
    Ok(value)
}

/// Due dates are optional but may not lie before today
pub fn check_due_date(due: Option<NaiveDate>, today: NaiveDate) -> Result<(), ValidationError> {
    match due {
        Some(date) if date < today => Err(ValidationError::PastDueDate(date)),
        _ => Ok(()),
    }
}
