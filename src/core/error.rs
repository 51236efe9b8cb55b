use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub constraint: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            constraint: constraint.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.constraint)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn single(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self {
            violations: vec![FieldViolation::new(field, constraint)],
        }
    }

    pub fn push(&mut self, field: impl Into<String>, constraint: impl Into<String>) {
        self.violations.push(FieldViolation::new(field, constraint));
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn mentions(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "invalid input: {joined}")
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValuationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("mathematical domain error: {0}")]
    MathematicalDomain(String),
    #[error("unexpected valuation failure: {0}")]
    Unexpected(String),
}

impl ValuationError {
    pub fn domain(msg: impl Into<String>) -> Self {
        Self::MathematicalDomain(msg.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ValuationError::Validation(_) => "validation",
            ValuationError::MathematicalDomain(_) => "mathematical_domain",
            ValuationError::Unexpected(_) => "unexpected",
        }
    }
}
