mod engine;
mod error;
mod types;

pub use engine::{
    COST_OF_DEBT, compute_enterprise_value, compute_implied_share_price, compute_terminal_value,
    compute_wacc, discount_factor, discount_series, project_free_cash_flows, run_valuation,
    validate_input,
};
pub use error::{FieldViolation, ValidationError, ValuationError};
pub use types::{UnitMultiplier, ValuationInput, ValuationResult, YearBreakdown};
