use serde::Deserialize;
use serde_json::Value;

use crate::core::{UnitMultiplier, ValidationError, ValuationInput};

/// Raw request body for a valuation. Every field is kept as untyped JSON so a
/// wrong type or a missing field can be reported against its field name.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ValuationPayload {
    revenue: Option<Value>,
    ebit: Option<Value>,
    taxes: Option<Value>,
    d_and_a: Option<Value>,
    capital_expenditure: Option<Value>,
    change_in_net_working_capital: Option<Value>,
    perpetual_growth_rate: Option<Value>,
    exit_multiple: Option<Value>,
    weight_perpetuity: Option<Value>,
    risk_free_rate: Option<Value>,
    market_risk_premium: Option<Value>,
    beta: Option<Value>,
    debt_to_equity: Option<Value>,
    debt: Option<Value>,
    cash: Option<Value>,
    shares_outstanding: Option<Value>,
    projection_years: Option<Value>,
    current_share_price: Option<Value>,
    unit_multiplier: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct FetchPayload {
    ticker: Option<Value>,
}

impl FetchPayload {
    // A missing ticker stays empty so the fetch step reports it as required.
    pub(crate) fn into_ticker(self) -> Result<String, ValidationError> {
        match self.ticker {
            None | Some(Value::Null) => Ok(String::new()),
            Some(Value::String(ticker)) => Ok(ticker),
            Some(_) => Err(ValidationError::single("ticker", "must be a string")),
        }
    }
}

pub(crate) fn ticker_from_json(body: &[u8]) -> Result<String, ValidationError> {
    let payload: FetchPayload = serde_json::from_slice(body)
        .map_err(|e| ValidationError::single("body", format!("is not valid JSON: {e}")))?;
    payload.into_ticker()
}

pub fn input_from_json(body: &[u8]) -> Result<ValuationInput, ValidationError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ValidationError::single("body", format!("is not valid JSON: {e}")))?;
    if !value.is_object() {
        return Err(ValidationError::single("body", "must be a JSON object"));
    }
    let payload: ValuationPayload = serde_json::from_value(value)
        .map_err(|e| ValidationError::single("body", format!("could not be read: {e}")))?;
    payload.into_input()
}

impl ValuationPayload {
    pub fn into_input(self) -> Result<ValuationInput, ValidationError> {
        let mut errors = ValidationError::default();

        let input = ValuationInput {
            revenue: series(&mut errors, "revenue", self.revenue),
            ebit: series(&mut errors, "ebit", self.ebit),
            taxes: series(&mut errors, "taxes", self.taxes),
            d_and_a: series(&mut errors, "d_and_a", self.d_and_a),
            capital_expenditure: series(
                &mut errors,
                "capital_expenditure",
                self.capital_expenditure,
            ),
            change_in_net_working_capital: series(
                &mut errors,
                "change_in_net_working_capital",
                self.change_in_net_working_capital,
            ),
            perpetual_growth_rate: number(
                &mut errors,
                "perpetual_growth_rate",
                self.perpetual_growth_rate,
            ),
            exit_multiple: number(&mut errors, "exit_multiple", self.exit_multiple),
            weight_perpetuity: number(&mut errors, "weight_perpetuity", self.weight_perpetuity),
            risk_free_rate: number(&mut errors, "risk_free_rate", self.risk_free_rate),
            market_risk_premium: number(
                &mut errors,
                "market_risk_premium",
                self.market_risk_premium,
            ),
            beta: number(&mut errors, "beta", self.beta),
            debt_to_equity: number(&mut errors, "debt_to_equity", self.debt_to_equity),
            debt: number(&mut errors, "debt", self.debt),
            cash: number(&mut errors, "cash", self.cash),
            shares_outstanding: number(
                &mut errors,
                "shares_outstanding",
                self.shares_outstanding,
            ),
            projection_years: whole_number(&mut errors, "projection_years", self.projection_years),
            current_share_price: number(
                &mut errors,
                "current_share_price",
                self.current_share_price,
            ),
            unit_multiplier: unit_multiplier(&mut errors, self.unit_multiplier),
        };

        errors.into_result()?;
        Ok(input)
    }
}

fn required(errors: &mut ValidationError, field: &str, value: Option<Value>) -> Option<Value> {
    match value {
        None | Some(Value::Null) => {
            errors.push(field, "is required");
            None
        }
        Some(value) => Some(value),
    }
}

fn number(errors: &mut ValidationError, field: &str, value: Option<Value>) -> f64 {
    let Some(value) = required(errors, field, value) else {
        return 0.0;
    };
    match value.as_f64() {
        Some(n) => n,
        None => {
            errors.push(field, "must be a number");
            0.0
        }
    }
}

fn series(errors: &mut ValidationError, field: &str, value: Option<Value>) -> Vec<f64> {
    let Some(value) = required(errors, field, value) else {
        return Vec::new();
    };
    let Value::Array(items) = value else {
        errors.push(field, "must be an array of numbers");
        return Vec::new();
    };

    let mut out = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        match item.as_f64() {
            Some(n) => out.push(n),
            None => errors.push(format!("{field}[{idx}]"), "must be a number"),
        }
    }
    out
}

fn whole_number(errors: &mut ValidationError, field: &str, value: Option<Value>) -> u32 {
    let Some(value) = required(errors, field, value) else {
        return 0;
    };
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).unwrap_or_else(|_| {
            errors.push(field, "is too large");
            0
        });
    }
    match value.as_f64() {
        Some(n) if n.fract() == 0.0 && n > 0.0 && n <= f64::from(u32::MAX) => n as u32,
        Some(n) if n <= 0.0 => {
            errors.push(field, "must be > 0");
            0
        }
        Some(n) if n.fract() == 0.0 => {
            errors.push(field, "is too large");
            0
        }
        _ => {
            errors.push(field, "must be a whole number");
            0
        }
    }
}

fn unit_multiplier(errors: &mut ValidationError, value: Option<Value>) -> UnitMultiplier {
    match value {
        None | Some(Value::Null) => UnitMultiplier::default(),
        Some(value) => serde_json::from_value(value).unwrap_or_else(|_| {
            errors.push(
                "unit_multiplier",
                "must be one of ones, thousands, millions, billions",
            );
            UnitMultiplier::default()
        }),
    }
}
