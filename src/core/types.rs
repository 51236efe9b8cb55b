use serde::{Deserialize, Serialize};

/// Unit in which the monetary inputs (projections, debt, cash) are expressed.
/// Share counts are always raw.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitMultiplier {
    #[default]
    Ones,
    Thousands,
    Millions,
    Billions,
}

impl UnitMultiplier {
    pub fn factor(self) -> f64 {
        match self {
            UnitMultiplier::Ones => 1.0,
            UnitMultiplier::Thousands => 1e3,
            UnitMultiplier::Millions => 1e6,
            UnitMultiplier::Billions => 1e9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuationInput {
    pub revenue: Vec<f64>,
    pub ebit: Vec<f64>,
    pub taxes: Vec<f64>,
    pub d_and_a: Vec<f64>,
    pub capital_expenditure: Vec<f64>,
    pub change_in_net_working_capital: Vec<f64>,
    pub perpetual_growth_rate: f64,
    pub exit_multiple: f64,
    pub weight_perpetuity: f64,
    pub risk_free_rate: f64,
    pub market_risk_premium: f64,
    pub beta: f64,
    pub debt_to_equity: f64,
    pub debt: f64,
    pub cash: f64,
    pub shares_outstanding: f64,
    pub projection_years: u32,
    pub current_share_price: f64,
    pub unit_multiplier: UnitMultiplier,
}

impl ValuationInput {
    pub fn series(&self) -> [(&'static str, &[f64]); 6] {
        [
            ("revenue", self.revenue.as_slice()),
            ("ebit", self.ebit.as_slice()),
            ("taxes", self.taxes.as_slice()),
            ("d_and_a", self.d_and_a.as_slice()),
            ("capital_expenditure", self.capital_expenditure.as_slice()),
            (
                "change_in_net_working_capital",
                self.change_in_net_working_capital.as_slice(),
            ),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearBreakdown {
    pub year: u32,
    pub free_cash_flow: f64,
    pub discount_factor: f64,
    pub present_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuationResult {
    pub implied_share_price: f64,
    /// One entry per projection year; the terminal value is reported separately.
    pub discounted_cash_flows: Vec<f64>,
    pub terminal_value: f64,
    pub discounted_terminal_value: f64,
    pub wacc: f64,
    pub enterprise_value: f64,
    pub upside_percent: f64,
    pub schedule: Vec<YearBreakdown>,
}
