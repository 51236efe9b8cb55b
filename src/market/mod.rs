mod yahoo;

pub use yahoo::YahooProvider;

use tracing::{debug, warn};

use crate::core::{UnitMultiplier, ValuationInput};

pub const DEFAULT_BETA: f64 = 1.1;
pub const DEFAULT_TAX_RATE: f64 = 0.21;
pub const ASSUMED_GROWTH: f64 = 1.15;
pub const PERPETUAL_GROWTH_RATE: f64 = 0.025;
pub const MARKET_RISK_PREMIUM: f64 = 0.055;

const SEED_REVENUE: f64 = 1000.0;
const FALLBACK_EBIT_MARGIN: f64 = 0.15;
const D_AND_A_SHARE: f64 = 0.05;
const CAPEX_SHARE: f64 = 0.07;
const NWC_SHARE: f64 = 0.02;
const MILLIONS: f64 = 1e6;

/// Provider figures in raw currency units, series ordered oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketSnapshot {
    pub ticker: String,
    pub revenue: Vec<f64>,
    pub operating_income: Vec<f64>,
    pub current_price: Option<f64>,
    pub shares_outstanding: Option<f64>,
    pub beta: Option<f64>,
    pub total_debt: Option<f64>,
    pub cash: Option<f64>,
    pub stockholders_equity: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum MarketDataError {
    #[error("ticker symbol must not be empty")]
    EmptyTicker,
    #[error("could not build HTTP client: {0}")]
    Client(String),
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("could not parse provider response: {0}")]
    Parse(String),
    #[error("provider returned no {what} for {ticker}")]
    Missing { what: &'static str, ticker: String },
}

pub trait MarketDataProvider {
    fn fetch(&self, ticker: &str) -> Result<MarketSnapshot, MarketDataError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchDefaults {
    pub years: usize,
    pub projection_years: Option<u32>,
    pub exit_multiple: f64,
    pub weight_perpetuity: f64,
    pub risk_free_rate: f64,
    pub debt_to_equity: f64,
}

impl Default for FetchDefaults {
    fn default() -> Self {
        Self {
            years: 6,
            projection_years: None,
            exit_multiple: 12.0,
            weight_perpetuity: 0.5,
            risk_free_rate: 0.0375,
            debt_to_equity: 0.25,
        }
    }
}

pub fn normalize_ticker(raw: &str) -> Result<String, MarketDataError> {
    let ticker = raw.trim().to_uppercase();
    if ticker.is_empty() {
        return Err(MarketDataError::EmptyTicker);
    }
    Ok(ticker)
}

pub fn fetch_input(
    provider: &dyn MarketDataProvider,
    ticker: &str,
    defaults: &FetchDefaults,
) -> Result<ValuationInput, MarketDataError> {
    let ticker = normalize_ticker(ticker)?;
    let snapshot = provider.fetch(&ticker)?;
    build_input(&snapshot, defaults)
}

/// Drops zero and non-finite entries, keeps the latest `fill_length` values and
/// extends the tail at `growth` per year until `fill_length` values exist.
pub fn clean_series(values: &[f64], fill_length: usize, growth: f64) -> Vec<f64> {
    let cleaned: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| v.is_finite() && *v != 0.0)
        .collect();
    let skip = cleaned.len().saturating_sub(fill_length);

    let mut out: Vec<f64> = cleaned[skip..].to_vec();
    while out.len() < fill_length {
        let next = out.last().map_or(SEED_REVENUE, |last| last * growth);
        out.push(next);
    }
    out
}

pub fn build_input(
    snapshot: &MarketSnapshot,
    defaults: &FetchDefaults,
) -> Result<ValuationInput, MarketDataError> {
    let projection_years = defaults
        .projection_years
        .unwrap_or(defaults.years as u32)
        .max(1);
    let years = defaults.years.max(projection_years as usize);

    let revenue = clean_series(&in_millions(&snapshot.revenue), years, ASSUMED_GROWTH);
    if snapshot.revenue.is_empty() {
        warn!(ticker = %snapshot.ticker, "no revenue history, using seeded growth series");
    }

    let ebit = if snapshot.operating_income.is_empty() {
        warn!(ticker = %snapshot.ticker, "no operating income history, assuming 15% margin");
        revenue.iter().map(|r| r * FALLBACK_EBIT_MARGIN).collect()
    } else {
        clean_series(
            &in_millions(&snapshot.operating_income),
            years,
            ASSUMED_GROWTH,
        )
    };

    let current_share_price = snapshot
        .current_price
        .filter(|p| p.is_finite() && *p > 0.0)
        .ok_or_else(|| MarketDataError::Missing {
            what: "current share price",
            ticker: snapshot.ticker.clone(),
        })?;
    let shares_outstanding = snapshot
        .shares_outstanding
        .filter(|s| s.is_finite() && *s > 0.0)
        .ok_or_else(|| MarketDataError::Missing {
            what: "shares outstanding",
            ticker: snapshot.ticker.clone(),
        })?;

    let beta = snapshot
        .beta
        .filter(|b| b.is_finite() && *b > 0.0)
        .unwrap_or_else(|| {
            debug!(ticker = %snapshot.ticker, beta = DEFAULT_BETA, "using default beta");
            DEFAULT_BETA
        });

    let debt = non_negative_millions(snapshot.total_debt);
    let cash = non_negative_millions(snapshot.cash);
    let debt_to_equity = match (snapshot.total_debt, snapshot.stockholders_equity) {
        (Some(debt), Some(equity)) if debt >= 0.0 && equity > 0.0 => debt / equity,
        _ => defaults.debt_to_equity,
    };

    Ok(ValuationInput {
        taxes: vec![DEFAULT_TAX_RATE; years],
        d_and_a: revenue.iter().map(|r| r * D_AND_A_SHARE).collect(),
        capital_expenditure: revenue.iter().map(|r| r * CAPEX_SHARE).collect(),
        change_in_net_working_capital: revenue.iter().map(|r| r * NWC_SHARE).collect(),
        revenue,
        ebit,
        perpetual_growth_rate: PERPETUAL_GROWTH_RATE,
        exit_multiple: defaults.exit_multiple,
        weight_perpetuity: defaults.weight_perpetuity,
        risk_free_rate: defaults.risk_free_rate,
        market_risk_premium: MARKET_RISK_PREMIUM,
        beta,
        debt_to_equity,
        debt,
        cash,
        shares_outstanding,
        projection_years,
        current_share_price,
        unit_multiplier: UnitMultiplier::Millions,
    })
}

fn in_millions(values: &[f64]) -> Vec<f64> {
    values.iter().map(|v| v / MILLIONS).collect()
}

fn non_negative_millions(value: Option<f64>) -> f64 {
    value
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map_or(0.0, |v| v / MILLIONS)
}
