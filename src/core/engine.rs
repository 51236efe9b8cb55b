use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use tracing::debug;

use super::error::{ValidationError, ValuationError};
use super::types::{ValuationInput, ValuationResult, YearBreakdown};

pub const COST_OF_DEBT: f64 = 0.05;

const WACC_MEMO_LIMIT: usize = 4096;

type WaccKey = [u64; 4];

pub fn run_valuation(input: &ValuationInput) -> Result<ValuationResult, ValuationError> {
    validate_input(input)?;

    let years = input.projection_years as usize;
    let free_cash_flows = project_free_cash_flows(
        &input.revenue[..years],
        &input.ebit[..years],
        &input.taxes[..years],
        &input.d_and_a[..years],
        &input.capital_expenditure[..years],
        &input.change_in_net_working_capital[..years],
        years,
    )?;

    let wacc = ensure_finite(
        "wacc",
        compute_wacc(
            input.risk_free_rate,
            input.market_risk_premium,
            input.beta,
            input.debt_to_equity,
        ),
    )?;
    if wacc <= input.perpetual_growth_rate {
        return Err(ValuationError::domain(format!(
            "wacc ({wacc}) must exceed perpetual_growth_rate ({}); the perpetuity growth terminal value is undefined",
            input.perpetual_growth_rate
        )));
    }

    let last_free_cash_flow = *free_cash_flows
        .last()
        .ok_or_else(|| ValuationError::Unexpected("no free cash flows were projected".into()))?;
    let terminal_value = compute_terminal_value(
        last_free_cash_flow,
        input.perpetual_growth_rate,
        input.exit_multiple,
        input.weight_perpetuity,
        wacc,
    )?;

    let discounted_cash_flows =
        discount_series(&free_cash_flows, wacc, 1, input.projection_years)?;
    let discounted_terminal_value = ensure_finite(
        "discounted_terminal_value",
        terminal_value * discount_factor(wacc, input.projection_years),
    )?;

    let total_present_value = ensure_finite(
        "total_present_value",
        discounted_cash_flows.iter().sum::<f64>() + discounted_terminal_value,
    )?;
    let enterprise_value = ensure_finite(
        "enterprise_value",
        compute_enterprise_value(total_present_value, input.debt, input.cash),
    )?;
    let implied_share_price = ensure_finite(
        "implied_share_price",
        price_per_share(enterprise_value, input.shares_outstanding)?
            * input.unit_multiplier.factor(),
    )?;
    let upside_percent = ensure_finite(
        "upside_percent",
        (implied_share_price - input.current_share_price) / input.current_share_price * 100.0,
    )?;

    let schedule = free_cash_flows
        .iter()
        .zip(&discounted_cash_flows)
        .zip(1..=input.projection_years)
        .map(|((&free_cash_flow, &present_value), year)| YearBreakdown {
            year,
            free_cash_flow,
            discount_factor: discount_factor(wacc, year),
            present_value,
        })
        .collect();

    debug!(
        wacc,
        terminal_value,
        discounted_terminal_value,
        enterprise_value,
        implied_share_price,
        "valuation computed"
    );

    Ok(ValuationResult {
        implied_share_price,
        discounted_cash_flows,
        terminal_value,
        discounted_terminal_value,
        wacc,
        enterprise_value,
        upside_percent,
        schedule,
    })
}

pub fn validate_input(input: &ValuationInput) -> Result<(), ValidationError> {
    let mut errors = ValidationError::default();
    let years = input.projection_years as usize;

    if input.projection_years == 0 {
        errors.push("projection_years", "must be > 0");
    }

    for (field, values) in input.series() {
        if values.len() < years {
            errors.push(
                field,
                format!(
                    "is shorter than projection_years ({} < {years})",
                    values.len()
                ),
            );
        }
        if values.iter().any(|v| !v.is_finite()) {
            errors.push(field, "must contain only finite numbers");
        }
    }
    if input
        .taxes
        .iter()
        .any(|rate| rate.is_finite() && !(0.0..=1.0).contains(rate))
    {
        errors.push("taxes", "entries must be within [0, 1]");
    }

    check_range(
        &mut errors,
        "perpetual_growth_rate",
        input.perpetual_growth_rate,
        -1.0,
        1.0,
    );
    check_positive(&mut errors, "exit_multiple", input.exit_multiple);
    check_range(
        &mut errors,
        "weight_perpetuity",
        input.weight_perpetuity,
        0.0,
        1.0,
    );
    check_range(&mut errors, "risk_free_rate", input.risk_free_rate, 0.0, 1.0);
    check_positive(&mut errors, "market_risk_premium", input.market_risk_premium);
    check_positive(&mut errors, "beta", input.beta);
    check_non_negative(&mut errors, "debt_to_equity", input.debt_to_equity);
    check_non_negative(&mut errors, "debt", input.debt);
    check_non_negative(&mut errors, "cash", input.cash);
    check_positive(&mut errors, "shares_outstanding", input.shares_outstanding);
    check_positive(&mut errors, "current_share_price", input.current_share_price);

    errors.into_result()
}

fn check_positive(errors: &mut ValidationError, field: &str, value: f64) {
    if !(value.is_finite() && value > 0.0) {
        errors.push(field, "must be a finite number > 0");
    }
}

fn check_non_negative(errors: &mut ValidationError, field: &str, value: f64) {
    if !(value.is_finite() && value >= 0.0) {
        errors.push(field, "must be a finite number >= 0");
    }
}

fn check_range(errors: &mut ValidationError, field: &str, value: f64, lo: f64, hi: f64) {
    if !(lo..=hi).contains(&value) {
        errors.push(field, format!("must be within [{lo}, {hi}]"));
    }
}

fn ensure_finite(label: &str, value: f64) -> Result<f64, ValuationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ValuationError::domain(format!(
            "{label} evaluated to a non-finite value"
        )))
    }
}

pub fn project_free_cash_flows(
    revenue: &[f64],
    ebit: &[f64],
    taxes: &[f64],
    d_and_a: &[f64],
    capital_expenditure: &[f64],
    change_in_net_working_capital: &[f64],
    years: usize,
) -> Result<Vec<f64>, ValuationError> {
    let mut errors = ValidationError::default();
    if years == 0 {
        errors.push("projection_years", "must be > 0");
    }
    for (field, values) in [
        ("revenue", revenue),
        ("ebit", ebit),
        ("taxes", taxes),
        ("d_and_a", d_and_a),
        ("capital_expenditure", capital_expenditure),
        (
            "change_in_net_working_capital",
            change_in_net_working_capital,
        ),
    ] {
        if values.len() < years {
            errors.push(
                field,
                format!(
                    "is shorter than projection_years ({} < {years})",
                    values.len()
                ),
            );
        }
    }
    errors.into_result()?;

    Ok((0..years)
        .map(|i| {
            let net_income = ebit[i] * (1.0 - taxes[i]);
            net_income + d_and_a[i] - capital_expenditure[i] - change_in_net_working_capital[i]
        })
        .collect())
}

pub fn compute_wacc(
    risk_free_rate: f64,
    market_risk_premium: f64,
    beta: f64,
    debt_to_equity: f64,
) -> f64 {
    let key: WaccKey =
        [risk_free_rate, market_risk_premium, beta, debt_to_equity].map(|v| (v + 0.0).to_bits());

    if let Ok(memo) = wacc_memo().lock() {
        if let Some(&wacc) = memo.get(&key) {
            return wacc;
        }
    }

    let wacc = wacc_formula(risk_free_rate, market_risk_premium, beta, debt_to_equity);

    // A poisoned lock only costs the memo entry.
    if let Ok(mut memo) = wacc_memo().lock() {
        if memo.len() >= WACC_MEMO_LIMIT {
            memo.clear();
        }
        memo.insert(key, wacc);
    }
    wacc
}

fn wacc_memo() -> &'static Mutex<HashMap<WaccKey, f64>> {
    static MEMO: OnceLock<Mutex<HashMap<WaccKey, f64>>> = OnceLock::new();
    MEMO.get_or_init(|| Mutex::new(HashMap::new()))
}

fn wacc_formula(
    risk_free_rate: f64,
    market_risk_premium: f64,
    beta: f64,
    debt_to_equity: f64,
) -> f64 {
    let cost_of_equity = risk_free_rate + beta * market_risk_premium;
    let equity_weight = 1.0 / (1.0 + debt_to_equity);
    let debt_weight = debt_to_equity / (1.0 + debt_to_equity);
    cost_of_equity * equity_weight + COST_OF_DEBT * debt_weight
}

pub fn compute_terminal_value(
    last_free_cash_flow: f64,
    perpetual_growth_rate: f64,
    exit_multiple: f64,
    weight_perpetuity: f64,
    wacc: f64,
) -> Result<f64, ValuationError> {
    if !(wacc > perpetual_growth_rate) {
        return Err(ValuationError::domain(format!(
            "wacc ({wacc}) must exceed perpetual_growth_rate ({perpetual_growth_rate})"
        )));
    }

    let perpetuity = ensure_finite(
        "perpetuity growth terminal value",
        last_free_cash_flow * (1.0 + perpetual_growth_rate) / (wacc - perpetual_growth_rate),
    )?;
    let multiple = last_free_cash_flow * exit_multiple;
    ensure_finite(
        "terminal_value",
        weight_perpetuity * perpetuity + (1.0 - weight_perpetuity) * multiple,
    )
}

pub fn discount_factor(wacc: f64, year: u32) -> f64 {
    1.0 / (1.0 + wacc).powf(f64::from(year))
}

/// Discounts `values[k]` as the cash flow of year `start_year + k`, for every
/// year in `start_year..=end_year`.
pub fn discount_series(
    values: &[f64],
    wacc: f64,
    start_year: u32,
    end_year: u32,
) -> Result<Vec<f64>, ValuationError> {
    if start_year > end_year {
        return Err(ValidationError::single(
            "start_year",
            format!("must be <= end_year ({start_year} > {end_year})"),
        )
        .into());
    }
    let span = (end_year - start_year) as usize + 1;
    if values.len() != span {
        return Err(ValidationError::single(
            "values",
            format!(
                "has {} entries but years {start_year}..={end_year} need {span}",
                values.len()
            ),
        )
        .into());
    }

    values
        .iter()
        .zip(start_year..=end_year)
        .map(|(&value, year)| {
            ensure_finite("discounted cash flow", value * discount_factor(wacc, year))
        })
        .collect()
}

pub fn compute_implied_share_price(
    total_present_value: f64,
    debt: f64,
    cash: f64,
    shares_outstanding: f64,
) -> Result<f64, ValuationError> {
    price_per_share(
        compute_enterprise_value(total_present_value, debt, cash),
        shares_outstanding,
    )
}

// Debt is added and cash subtracted, matching how results have always been quoted.
pub fn compute_enterprise_value(total_present_value: f64, debt: f64, cash: f64) -> f64 {
    total_present_value + debt - cash
}

fn price_per_share(enterprise_value: f64, shares_outstanding: f64) -> Result<f64, ValuationError> {
    if !(shares_outstanding > 0.0) {
        return Err(ValidationError::single("shares_outstanding", "must be a finite number > 0").into());
    }
    Ok(enterprise_value / shares_outstanding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::UnitMultiplier;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS * expected.abs().max(1.0),
            "expected {expected}, got {actual}"
        );
    }

    fn sample_input() -> ValuationInput {
        ValuationInput {
            revenue: vec![1000.0; 5],
            ebit: vec![200.0; 5],
            taxes: vec![0.21; 5],
            d_and_a: vec![50.0; 5],
            capital_expenditure: vec![70.0; 5],
            change_in_net_working_capital: vec![20.0; 5],
            perpetual_growth_rate: 0.025,
            exit_multiple: 8.0,
            weight_perpetuity: 0.5,
            risk_free_rate: 0.04,
            market_risk_premium: 0.055,
            beta: 1.1,
            debt_to_equity: 0.3,
            debt: 500.0,
            cash: 200.0,
            shares_outstanding: 100.0,
            projection_years: 5,
            current_share_price: 20.0,
            unit_multiplier: UnitMultiplier::Ones,
        }
    }

    #[test]
    fn free_cash_flow_is_after_tax_ebit_plus_da_less_capex_and_nwc() {
        let fcf = project_free_cash_flows(
            &[1000.0, 1100.0],
            &[200.0, 300.0],
            &[0.21, 0.25],
            &[50.0, 60.0],
            &[70.0, 80.0],
            &[20.0, 10.0],
            2,
        )
        .expect("valid series");
        assert_eq!(fcf.len(), 2);
        assert_approx(fcf[0], 200.0 * 0.79 + 50.0 - 70.0 - 20.0);
        assert_approx(fcf[1], 300.0 * 0.75 + 60.0 - 80.0 - 10.0);
    }

    #[test]
    fn free_cash_flows_consume_only_the_first_years() {
        let fcf = project_free_cash_flows(
            &[1.0, 2.0, 3.0],
            &[100.0, 100.0, 9_999.0],
            &[0.0, 0.0, 0.0],
            &[0.0, 0.0, 0.0],
            &[0.0, 0.0, 0.0],
            &[0.0, 0.0, 0.0],
            2,
        )
        .expect("valid series");
        assert_eq!(fcf, vec![100.0, 100.0]);
    }

    #[test]
    fn free_cash_flows_reject_short_series() {
        let err = project_free_cash_flows(
            &[1.0; 3],
            &[1.0; 2],
            &[0.2; 3],
            &[1.0; 3],
            &[1.0; 3],
            &[1.0; 3],
            3,
        )
        .expect_err("ebit is too short");
        let ValuationError::Validation(validation) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(validation.mentions("ebit"));
        assert_eq!(validation.violations.len(), 1);
    }

    #[test]
    fn wacc_matches_capital_weighted_blend() {
        let wacc = compute_wacc(0.04, 0.055, 1.1, 0.3);
        let cost_of_equity = 0.04 + 1.1 * 0.055;
        assert_approx(wacc, cost_of_equity / 1.3 + COST_OF_DEBT * 0.3 / 1.3);
        assert_approx(wacc, 0.1155 / 1.3);
    }

    #[test]
    fn wacc_without_debt_is_cost_of_equity() {
        assert_approx(compute_wacc(0.03, 0.06, 1.0, 0.0), 0.09);
    }

    #[test]
    fn wacc_treats_negative_zero_like_zero() {
        let a = compute_wacc(0.02, 0.05, 0.9, 0.0);
        let b = compute_wacc(0.02, 0.05, 0.9, -0.0);
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn terminal_value_rejects_wacc_equal_to_growth() {
        let err = compute_terminal_value(100.0, 0.08, 10.0, 0.5, 0.08)
            .expect_err("zero denominator must not produce infinity");
        assert!(matches!(err, ValuationError::MathematicalDomain(_)));
    }

    #[test]
    fn terminal_value_rejects_wacc_below_growth() {
        let err = compute_terminal_value(100.0, 0.10, 10.0, 1.0, 0.08)
            .expect_err("negative denominator");
        assert!(matches!(err, ValuationError::MathematicalDomain(_)));
    }

    #[test]
    fn terminal_value_blends_both_methods() {
        let tv = compute_terminal_value(100.0, 0.02, 10.0, 0.25, 0.1).expect("valid");
        let perpetuity = 100.0 * 1.02 / 0.08;
        assert_approx(tv, 0.25 * perpetuity + 0.75 * 1_000.0);
    }

    #[test]
    fn discount_series_uses_end_of_year_factors() {
        let discounted = discount_series(&[110.0, 121.0], 0.1, 1, 2).expect("valid span");
        assert_approx(discounted[0], 100.0);
        assert_approx(discounted[1], 100.0);
    }

    #[test]
    fn discount_series_rejects_mismatched_span() {
        let err = discount_series(&[1.0, 2.0], 0.1, 1, 3).expect_err("span is 3 years");
        assert!(matches!(err, ValuationError::Validation(_)));
        let err = discount_series(&[1.0], 0.1, 4, 3).expect_err("inverted span");
        assert!(matches!(err, ValuationError::Validation(_)));
    }

    #[test]
    fn implied_share_price_adds_debt_and_subtracts_cash() {
        let price = compute_implied_share_price(1_000.0, 500.0, 200.0, 100.0).expect("valid");
        assert_approx(price, 13.0);
    }

    #[test]
    fn implied_share_price_rejects_zero_shares() {
        let err = compute_implied_share_price(1_000.0, 0.0, 0.0, 0.0).expect_err("zero shares");
        assert!(matches!(err, ValuationError::Validation(_)));
    }

    #[test]
    fn run_valuation_reproduces_reference_scenario() {
        let input = sample_input();
        let result = run_valuation(&input).expect("valid scenario");

        let wacc: f64 = (0.04 + 1.1 * 0.055) / 1.3 + 0.05 * 0.3 / 1.3;
        let fcf = 200.0 * (1.0 - 0.21) + 50.0 - 70.0 - 20.0;
        let perpetuity = fcf * 1.025 / (wacc - 0.025);
        let terminal_value = 0.5 * perpetuity + 0.5 * fcf * 8.0;
        let discounted: Vec<f64> = (1..=5)
            .map(|year| fcf / (1.0 + wacc).powi(year))
            .collect();
        let discounted_terminal = terminal_value / (1.0 + wacc).powi(5);
        let total = discounted.iter().sum::<f64>() + discounted_terminal;
        let implied = (total + 500.0 - 200.0) / 100.0;

        assert_approx(result.wacc, wacc);
        assert_approx(result.terminal_value, terminal_value);
        assert_approx(result.discounted_terminal_value, discounted_terminal);
        assert_eq!(result.discounted_cash_flows.len(), 5);
        for (actual, expected) in result.discounted_cash_flows.iter().zip(&discounted) {
            assert_approx(*actual, *expected);
        }
        assert_approx(result.enterprise_value, total + 300.0);
        assert_approx(result.implied_share_price, implied);
        assert_approx(result.upside_percent, (implied - 20.0) / 20.0 * 100.0);
    }

    #[test]
    fn run_valuation_schedule_lines_up_with_discounted_flows() {
        let result = run_valuation(&sample_input()).expect("valid scenario");
        assert_eq!(result.schedule.len(), 5);
        for (idx, row) in result.schedule.iter().enumerate() {
            assert_eq!(row.year, idx as u32 + 1);
            assert_approx(row.present_value, result.discounted_cash_flows[idx]);
            assert_approx(row.free_cash_flow * row.discount_factor, row.present_value);
        }
        let last = result.schedule.last().expect("five rows");
        assert_approx(
            result.terminal_value * last.discount_factor,
            result.discounted_terminal_value,
        );
    }

    #[test]
    fn run_valuation_scales_price_by_unit_multiplier() {
        let ones = run_valuation(&sample_input()).expect("valid");
        let mut input = sample_input();
        input.unit_multiplier = UnitMultiplier::Millions;
        input.shares_outstanding = 100_000_000.0;
        let millions = run_valuation(&input).expect("valid");
        assert_approx(millions.implied_share_price, ones.implied_share_price);
        assert_approx(millions.enterprise_value, ones.enterprise_value);
    }

    #[test]
    fn run_valuation_rejects_short_series_before_arithmetic() {
        let mut input = sample_input();
        input.capital_expenditure.truncate(3);
        input.perpetual_growth_rate = 0.5;
        let err = run_valuation(&input).expect_err("short capex");
        let ValuationError::Validation(validation) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(validation.mentions("capital_expenditure"));
    }

    #[test]
    fn run_valuation_reports_every_violation() {
        let mut input = sample_input();
        input.weight_perpetuity = 1.5;
        input.beta = 0.0;
        input.shares_outstanding = -1.0;
        input.taxes[1] = 1.2;
        input.projection_years = 0;
        let err = run_valuation(&input).expect_err("many violations");
        let ValuationError::Validation(validation) = err else {
            panic!("expected validation error, got {err:?}");
        };
        for field in [
            "weight_perpetuity",
            "beta",
            "shares_outstanding",
            "taxes",
            "projection_years",
        ] {
            assert!(validation.mentions(field), "missing violation for {field}");
        }
    }

    #[test]
    fn run_valuation_rejects_non_finite_series_entries() {
        let mut input = sample_input();
        input.d_and_a[0] = f64::NAN;
        let err = run_valuation(&input).expect_err("NaN entry");
        let ValuationError::Validation(validation) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(validation.mentions("d_and_a"));
    }

    #[test]
    fn run_valuation_raises_domain_error_when_wacc_equals_growth() {
        let mut input = sample_input();
        input.perpetual_growth_rate = compute_wacc(
            input.risk_free_rate,
            input.market_risk_premium,
            input.beta,
            input.debt_to_equity,
        );
        let err = run_valuation(&input).expect_err("undefined terminal value");
        assert!(matches!(err, ValuationError::MathematicalDomain(_)));
    }

    #[test]
    fn run_valuation_reports_overflowing_terminal_value_as_domain_error() {
        let mut input = sample_input();
        input.projection_years = 2;
        input.ebit = vec![1e308; 2];
        input.d_and_a = vec![1e308; 2];
        let err = run_valuation(&input).expect_err("perpetuity value overflows");
        let ValuationError::MathematicalDomain(message) = err else {
            panic!("expected domain error, got {err:?}");
        };
        assert!(message.contains("non-finite"), "{message}");
    }

    #[test]
    fn run_valuation_reports_overflowing_share_price_as_domain_error() {
        let mut input = sample_input();
        input.ebit = vec![1e300; 5];
        input.shares_outstanding = 1.0;
        input.unit_multiplier = UnitMultiplier::Billions;
        let err = run_valuation(&input).expect_err("price overflows once scaled");
        let ValuationError::MathematicalDomain(message) = err else {
            panic!("expected domain error, got {err:?}");
        };
        assert!(message.contains("implied_share_price"), "{message}");
    }

    #[test]
    fn implied_price_divides_reported_enterprise_value() {
        let result = run_valuation(&sample_input()).expect("valid");
        assert_approx(result.implied_share_price, result.enterprise_value / 100.0);
        assert_approx(compute_enterprise_value(1_000.0, 500.0, 200.0), 1_300.0);
    }

    #[test]
    fn run_valuation_is_idempotent() {
        let input = sample_input();
        let first = run_valuation(&input).expect("valid");
        let second = run_valuation(&input).expect("valid");
        assert_eq!(first.implied_share_price.to_bits(), second.implied_share_price.to_bits());
        assert_eq!(first, second);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_discounting_shrinks_with_each_year(
            value in -1.0e6f64..1.0e6,
            wacc in 0.001f64..0.5,
            years in 2u32..40,
        ) {
            proptest::prop_assume!(value.abs() > 1e-3);
            let values = vec![value; years as usize];
            let discounted = discount_series(&values, wacc, 1, years).expect("valid span");
            for pair in discounted.windows(2) {
                prop_assert!(pair[1].abs() < pair[0].abs());
            }
        }

        #[test]
        fn prop_wacc_is_stable_across_calls(
            risk_free_rate in 0.0f64..=1.0,
            market_risk_premium in 0.001f64..0.2,
            beta in 0.01f64..4.0,
            debt_to_equity in 0.0f64..5.0,
        ) {
            let first = compute_wacc(risk_free_rate, market_risk_premium, beta, debt_to_equity);
            for _ in 0..3 {
                let again = compute_wacc(risk_free_rate, market_risk_premium, beta, debt_to_equity);
                prop_assert_eq!(first.to_bits(), again.to_bits());
            }
            let direct = wacc_formula(risk_free_rate, market_risk_premium, beta, debt_to_equity);
            prop_assert_eq!(first.to_bits(), direct.to_bits());
        }

        #[test]
        fn prop_terminal_weight_extremes_select_a_single_method(
            last_fcf in -1.0e6f64..1.0e6,
            growth in -0.5f64..0.05,
            exit_multiple in 0.1f64..40.0,
            wacc in 0.06f64..0.4,
        ) {
            let perpetuity_only = compute_terminal_value(last_fcf, growth, exit_multiple, 1.0, wacc)
                .expect("wacc above growth");
            let expected = last_fcf * (1.0 + growth) / (wacc - growth);
            prop_assert_eq!(perpetuity_only.to_bits(), expected.to_bits());

            let multiple_only = compute_terminal_value(last_fcf, growth, exit_multiple, 0.0, wacc)
                .expect("wacc above growth");
            prop_assert_eq!(multiple_only.to_bits(), (last_fcf * exit_multiple).to_bits());
        }

        #[test]
        fn prop_run_valuation_is_deterministic(
            ebit in 1.0f64..10_000.0,
            tax in 0.0f64..=1.0,
            growth in -0.5f64..0.03,
            weight in 0.0f64..=1.0,
            beta in 0.1f64..3.0,
            years in 1u32..12,
        ) {
            let mut input = sample_input();
            let n = years as usize;
            input.revenue = vec![ebit * 5.0; n];
            input.ebit = vec![ebit; n];
            input.taxes = vec![tax; n];
            input.d_and_a = vec![ebit * 0.1; n];
            input.capital_expenditure = vec![ebit * 0.2; n];
            input.change_in_net_working_capital = vec![ebit * 0.05; n];
            input.perpetual_growth_rate = growth;
            input.weight_perpetuity = weight;
            input.beta = beta;
            input.projection_years = years;

            let first = run_valuation(&input).expect("valid input");
            let second = run_valuation(&input).expect("valid input");
            prop_assert_eq!(first.discounted_cash_flows.len(), n);
            prop_assert!(first.implied_share_price.is_finite());
            prop_assert_eq!(first, second);
        }
    }
}
