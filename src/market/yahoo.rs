use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::blocking::Client;
use serde_json::Value;
use tracing::{debug, warn};

use super::{MarketDataError, MarketDataProvider, MarketSnapshot};

const TIMESERIES_URL: &str =
    "https://query2.finance.yahoo.com/ws/fundamentals-timeseries/v1/finance/timeseries";
const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const QUOTE_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const KEY_STATISTICS_MODULES: &str = "defaultKeyStatistics,summaryDetail";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) dcf/0.1";
// 1985-08-23, well before any annual filing the endpoint serves.
const PERIOD_START: u64 = 493_590_046;

const REVENUE: &str = "annualTotalRevenue";
const OPERATING_INCOME: &str = "annualOperatingIncome";
const SHARES: &str = "annualOrdinarySharesNumber";
const TOTAL_DEBT: &str = "annualTotalDebt";
const CASH: &str = "annualCashAndCashEquivalents";
const EQUITY: &str = "annualStockholdersEquity";

const FUNDAMENTALS: [&str; 6] = [REVENUE, OPERATING_INCOME, SHARES, TOTAL_DEBT, CASH, EQUITY];

/// Must only be used off the async runtime; the blocking client owns its own.
pub struct YahooProvider {
    timeout: Duration,
}

impl YahooProvider {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn client(&self) -> Result<Client, MarketDataError> {
        Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.timeout)
            .build()
            .map_err(|e| MarketDataError::Client(e.to_string()))
    }

    fn get_json(
        &self,
        client: &Client,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, MarketDataError> {
        let resp = client
            .get(url)
            .query(query)
            .send()
            .map_err(|e| MarketDataError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(MarketDataError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }

        resp.json()
            .map_err(|e| MarketDataError::Parse(format!("{url}: {e}")))
    }
}

impl MarketDataProvider for YahooProvider {
    fn fetch(&self, ticker: &str) -> Result<MarketSnapshot, MarketDataError> {
        let client = self.client()?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
            .to_string();
        let types = FUNDAMENTALS.join(",");
        let period_start = PERIOD_START.to_string();

        debug!(ticker, "fetching fundamentals");
        let fundamentals = self.get_json(
            &client,
            &format!("{TIMESERIES_URL}/{ticker}"),
            &[
                ("symbol", ticker),
                ("type", types.as_str()),
                ("period1", period_start.as_str()),
                ("period2", now.as_str()),
            ],
        )?;
        let mut series = parse_timeseries(&fundamentals)?;

        debug!(ticker, "fetching quote");
        let chart = self.get_json(
            &client,
            &format!("{CHART_URL}/{ticker}"),
            &[("range", "5d"), ("interval", "1d")],
        )?;

        debug!(ticker, "fetching key statistics");
        let statistics = match self.get_json(
            &client,
            &format!("{QUOTE_SUMMARY_URL}/{ticker}"),
            &[("modules", KEY_STATISTICS_MODULES)],
        ) {
            Ok(body) => parse_key_statistics(&body),
            Err(err) => {
                warn!(ticker, %err, "key statistics unavailable, using fallbacks");
                KeyStatistics::default()
            }
        };

        let latest = |key: &str| series.get(key).and_then(|values| values.last().copied());
        let shares_outstanding = statistics.shares_outstanding.or_else(|| latest(SHARES));
        let total_debt = latest(TOTAL_DEBT);
        let cash = latest(CASH);
        let stockholders_equity = latest(EQUITY);

        Ok(MarketSnapshot {
            ticker: ticker.to_string(),
            revenue: series.remove(REVENUE).unwrap_or_default(),
            operating_income: series.remove(OPERATING_INCOME).unwrap_or_default(),
            current_price: parse_chart_price(&chart),
            shares_outstanding,
            beta: statistics.beta,
            total_debt,
            cash,
            stockholders_equity,
        })
    }
}

/// Maps each reported type to its values, oldest first. Null points and
/// unparseable amounts are skipped.
pub(crate) fn parse_timeseries(body: &Value) -> Result<HashMap<String, Vec<f64>>, MarketDataError> {
    let results = body
        .pointer("/timeseries/result")
        .and_then(Value::as_array)
        .ok_or_else(|| MarketDataError::Parse("timeseries response has no result".into()))?;

    let mut out = HashMap::new();
    for entry in results {
        let Some(kind) = entry.pointer("/meta/type/0").and_then(Value::as_str) else {
            continue;
        };
        let Some(points) = entry.get(kind).and_then(Value::as_array) else {
            continue;
        };

        let mut dated: Vec<(&str, f64)> = points
            .iter()
            .filter_map(|point| {
                let date = point.get("asOfDate")?.as_str()?;
                let amount = parse_amount(point.pointer("/reportedValue/raw")?)?;
                Some((date, amount))
            })
            .collect();
        dated.sort_by(|a, b| a.0.cmp(b.0));
        out.insert(
            kind.to_string(),
            dated.into_iter().map(|(_, amount)| amount).collect(),
        );
    }
    Ok(out)
}

#[derive(Debug, Default, PartialEq)]
pub(crate) struct KeyStatistics {
    pub beta: Option<f64>,
    pub shares_outstanding: Option<f64>,
}

// Yahoo wraps figures as `{"raw": .., "fmt": ..}` and sends `{}` when it has none.
pub(crate) fn parse_key_statistics(body: &Value) -> KeyStatistics {
    let Some(result) = body.pointer("/quoteSummary/result/0") else {
        return KeyStatistics::default();
    };
    let stat = |module: &str, key: &str| {
        let value = result.get(module)?.get(key)?;
        parse_amount(value.get("raw").unwrap_or(value))
    };

    KeyStatistics {
        beta: stat("defaultKeyStatistics", "beta").or_else(|| stat("summaryDetail", "beta")),
        shares_outstanding: stat("defaultKeyStatistics", "sharesOutstanding")
            .filter(|shares| *shares > 0.0),
    }
}

pub(crate) fn parse_chart_price(body: &Value) -> Option<f64> {
    let result = body.pointer("/chart/result/0")?;
    let price = result
        .pointer("/meta/regularMarketPrice")
        .and_then(parse_amount)
        .filter(|p| *p > 0.0);
    price.or_else(|| {
        result
            .pointer("/indicators/quote/0/close")?
            .as_array()?
            .iter()
            .rev()
            .find_map(parse_amount)
    })
}

fn parse_amount(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok()?,
        _ => return None,
    };
    amount.is_finite().then_some(amount)
}
