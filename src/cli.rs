use std::io::Read;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::api::{self, AppState, DEFAULT_ALLOWED_ORIGINS, ServerConfig, ServerError};
use crate::core::{ValuationError, run_valuation};
use crate::logging::{LogFormat, init_logging};
use crate::market::{FetchDefaults, MarketDataError, YahooProvider, fetch_input};

#[derive(Parser, Debug)]
#[command(
    name = "dcf",
    version,
    about = "Discounted cash flow equity valuation (HTTP API, one-shot CLI, market data fetch)"
)]
pub struct Cli {
    #[arg(long, global = true, env = "DCF_LOG_LEVEL", default_value = "info")]
    log_level: String,
    #[arg(
        long,
        global = true,
        env = "DCF_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Pretty
    )]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the valuation API over HTTP
    Serve(ServeArgs),
    /// Value a JSON input document and print the result
    Value(ValueArgs),
    /// Fetch public market data for a ticker and print a valuation input
    Fetch(FetchArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, env = "DCF_HOST", default_value = "127.0.0.1")]
    host: IpAddr,
    #[arg(long, env = "DCF_PORT", default_value_t = 8000)]
    port: u16,
    #[arg(
        long = "allowed-origin",
        env = "DCF_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_values = DEFAULT_ALLOWED_ORIGINS,
        help = "Origin allowed to call the API with credentials; repeat or comma-separate"
    )]
    allowed_origins: Vec<String>,
    #[command(flatten)]
    assumptions: AssumptionArgs,
}

#[derive(Args, Debug)]
struct ValueArgs {
    #[arg(help = "Input JSON file; reads stdin when omitted or '-'")]
    input: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct FetchArgs {
    #[arg(help = "Ticker symbol, e.g. AAPL")]
    ticker: String,
    #[command(flatten)]
    assumptions: AssumptionArgs,
}

/// Valuation assumptions that no market data provider reports.
#[derive(Args, Debug, Clone)]
struct AssumptionArgs {
    #[arg(long, default_value_t = 6, help = "Years of history/backfill per series")]
    years: usize,
    #[arg(long, help = "Projection horizon; defaults to --years")]
    projection_years: Option<u32>,
    #[arg(long, default_value_t = 12.0)]
    exit_multiple: f64,
    #[arg(
        long,
        default_value_t = 0.5,
        help = "Weight of the perpetuity growth method in the terminal value"
    )]
    weight_perpetuity: f64,
    #[arg(long, default_value_t = 0.0375)]
    risk_free_rate: f64,
    #[arg(
        long,
        default_value_t = 0.25,
        help = "Debt-to-equity used when the provider has no balance sheet"
    )]
    debt_to_equity: f64,
    #[arg(long, default_value_t = 10, help = "Provider request timeout in seconds")]
    timeout_secs: u64,
}

impl AssumptionArgs {
    fn fetch_defaults(&self) -> FetchDefaults {
        FetchDefaults {
            years: self.years,
            projection_years: self.projection_years,
            exit_multiple: self.exit_multiple,
            weight_perpetuity: self.weight_perpetuity,
            risk_free_rate: self.risk_free_rate,
            debt_to_equity: self.debt_to_equity,
        }
    }

    fn provider(&self) -> YahooProvider {
        YahooProvider::new(Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Valuation(#[from] ValuationError),
    #[error(transparent)]
    MarketData(#[from] MarketDataError),
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to write output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("background task failed: {0}")]
    Task(String),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Valuation(ValuationError::Validation(_)) => 2,
            CliError::Valuation(ValuationError::MathematicalDomain(_)) => 3,
            CliError::MarketData(_) => 4,
            _ => 1,
        }
    }
}

pub async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Value(args) => value(args),
        Command::Fetch(args) => fetch(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<(), CliError> {
    info!("DCF valuation service v{}", env!("CARGO_PKG_VERSION"));
    let state = AppState::new(
        Arc::new(args.assumptions.provider()),
        args.assumptions.fetch_defaults(),
    );
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        allowed_origins: args.allowed_origins,
    };
    api::run_http_server(config, state).await?;
    Ok(())
}

fn value(args: ValueArgs) -> Result<(), CliError> {
    let raw = match args.input.as_deref() {
        Some(path) if path.as_os_str() != "-" => std::fs::read(path)?,
        _ => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };

    let input = api::input_from_json(&raw).map_err(ValuationError::from)?;
    let result = run_valuation(&input)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn fetch(args: FetchArgs) -> Result<(), CliError> {
    let provider = args.assumptions.provider();
    let defaults = args.assumptions.fetch_defaults();
    let ticker = args.ticker;

    // The blocking HTTP client must stay off the async workers.
    let input = tokio::task::spawn_blocking(move || fetch_input(&provider, &ticker, &defaults))
        .await
        .map_err(|e| CliError::Task(e.to_string()))??;

    println!("{}", serde_json::to_string_pretty(&input)?);
    Ok(())
}
