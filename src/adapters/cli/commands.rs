//! CLI Command Handlers
//!
//! Implementation of all CLI commands for the ou-reversion tool.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::adapters::market_data::CsvFileProvider;
use crate::application::{analyze_parameters, compare_methods, MeanReversionPipeline, MethodComparison, ParameterAnalysis};
use crate::backtest::BacktestResult;
use crate::config::{load_config, Config};
use crate::domain::{PriceSeries, Signal};
use crate::ports::{PriceSeriesProvider, SeriesQuery};
use crate::strategy::{estimate, signal_strength, EstimationMethod, OUParameters, OUProcess, StrategyConfig};

/// ou-reversion - Ornstein-Uhlenbeck estimation and mean reversion backtesting
#[derive(Parser, Debug)]
#[command(
    name = "ou-reversion",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Ornstein-Uhlenbeck estimation and mean reversion backtesting",
    long_about = "Fits an Ornstein-Uhlenbeck process to a price series (MLE, AR(1) regression \
                  or OLS on differences), classifies each bar by its stationary z-score and \
                  replays the signals through a long/short backtest."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Estimate OU parameters from a series
    Estimate(EstimateCmd),

    /// Step-by-step MLE derivation, optionally scored against true parameters
    Analyze(AnalyzeCmd),

    /// Decision for the latest bar
    Signal(SignalCmd),

    /// Run the full estimate-classify-backtest pipeline
    Backtest(BacktestCmd),

    /// Write a synthetic OU path to CSV
    Simulate(SimulateCmd),
}

impl Command {
    fn config_path(&self) -> Option<&Path> {
        match self {
            Command::Estimate(cmd) => cmd.data.config.as_deref(),
            Command::Analyze(cmd) => cmd.data.config.as_deref(),
            Command::Signal(cmd) => cmd.data.config.as_deref(),
            Command::Backtest(cmd) => cmd.data.config.as_deref(),
            Command::Simulate(_) => None,
        }
    }
}

/// Output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Series source and shared overrides
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// CSV file with `timestamp,close` or bare `close` rows (default: [data] path or OU_DATA_PATH)
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the sampling interval
    #[arg(long, value_name = "DT")]
    pub dt: Option<f64>,

    /// Use only the most recent N observations
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Estimate parameters
#[derive(Parser, Debug)]
pub struct EstimateCmd {
    #[command(flatten)]
    pub data: DataArgs,

    /// Estimation method: mle, regression or ols
    #[arg(short, long, value_name = "METHOD")]
    pub method: Option<EstimationMethod>,

    /// Run every method and compare
    #[arg(short, long, conflicts_with = "method")]
    pub all: bool,
}

/// Detailed parameter analysis
#[derive(Parser, Debug)]
pub struct AnalyzeCmd {
    #[command(flatten)]
    pub data: DataArgs,

    /// Known theta, for error reporting on synthetic data
    #[arg(long, value_name = "THETA", requires_all = ["true_mu", "true_sigma"])]
    pub true_theta: Option<f64>,

    /// Known mu
    #[arg(long, value_name = "MU", requires = "true_theta")]
    pub true_mu: Option<f64>,

    /// Known sigma
    #[arg(long, value_name = "SIGMA", requires = "true_theta")]
    pub true_sigma: Option<f64>,
}

/// Latest-bar signal
#[derive(Parser, Debug)]
pub struct SignalCmd {
    #[command(flatten)]
    pub data: DataArgs,

    /// Estimation method: mle, regression or ols
    #[arg(short, long, value_name = "METHOD")]
    pub method: Option<EstimationMethod>,

    /// Override the entry threshold
    #[arg(short, long, value_name = "K")]
    pub k: Option<f64>,
}

/// Run backtesting
#[derive(Parser, Debug)]
pub struct BacktestCmd {
    #[command(flatten)]
    pub data: DataArgs,

    /// Estimation method: mle, regression or ols
    #[arg(short, long, value_name = "METHOD")]
    pub method: Option<EstimationMethod>,

    /// Override the entry threshold
    #[arg(short, long, value_name = "K")]
    pub k: Option<f64>,

    /// Override the stop multiplier
    #[arg(long, value_name = "MULT")]
    pub stop_mult: Option<f64>,

    /// Disable short entries
    #[arg(long)]
    pub no_short: bool,

    /// Hold through mu and close on the opposite signal instead
    #[arg(long)]
    pub no_exit_at_mean: bool,

    /// Also stop out on this loss fraction from entry (e.g. 0.2)
    #[arg(long, value_name = "FRACTION")]
    pub stop_loss_pct: Option<f64>,

    /// Annualise the Sharpe ratio with this many periods per year
    #[arg(long, value_name = "N")]
    pub periods_per_year: Option<f64>,

    /// Print the trade log
    #[arg(short, long)]
    pub trades: bool,

    /// Export results to JSON
    #[arg(long, value_name = "FILE")]
    pub export_json: Option<PathBuf>,
}

/// Simulate an OU path
#[derive(Parser, Debug)]
pub struct SimulateCmd {
    /// Mean reversion speed
    #[arg(long, value_name = "THETA")]
    pub theta: f64,

    /// Long-term mean
    #[arg(long, value_name = "MU")]
    pub mu: f64,

    /// Volatility
    #[arg(long, value_name = "SIGMA")]
    pub sigma: f64,

    /// Sampling interval
    #[arg(long, value_name = "DT", default_value = "1.0")]
    pub dt: f64,

    /// Number of observations
    #[arg(short, long, value_name = "N", default_value = "1000")]
    pub n: usize,

    /// Starting value (default: mu)
    #[arg(long, value_name = "X0")]
    pub x0: Option<f64>,

    /// RNG seed
    #[arg(long, value_name = "SEED", default_value = "42")]
    pub seed: u64,

    /// Use Euler-Maruyama instead of the exact transition
    #[arg(long)]
    pub euler: bool,

    /// Output CSV file
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,
}

/// Execute the CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    let config = match app.command.config_path() {
        Some(path) => load_config(path).with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    // Initialize logging based on flags
    init_logging(app.verbose, app.debug, &config.logging.level)?;

    match app.command {
        Command::Estimate(cmd) => estimate_command(cmd, &config).await,
        Command::Analyze(cmd) => analyze_command(cmd, &config).await,
        Command::Signal(cmd) => signal_command(cmd, &config).await,
        Command::Backtest(cmd) => backtest_command(cmd, &config).await,
        Command::Simulate(cmd) => simulate_command(cmd).await,
    }
}

/// Initialize logging system
fn init_logging(verbose: bool, debug: bool, config_level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        config_level
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

/// Resolve configuration, apply `--dt`, and load the series
async fn load_series(data: &DataArgs, config: &Config) -> Result<(StrategyConfig, PriceSeries, String)> {
    let mut strategy = StrategyConfig::from(config);
    if let Some(dt) = data.dt {
        strategy = strategy.with_dt(dt);
    }

    let path = data
        .input
        .clone()
        .or_else(|| config.data.get_path())
        .context("No input series: pass --input or set [data] path / OU_DATA_PATH")?;

    let provider = CsvFileProvider::new(&path, strategy.dt);
    let query = SeriesQuery {
        symbol: config.data.symbol.clone().unwrap_or_default(),
        limit: data.limit.or(config.data.limit),
    };

    let raw = provider
        .fetch_series(&query)
        .await
        .with_context(|| format!("Failed to read series from {}", path.display()))?;
    let symbol = raw.symbol.clone();
    let series = raw
        .into_price_series()
        .with_context(|| format!("Invalid series in {}", path.display()))?;

    tracing::info!(symbol = %symbol, observations = series.len(), dt = series.dt(), "Series loaded");
    Ok((strategy, series, symbol))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Handle estimate command
async fn estimate_command(cmd: EstimateCmd, config: &Config) -> Result<()> {
    let (strategy, series, symbol) = load_series(&cmd.data, config).await?;

    if cmd.all {
        let comparison = compare_methods(&series, None);
        return match cmd.data.format {
            OutputFormat::Json => print_json(&comparison),
            OutputFormat::Text => {
                print_comparison(&symbol, &series, &comparison);
                Ok(())
            }
        };
    }

    let method = cmd.method.unwrap_or(strategy.method);
    let params = estimate(&series, method).with_context(|| format!("{} estimation failed", method))?;

    match cmd.data.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "symbol": symbol,
            "method": method,
            "observations": series.len(),
            "params": params,
            "half_life": params.half_life(),
            "stationary_std": params.stationary_std(),
        })),
        OutputFormat::Text => {
            println!("OU Estimate ({}, {} observations)", symbol, series.len());
            println!("  Method:         {}", method);
            print_params(&params);
            Ok(())
        }
    }
}

fn print_params(params: &OUParameters) {
    println!("  theta:          {:.6}", params.theta);
    println!("  mu:             {:.6}", params.mu);
    println!("  sigma:          {:.6}", params.sigma);
    if let Some(half_life) = params.half_life() {
        println!("  Half-life:      {:.4}", half_life);
    }
    if let Some(std) = params.stationary_std() {
        println!("  Stationary std: {:.6}", std);
    }
}

fn print_comparison(symbol: &str, series: &PriceSeries, comparison: &MethodComparison) {
    println!("Method Comparison ({}, {} observations)", symbol, series.len());
    println!("  {:<12} {:>12} {:>12} {:>12} {:>12}", "method", "theta", "mu", "sigma", "half-life");
    for row in &comparison.rows {
        match (&row.params, &row.error) {
            (Some(p), _) => println!(
                "  {:<12} {:>12.6} {:>12.6} {:>12.6} {:>12.4}",
                row.method.to_string(),
                p.theta,
                p.mu,
                p.sigma,
                row.half_life.unwrap_or(f64::NAN)
            ),
            (None, Some(err)) => println!("  {:<12} FAILED: {}", row.method.to_string(), err),
            (None, None) => {}
        }
        if let Some(errors) = row.errors {
            println!(
                "  {:<12} err% theta {:.2}  mu {:.2}  sigma {:.2}",
                "", errors.theta_pct, errors.mu_pct, errors.sigma_pct
            );
        }
    }
    if let Some(best) = comparison.most_accurate() {
        println!("  Most accurate theta: {}", best);
    }
}

/// Handle analyze command
async fn analyze_command(cmd: AnalyzeCmd, config: &Config) -> Result<()> {
    let (strategy, series, symbol) = load_series(&cmd.data, config).await?;

    let truth = match (cmd.true_theta, cmd.true_mu, cmd.true_sigma) {
        (Some(theta), Some(mu), Some(sigma)) => Some(OUParameters::new(theta, mu, sigma, strategy.dt)),
        _ => None,
    };

    let analysis = analyze_parameters(&series, truth.as_ref()).context("Parameter analysis failed")?;
    let comparison = compare_methods(&series, truth.as_ref());

    match cmd.data.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "symbol": symbol,
            "analysis": analysis,
            "comparison": comparison,
        })),
        OutputFormat::Text => {
            print_analysis(&symbol, &analysis);
            println!();
            print_comparison(&symbol, &series, &comparison);
            Ok(())
        }
    }
}

fn print_analysis(symbol: &str, a: &ParameterAnalysis) {
    println!("======================================");
    println!("    OU Parameter Analysis: {}", symbol);
    println!("======================================");
    println!("  Observations:       {} (dt = {})", a.sample_size, a.dt);
    println!();
    println!("  1. Lag-1 autocorrelation rho = {:.6}", a.rho);
    println!("  2. theta = -ln(rho) / dt     = {:.6}", a.theta);
    println!("     half-life = ln 2 / theta  = {:.4}", a.half_life);
    println!("  3. mu = sample mean          = {:.6}", a.mu);
    println!("  4. e^(-theta dt)             = {:.6}", a.decay);
    println!("     e^(-2 theta dt)           = {:.6}", a.decay_squared);
    println!("     residual sum of squares   = {:.6}", a.residual_sum_squares);
    println!("     denominator               = {:.6}", a.denominator);
    println!("     sigma                     = {:.6}", a.sigma);
    println!("  5. stationary variance       = {:.6}", a.stationary_variance);
    println!("     stationary std            = {:.6}", a.stationary_std);

    if let Some(errors) = a.errors {
        println!();
        println!("  Error vs true parameters:");
        println!("     theta {:.2}%", errors.theta_pct);
        println!("     mu    {:.2}%", errors.mu_pct);
        println!("     sigma {:.2}%", errors.sigma_pct);
    }
}

/// Handle signal command
async fn signal_command(cmd: SignalCmd, config: &Config) -> Result<()> {
    let (mut strategy, series, symbol) = load_series(&cmd.data, config).await?;
    if let Some(method) = cmd.method {
        strategy = strategy.with_method(method);
    }
    if let Some(k) = cmd.k {
        strategy = strategy.with_threshold(k);
    }

    let pipeline = MeanReversionPipeline::new(strategy).context("Invalid strategy configuration")?;
    let params = pipeline.fit(&series)?;
    let signals = pipeline.classify(&series, &params)?;
    let latest: &Signal = signals.last().context("Series produced no signals")?;
    let strength = signal_strength(latest.z_score);
    let reversion = OUProcess::new(params)?.probability_reversion(latest.price);

    match cmd.data.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "symbol": symbol,
            "params": params,
            "signal": latest,
            "strength": strength,
            "percentile": latest.percentile(),
            "confidence": latest.confidence(),
            "probability_reversion": reversion,
        })),
        OutputFormat::Text => {
            println!("Signal ({}, bar {})", symbol, latest.index);
            println!("  Price:      {:.6}", latest.price);
            println!("  z-score:    {:+.4}", latest.z_score);
            println!("  Decision:   {}", latest.decision);
            println!("  Strength:   {:+.4}", strength);
            println!("  Percentile: {:.4}", latest.percentile());
            println!("  Confidence: {:.4}", latest.confidence());
            println!("  P(revert):  {:.4}", reversion);
            println!();
            print_params(&params);
            Ok(())
        }
    }
}

/// Serialized backtest export
#[derive(Debug, Serialize)]
struct BacktestExport<'a> {
    symbol: &'a str,
    config: &'a StrategyConfig,
    params: &'a OUParameters,
    #[serde(flatten)]
    result: &'a BacktestResult,
}

/// Handle backtest command
async fn backtest_command(cmd: BacktestCmd, config: &Config) -> Result<()> {
    let (mut strategy, series, symbol) = load_series(&cmd.data, config).await?;
    if let Some(method) = cmd.method {
        strategy = strategy.with_method(method);
    }
    if let Some(k) = cmd.k {
        strategy = strategy.with_threshold(k);
    }
    if let Some(stop_mult) = cmd.stop_mult {
        strategy = strategy.with_stop_mult(stop_mult);
    }
    if cmd.no_short {
        strategy = strategy.with_shorting(false);
    }
    if cmd.no_exit_at_mean {
        strategy = strategy.with_exit_at_mean(false);
    }
    if let Some(pct) = cmd.stop_loss_pct {
        strategy = strategy.with_stop_loss_pct(pct);
    }
    if let Some(periods) = cmd.periods_per_year {
        strategy = strategy.with_periods_per_year(periods);
    }

    let pipeline = MeanReversionPipeline::new(strategy).context("Invalid strategy configuration")?;
    let report = pipeline.run(&series)?;

    let export = BacktestExport {
        symbol: &symbol,
        config: pipeline.config(),
        params: &report.params,
        result: &report.backtest,
    };

    if let Some(ref path) = cmd.export_json {
        let json = serde_json::to_string_pretty(&export)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "Exported backtest results");
    }

    if cmd.data.format == OutputFormat::Json {
        return print_json(&export);
    }

    let m = &report.backtest.metrics;
    println!("Backtest Results ({}, {} bars)", symbol, series.len());
    println!("  Method:        {}", pipeline.config().method);
    print_params(&report.params);
    println!();
    println!("  Trades:        {}", m.total_trades);
    println!("  Total return:  {:.6}", m.total_return);
    println!("  Win rate:      {:.2}%", m.win_rate * 100.0);
    println!("  Sharpe:        {:.4}", m.sharpe_ratio);
    println!("  Max drawdown:  {:.6}", m.max_drawdown);
    match m.profit_factor {
        Some(pf) => println!("  Profit factor: {:.4}", pf),
        None => println!("  Profit factor: n/a (no losing trades)"),
    }
    println!("  Avg trade PnL: {:.6}", m.avg_trade_pnl);

    if cmd.trades && !report.backtest.trades.is_empty() {
        println!();
        println!("  Trade Log:");
        for (i, trade) in report.backtest.trades.iter().enumerate() {
            println!("    {}. {}", i + 1, trade);
        }
    }

    if let Some(ref path) = cmd.export_json {
        println!();
        println!("  Exported JSON: {}", path.display());
    }

    Ok(())
}

/// Handle simulate command
async fn simulate_command(cmd: SimulateCmd) -> Result<()> {
    if cmd.n == 0 {
        bail!("--n must be at least 1");
    }
    let params = OUParameters::new(cmd.theta, cmd.mu, cmd.sigma, cmd.dt);
    let process = OUProcess::new(params).context("Invalid process parameters")?;

    let mut rng = StdRng::seed_from_u64(cmd.seed);
    let path = if cmd.euler {
        process.simulate_euler(cmd.n, cmd.x0, &mut rng)
    } else {
        process.simulate_exact(cmd.n, cmd.x0, &mut rng)
    };

    CsvFileProvider::write_series(&cmd.output, &path, cmd.dt)
        .await
        .with_context(|| format!("Failed to write {}", cmd.output.display()))?;

    tracing::info!(n = cmd.n, seed = cmd.seed, euler = cmd.euler, "Simulated OU path");
    println!("Simulated {} observations -> {}", path.len(), cmd.output.display());
    println!("  theta {}  mu {}  sigma {}  dt {}  seed {}", cmd.theta, cmd.mu, cmd.sigma, cmd.dt, cmd.seed);
    println!("  Half-life:           {:.4}", process.half_life());
    println!("  Stationary variance: {:.6}", process.stationary_variance());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        CliApp::command().debug_assert();
    }

    #[test]
    fn test_parse_estimate_all() {
        let app = CliApp::try_parse_from(["ou-reversion", "estimate", "-i", "prices.csv", "--all", "-f", "json"]).unwrap();
        match app.command {
            Command::Estimate(cmd) => {
                assert!(cmd.all);
                assert_eq!(cmd.data.format, OutputFormat::Json);
                assert_eq!(cmd.data.input, Some(PathBuf::from("prices.csv")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_method() {
        let app = CliApp::try_parse_from(["ou-reversion", "backtest", "--method", "ols", "--no-short"]).unwrap();
        match app.command {
            Command::Backtest(cmd) => {
                assert_eq!(cmd.method, Some(EstimationMethod::Ols));
                assert!(cmd.no_short);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(CliApp::try_parse_from(["ou-reversion", "estimate", "--method", "kalman"]).is_err());
    }

    #[test]
    fn test_parse_exit_options() {
        let app = CliApp::try_parse_from([
            "ou-reversion",
            "backtest",
            "--no-exit-at-mean",
            "--stop-loss-pct",
            "0.2",
        ])
        .unwrap();
        match app.command {
            Command::Backtest(cmd) => {
                assert!(cmd.no_exit_at_mean);
                assert_eq!(cmd.stop_loss_pct, Some(0.2));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_analyze_requires_full_truth() {
        assert!(CliApp::try_parse_from(["ou-reversion", "analyze", "--true-theta", "1.0"]).is_err());
        assert!(CliApp::try_parse_from([
            "ou-reversion", "analyze", "--true-theta", "1.0", "--true-mu", "0", "--true-sigma", "0.5"
        ])
        .is_ok());
    }

    #[tokio::test]
    async fn test_simulate_then_estimate_files() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("ou.csv");

        simulate_command(SimulateCmd {
            theta: 0.5,
            mu: 10.0,
            sigma: 1.0,
            dt: 1.0,
            n: 500,
            x0: None,
            seed: 7,
            euler: false,
            output: output.clone(),
        })
        .await
        .unwrap();

        let data = DataArgs {
            input: Some(output),
            config: None,
            dt: None,
            limit: Some(400),
            format: OutputFormat::Text,
        };
        let (strategy, series, symbol) = load_series(&data, &Config::default()).await.unwrap();
        assert_eq!(series.len(), 400);
        assert_eq!(strategy, StrategyConfig::default());
        assert_eq!(symbol, "ou");
    }

    #[tokio::test]
    async fn test_backtest_export_json() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("ou.csv");
        let export = dir.path().join("result.json");

        let process = OUProcess::new(OUParameters::new(0.3, 50.0, 2.0, 1.0)).unwrap();
        let path = process.simulate_exact(600, None, &mut StdRng::seed_from_u64(1));
        CsvFileProvider::write_series(&input, &path, 1.0).await.unwrap();

        let cmd = BacktestCmd {
            data: DataArgs {
                input: Some(input),
                config: None,
                dt: None,
                limit: None,
                format: OutputFormat::Text,
            },
            method: None,
            k: None,
            stop_mult: None,
            no_short: false,
            no_exit_at_mean: false,
            stop_loss_pct: Some(0.5),
            periods_per_year: None,
            trades: false,
            export_json: Some(export.clone()),
        };
        backtest_command(cmd, &Config::default()).await.unwrap();

        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&export).unwrap()).unwrap();
        assert_eq!(json["equity_curve"].as_array().unwrap().len(), 600);
        assert!(json["metrics"]["total_trades"].is_number());
        assert_eq!(json["config"]["method"], "mle");
        assert_eq!(json["config"]["stop_loss_pct"], 0.5);
    }
}
