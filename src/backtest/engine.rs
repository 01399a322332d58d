//! Backtest Engine
//!
//! Replays classified bars through a FLAT / LONG / SHORT state machine and
//! records closed trades, a per-bar equity curve and summary metrics.
//! Each run owns its position state; the engine itself is immutable.

use serde::{Deserialize, Serialize};

use crate::backtest::metrics::{Metrics, MetricsCalculator};
use crate::domain::{Decision, ExitReason, OuError, Position, PositionState, PriceSeries, Side, Signal, Trade};
use crate::strategy::classifier::SignalClassifier;
use crate::strategy::ou_process::OUParameters;
use crate::strategy::params::{ConfigError, StrategyConfig};

/// Full result of one backtest run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub trades: Vec<Trade>,
    /// Cumulative closed-trade PnL, one point per bar
    pub equity_curve: Vec<f64>,
    pub metrics: Metrics,
}

/// Fixed inputs of a per-bar step, derived once from the fitted parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepContext {
    pub mu: f64,
    pub stationary_std: f64,
    /// The bar being stepped is the final one of the series
    pub is_last: bool,
}

impl StepContext {
    pub fn from_params(params: &OUParameters) -> Result<Self, OuError> {
        let stationary_std = params.stationary_std().ok_or_else(|| {
            OuError::DegenerateParameter(format!(
                "theta = {} gives no stationary distribution",
                params.theta
            ))
        })?;
        Ok(Self {
            mu: params.mu,
            stationary_std,
            is_last: false,
        })
    }

    pub fn at_last_bar(self, is_last: bool) -> Self {
        Self { is_last, ..self }
    }
}

/// Outcome of one bar: the next position state and the trade closed on
/// this bar, if any
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub state: PositionState,
    pub trade: Option<Trade>,
}

/// Bar-by-bar position state machine.
///
/// States are FLAT, LONG and SHORT. On each bar exactly one transition is
/// evaluated:
///   1. FLAT + BUY opens LONG, FLAT + SELL opens SHORT (when shorting is enabled)
///   2. An open position exits on its stop first (sigma band or, when set,
///      the percentage stop), then on reversion to mu. With the mean exit
///      turned off it closes on the opposite signal instead.
///   3. Whatever is still open on the final bar closes at the final price
///
/// The engine holds only configuration; each run owns its position state,
/// so one engine may drive any number of independent runs.
#[derive(Debug, Clone)]
pub struct BacktestEngine {
    config: StrategyConfig,
}

impl BacktestEngine {
    pub fn new(config: StrategyConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Advance one bar
    pub fn step(&self, state: PositionState, signal: &Signal, ctx: &StepContext) -> Step {
        match state {
            PositionState::Flat => Step {
                state: self.try_enter(signal, ctx),
                trade: None,
            },
            PositionState::Open(position) => match self.exit_reason(&position, signal, ctx) {
                Some(reason) => {
                    let trade = Trade::close(&position, signal.price, signal.index, reason);
                    tracing::debug!(
                        side = %trade.side,
                        index = trade.exit_index,
                        price = trade.exit_price,
                        pnl = trade.pnl,
                        reason = %trade.exit_reason,
                        "Closed position"
                    );
                    Step {
                        state: PositionState::Flat,
                        trade: Some(trade),
                    }
                }
                None => Step { state, trade: None },
            },
        }
    }

    fn try_enter(&self, signal: &Signal, ctx: &StepContext) -> PositionState {
        // Opening on the final bar would be closed at the same price
        if ctx.is_last {
            return PositionState::Flat;
        }

        let side = match signal.decision {
            Decision::Buy => Side::Long,
            Decision::Sell if self.config.shorting_enabled => Side::Short,
            Decision::Sell | Decision::Hold => return PositionState::Flat,
        };

        let stop_distance = self.config.stop_mult * ctx.stationary_std;
        let stop_loss_price = match side {
            Side::Long => ctx.mu - stop_distance,
            Side::Short => ctx.mu + stop_distance,
        };
        let size = self.config.position_size(signal.z_score);

        match Position::open(side, signal.price, signal.index, size, stop_loss_price) {
            Ok(position) => {
                tracing::debug!(
                    side = %side,
                    index = signal.index,
                    price = signal.price,
                    z = signal.z_score,
                    size,
                    stop = stop_loss_price,
                    "Opened position"
                );
                PositionState::Open(position)
            }
            Err(e) => {
                tracing::warn!(index = signal.index, error = %e, "Entry skipped");
                PositionState::Flat
            }
        }
    }

    /// Stop-loss takes priority over every other exit on the same bar
    fn exit_reason(&self, position: &Position, signal: &Signal, ctx: &StepContext) -> Option<ExitReason> {
        let price = signal.price;
        let pct_stop_hit = self
            .config
            .stop_loss_pct
            .is_some_and(|pct| position.loss_fraction(price) > pct);

        if position.stop_hit(price) || pct_stop_hit {
            Some(ExitReason::StopLoss)
        } else if self.config.exit_at_mean && position.reverted(price, ctx.mu) {
            Some(ExitReason::MeanRevert)
        } else if !self.config.exit_at_mean && is_opposite(position.side, signal.decision) {
            Some(ExitReason::OppositeSignal)
        } else if ctx.is_last {
            Some(ExitReason::EndOfSeries)
        } else {
            None
        }
    }

    /// Replay an ordered signal sequence.
    ///
    /// Degenerate parameters abort the run; no default parameters are
    /// substituted.
    pub fn run(&self, params: &OUParameters, signals: &[Signal]) -> Result<BacktestResult, OuError> {
        params.ensure_mean_reverting()?;
        let base_ctx = StepContext::from_params(params)?;

        let mut state = PositionState::Flat;
        let mut trades = Vec::new();
        let mut equity_curve = Vec::with_capacity(signals.len());
        let mut equity = 0.0;
        let last = signals.len().saturating_sub(1);

        for (i, signal) in signals.iter().enumerate() {
            let ctx = base_ctx.at_last_bar(i == last);
            let step = self.step(state, signal, &ctx);
            state = step.state;
            if let Some(trade) = step.trade {
                equity += trade.pnl;
                trades.push(trade);
            }
            equity_curve.push(equity);
        }

        let metrics = MetricsCalculator::calculate(&equity_curve, &trades, self.config.periods_per_year);
        tracing::info!(
            bars = signals.len(),
            trades = metrics.total_trades,
            total_return = metrics.total_return,
            win_rate = metrics.win_rate,
            max_drawdown = metrics.max_drawdown,
            "Backtest complete"
        );

        Ok(BacktestResult {
            trades,
            equity_curve,
            metrics,
        })
    }

    /// Classify every bar of `series` with the configured threshold, then run
    pub fn run_series(&self, series: &PriceSeries, params: &OUParameters) -> Result<BacktestResult, OuError> {
        let classifier = SignalClassifier::new(*params, self.config.k)?;
        let signals = classifier.signals(series);
        self.run(params, &signals)
    }
}

fn is_opposite(side: Side, decision: Decision) -> bool {
    matches!(
        (side, decision),
        (Side::Long, Decision::Sell) | (Side::Short, Decision::Buy)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// mu = 100, stationary std = 5
    fn params() -> OUParameters {
        OUParameters::new(0.5, 100.0, 5.0, 1.0)
    }

    fn engine(config: StrategyConfig) -> BacktestEngine {
        BacktestEngine::new(config).unwrap()
    }

    fn ctx(is_last: bool) -> StepContext {
        StepContext::from_params(&params()).unwrap().at_last_bar(is_last)
    }

    fn signal(index: usize, price: f64) -> Signal {
        SignalClassifier::new(params(), 2.0).unwrap().signal(index, price)
    }

    fn run_prices(config: StrategyConfig, prices: &[f64]) -> BacktestResult {
        let series = PriceSeries::new(prices.to_vec(), 1.0).unwrap();
        engine(config).run_series(&series, &params()).unwrap()
    }

    #[test]
    fn test_flat_buy_opens_long() {
        let e = engine(StrategyConfig::default());
        let step = e.step(PositionState::Flat, &signal(3, 88.0), &ctx(false));

        let position = step.state.position().copied().unwrap();
        assert_eq!(position.side, Side::Long);
        assert_eq!(position.entry_index, 3);
        assert_eq!(position.entry_price, 88.0);
        // |z| = 2.4 -> size 1.2
        assert_relative_eq!(position.size, 1.2, epsilon = 1e-12);
        // mu - 3 * 5
        assert_relative_eq!(position.stop_loss_price, 85.0);
        assert!(step.trade.is_none());
    }

    #[test]
    fn test_flat_sell_opens_short() {
        let e = engine(StrategyConfig::default());
        let step = e.step(PositionState::Flat, &signal(0, 111.0), &ctx(false));

        let position = step.state.position().copied().unwrap();
        assert_eq!(position.side, Side::Short);
        assert_relative_eq!(position.stop_loss_price, 115.0);
    }

    #[test]
    fn test_sell_ignored_without_shorting() {
        let e = engine(StrategyConfig::default().with_shorting(false));
        let step = e.step(PositionState::Flat, &signal(0, 111.0), &ctx(false));
        assert!(step.state.is_flat());
    }

    #[test]
    fn test_hold_stays_flat() {
        let e = engine(StrategyConfig::default());
        let step = e.step(PositionState::Flat, &signal(0, 95.0), &ctx(false));
        assert!(step.state.is_flat());
        assert!(step.trade.is_none());
    }

    #[test]
    fn test_no_entry_on_final_bar() {
        let e = engine(StrategyConfig::default());
        let step = e.step(PositionState::Flat, &signal(9, 80.0), &ctx(true));
        assert!(step.state.is_flat());
    }

    #[test]
    fn test_long_exits_on_mean_revert() {
        let e = engine(StrategyConfig::default());
        let open = e.step(PositionState::Flat, &signal(0, 88.0), &ctx(false)).state;

        let step = e.step(open, &signal(1, 95.0), &ctx(false));
        assert_eq!(step.state, open);

        let step = e.step(open, &signal(2, 100.5), &ctx(false));
        assert!(step.state.is_flat());
        let trade = step.trade.unwrap();
        assert_eq!(trade.exit_reason, ExitReason::MeanRevert);
        assert_relative_eq!(trade.pnl, 12.5 * 1.2, epsilon = 1e-9);
    }

    #[test]
    fn test_long_exits_on_stop_loss() {
        let e = engine(StrategyConfig::default());
        let open = e.step(PositionState::Flat, &signal(0, 88.0), &ctx(false)).state;

        let step = e.step(open, &signal(1, 84.0), &ctx(false));
        let trade = step.trade.unwrap();
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert!(trade.pnl < 0.0);
    }

    #[test]
    fn test_short_exits_mirror_long() {
        let e = engine(StrategyConfig::default());
        let open = e.step(PositionState::Flat, &signal(0, 112.0), &ctx(false)).state;

        let reverted = e.step(open, &signal(1, 99.0), &ctx(false)).trade.unwrap();
        assert_eq!(reverted.exit_reason, ExitReason::MeanRevert);
        assert!(reverted.pnl > 0.0);

        let stopped = e.step(open, &signal(1, 116.0), &ctx(false)).trade.unwrap();
        assert_eq!(stopped.exit_reason, ExitReason::StopLoss);
        assert!(stopped.pnl < 0.0);
    }

    #[test]
    fn test_stop_loss_has_priority() {
        // Zero volatility puts the stop at mu, so both exits trigger together
        let degenerate_band = OUParameters::new(0.5, 100.0, 0.0, 1.0);
        let ctx = StepContext::from_params(&degenerate_band).unwrap();
        let e = engine(StrategyConfig::default());

        let position = Position::open(Side::Long, 90.0, 0, 1.0, 100.0).unwrap();
        let bar = Signal::new(1, 100.0, 0.0, Decision::Hold);
        let step = e.step(PositionState::Open(position), &bar, &ctx);
        assert_eq!(step.trade.unwrap().exit_reason, ExitReason::StopLoss);
    }

    #[test]
    fn test_percentage_stop_exits_inside_sigma_band() {
        let e = engine(StrategyConfig::default().with_stop_loss_pct(0.02));
        let open = e.step(PositionState::Flat, &signal(0, 89.0), &ctx(false)).state;

        // 86.5 is above the 85.0 band stop but 2.8% below entry
        let trade = e.step(open, &signal(1, 86.5), &ctx(false)).trade.unwrap();
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert!(trade.pnl < 0.0);

        // Within the percentage the position stays open
        let step = e.step(open, &signal(1, 88.0), &ctx(false));
        assert!(step.trade.is_none());
    }

    #[test]
    fn test_percentage_stop_on_short_inside_wide_band() {
        let config = StrategyConfig::default()
            .with_stop_mult(10.0)
            .with_stop_loss_pct(0.05)
            .with_exit_at_mean(false);
        let e = engine(config);
        let open = e.step(PositionState::Flat, &signal(0, 111.0), &ctx(false)).state;
        assert_eq!(open.side(), Some(Side::Short));

        // Short from 111 stopped at 117 (+5.4%), far inside the 150.0 band stop
        let trade = e.step(open, &signal(1, 117.0), &ctx(false)).trade.unwrap();
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    }

    #[test]
    fn test_mean_exit_disabled_waits_for_opposite_signal() {
        let e = engine(StrategyConfig::default().with_exit_at_mean(false));
        let open = e.step(PositionState::Flat, &signal(0, 88.0), &ctx(false)).state;

        // Crossing mu no longer closes the long
        let step = e.step(open, &signal(1, 101.0), &ctx(false));
        assert_eq!(step.state, open);
        assert!(step.trade.is_none());

        let trade = e.step(open, &signal(2, 111.0), &ctx(false)).trade.unwrap();
        assert_eq!(trade.exit_reason, ExitReason::OppositeSignal);
        assert_relative_eq!(trade.pnl, 23.0 * 1.2, epsilon = 1e-9);
    }

    #[test]
    fn test_mean_exit_disabled_still_forces_close() {
        let config = StrategyConfig::default().with_exit_at_mean(false);
        let result = run_prices(config, &[100.0, 88.0, 99.0, 104.0]);

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].exit_reason, ExitReason::EndOfSeries);
        assert_eq!(result.trades[0].exit_price, 104.0);
    }

    #[test]
    fn test_new_entry_ignored_while_open() {
        let result = run_prices(StrategyConfig::default(), &[100.0, 88.0, 87.0, 86.0, 101.0, 100.0]);
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.entry_index, 1);
        assert_eq!(trade.entry_price, 88.0);
        assert_eq!(trade.exit_index, 4);
    }

    #[test]
    fn test_forced_close_at_end_of_series() {
        let prices = [100.0, 101.0, 99.0, 100.5, 88.0, 92.0];
        let result = run_prices(StrategyConfig::default(), &prices);

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.entry_index, 4);
        assert_eq!(trade.exit_index, 5);
        assert_eq!(trade.exit_price, 92.0);
        assert_eq!(trade.exit_reason, ExitReason::EndOfSeries);
    }

    #[test]
    fn test_equity_curve_per_bar() {
        let prices = [100.0, 88.0, 95.0, 100.0, 112.0, 104.0, 99.0, 100.0];
        let result = run_prices(StrategyConfig::default(), &prices);

        assert_eq!(result.equity_curve.len(), prices.len());
        assert_eq!(result.trades.len(), 2);
        // Flat until the first exit, then steps by each closed trade
        assert_eq!(result.equity_curve[..3], [0.0, 0.0, 0.0]);
        assert_relative_eq!(result.equity_curve[3], result.trades[0].pnl);
        assert_relative_eq!(
            *result.equity_curve.last().unwrap(),
            result.trades.iter().map(|t| t.pnl).sum::<f64>()
        );
        assert_relative_eq!(result.metrics.total_return, *result.equity_curve.last().unwrap());
        assert_eq!(result.metrics.win_rate, 1.0);

        // No losing trade: the result still reads back from its own JSON
        assert_eq!(result.metrics.profit_factor, None);
        let json = serde_json::to_string(&result).unwrap();
        let back: BacktestResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.trades.len(), result.trades.len());
        assert_eq!(back.metrics.profit_factor, None);
        assert_relative_eq!(back.metrics.total_return, result.metrics.total_return);
    }

    #[test]
    fn test_constant_series_no_trades() {
        let result = run_prices(StrategyConfig::default(), &[100.0; 30]);
        assert!(result.trades.is_empty());
        assert_eq!(result.metrics.total_return, 0.0);
        assert!(result.equity_curve.iter().all(|&e| e == 0.0));
    }

    #[test]
    fn test_degenerate_params_abort_run() {
        let e = engine(StrategyConfig::default());
        let bad = OUParameters::new(-0.2, 100.0, 5.0, 1.0);
        let signals = vec![Signal::new(0, 100.0, 0.0, Decision::Hold)];
        assert!(matches!(e.run(&bad, &signals), Err(OuError::DegenerateParameter(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(BacktestEngine::new(StrategyConfig::default().with_stop_mult(1.0)).is_err());
    }

    #[test]
    fn test_empty_signal_sequence() {
        let e = engine(StrategyConfig::default());
        let result = e.run(&params(), &[]).unwrap();
        assert!(result.trades.is_empty());
        assert!(result.equity_curve.is_empty());
    }
}
