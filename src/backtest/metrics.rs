use serde::{Deserialize, Serialize};

use crate::domain::Trade;

/// Summary statistics of one backtest run.
///
/// All money figures are in price units times position size; the equity
/// curve starts from zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Final cumulative PnL
    pub total_return: f64,
    /// Fraction of trades with positive PnL
    pub win_rate: f64,
    /// Mean per-trade return over its standard deviation
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough decline of the equity curve
    pub max_drawdown: f64,
    pub total_trades: usize,
    /// Gross profit over gross loss; `None` when no trade lost money
    pub profit_factor: Option<f64>,
    pub avg_trade_pnl: f64,
}

pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Calculate all metrics from the equity curve and trade log.
    ///
    /// `periods_per_year` annualises the Sharpe ratio by its square root;
    /// without it the ratio is left per-trade.
    pub fn calculate(equity_curve: &[f64], trades: &[Trade], periods_per_year: Option<f64>) -> Metrics {
        let pnls: Vec<f64> = trades.iter().map(|t| t.pnl).collect();
        let returns: Vec<f64> = trades.iter().map(Trade::return_pct).collect();

        Metrics {
            total_return: Self::total_return(equity_curve),
            win_rate: Self::win_rate(&pnls),
            sharpe_ratio: Self::sharpe_ratio(&returns, periods_per_year),
            max_drawdown: Self::max_drawdown(equity_curve),
            total_trades: trades.len(),
            profit_factor: Self::profit_factor(&pnls),
            avg_trade_pnl: if pnls.is_empty() {
                0.0
            } else {
                pnls.iter().sum::<f64>() / pnls.len() as f64
            },
        }
    }

    fn total_return(equity_curve: &[f64]) -> f64 {
        equity_curve.last().copied().unwrap_or(0.0)
    }

    fn win_rate(pnls: &[f64]) -> f64 {
        if pnls.is_empty() {
            return 0.0;
        }
        let wins = pnls.iter().filter(|&&p| p > 0.0).count();
        wins as f64 / pnls.len() as f64
    }

    fn sharpe_ratio(returns: &[f64], periods_per_year: Option<f64>) -> f64 {
        if returns.len() < 2 {
            return 0.0;
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let std = std_dev(returns);
        if std == 0.0 {
            return 0.0;
        }
        let ratio = mean / std;
        match periods_per_year {
            Some(periods) => ratio * periods.sqrt(),
            None => ratio,
        }
    }

    /// Absolute decline from the running peak; the curve is measured from a
    /// zero baseline so an opening loss counts as drawdown.
    fn max_drawdown(equity_curve: &[f64]) -> f64 {
        let mut peak = 0.0f64;
        let mut max_dd = 0.0f64;
        for &value in equity_curve {
            if value > peak {
                peak = value;
            }
            let dd = peak - value;
            if dd > max_dd {
                max_dd = dd;
            }
        }
        max_dd
    }

    fn profit_factor(pnls: &[f64]) -> Option<f64> {
        let gross_profit: f64 = pnls.iter().filter(|&&p| p > 0.0).sum();
        let gross_loss: f64 = pnls.iter().filter(|&&p| p < 0.0).map(|p| p.abs()).sum();
        if gross_loss == 0.0 {
            return None;
        }
        Some(gross_profit / gross_loss)
    }
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExitReason, Side};
    use approx::assert_relative_eq;

    fn make_trades(pnls: &[f64]) -> Vec<Trade> {
        pnls.iter()
            .enumerate()
            .map(|(i, &pnl)| Trade {
                side: Side::Long,
                entry_price: 100.0,
                exit_price: 100.0 + pnl,
                entry_index: i * 10,
                exit_index: i * 10 + 5,
                size: 1.0,
                pnl,
                exit_reason: ExitReason::MeanRevert,
            })
            .collect()
    }

    fn equity_from(pnls: &[f64]) -> Vec<f64> {
        pnls.iter()
            .scan(0.0, |acc, &pnl| {
                *acc += pnl;
                Some(*acc)
            })
            .collect()
    }

    #[test]
    fn test_win_rate() {
        let pnls = vec![10.0, -5.0, 20.0, -3.0, 15.0];
        assert!((MetricsCalculator::win_rate(&pnls) - 0.6).abs() < 1e-10);
        assert_eq!(MetricsCalculator::win_rate(&[]), 0.0);
    }

    #[test]
    fn test_profit_factor() {
        let pnls = vec![10.0, -5.0, 20.0, -3.0];
        let pf = MetricsCalculator::profit_factor(&pnls).unwrap();
        assert!((pf - 30.0 / 8.0).abs() < 1e-10);
        assert_eq!(MetricsCalculator::profit_factor(&[1.0]), None);
        assert_eq!(MetricsCalculator::profit_factor(&[]), None);
        assert_eq!(MetricsCalculator::profit_factor(&[-2.0]), Some(0.0));
    }

    #[test]
    fn test_all_winning_metrics_survive_json() {
        let pnls = vec![4.0, 2.5];
        let metrics = MetricsCalculator::calculate(&equity_from(&pnls), &make_trades(&pnls), None);
        assert_eq!(metrics.profit_factor, None);

        let json = serde_json::to_string(&metrics).unwrap();
        assert!(json.contains("\"profit_factor\":null"));
        let back: Metrics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.profit_factor, None);
        assert_eq!(back.total_trades, 2);
        assert_relative_eq!(back.total_return, 6.5);
    }

    #[test]
    fn test_max_drawdown() {
        let equity = vec![0.0, 10.0, 5.0, 15.0, 0.0, 3.0];
        assert_relative_eq!(MetricsCalculator::max_drawdown(&equity), 15.0);
    }

    #[test]
    fn test_max_drawdown_from_zero_baseline() {
        let equity = vec![0.0, -4.0, -2.0, 1.0];
        assert_relative_eq!(MetricsCalculator::max_drawdown(&equity), 4.0);
        assert_eq!(MetricsCalculator::max_drawdown(&[]), 0.0);
    }

    #[test]
    fn test_sharpe_zero_std() {
        let returns = vec![0.01, 0.01, 0.01];
        assert_eq!(MetricsCalculator::sharpe_ratio(&returns, None), 0.0);
        assert_eq!(MetricsCalculator::sharpe_ratio(&[0.05], None), 0.0);
    }

    #[test]
    fn test_sharpe_annualization() {
        let returns = vec![0.02, -0.01, 0.03, 0.00];
        let raw = MetricsCalculator::sharpe_ratio(&returns, None);
        // mean 0.01, population std sqrt(0.00025)
        assert_relative_eq!(raw, 0.01 / 0.00025f64.sqrt(), epsilon = 1e-12);

        let annual = MetricsCalculator::sharpe_ratio(&returns, Some(252.0));
        assert_relative_eq!(annual, raw * 252f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_metrics_full() {
        let pnls = vec![10.0, -5.0, 20.0, -3.0, 15.0];
        let trades = make_trades(&pnls);
        let equity = equity_from(&pnls);

        let metrics = MetricsCalculator::calculate(&equity, &trades, None);
        assert_eq!(metrics.total_trades, 5);
        assert_relative_eq!(metrics.total_return, 37.0);
        assert_relative_eq!(metrics.win_rate, 0.6);
        assert_relative_eq!(metrics.max_drawdown, 5.0);
        assert_relative_eq!(metrics.avg_trade_pnl, 7.4);
        assert!(metrics.sharpe_ratio > 0.0);
    }

    #[test]
    fn test_metrics_no_trades() {
        let metrics = MetricsCalculator::calculate(&[0.0, 0.0, 0.0], &[], Some(252.0));
        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.total_return, 0.0);
        assert_eq!(metrics.win_rate, 0.0);
        assert_eq!(metrics.sharpe_ratio, 0.0);
        assert_eq!(metrics.max_drawdown, 0.0);
    }
}
