use chrono::{DateTime, Utc};

use crate::market::PriceSeries;

pub const EMA_FAST_PERIOD: usize = 12;
pub const EMA_SLOW_PERIOD: usize = 26;
pub const SIGNAL_PERIOD: usize = 9;
pub const RSI_PERIOD: usize = 14;

/// Per-sample derived values. The EMAs, MACD and Signal are defined for every
/// sample of a non-empty series (the EMA is seeded with the first price), so
/// they are plain floats; RSI stays `None` until a full window of deltas
/// exists.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub macd: f64,
    pub signal: f64,
    pub rsi: Option<f64>,
}

pub type IndicatorSeries = Vec<IndicatorPoint>;

/// Augments a price series with EMA(12)/EMA(26), MACD, Signal(9) and RSI(14).
/// Pure: same input, same output; an empty series yields an empty result.
/// Samples are processed strictly in input order.
pub fn compute_indicators(series: &PriceSeries) -> IndicatorSeries {
    if series.is_empty() {
        return Vec::new();
    }

    let prices: Vec<f64> = series.iter().map(|s| s.price).collect();
    let ema_fast = ema(&prices, EMA_FAST_PERIOD);
    let ema_slow = ema(&prices, EMA_SLOW_PERIOD);
    let macd: Vec<f64> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(fast, slow)| fast - slow)
        .collect();
    let signal = ema(&macd, SIGNAL_PERIOD);
    let rsi = rolling_rsi(&prices, RSI_PERIOD);

    series
        .iter()
        .enumerate()
        .map(|(i, sample)| IndicatorPoint {
            timestamp: sample.timestamp,
            price: sample.price,
            ema_fast: ema_fast[i],
            ema_slow: ema_slow[i],
            macd: macd[i],
            signal: signal[i],
            rsi: rsi[i],
        })
        .collect()
}

/// Exponential moving average with alpha = 2 / (period + 1), seeded with the
/// first value. No warm-up gap and no bias adjustment: one output per input.
fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out: Vec<f64> = Vec::with_capacity(values.len());
    for (i, &value) in values.iter().enumerate() {
        if i == 0 {
            out.push(value);
        } else {
            out.push(alpha * value + (1.0 - alpha) * out[i - 1]);
        }
    }
    out
}

/// RSI over simple rolling means of the trailing `period` gains and losses
/// (not Wilder-smoothed). Undefined until `period` deltas exist, so the first
/// value lands at index `period`. A window with zero average loss maps to 100
/// when any gain is present and stays undefined when the window is flat.
fn rolling_rsi(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; prices.len()];
    if prices.len() <= period {
        return out;
    }

    let mut gains = Vec::with_capacity(prices.len() - 1);
    let mut losses = Vec::with_capacity(prices.len() - 1);
    for pair in prices.windows(2) {
        let delta = pair[1] - pair[0];
        gains.push(delta.max(0.0));
        losses.push((-delta).max(0.0));
    }

    for i in period..prices.len() {
        // Delta j sits between samples j and j+1, so the window for sample i
        // covers deltas i-period..i.
        let window = (i - period)..i;
        let avg_gain = gains[window.clone()].iter().sum::<f64>() / period as f64;
        let avg_loss = losses[window].iter().sum::<f64>() / period as f64;

        out[i] = if avg_loss == 0.0 {
            (avg_gain > 0.0).then_some(100.0)
        } else {
            let rs = avg_gain / avg_loss;
            Some(100.0 - 100.0 / (1.0 + rs))
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::PriceSample;

    fn series(prices: &[f64]) -> PriceSeries {
        prices
            .iter()
            .enumerate()
            .map(|(i, &price)| PriceSample {
                timestamp: DateTime::<Utc>::from_timestamp(1_700_000_000 + i as i64 * 86_400, 0)
                    .unwrap(),
                price,
            })
            .collect()
    }

    const TRACE: [f64; 15] = [
        100.0, 102.0, 101.0, 105.0, 107.0, 106.0, 108.0, 110.0, 109.0, 111.0, 113.0, 112.0, 115.0,
        114.0, 116.0,
    ];

    fn close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn empty_series_yields_empty_output() {
        assert!(compute_indicators(&Vec::new()).is_empty());
    }

    #[test]
    fn output_is_aligned_and_seeded_with_first_price() {
        let input = series(&TRACE);
        let out = compute_indicators(&input);

        assert_eq!(out.len(), input.len());
        assert_eq!(out[0].ema_fast, 100.0);
        assert_eq!(out[0].ema_slow, 100.0);
        assert_eq!(out[0].macd, 0.0);
        assert_eq!(out[0].signal, 0.0);
    }

    #[test]
    fn ema_follows_the_recursive_definition() {
        let out = ema(&[2.0, 4.0, 8.0], 3);
        // alpha = 0.5
        assert_eq!(out, vec![2.0, 3.0, 5.5]);
    }

    #[test]
    fn golden_trace_matches_hand_computed_values() {
        let out = compute_indicators(&series(&TRACE));

        // EMA(12): alpha = 2/13 -> (2*102 + 11*100) / 13
        close(out[1].ema_fast, 1304.0 / 13.0);
        // EMA(26): alpha = 2/27 -> (2*102 + 25*100) / 27
        close(out[1].ema_slow, 2704.0 / 27.0);
        // MACD pointwise difference
        close(out[1].macd, 1304.0 / 13.0 - 2704.0 / 27.0);
        // Signal(9): alpha = 0.2, seeded with macd[0] = 0
        close(out[1].signal, 0.2 * (1304.0 / 13.0 - 2704.0 / 27.0));

        // Deltas over TRACE: gains sum 21, losses sum 5 over the 14-window,
        // so rs = 4.2 and rsi = 100 - 100/5.2.
        close(out[14].rsi.unwrap(), 100.0 - 100.0 / 5.2);
    }

    #[test]
    fn rsi_is_undefined_for_the_first_window() {
        let out = compute_indicators(&series(&TRACE));
        for point in &out[..RSI_PERIOD] {
            assert_eq!(point.rsi, None);
        }
        assert!(out[RSI_PERIOD].rsi.is_some());
    }

    #[test]
    fn rsi_stays_within_bounds() {
        let prices: Vec<f64> = (0..40)
            .map(|i| 100.0 + ((i * 37) % 11) as f64 - 5.0)
            .collect();
        let out = compute_indicators(&series(&prices));

        for point in out {
            if let Some(rsi) = point.rsi {
                assert!((0.0..=100.0).contains(&rsi), "rsi out of bounds: {rsi}");
            }
        }
    }

    #[test]
    fn monotonic_rise_pins_rsi_at_100() {
        let prices: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let out = compute_indicators(&series(&prices));

        for point in &out[RSI_PERIOD..] {
            assert_eq!(point.rsi, Some(100.0));
        }
    }

    #[test]
    fn monotonic_fall_pins_rsi_at_0() {
        let prices: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let out = compute_indicators(&series(&prices));

        for point in &out[RSI_PERIOD..] {
            assert_eq!(point.rsi, Some(0.0));
        }
    }

    #[test]
    fn flat_series_leaves_rsi_undefined() {
        let out = compute_indicators(&series(&[42.0; 20]));
        for point in &out {
            assert_eq!(point.rsi, None);
            assert_eq!(point.ema_fast, 42.0);
            assert_eq!(point.macd, 0.0);
        }
    }

    #[test]
    fn recomputation_is_idempotent() {
        let input = series(&TRACE);
        assert_eq!(compute_indicators(&input), compute_indicators(&input));
    }
}
