use super::{lead, mean, rolling, Series};

/// Relative strength index over `period` close deltas.
///
/// Deltas are taken against the next close (`close[i] - close[i + 1]`), the
/// same shift the EMA column uses. Losses are averaged as magnitudes so the
/// result stays in `[0, 100]`. A window with no movement at all (`0 / 0`) is
/// undefined; a window with gains and no losses is 100.
pub fn rsi(closes: &[f64], period: usize) -> Series {
    let deltas: Vec<Option<f64>> = closes
        .iter()
        .zip(lead(closes))
        .map(|(close, next)| next.map(|next| close - next))
        .collect();

    let gains: Vec<Option<f64>> = deltas.iter().map(|d| d.map(|d| d.max(0.0))).collect();
    let losses: Vec<Option<f64>> = deltas
        .iter()
        .map(|d| d.map(|d| if d > 0.0 { 0.0 } else { -d }))
        .collect();

    let avg_gain = rolling(&gains, period, mean);
    let avg_loss = rolling(&losses, period, mean);

    avg_gain
        .iter()
        .zip(avg_loss.iter())
        .map(|(gain, loss)| match (gain, loss) {
            (Some(gain), Some(loss)) => rsi_from_averages(*gain, *loss),
            _ => None,
        })
        .collect()
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            return None;
        }
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}
