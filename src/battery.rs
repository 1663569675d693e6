/// Voltage at which the cell is considered empty.
const EMPTY_VOLTAGE: f64 = 2.1;

/// Estimate the remaining battery percentage from the cell voltage in volts.
///
/// The sensor runs on a CR2032, so 2.1V maps to 0% and 3.1V or above maps to
/// 100%. Readings below 2.1V report 0% rather than a negative value.
///
/// The percentage is rounded to the nearest integer, not truncated: 2.39V
/// reports 29% where truncating `round(v - 2.1, 2) * 100` would give 28%.
pub fn battery_percent(voltage: f32) -> u8 {
    let percent = ((f64::from(voltage) - EMPTY_VOLTAGE) * 100.0).round();
    percent.max(0.0).min(100.0) as u8
}
