//! Display formatting. This is the only place missing numbers become zero.

use serde::Serialize;

fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn with_suffix(value: f64) -> String {
    let abs = value.abs();
    if abs >= 1e12 {
        format!("{:.2}T", value / 1e12)
    } else if abs >= 1e9 {
        format!("{:.2}B", value / 1e9)
    } else if abs >= 1e6 {
        format!("{:.2}M", value / 1e6)
    } else if abs >= 1e3 {
        format!("{:.2}K", value / 1e3)
    } else {
        format!("{:.2}", value)
    }
}

/// `$1.23T`, `$4.56M`, `$0.00` for missing values.
pub fn format_currency(value: Option<f64>) -> String {
    let v = usable(value).unwrap_or(0.0);
    if v < 0.0 {
        format!("-${}", with_suffix(-v))
    } else {
        format!("${}", with_suffix(v))
    }
}

/// Unit price with enough decimals for sub-cent coins.
pub fn format_price(value: Option<f64>) -> String {
    let v = usable(value).unwrap_or(0.0);
    if v != 0.0 && v.abs() < 0.01 {
        format!("${:.6}", v)
    } else {
        format!("${:.2}", v)
    }
}

/// Same suffixes as [`format_currency`] without the dollar sign; `0` for
/// missing values.
pub fn format_number(value: Option<f64>) -> String {
    match usable(value) {
        Some(v) => with_suffix(v),
        None => "0".to_string(),
    }
}

/// `+1.23%`, `-4.50%`, `0.00%` for missing values.
pub fn format_percentage(value: Option<f64>) -> String {
    match usable(value) {
        Some(v) if v >= 0.0 => format!("+{:.2}%", v),
        Some(v) => format!("{:.2}%", v),
        None => "0.00%".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn of(value: Option<f64>) -> Self {
        match usable(value) {
            Some(v) if v > 0.0 => Self::Up,
            Some(v) if v < 0.0 => Self::Down,
            _ => Self::Flat,
        }
    }

    pub fn arrow(self) -> &'static str {
        match self {
            Self::Up => "▲",
            Self::Down => "▼",
            Self::Flat => "·",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_currency_suffixes() {
        assert_eq!(format_currency(Some(1.32e12)), "$1.32T");
        assert_eq!(format_currency(Some(2.5e9)), "$2.50B");
        assert_eq!(format_currency(Some(7_654_321.0)), "$7.65M");
        assert_eq!(format_currency(Some(1_500.0)), "$1.50K");
        assert_eq!(format_currency(Some(12.346)), "$12.35");
        assert_eq!(format_currency(Some(-2_000.0)), "-$2.00K");
    }

    #[test]
    fn test_missing_values_display_as_zero() {
        assert_eq!(format_currency(None), "$0.00");
        assert_eq!(format_currency(Some(f64::NAN)), "$0.00");
        assert_eq!(format_number(None), "0");
        assert_eq!(format_number(Some(f64::NAN)), "0");
        assert_eq!(format_percentage(None), "0.00%");
        assert_eq!(format_price(None), "$0.00");
    }

    #[test]
    fn test_format_number_and_price() {
        assert_eq!(format_number(Some(19_700_000.0)), "19.70M");
        assert_eq!(format_number(Some(0.0)), "0.00");
        assert_eq!(format_price(Some(0.000123)), "$0.000123");
        assert_eq!(format_price(Some(67000.5)), "$67000.50");
    }

    #[test]
    fn test_format_percentage_sign() {
        assert_eq!(format_percentage(Some(3.14159)), "+3.14%");
        assert_eq!(format_percentage(Some(0.0)), "+0.00%");
        assert_eq!(format_percentage(Some(-0.745)), "-0.74%");
    }

    #[test]
    fn test_trend() {
        assert_eq!(Trend::of(Some(1.0)), Trend::Up);
        assert_eq!(Trend::of(Some(-0.1)), Trend::Down);
        assert_eq!(Trend::of(Some(0.0)), Trend::Flat);
        assert_eq!(Trend::of(None), Trend::Flat);
    }
}
