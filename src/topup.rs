use crate::error::AppError;
use serde::Serialize;

/// Service fee taken on top-ups when nothing else is configured.
pub const DEFAULT_FEE_RATE: f64 = 0.234;

/// Credits expected for `amount` of native currency after the fee.
pub fn estimate_credits(amount: f64, fee_rate: f64) -> f64 {
    amount * (1.0 - fee_rate)
}

/// Estimate for raw user input, formatted the way the dashboard shows it.
/// Anything that is not a positive number estimates to `0`.
pub fn format_estimate(raw_amount: &str, fee_rate: f64) -> String {
    match raw_amount.trim().parse::<f64>() {
        Ok(amount) if amount.is_finite() && amount > 0.0 => {
            format!("{:.6}", estimate_credits(amount, fee_rate))
        }
        _ => "0".to_string(),
    }
}

/// Validated top-up amount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TopUpAmount(f64);

impl TopUpAmount {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AppError::Validation("Password and amount are required.".into()));
        }
        let amount: f64 = raw
            .parse()
            .map_err(|_| AppError::Validation(format!("Amount must be a number, got '{raw}'")))?;
        Self::new(amount)
    }

    pub fn new(amount: f64) -> Result<Self, AppError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(AppError::Validation("Amount must be greater than 0.".into()));
        }
        Ok(Self(amount))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hundred_at_default_fee() {
        assert_eq!(format_estimate("100", DEFAULT_FEE_RATE), "76.600000");
    }

    #[test]
    fn non_positive_or_garbage_estimates_zero() {
        assert_eq!(format_estimate("0", DEFAULT_FEE_RATE), "0");
        assert_eq!(format_estimate("-3", DEFAULT_FEE_RATE), "0");
        assert_eq!(format_estimate("", DEFAULT_FEE_RATE), "0");
        assert_eq!(format_estimate("ten", DEFAULT_FEE_RATE), "0");
    }

    #[test]
    fn fee_rate_is_a_parameter() {
        assert_eq!(format_estimate("10", 0.5), "5.000000");
        assert!((estimate_credits(2.0, 0.0) - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn amount_must_be_positive() {
        assert!(TopUpAmount::parse("0").is_err());
        assert!(TopUpAmount::parse("-1").is_err());
        assert!(TopUpAmount::parse("").is_err());
        assert_eq!(TopUpAmount::parse(" 0.5 ").unwrap().value(), 0.5);
    }
}
