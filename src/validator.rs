//! Pre-execution checks for swap requests

use crate::{
    error::SwapError,
    exchange,
    types::{BalanceView, PriceSnapshot, SwapQuote, SwapRequest},
};
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

/// Parses a user-entered amount
///
/// Accepts digits with at most one decimal point (`"12"`, `"0.5"`, `".5"`,
/// `"5."`). Anything else, including zero, is an invalid amount.
pub fn parse_amount(input: &str) -> Result<Decimal, SwapError> {
    let text = input.trim();

    let well_formed = !text.is_empty()
        && text != "."
        && text.chars().all(|c| c.is_ascii_digit() || c == '.')
        && text.chars().filter(|c| *c == '.').count() <= 1;
    if !well_formed {
        return Err(SwapError::invalid_amount(format!("'{}' is not a number", input)));
    }

    let normalized = text.strip_suffix('.').unwrap_or(text);
    let normalized = if normalized.starts_with('.') {
        format!("0{}", normalized)
    } else {
        normalized.to_string()
    };

    let amount = Decimal::from_str(&normalized)
        .map_err(|e| SwapError::invalid_amount(format!("'{}': {}", input, e)))?;

    if amount <= Decimal::ZERO {
        return Err(SwapError::invalid_amount("amount must be greater than zero"));
    }

    Ok(amount)
}

impl SwapRequest {
    /// Builds a request from raw form input
    pub fn from_input(
        from_token: impl Into<String>,
        to_token: impl Into<String>,
        amount: &str,
    ) -> Result<Self, SwapError> {
        Ok(Self::new(from_token, to_token, parse_amount(amount)?))
    }
}

/// Checks a swap request against one price snapshot and one balance view
///
/// Checks run in a fixed order and stop at the first failure:
/// amount, distinct tokens, quote availability, funds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwapValidator;

impl SwapValidator {
    pub fn new() -> Self {
        Self
    }

    /// Input checks that need neither prices nor balances
    pub fn check_request(&self, request: &SwapRequest) -> Result<(), SwapError> {
        if request.from_amount <= Decimal::ZERO {
            return Err(SwapError::invalid_amount(format!(
                "amount must be greater than zero, got {}",
                request.from_amount
            )));
        }

        if request.from_token == request.to_token {
            return Err(SwapError::IdenticalTokens(request.from_token.clone()));
        }

        Ok(())
    }

    /// Validates the request and prices it
    ///
    /// Never touches the ledger.
    pub fn validate(
        &self,
        request: &SwapRequest,
        snapshot: &PriceSnapshot,
        balances: &BalanceView,
    ) -> Result<SwapQuote, SwapError> {
        self.check_request(request)?;

        for token in [&request.from_token, &request.to_token] {
            if snapshot.price(token).is_none() {
                return Err(SwapError::quote_unavailable(token));
            }
        }

        let conversion = exchange::quote_amount(
            &request.from_token,
            &request.to_token,
            request.from_amount,
            snapshot,
        )
        .filter(|c| c.to_amount > Decimal::ZERO)
        .ok_or_else(|| SwapError::quote_unavailable(&request.to_token))?;

        let available = balances.balance(&request.from_token);
        if request.from_amount > available {
            return Err(SwapError::InsufficientFunds {
                token: request.from_token.clone(),
                requested: request.from_amount,
                available,
            });
        }

        Ok(SwapQuote::new(
            Uuid::new_v4(),
            &request.from_token,
            &request.to_token,
            request.from_amount,
            conversion.to_amount,
            conversion.rate,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PriceRecord;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::time::Duration;

    fn prices() -> PriceSnapshot {
        PriceSnapshot::from_records(
            vec![
                PriceRecord::new("BTC", dec!(45000)),
                PriceRecord::new("ETH", dec!(3000)),
            ],
            Duration::from_secs(300),
        )
    }

    fn balances(entries: &[(&str, Decimal)]) -> BalanceView {
        BalanceView {
            balances: entries
                .iter()
                .map(|(t, a)| (t.to_string(), *a))
                .collect::<HashMap<_, _>>(),
            version: 0,
            taken_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_swap_is_quoted() {
        let quote = SwapValidator::new()
            .validate(
                &SwapRequest::new("BTC", "ETH", dec!(1)),
                &prices(),
                &balances(&[("BTC", dec!(2))]),
            )
            .unwrap();

        assert_eq!(quote.rate(), dec!(15));
        assert_eq!(quote.to_amount(), dec!(15));
        assert_eq!(quote.from_amount(), dec!(1));
    }

    #[test]
    fn test_insufficient_funds_reports_available() {
        let err = SwapValidator::new()
            .validate(
                &SwapRequest::new("ETH", "BTC", dec!(10)),
                &prices(),
                &balances(&[("ETH", dec!(5))]),
            )
            .unwrap_err();

        assert_eq!(err.available(), Some(dec!(5)));
    }

    #[test]
    fn test_identical_tokens() {
        let err = SwapValidator::new()
            .validate(
                &SwapRequest::new("BTC", "BTC", dec!(1)),
                &prices(),
                &balances(&[("BTC", dec!(2))]),
            )
            .unwrap_err();

        assert_eq!(err, SwapError::IdenticalTokens("BTC".to_string()));
    }

    #[test]
    fn test_unpriced_token() {
        let err = SwapValidator::new()
            .validate(
                &SwapRequest::new("BTC", "DOGE", dec!(1)),
                &prices(),
                &balances(&[("BTC", dec!(2))]),
            )
            .unwrap_err();

        assert_eq!(err, SwapError::quote_unavailable("DOGE"));
    }

    #[test]
    fn test_checks_run_in_order() {
        let validator = SwapValidator::new();
        let empty = balances(&[]);

        // Zero amount wins over identical, unpriced tokens
        let err = validator
            .validate(&SwapRequest::new("DOGE", "DOGE", dec!(0)), &prices(), &empty)
            .unwrap_err();
        assert!(matches!(err, SwapError::InvalidAmount(_)));

        // Identical wins over unpriced
        let err = validator
            .validate(&SwapRequest::new("DOGE", "DOGE", dec!(1)), &prices(), &empty)
            .unwrap_err();
        assert!(matches!(err, SwapError::IdenticalTokens(_)));

        // Unpriced wins over missing funds
        let err = validator
            .validate(&SwapRequest::new("DOGE", "BTC", dec!(1)), &prices(), &empty)
            .unwrap_err();
        assert_eq!(err, SwapError::quote_unavailable("DOGE"));
    }

    #[test]
    fn test_negative_amount() {
        let err = SwapValidator::new()
            .validate(
                &SwapRequest::new("BTC", "ETH", dec!(-1)),
                &prices(),
                &balances(&[("BTC", dec!(2))]),
            )
            .unwrap_err();

        assert!(matches!(err, SwapError::InvalidAmount(_)));
    }

    #[test]
    fn test_whole_balance_can_be_spent() {
        let quote = SwapValidator::new()
            .validate(
                &SwapRequest::new("ETH", "BTC", dec!(5)),
                &prices(),
                &balances(&[("ETH", dec!(5))]),
            )
            .unwrap();

        assert_eq!(quote.rate(), dec!(3000) / dec!(45000));
        assert_eq!(quote.to_amount(), dec!(5) * quote.rate());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("12").unwrap(), dec!(12));
        assert_eq!(parse_amount("0.5").unwrap(), dec!(0.5));
        assert_eq!(parse_amount(".5").unwrap(), dec!(0.5));
        assert_eq!(parse_amount("5.").unwrap(), dec!(5));
        assert_eq!(parse_amount(" 3 ").unwrap(), dec!(3));

        for bad in ["", ".", "0", "0.000", "-1", "1.2.3", "abc", "1e5", "NaN", "inf"] {
            assert!(
                matches!(parse_amount(bad), Err(SwapError::InvalidAmount(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_request_from_input() {
        let request = SwapRequest::from_input("BTC", "ETH", "0.25").unwrap();
        assert_eq!(request, SwapRequest::new("BTC", "ETH", dec!(0.25)));
        assert!(SwapRequest::from_input("BTC", "ETH", "").is_err());
    }
}
