//! Exchange rate and conversion math
//!
//! Pure functions over a [`PriceSnapshot`]. All arithmetic is
//! `rust_decimal`, and nothing here rounds; display precision is the
//! caller's business.

use crate::types::PriceSnapshot;
use rust_decimal::Decimal;

/// Units of `to_token` received per unit of `from_token`
///
/// `None` means no quote: either token has no price in the snapshot.
pub fn rate(from_token: &str, to_token: &str, snapshot: &PriceSnapshot) -> Option<Decimal> {
    let from_price = snapshot.price(from_token)?;
    let to_price = snapshot.price(to_token)?;

    from_price.checked_div(to_price)
}

/// Converts an amount at the given rate, `None` on overflow
pub fn convert(amount: Decimal, rate: Decimal) -> Option<Decimal> {
    amount.checked_mul(rate)
}

/// Rate and converted amount for a prospective swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversion {
    pub rate: Decimal,
    pub to_amount: Decimal,
}

/// Prices `amount` of `from_token` in `to_token`
pub fn quote_amount(
    from_token: &str,
    to_token: &str,
    amount: Decimal,
    snapshot: &PriceSnapshot,
) -> Option<Conversion> {
    let rate = rate(from_token, to_token, snapshot)?;
    let to_amount = convert(amount, rate)?;
    Some(Conversion { rate, to_amount })
}
