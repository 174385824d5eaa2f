//! Listing price calculation.

use anyhow::{bail, Result};

/// Marketplace listing price covering cost, margin, and referral fee:
/// `price = (win_price + shipping) / (1 - (margin + fee) / 100)`,
/// rounded up to the nearest 10 JPY.
pub fn calculate_amazon_price(
    estimated_win_price: i64,
    shipping_cost: i64,
    margin_pct: f64,
    amazon_fee_pct: f64,
) -> Result<i64> {
    if estimated_win_price <= 0 {
        return Ok(0);
    }
    let total_cost = (estimated_win_price + shipping_cost) as f64;
    let divisor = 1.0 - (margin_pct + amazon_fee_pct) / 100.0;
    if divisor <= 0.0 {
        bail!("Combined margin and fees exceed 100%");
    }
    let raw = total_cost / divisor;
    Ok(((raw / 10.0).ceil() * 10.0) as i64)
}

/// Seller SKU for an auction; a date suffix is appended on relist.
pub fn generate_sku(auction_id: &str) -> String {
    format!("YAHOO-{auction_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_price() {
        // (3000 + 800) / (1 - 0.25) = 5066.67 → 5070
        assert_eq!(calculate_amazon_price(3000, 800, 15.0, 10.0).unwrap(), 5070);
    }

    #[test]
    fn zero_cost_yields_zero() {
        assert_eq!(calculate_amazon_price(0, 800, 15.0, 10.0).unwrap(), 0);
    }

    #[test]
    fn impossible_margin_errors() {
        assert!(calculate_amazon_price(3000, 800, 60.0, 45.0).is_err());
    }

    #[test]
    fn rounds_up_to_ten() {
        // (1000 + 0) / 0.75 = 1333.3 → 1340
        assert_eq!(calculate_amazon_price(1000, 0, 15.0, 10.0).unwrap(), 1340);
    }

    #[test]
    fn sku_format() {
        assert_eq!(generate_sku("x1012345678"), "YAHOO-x1012345678");
    }
}
