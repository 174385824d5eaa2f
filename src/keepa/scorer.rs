//! Deal scoring: pure functions from (auction price, analytics product)
//! to a scored candidate.

use serde::{Deserialize, Serialize};

use super::{stat_minmax, stat_val, KeepaProduct, IDX_NEW, IDX_SALES_RANK, IDX_USED};

/// Forwarding cost by package size category (total of three sides, mm →
/// JPY). Comes from the operator's carrier contract.
const FORWARDING_SIZE_TABLE: &[(i64, i64)] = &[
    (600, 735),
    (800, 840),
    (1000, 960),
    (1200, 1150),
    (1400, 1340),
    (1600, 1810),
    (1800, 3060),
    (2000, 3810),
];

/// Anything over size 200 cannot be forwarded.
const MAX_FORWARDABLE_MM: i64 = 2000;

/// Sales-rank trend from the 30-day / 90-day average ratio. Lower rank
/// is better, so a falling ratio means improving sales.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesRankAnalysis {
    pub current_rank: Option<i64>,
    pub avg_rank_30d: Option<i64>,
    pub avg_rank_90d: Option<i64>,
    pub min_rank_90d: Option<i64>,
    pub max_rank_90d: Option<i64>,
    /// "improving" | "declining" | "stable" | "unknown"
    pub rank_trend: &'static str,
    pub sells_well: bool,
    pub rank_threshold_used: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsedPriceAnalysis {
    pub current_price: Option<i64>,
    pub avg_price_30d: Option<i64>,
    pub avg_price_90d: Option<i64>,
    pub min_price_90d: Option<i64>,
    pub max_price_90d: Option<i64>,
    /// "rising" | "falling" | "stable" | "unknown"
    pub price_trend: &'static str,
    pub price_volatility: f64,
}

pub fn analyze_sales_rank(product: &KeepaProduct, good_rank_threshold: i64) -> SalesRankAnalysis {
    let stats = product.stats.clone().unwrap_or_default();
    let current = stat_val(&stats.current, IDX_SALES_RANK);
    let avg_30d = stat_val(&stats.avg30, IDX_SALES_RANK);
    let avg_90d = stat_val(&stats.avg90, IDX_SALES_RANK);
    let min_90d = stat_minmax(&stats.min_in_interval, IDX_SALES_RANK);
    let max_90d = stat_minmax(&stats.max_in_interval, IDX_SALES_RANK);

    let rank_trend = match (avg_30d, avg_90d) {
        (Some(a30), Some(a90)) if a90 > 0 => {
            let ratio = a30 as f64 / a90 as f64;
            if ratio < 0.85 {
                "improving"
            } else if ratio > 1.15 {
                "declining"
            } else {
                "stable"
            }
        }
        _ => "unknown",
    };

    SalesRankAnalysis {
        current_rank: current,
        avg_rank_30d: avg_30d,
        avg_rank_90d: avg_90d,
        min_rank_90d: min_90d,
        max_rank_90d: max_90d,
        rank_trend,
        sells_well: current.is_some_and(|r| r <= good_rank_threshold),
        rank_threshold_used: good_rank_threshold,
    }
}

pub fn analyze_used_price(product: &KeepaProduct) -> UsedPriceAnalysis {
    let stats = product.stats.clone().unwrap_or_default();
    let current = stat_val(&stats.current, IDX_USED);
    let avg_30d = stat_val(&stats.avg30, IDX_USED);
    let avg_90d = stat_val(&stats.avg90, IDX_USED);
    let min_90d = stat_minmax(&stats.min_in_interval, IDX_USED);
    let max_90d = stat_minmax(&stats.max_in_interval, IDX_USED);

    let price_trend = match (avg_30d, avg_90d) {
        (Some(a30), Some(a90)) if a90 > 0 => {
            let ratio = a30 as f64 / a90 as f64;
            if ratio > 1.10 {
                "rising"
            } else if ratio < 0.90 {
                "falling"
            } else {
                "stable"
            }
        }
        _ => "unknown",
    };

    let price_volatility = match (min_90d, max_90d, avg_90d) {
        (Some(min), Some(max), Some(avg)) if avg > 0 => {
            ((max - min) as f64 / avg as f64 * 1000.0).round() / 1000.0
        }
        _ => 0.0,
    };

    UsedPriceAnalysis {
        current_price: current,
        avg_price_30d: avg_30d,
        avg_price_90d: avg_90d,
        min_price_90d: min_90d,
        max_price_90d: max_90d,
        price_trend,
        price_volatility,
    }
}

/// Forwarding cost from the size table, `None` when the package cannot
/// be forwarded, or the fallback when dimensions are unknown.
fn resolve_forwarding_cost(product: &KeepaProduct, fallback: i64) -> Option<i64> {
    let (l, w, h) = match (
        product.package_length,
        product.package_width,
        product.package_height,
    ) {
        (Some(l), Some(w), Some(h)) if l > 0 && w > 0 && h > 0 => (l, w, h),
        _ => return Some(fallback),
    };
    let total = l + w + h;
    if total > MAX_FORWARDABLE_MM {
        return None;
    }
    FORWARDING_SIZE_TABLE
        .iter()
        .find(|(limit, _)| total <= *limit)
        .map(|(_, cost)| *cost)
}

/// A scored (auction, marketplace product) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealCandidate {
    pub yahoo_title: String,
    pub yahoo_price: i64,
    pub yahoo_shipping: i64,
    pub yahoo_auction_id: String,
    pub yahoo_url: String,
    pub yahoo_image_url: String,
    pub amazon_asin: String,
    pub amazon_title: String,
    pub amazon_used_price: Option<i64>,
    pub amazon_new_price: Option<i64>,
    pub sales_rank: Option<i64>,
    pub sells_well: bool,
    pub sell_price: i64,
    pub total_cost: i64,
    pub amazon_fee: i64,
    pub amazon_fee_pct: f64,
    pub forwarding_cost: i64,
    pub gross_profit: i64,
    pub gross_margin_pct: f64,
    pub rank_trend: &'static str,
    pub price_trend: &'static str,
}

/// Score a potential deal.
///
/// ```text
/// total_cost   = yahoo_price + yahoo_shipping + forwarding + system_fee
/// sell_price   = current used price, else current new price
/// amazon_fee   = floor(sell_price * fee_pct / 100)
/// gross_profit = sell_price - total_cost - amazon_fee
/// gross_margin = round(gross_profit / sell_price * 100, 1)
/// ```
///
/// Returns `None` when the product has no usable sell price, the fee
/// percentage is absurd, or the package is too large to forward.
/// Auction identity fields are left empty for the caller to fill.
#[allow(clippy::too_many_arguments)]
pub fn score_deal(
    yahoo_price: i64,
    product: &KeepaProduct,
    yahoo_shipping: i64,
    forwarding_fallback: i64,
    system_fee: i64,
    amazon_fee_pct: f64,
    good_rank_threshold: i64,
) -> Option<DealCandidate> {
    let stats = product.stats.clone().unwrap_or_default();
    let used_price = stat_val(&stats.current, IDX_USED);
    let new_price = stat_val(&stats.current, IDX_NEW);
    let rank = stat_val(&stats.current, IDX_SALES_RANK);

    let sell_price = used_price.or(new_price).filter(|p| *p > 0)?;

    if amazon_fee_pct >= 100.0 {
        return None;
    }

    let forwarding = resolve_forwarding_cost(product, forwarding_fallback)?;

    let total_cost = yahoo_price + yahoo_shipping + forwarding + system_fee;
    let amazon_fee = (sell_price as f64 * amazon_fee_pct / 100.0).floor() as i64;
    let gross_profit = sell_price - total_cost - amazon_fee;
    let gross_margin_pct =
        (gross_profit as f64 / sell_price as f64 * 100.0 * 10.0).round() / 10.0;

    let sr = analyze_sales_rank(product, good_rank_threshold);
    let up = analyze_used_price(product);

    Some(DealCandidate {
        yahoo_title: String::new(),
        yahoo_price,
        yahoo_shipping,
        yahoo_auction_id: String::new(),
        yahoo_url: String::new(),
        yahoo_image_url: String::new(),
        amazon_asin: product.asin.clone(),
        amazon_title: product.title.clone().unwrap_or_default(),
        amazon_used_price: used_price,
        amazon_new_price: new_price,
        sales_rank: rank,
        sells_well: sr.sells_well,
        sell_price,
        total_cost,
        amazon_fee,
        amazon_fee_pct,
        forwarding_cost: forwarding,
        gross_profit,
        gross_margin_pct,
        rank_trend: sr.rank_trend,
        price_trend: up.price_trend,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product(used: i64, new: i64, rank: i64) -> KeepaProduct {
        serde_json::from_value(json!({
            "asin": "B000TEST01",
            "title": "Test",
            "stats": {"current": [-1, new, used, rank]}
        }))
        .unwrap()
    }

    #[test]
    fn scores_the_reference_deal_exactly() {
        let deal = score_deal(3000, &product(10_000, -1, 45_000), 0, 800, 100, 10.0, 100_000)
            .unwrap();
        assert_eq!(deal.total_cost, 3900);
        assert_eq!(deal.amazon_fee, 1000);
        assert_eq!(deal.gross_profit, 5100);
        assert_eq!(deal.gross_margin_pct, 51.0);
        assert!(deal.sells_well);
    }

    #[test]
    fn integer_arithmetic_is_reproducible() {
        let p = product(9999, -1, 50_000);
        let a = score_deal(3210, &p, 350, 960, 100, 8.0, 100_000).unwrap();
        let b = score_deal(3210, &p, 350, 960, 100, 8.0, 100_000).unwrap();
        assert_eq!(a.gross_profit, b.gross_profit);
        assert_eq!(a.gross_margin_pct, b.gross_margin_pct);
        // floor(9999 * 0.08) = 799
        assert_eq!(a.amazon_fee, 799);
    }

    #[test]
    fn falls_back_to_new_price() {
        let deal = score_deal(3000, &product(-1, 15_000, 200_000), 0, 800, 100, 10.0, 100_000)
            .unwrap();
        assert_eq!(deal.sell_price, 15_000);
        assert!(!deal.sells_well);
    }

    #[test]
    fn no_price_data_scores_nothing() {
        assert!(score_deal(3000, &product(-1, -1, 1000), 0, 800, 100, 10.0, 100_000).is_none());
    }

    #[test]
    fn absurd_fee_scores_nothing() {
        assert!(score_deal(3000, &product(10_000, -1, 1000), 0, 800, 100, 100.0, 100_000).is_none());
    }

    #[test]
    fn size_table_overrides_fallback() {
        let mut p = product(10_000, -1, 1000);
        p.package_length = Some(300);
        p.package_width = Some(200);
        p.package_height = Some(80);
        // total 580mm → size 60 → 735 JPY
        let deal = score_deal(3000, &p, 0, 960, 100, 10.0, 100_000).unwrap();
        assert_eq!(deal.forwarding_cost, 735);
    }

    #[test]
    fn oversize_package_scores_nothing() {
        let mut p = product(10_000, -1, 1000);
        p.package_length = Some(900);
        p.package_width = Some(700);
        p.package_height = Some(500);
        assert!(score_deal(3000, &p, 0, 960, 100, 10.0, 100_000).is_none());
    }

    #[test]
    fn trend_classification_boundaries() {
        let p: KeepaProduct = serde_json::from_value(json!({
            "asin": "B0",
            "stats": {
                "current": [-1, -1, 10000, 40000],
                "avg30": [-1, -1, 12000, 30000],
                "avg90": [-1, -1, 10000, 40000]
            }
        }))
        .unwrap();
        // rank 30000/40000 = 0.75 < 0.85 → improving
        assert_eq!(analyze_sales_rank(&p, 100_000).rank_trend, "improving");
        // price 12000/10000 = 1.2 > 1.10 → rising
        assert_eq!(analyze_used_price(&p).price_trend, "rising");
    }
}
