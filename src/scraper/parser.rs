//! Parsers for auction-site HTML.
//!
//! Item pages embed their data as a `var pageData = {...};` JSON blob;
//! search results spread `data-auction-*` attributes across descendant
//! elements of each `li.Product`.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::warn;

use super::client::auction_url;
use super::{AuctionSnapshot, SearchResultItem};

fn jst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).expect("JST offset")
}

lazy_static! {
    static ref PAGE_DATA_RE: Regex =
        Regex::new(r"(?s)var\s+pageData\s*=\s*(\{.*?\})\s*;").unwrap();
    static ref OG_IMAGE_RE: Regex =
        Regex::new(r#"<meta\s+property="og:image"\s+content="([^"]+)""#).unwrap();
    static ref DESCRIPTION_RE: Regex = Regex::new(
        r#"<meta\s+(?:property="og:description"|name="description")\s+content="([^"]+)""#
    )
    .unwrap();
    static ref SELLER_RE: Regex = Regex::new(r#"/seller/([^"'&?\s]+)"#).unwrap();
    static ref IMG_URL_RE: Regex = Regex::new(
        r#"https://auctions\.c\.yimg\.jp/images\.auctions\.yahoo\.co\.jp/image/[^\s"'<>]+"#
    )
    .unwrap();
    static ref PRICE_DIGITS_RE: Regex = Regex::new(r"[\d,]+").unwrap();
}

/// pageData numbers arrive as either JSON numbers or digit strings.
fn val_i64(v: &Value) -> i64 {
    match v {
        Value::Number(n) => n.as_i64().unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn val_str(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// Parse an individual auction page.
pub struct AuctionPageParser;

impl AuctionPageParser {
    pub fn parse(html: &str) -> Option<AuctionSnapshot> {
        let m = PAGE_DATA_RE.captures(html).or_else(|| {
            warn!("pageData not found in HTML");
            None
        })?;
        let data: Value = match serde_json::from_str(&m[1]) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Failed to parse pageData JSON");
                return None;
            }
        };

        let items = &data["items"];
        let auction_id = val_str(&items["productID"]);
        if auction_id.is_empty() {
            return None;
        }

        let image_url = OG_IMAGE_RE
            .captures(html)
            .map(|c| c[1].to_string())
            .unwrap_or_default();
        let seller_id = SELLER_RE
            .captures(html)
            .map(|c| c[1].to_string())
            .unwrap_or_default();

        Some(AuctionSnapshot {
            url: auction_url(&auction_id),
            auction_id,
            title: val_str(&items["productName"]),
            image_url,
            category_id: val_str(&items["productCategoryID"]),
            seller_id,
            current_price: val_i64(&items["price"]),
            // pageData doesn't expose the start price separately
            start_price: val_i64(&items["price"]),
            buy_now_price: 0,
            win_price: val_i64(&items["winPrice"]),
            start_time: parse_jst_datetime(items["starttime"].as_str()),
            end_time: parse_jst_datetime(items["endtime"].as_str()),
            bid_count: val_i64(&items["bids"]),
            is_closed: items["isClosed"].as_str() == Some("1"),
            has_winner: items["hasWinner"].as_str() == Some("1"),
        })
    }

    /// All product image URLs: pageData arrays, then og:image, then a
    /// regex pass for CDN URLs. Order-preserving dedup.
    pub fn extract_all_images(html: &str) -> Vec<String> {
        let mut images: Vec<String> = Vec::new();

        if let Some(m) = PAGE_DATA_RE.captures(html) {
            if let Ok(data) = serde_json::from_str::<Value>(&m[1]) {
                let items = &data["items"];
                for key in ["imageUrls", "images", "img"] {
                    match &items[key] {
                        Value::Array(arr) => {
                            for v in arr {
                                let url = match v {
                                    Value::String(s) => s.clone(),
                                    Value::Object(o) => o
                                        .get("url")
                                        .and_then(|u| u.as_str())
                                        .unwrap_or("")
                                        .to_string(),
                                    _ => String::new(),
                                };
                                if !url.is_empty() {
                                    images.push(url);
                                }
                            }
                        }
                        Value::String(s) if !s.is_empty() => images.push(s.clone()),
                        _ => {}
                    }
                    if !images.is_empty() {
                        break;
                    }
                }
            }
        }

        if images.is_empty() {
            if let Some(og) = OG_IMAGE_RE.captures(html) {
                images.push(og[1].to_string());
            }
        }
        if images.is_empty() {
            images = IMG_URL_RE
                .find_iter(html)
                .map(|m| m.as_str().to_string())
                .collect();
        }

        let mut seen = std::collections::HashSet::new();
        images.retain(|u| !u.is_empty() && seen.insert(u.clone()));
        images
    }

    /// Seller description text from the meta description tags.
    pub fn extract_description(html: &str) -> String {
        DESCRIPTION_RE
            .captures(html)
            .map(|c| c[1].to_string())
            .unwrap_or_default()
    }
}

fn parse_jst_datetime(s: Option<&str>) -> Option<DateTime<Utc>> {
    let s = s?;
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok()?;
    jst()
        .from_local_datetime(&naive)
        .single()
        .map(|d| d.with_timezone(&Utc))
}

/// Parse a search results page.
pub struct SearchResultsParser;

impl SearchResultsParser {
    pub fn parse(html: &str) -> Vec<SearchResultItem> {
        let doc = Html::parse_document(html);
        let product_sel = Selector::parse("li.Product").expect("static selector");

        doc.select(&product_sel)
            .filter_map(Self::parse_product)
            .collect()
    }

    fn parse_product(li: ElementRef) -> Option<SearchResultItem> {
        let data_sel = Selector::parse("[data-auction-id]").expect("static selector");

        // Gather data-auction-* attributes spread across descendants;
        // first non-empty value wins.
        let mut attrs: std::collections::HashMap<String, String> = Default::default();
        for el in li.select(&data_sel) {
            for (name, value) in el.value().attrs() {
                if let Some(attr_name) = name.strip_prefix("data-auction-") {
                    if !value.is_empty() {
                        attrs
                            .entry(attr_name.to_string())
                            .or_insert_with(|| value.to_string());
                    }
                }
            }
        }

        let auction_id = attrs.get("id").cloned().unwrap_or_default();
        if auction_id.is_empty() {
            return None;
        }

        // End time is a unix timestamp in JST
        let end_time = attrs
            .get("endtime")
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single());

        let bid_count = Self::select_text(&li, ".Product__bid")
            .and_then(|t| t.trim().parse::<i64>().ok())
            .unwrap_or(0);

        let shipping_cost = Self::parse_shipping(&li);

        let mut buy_now_price = attrs
            .get("buynowprice")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        if buy_now_price <= 0 {
            buy_now_price = Self::parse_buy_now_price(&li);
        }

        Some(SearchResultItem {
            url: auction_url(&auction_id),
            auction_id,
            title: attrs.get("title").cloned().unwrap_or_default(),
            image_url: attrs.get("img").cloned().unwrap_or_default(),
            current_price: attrs
                .get("price")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            buy_now_price,
            start_price: attrs
                .get("startprice")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            bid_count,
            end_time,
            seller_id: attrs.get("auc-seller-id").cloned().unwrap_or_default(),
            category_id: attrs.get("category").cloned().unwrap_or_default(),
            shipping_cost,
        })
    }

    fn select_text(li: &ElementRef, selector: &str) -> Option<String> {
        let sel = Selector::parse(selector).ok()?;
        li.select(&sel)
            .next()
            .map(|el| el.text().collect::<String>())
    }

    /// Buy-now (即決) price from the price rows:
    /// ```html
    /// <div class="Product__price">
    ///   <span class="Product__label">即決</span>
    ///   <span class="Product__priceValue">3,950円</span>
    /// </div>
    /// ```
    fn parse_buy_now_price(li: &ElementRef) -> i64 {
        let price_sel = Selector::parse(".Product__price").expect("static selector");
        let label_sel = Selector::parse(".Product__label").expect("static selector");
        let value_sel = Selector::parse(".Product__priceValue").expect("static selector");

        for price_div in li.select(&price_sel) {
            let label = match price_div.select(&label_sel).next() {
                Some(el) => el.text().collect::<String>(),
                None => continue,
            };
            if !label.contains("即決") {
                continue;
            }
            if let Some(value_el) = price_div.select(&value_sel).next() {
                let text = value_el.text().collect::<String>().replace(',', "");
                if let Some(m) = PRICE_DIGITS_RE.find(&text) {
                    if let Ok(price) = m.as_str().parse::<i64>() {
                        return price;
                    }
                }
            }
        }
        0
    }

    /// Shipping cost: 0 for 送料無料, the first labelled integer, or
    /// `None` when unknown.
    fn parse_shipping(li: &ElementRef) -> Option<i64> {
        for selector in [
            ".Product__shipping",
            ".Product__postage",
            "[class*='shipping']",
            "[class*='postage']",
        ] {
            let sel = match Selector::parse(selector) {
                Ok(s) => s,
                Err(_) => continue,
            };
            if let Some(el) = li.select(&sel).next() {
                let text = el.text().collect::<String>();
                if text.contains("無料") || text.to_lowercase().contains("free") {
                    return Some(0);
                }
                let digits = text.replace(',', "");
                if let Some(m) = PRICE_DIGITS_RE.find(&digits) {
                    if let Ok(cost) = m.as_str().parse::<i64>() {
                        return Some(cost);
                    }
                }
                return None;
            }
        }

        if li.text().collect::<String>().contains("送料無料") {
            return Some(0);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemStatus;

    const ITEM_HTML: &str = r#"<html><head>
        <meta property="og:image" content="https://auctions.c.yimg.jp/images.auctions.yahoo.co.jp/image/main.jpg">
        </head><body>
        <a href="https://auctions.yahoo.co.jp/seller/testseller99?x=1">seller</a>
        <script>
        var pageData = {"items":{"productID":"x1012345678","productName":"Sony WH-1000XM4 ヘッドホン","price":"12500","winPrice":"0","starttime":"2026-07-01 21:00:00","endtime":"2026-07-08 21:00:00","bids":"3","isClosed":"0","hasWinner":"0","productCategoryID":"2084"}};
        </script></body></html>"#;

    #[test]
    fn parses_item_page_data() {
        let snap = AuctionPageParser::parse(ITEM_HTML).unwrap();
        assert_eq!(snap.auction_id, "x1012345678");
        assert_eq!(snap.title, "Sony WH-1000XM4 ヘッドホン");
        assert_eq!(snap.current_price, 12500);
        assert_eq!(snap.bid_count, 3);
        assert_eq!(snap.seller_id, "testseller99");
        assert!(!snap.is_closed);
        assert_eq!(snap.status(), ItemStatus::Active);
        // 21:00 JST == 12:00 UTC
        let end = snap.end_time.unwrap();
        assert_eq!(end.format("%Y-%m-%d %H:%M").to_string(), "2026-07-08 12:00");
    }

    #[test]
    fn closed_with_winner_is_sold() {
        let html = ITEM_HTML
            .replace(r#""isClosed":"0""#, r#""isClosed":"1""#)
            .replace(r#""hasWinner":"0""#, r#""hasWinner":"1""#);
        let snap = AuctionPageParser::parse(&html).unwrap();
        assert_eq!(snap.status(), ItemStatus::EndedSold);
    }

    #[test]
    fn images_fall_back_to_og_image() {
        let images = AuctionPageParser::extract_all_images(ITEM_HTML);
        assert_eq!(
            images,
            vec!["https://auctions.c.yimg.jp/images.auctions.yahoo.co.jp/image/main.jpg"]
        );
    }

    const SEARCH_HTML: &str = r#"<html><body><ul>
        <li class="Product">
          <a data-auction-id="b2087654321" data-auction-title="ダイソン V8 Slim 掃除機"
             data-auction-price="8000" data-auction-startprice="1000"
             data-auction-img="https://example.invalid/i.jpg"
             data-auction-endtime="1767225600" data-auction-category="12345"></a>
          <span data-auction-id="b2087654321" data-auction-buynowprice="15000"></span>
          <span class="Product__bid">4</span>
          <div class="Product__postage">送料無料</div>
        </li>
        <li class="Product">
          <a data-auction-id="c3098765432" data-auction-title="GoPro HERO12"
             data-auction-price="30000"></a>
          <div class="Product__price">
            <span class="Product__label">現在</span>
            <span class="Product__priceValue">30,000円</span>
          </div>
          <div class="Product__price">
            <span class="Product__label">即決</span>
            <span class="Product__priceValue">42,800円</span>
          </div>
          <div class="Product__shipping">送料 ¥1,000</div>
        </li>
        </ul></body></html>"#;

    #[test]
    fn parses_search_results() {
        let items = SearchResultsParser::parse(SEARCH_HTML);
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.auction_id, "b2087654321");
        assert_eq!(first.title, "ダイソン V8 Slim 掃除機");
        assert_eq!(first.buy_now_price, 15000);
        assert_eq!(first.bid_count, 4);
        assert_eq!(first.shipping_cost, Some(0));
        assert!(first.end_time.is_some());

        let second = &items[1];
        // Buy-now came from the 即決-labelled price row
        assert_eq!(second.buy_now_price, 42800);
        assert_eq!(second.shipping_cost, Some(1000));
    }
}
