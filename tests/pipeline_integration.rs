//! End-to-end pipeline checks over a real database file: match → score
//! → persist → reject → learn → re-match.

use chrono::Utc;
use tempfile::tempdir;

use scoutbot_backend::ai::engine::approve_candidate;
use scoutbot_backend::ai::generator;
use scoutbot_backend::ai::rejection;
use scoutbot_backend::keepa::scorer::score_deal;
use scoutbot_backend::keepa::KeepaProduct;
use scoutbot_backend::matcher::{self, MatcherOverrides};
use scoutbot_backend::models::{AlertStatus, DealAlert, RejectionReason};
use scoutbot_backend::store::{NewKeyword, Store};

fn keepa_product(used_price: i64, rank: i64, title: &str) -> KeepaProduct {
    serde_json::from_value(serde_json::json!({
        "asin": "B000TEST01",
        "title": title,
        "stats": {"current": [-1, -1, used_price, rank]}
    }))
    .unwrap()
}

fn alert_from_deal(
    keyword_id: i64,
    auction_id: &str,
    yahoo_title: &str,
    amazon_title: &str,
    deal: &scoutbot_backend::keepa::scorer::DealCandidate,
) -> DealAlert {
    DealAlert {
        id: 0,
        keyword_id,
        yahoo_auction_id: auction_id.to_string(),
        amazon_asin: deal.amazon_asin.clone(),
        yahoo_title: yahoo_title.to_string(),
        yahoo_url: String::new(),
        yahoo_image_url: String::new(),
        amazon_title: amazon_title.to_string(),
        yahoo_price: deal.yahoo_price,
        yahoo_shipping: deal.yahoo_shipping,
        sell_price: deal.sell_price,
        gross_profit: deal.gross_profit,
        gross_margin_pct: deal.gross_margin_pct,
        amazon_fee_pct: deal.amazon_fee_pct,
        forwarding_cost: deal.forwarding_cost,
        notified_at: Utc::now(),
        status: AlertStatus::Active,
        rejection_reason: None,
        rejection_note: String::new(),
        rejected_at: None,
    }
}

#[tokio::test]
async fn match_score_persist_and_expire() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("pipeline.db");
    let store = Store::open(db_path.to_str().unwrap()).unwrap();

    let kw = store
        .insert_keyword(&NewKeyword::manual("sony wh-1000xm4"))
        .unwrap()
        .unwrap();

    // A matching pair scores into an alert-worthy deal
    let yahoo_title = "Sony WH-1000XM4 ワイヤレスヘッドホン 美品";
    let amazon_title = "Sony WH-1000XM4 Wireless Headphones";
    let result = matcher::match_products(yahoo_title, amazon_title);
    assert!(result.is_likely_match());

    let product = keepa_product(10_000, 45_000, amazon_title);
    let deal = score_deal(3000, &product, 0, 800, 100, 10.0, 100_000).unwrap();
    assert_eq!(deal.gross_profit, 5100);
    assert_eq!(deal.gross_margin_pct, 51.0);
    assert!(deal.sells_well);

    let alert = alert_from_deal(kw.id, "x900", yahoo_title, amazon_title, &deal);
    let stored = store.insert_alert(&alert).unwrap().unwrap();
    assert!(stored.id > 0);

    // Same (auction, asin) pair again: silent no-op
    assert!(store.insert_alert(&alert).unwrap().is_none());
    assert_eq!(store.count_alerts().unwrap(), 1);

    // The auction ends: every open alert for it expires
    let expired = store.expire_alerts_for_auction("x900").unwrap();
    assert_eq!(expired, 1);
    assert_eq!(
        store.get_alert(stored.id).unwrap().unwrap().status,
        AlertStatus::Expired
    );
}

#[tokio::test]
async fn rejection_feeds_back_into_the_matcher() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("learning.db");
    let store = Store::open(db_path.to_str().unwrap()).unwrap();
    let overrides = MatcherOverrides::new();

    let kw = store
        .insert_keyword(&NewKeyword::manual("wh-1000xm5"))
        .unwrap()
        .unwrap();

    // An unknown accessory word slips past the static lexicon
    let yahoo_title = "WH-1000XM5 おきにいりけーぶるばんど";
    let amazon_title = "Sony WH-1000XM5 ヘッドホン";

    for (i, asin) in ["B000XM5A01", "B000XM5A02"].iter().enumerate() {
        let product = keepa_product(12_000, 30_000, amazon_title);
        let mut deal = score_deal(3000, &product, 0, 800, 100, 10.0, 100_000).unwrap();
        deal.amazon_asin = asin.to_string();
        let alert = alert_from_deal(kw.id, &format!("x95{i}"), yahoo_title, amazon_title, &deal);
        let stored = store.insert_alert(&alert).unwrap().unwrap();

        let rejected = rejection::reject_alert(
            stored.id,
            RejectionReason::Accessory,
            "",
            &store,
            &overrides,
        )
        .unwrap();
        assert!(rejected.is_some());
    }

    // Two observations: the learned word now hard-rejects the pair
    let snapshot = overrides.snapshot();
    let result = matcher::match_products_with(yahoo_title, amazon_title, &snapshot);
    assert!(result.accessory_conflict);
    assert!(!result.is_likely_match());
}

#[tokio::test]
async fn profitable_alert_seeds_series_candidates() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("series.db");
    let store = Store::open(db_path.to_str().unwrap()).unwrap();

    let kw = store
        .insert_keyword(&NewKeyword::manual("casio 電子辞書"))
        .unwrap()
        .unwrap();

    let product = keepa_product(15_000, 20_000, "CASIO エクスワード XD-900");
    let deal = score_deal(4000, &product, 0, 800, 100, 10.0, 100_000).unwrap();
    assert!(deal.gross_profit >= 3000);
    let alert = alert_from_deal(
        kw.id,
        "x970",
        "Casio XD-900 電子辞書",
        "CASIO エクスワード XD-900",
        &deal,
    );
    store.insert_alert(&alert).unwrap().unwrap();

    let existing = generator::existing_keyword_set(&store).unwrap();
    let candidates =
        generator::generate_series_expansion(&store, 3000, &existing, 10, None).unwrap();

    let keywords: Vec<&str> = candidates.iter().map(|c| c.keyword.as_str()).collect();
    for sibling in ["xd700", "xd800", "xd1000", "xd1100"] {
        assert!(
            keywords.contains(&sibling),
            "missing sibling {sibling} in {keywords:?}"
        );
    }
    assert!(candidates.iter().all(|c| c.strategy == "series"));
    assert!(candidates.iter().all(|c| (c.confidence - 0.75).abs() < 1e-9));
}

#[tokio::test]
async fn approving_a_candidate_auto_rejects_similar_pending_ones() {
    use scoutbot_backend::models::{CandidateStatus, KeywordCandidate};

    let dir = tempdir().unwrap();
    let db_path = dir.path().join("approve.db");
    let store = Store::open(db_path.to_str().unwrap()).unwrap();

    let insert = |keyword: &str| {
        store
            .insert_candidate(&KeywordCandidate {
                id: 0,
                keyword: keyword.to_string(),
                strategy: "brand".to_string(),
                confidence: 0.7,
                parent_keyword_id: None,
                reasoning: String::new(),
                status: CandidateStatus::Pending,
                validation_result: String::new(),
                created_at: Utc::now(),
                resolved_at: None,
            })
            .unwrap()
    };

    let winner = insert("Sony ヘッドホン");
    insert("ソニー ヘッドホン"); // same search intent, different script
    insert("ダイソン 掃除機"); // unrelated

    let (approved, auto_rejected) = approve_candidate(&store, winner.id).unwrap().unwrap();
    assert_eq!(approved.status, CandidateStatus::Approved);
    assert_eq!(auto_rejected, 1);

    let pending = store.list_candidates(Some(CandidateStatus::Pending)).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].keyword, "ダイソン 掃除機");

    // The approved keyword is now watched, attributed to its strategy
    let keywords = store.list_keywords().unwrap();
    assert!(keywords
        .iter()
        .any(|k| k.keyword == "Sony ヘッドホン" && k.source == "ai_brand"));
}
