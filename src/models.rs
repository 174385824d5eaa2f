//! Persisted entities and their enums.
//!
//! Every enum round-trips through its database TEXT form via
//! `as_str` / `parse_str` pairs so the store layer never matches on
//! raw strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Auction lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Active,
    EndedNoWinner,
    EndedSold,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Active => "active",
            ItemStatus::EndedNoWinner => "ended_no_winner",
            ItemStatus::EndedSold => "ended_sold",
        }
    }

    pub fn parse_str(s: &str) -> Self {
        match s {
            "ended_no_winner" => ItemStatus::EndedNoWinner,
            "ended_sold" => ItemStatus::EndedSold,
            _ => ItemStatus::Active,
        }
    }

    pub fn is_ended(&self) -> bool {
        !matches!(self, ItemStatus::Active)
    }
}

/// Marketplace listing status for a monitored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    Inactive,
    Error,
    Delisted,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Active => "active",
            ListingStatus::Inactive => "inactive",
            ListingStatus::Error => "error",
            ListingStatus::Delisted => "delisted",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ListingStatus::Active),
            "inactive" => Some(ListingStatus::Inactive),
            "error" => Some(ListingStatus::Error),
            "delisted" => Some(ListingStatus::Delisted),
            _ => None,
        }
    }
}

/// Used-item condition for marketplace offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    UsedLikeNew,
    UsedVeryGood,
    UsedGood,
    UsedAcceptable,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::UsedLikeNew => "used_like_new",
            Condition::UsedVeryGood => "used_very_good",
            Condition::UsedGood => "used_good",
            Condition::UsedAcceptable => "used_acceptable",
        }
    }

    pub fn parse_str(s: &str) -> Self {
        match s {
            "used_like_new" => Condition::UsedLikeNew,
            "used_good" => Condition::UsedGood,
            "used_acceptable" => Condition::UsedAcceptable,
            _ => Condition::UsedVeryGood,
        }
    }
}

/// Ship-by window patterns registered in Seller Central.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShippingPattern {
    OneToTwoDays,
    TwoToThreeDays,
    ThreeToSevenDays,
}

impl ShippingPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingPattern::OneToTwoDays => "1_2_days",
            ShippingPattern::TwoToThreeDays => "2_3_days",
            ShippingPattern::ThreeToSevenDays => "3_7_days",
        }
    }

    pub fn parse_str(s: &str) -> Self {
        match s {
            "1_2_days" => ShippingPattern::OneToTwoDays,
            "3_7_days" => ShippingPattern::ThreeToSevenDays,
            _ => ShippingPattern::TwoToThreeDays,
        }
    }

    pub fn lead_time_days(&self) -> i64 {
        match self {
            ShippingPattern::OneToTwoDays => 4,
            ShippingPattern::TwoToThreeDays => 6,
            ShippingPattern::ThreeToSevenDays => 9,
        }
    }
}

/// One tracked auction, optionally mirrored to a marketplace offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredItem {
    pub id: i64,
    pub auction_id: String,
    pub title: String,
    pub url: String,
    pub image_url: String,
    pub category_id: String,
    pub seller_id: String,

    pub current_price: i64,
    pub start_price: i64,
    pub buy_now_price: i64,
    pub win_price: i64,

    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub bid_count: i64,
    pub status: ItemStatus,

    pub check_interval_seconds: i64,
    pub auto_adjust_interval: bool,
    pub is_monitoring_active: bool,
    pub last_checked_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub notes: String,

    // Marketplace block
    pub amazon_asin: Option<String>,
    pub amazon_sku: Option<String>,
    pub amazon_condition: Condition,
    pub amazon_listing_status: Option<ListingStatus>,
    pub amazon_price: Option<i64>,
    pub estimated_win_price: i64,
    pub shipping_cost: i64,
    pub forwarding_cost: i64,
    pub amazon_fee_pct: f64,
    pub amazon_margin_pct: f64,
    pub amazon_lead_time_days: i64,
    pub amazon_shipping_pattern: ShippingPattern,
    pub amazon_condition_note: String,
    pub amazon_last_synced_at: Option<DateTime<Utc>>,
    /// Opaque JSON blob edited from the dashboard.
    pub seller_central_checklist: String,
}

/// Kinds of recorded item changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Initial,
    StatusChange,
    PriceChange,
    BidChange,
    AmazonListing,
    AmazonDelist,
    AmazonDelistAuto,
    AmazonError,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Initial => "initial",
            ChangeType::StatusChange => "status_change",
            ChangeType::PriceChange => "price_change",
            ChangeType::BidChange => "bid_change",
            ChangeType::AmazonListing => "amazon_listing",
            ChangeType::AmazonDelist => "amazon_delist",
            ChangeType::AmazonDelistAuto => "amazon_delist_auto",
            ChangeType::AmazonError => "amazon_error",
        }
    }

    pub fn parse_str(s: &str) -> Self {
        match s {
            "status_change" => ChangeType::StatusChange,
            "price_change" => ChangeType::PriceChange,
            "bid_change" => ChangeType::BidChange,
            "amazon_listing" => ChangeType::AmazonListing,
            "amazon_delist" => ChangeType::AmazonDelist,
            "amazon_delist_auto" => ChangeType::AmazonDelistAuto,
            "amazon_error" => ChangeType::AmazonError,
            _ => ChangeType::Initial,
        }
    }
}

/// Append-only audit entry for an item change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistory {
    pub id: i64,
    pub item_id: i64,
    pub auction_id: String,
    pub change_type: ChangeType,
    pub old_status: Option<String>,
    pub new_status: Option<String>,
    pub old_price: Option<i64>,
    pub new_price: Option<i64>,
    pub old_bid_count: Option<i64>,
    pub new_bid_count: Option<i64>,
    pub recorded_at: DateTime<Utc>,
}

impl StatusHistory {
    /// A fresh, unsaved change row for an item.
    pub fn change(item_id: i64, auction_id: &str, change_type: ChangeType) -> Self {
        Self {
            id: 0,
            item_id,
            auction_id: auction_id.to_string(),
            change_type,
            old_status: None,
            new_status: None,
            old_price: None,
            new_price: None,
            old_bid_count: None,
            new_bid_count: None,
            recorded_at: Utc::now(),
        }
    }
}

/// Append-only record of a notifier dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationLog {
    pub id: i64,
    pub item_id: i64,
    pub channel: String,
    pub event_type: String,
    pub message: String,
    pub success: bool,
    pub sent_at: DateTime<Utc>,
}

/// A search term under observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedKeyword {
    pub id: i64,
    pub keyword: String,
    pub is_active: bool,
    pub last_scanned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub notes: String,

    /// "manual" | "ai_<strategy>" | "ai_seed"
    pub source: String,
    pub parent_keyword_id: Option<i64>,
    pub performance_score: f64,
    pub total_scans: i64,
    pub total_deals_found: i64,
    pub total_gross_profit: i64,
    pub scans_since_last_deal: i64,
    pub confidence: f64,
    pub auto_deactivated_at: Option<DateTime<Utc>>,
}

impl WatchedKeyword {
    pub fn is_manual(&self) -> bool {
        self.source == "manual"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Rejected,
    Listed,
    Expired,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Rejected => "rejected",
            AlertStatus::Listed => "listed",
            AlertStatus::Expired => "expired",
        }
    }

    pub fn parse_str(s: &str) -> Self {
        match s {
            "rejected" => AlertStatus::Rejected,
            "listed" => AlertStatus::Listed,
            "expired" => AlertStatus::Expired,
            _ => AlertStatus::Active,
        }
    }
}

/// Operator feedback categories for rejected alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    WrongProduct,
    Accessory,
    ModelVariant,
    BadPrice,
    NeverShow,
    Other,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::WrongProduct => "wrong_product",
            RejectionReason::Accessory => "accessory",
            RejectionReason::ModelVariant => "model_variant",
            RejectionReason::BadPrice => "bad_price",
            RejectionReason::NeverShow => "never_show",
            RejectionReason::Other => "other",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "wrong_product" => Some(RejectionReason::WrongProduct),
            "accessory" => Some(RejectionReason::Accessory),
            "model_variant" => Some(RejectionReason::ModelVariant),
            "bad_price" => Some(RejectionReason::BadPrice),
            "never_show" => Some(RejectionReason::NeverShow),
            "other" => Some(RejectionReason::Other),
            _ => None,
        }
    }
}

/// A matched (auction, marketplace product) pair whose scored margin
/// cleared the configured floor. Unique per (yahoo_auction_id, asin).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealAlert {
    pub id: i64,
    pub keyword_id: i64,
    pub yahoo_auction_id: String,
    pub amazon_asin: String,
    pub yahoo_title: String,
    pub yahoo_url: String,
    pub yahoo_image_url: String,
    pub amazon_title: String,
    pub yahoo_price: i64,
    pub yahoo_shipping: i64,
    pub sell_price: i64,
    pub gross_profit: i64,
    pub gross_margin_pct: f64,
    pub amazon_fee_pct: f64,
    pub forwarding_cost: i64,
    pub notified_at: DateTime<Utc>,
    pub status: AlertStatus,
    pub rejection_reason: Option<RejectionReason>,
    pub rejection_note: String,
    pub rejected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Pending,
    Validated,
    AutoAdded,
    Approved,
    Rejected,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::Pending => "pending",
            CandidateStatus::Validated => "validated",
            CandidateStatus::AutoAdded => "auto_added",
            CandidateStatus::Approved => "approved",
            CandidateStatus::Rejected => "rejected",
        }
    }

    pub fn parse_str(s: &str) -> Self {
        match s {
            "validated" => CandidateStatus::Validated,
            "auto_added" => CandidateStatus::AutoAdded,
            "approved" => CandidateStatus::Approved,
            "rejected" => CandidateStatus::Rejected,
            _ => CandidateStatus::Pending,
        }
    }
}

/// A keyword proposal produced by a generation strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordCandidate {
    pub id: i64,
    pub keyword: String,
    /// "brand" | "title" | "category" | "synonym" | "series" | "demand" | "suggest" | "llm"
    pub strategy: String,
    pub confidence: f64,
    pub parent_keyword_id: Option<i64>,
    pub reasoning: String,
    pub status: CandidateStatus,
    /// Opaque JSON from the validator.
    pub validation_result: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Per-cycle discovery summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryLog {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// "running" | "completed" | "error"
    pub status: String,
    pub candidates_generated: i64,
    pub candidates_validated: i64,
    pub keywords_added: i64,
    pub keywords_deactivated: i64,
    pub keepa_tokens_used: i64,
    pub strategy_breakdown: String,
    pub error_message: String,
}

/// Kinds of learned matcher overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    AccessoryWord,
    ProblemPair,
    ModelConflict,
    BlockedAsin,
    ThresholdHint,
    NeverShowPair,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::AccessoryWord => "accessory_word",
            PatternType::ProblemPair => "problem_pair",
            PatternType::ModelConflict => "model_conflict",
            PatternType::BlockedAsin => "blocked_asin",
            PatternType::ThresholdHint => "threshold_hint",
            PatternType::NeverShowPair => "never_show_pair",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "accessory_word" => Some(PatternType::AccessoryWord),
            "problem_pair" => Some(PatternType::ProblemPair),
            "model_conflict" => Some(PatternType::ModelConflict),
            "blocked_asin" => Some(PatternType::BlockedAsin),
            "threshold_hint" => Some(PatternType::ThresholdHint),
            "never_show_pair" => Some(PatternType::NeverShowPair),
            _ => None,
        }
    }
}

/// A learned matcher override. Unique per (pattern_type, pattern_key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionPattern {
    pub id: i64,
    pub pattern_type: PatternType,
    pub pattern_key: String,
    /// Opaque JSON payload.
    pub pattern_data: String,
    pub hit_count: i64,
    pub confidence: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Template text per condition enum, edited by the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionTemplate {
    pub id: i64,
    pub condition_type: String,
    pub title: String,
    pub body: String,
    pub updated_at: DateTime<Utc>,
}

/// Operator-saved listing defaults keyed by ASIN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingPreset {
    pub id: i64,
    pub asin: String,
    pub condition: Condition,
    pub condition_note: String,
    pub shipping_pattern: ShippingPattern,
    pub created_at: DateTime<Utc>,
}
