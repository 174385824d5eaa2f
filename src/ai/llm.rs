//! Optional LLM integration for keyword suggestions and cold-start
//! seeds. Failures never propagate: the discovery cycle must not stall
//! on a third-party chat endpoint.

use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

use super::analyzer::KeywordInsights;
use super::generator::CandidateProposal;
use crate::config::Config;

async fn chat(config: &Config, prompt: &str, max_tokens: u32, timeout: Duration) -> Option<String> {
    let client = reqwest::Client::builder().timeout(timeout).build().ok()?;
    let resp = client
        .post(&config.llm_api_url)
        .header("x-api-key", &config.llm_api_key)
        .header("anthropic-version", "2023-06-01")
        .header("content-type", "application/json")
        .json(&json!({
            "model": config.llm_model,
            "max_tokens": max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        }))
        .send()
        .await
        .ok()?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        warn!(status, body = %text.chars().take(200).collect::<String>(), "LLM API error");
        return None;
    }
    let body: Value = resp.json().await.ok()?;
    body["content"][0]["text"].as_str().map(|s| s.to_string())
}

/// Strip optional markdown fences and parse a JSON array.
fn parse_json_array(content: &str) -> Option<Vec<Value>> {
    let mut content = content.trim();
    if let Some(stripped) = content.strip_prefix("```") {
        content = stripped.split_once('\n').map(|(_, rest)| rest).unwrap_or(stripped);
    }
    if let Some(stripped) = content.strip_suffix("```") {
        content = stripped;
    }
    serde_json::from_str::<Value>(content.trim())
        .ok()?
        .as_array()
        .cloned()
}

/// Keyword suggestions grounded in the mined deal history. Returns an
/// empty list on any error.
pub async fn get_llm_suggestions(
    insights: &KeywordInsights,
    config: &Config,
    max_suggestions: usize,
) -> Vec<CandidateProposal> {
    if !config.llm_enabled() {
        return Vec::new();
    }

    let top_kws: String = insights
        .top_keywords
        .iter()
        .filter(|kp| kp.total_deals > 0)
        .take(10)
        .map(|kp| {
            format!(
                "- {}: {}件Deal, 平均利益¥{:.0}, スコア{:.2}",
                kp.keyword, kp.total_deals, kp.avg_gross_profit, kp.performance_score
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let brands: String = insights
        .brand_patterns
        .iter()
        .take(10)
        .map(|b| format!("{}({}件)", b.brand_name, b.deal_count))
        .collect::<Vec<_>>()
        .join(", ");

    let product_types: String = insights
        .product_type_patterns
        .iter()
        .take(10)
        .map(|p| p.product_type.clone())
        .collect::<Vec<_>>()
        .join(", ");

    let prompt = format!(
        "あなたはヤフオク→Amazon転売（無在庫）のキーワードリサーチの専門家です。\n\
         以下のデータは過去の成功Deal（ヤフオクで安く仕入れてAmazonで利益が出た取引）の分析結果です。\n\n\
         ## 実績のあるキーワード\n{}\n\n\
         ## 利益の出るブランド\n{}\n\n\
         ## よく出る商品種別\n{}\n\n\
         ## 過去Deal総数: {}件\n\n\
         この分析結果に基づき、新しい検索キーワードを{}件提案してください。\n\
         条件：\n\
         - ヤフオクで安く出品されていてAmazonで高く売れそうな商品のキーワード\n\
         - 既存キーワードと被らないこと\n\
         - 2〜4語の具体的なキーワード（ブランド名+商品種別など）\n\n\
         以下のJSON形式で回答してください：\n\
         [{{\"keyword\": \"キーワード\", \"reasoning\": \"理由\", \"confidence\": 0.5}}]\n\n\
         JSONのみ出力してください。",
        if top_kws.is_empty() { "（まだ十分なデータがありません）" } else { top_kws.as_str() },
        if brands.is_empty() { "（未分析）" } else { brands.as_str() },
        if product_types.is_empty() { "（未分析）" } else { product_types.as_str() },
        insights.total_deals,
        max_suggestions,
    );

    let content = match chat(config, &prompt, 1024, Duration::from_secs(30)).await {
        Some(content) => content,
        None => return Vec::new(),
    };
    let suggestions = match parse_json_array(&content) {
        Some(arr) => arr,
        None => {
            warn!("LLM response was not a JSON array");
            return Vec::new();
        }
    };

    let candidates: Vec<CandidateProposal> = suggestions
        .into_iter()
        .take(max_suggestions)
        .filter_map(|s| {
            let keyword = s["keyword"].as_str()?.trim().to_string();
            if keyword.is_empty() {
                return None;
            }
            Some(CandidateProposal {
                keyword,
                strategy: "llm",
                confidence: s["confidence"].as_f64().unwrap_or(0.5).min(1.0),
                parent_keyword_id: None,
                reasoning: s["reasoning"].as_str().unwrap_or("LLM提案").to_string(),
            })
        })
        .collect();

    info!(count = candidates.len(), "LLM suggested keywords");
    candidates
}

/// Cold-start seed keywords for a fresh install, operator-triggered
/// from the HTTP surface. Returns (keyword, category, reasoning,
/// confidence) tuples; empty on any error.
pub async fn get_seed_keywords(config: &Config, count: usize) -> Vec<(String, String, String, f64)> {
    if !config.llm_enabled() {
        return Vec::new();
    }

    let prompt = format!(
        "あなたはヤフオク→Amazon中古転売の市場リサーチ専門家です。\n\n\
         日本のヤフオク（Yahoo!オークション）で安く仕入れて、Amazon.co.jpの中古品として出品し、\n\
         価格差で利益を得るビジネスモデルにおいて、初期キーワードを提案してください。\n\n\
         ## 条件\n\
         - ヤフオクで頻繁に出品されていて、Amazon中古でも需要がある商品ジャンル\n\
         - 粗利率40%以上・粗利3,000円以上が狙えるもの\n\
         - 具体的な検索キーワード（ブランド名+商品種別の2〜4語）\n\
         - 以下のカテゴリをバランスよくカバー:\n\
           ゲーム機・ゲームソフト、オーディオ、カメラ、家電、PC周辺機器、\n\
           フィギュア・ホビー、トレーディングカード\n\
         - 【重要】アパレル・ファッション関連は完全に除外すること\n\n\
         ## 出力\n\
         {count}件のキーワードをJSON配列で出力してください。他のテキストは不要です。\n\n\
         [{{\"keyword\": \"...\", \"category\": \"...\", \"reasoning\": \"...\", \"confidence\": 0.7}}]"
    );

    let content = match chat(config, &prompt, 4096, Duration::from_secs(60)).await {
        Some(content) => content,
        None => return Vec::new(),
    };
    let suggestions = match parse_json_array(&content) {
        Some(arr) => arr,
        None => return Vec::new(),
    };

    let results: Vec<(String, String, String, f64)> = suggestions
        .into_iter()
        .take(count)
        .filter_map(|s| {
            let keyword = s["keyword"].as_str()?.trim().to_string();
            if keyword.is_empty() {
                return None;
            }
            Some((
                keyword,
                s["category"].as_str().unwrap_or("").to_string(),
                s["reasoning"].as_str().unwrap_or("").to_string(),
                s["confidence"].as_f64().unwrap_or(0.5).min(1.0),
            ))
        })
        .collect();

    info!(count = results.len(), "LLM seed keywords generated");
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_array_parses_with_and_without_fences() {
        let bare = r#"[{"keyword": "dyson v8", "confidence": 0.6}]"#;
        assert_eq!(parse_json_array(bare).unwrap().len(), 1);

        let fenced = "```json\n[{\"keyword\": \"dyson v8\"}]\n```";
        assert_eq!(parse_json_array(fenced).unwrap().len(), 1);

        assert!(parse_json_array("not json").is_none());
        assert!(parse_json_array(r#"{"keyword": "x"}"#).is_none());
    }
}
