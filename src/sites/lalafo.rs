use serde_json::Value;

use super::{absolutize, Extractor, RawRecord};
use crate::discover::Pagination;

const BASE: &str = "https://lalafo.az";
const API: &str = "https://lalafo.az/api/search/v3/feed/search";
const REAL_ESTATE_CATEGORY: u32 = 2029;

/// lalafo.az — JSON feed API. Single-level: every feed item is a full
/// record, so there are no detail pages to fetch.
pub struct Lalafo;

impl Extractor for Lalafo {
    fn site(&self) -> &'static str {
        "lalafo.az"
    }

    fn pagination(&self) -> Pagination {
        Pagination::Range { first: 1, last: 2 }
    }

    fn page_url(&self, page: u32) -> String {
        format!(
            "{API}?category_id={REAL_ESTATE_CATEGORY}&expand=url&page={page}&per-page=20"
        )
    }

    fn extract(&self, url: &str, content: &str) -> Vec<RawRecord> {
        let Ok(feed) = serde_json::from_str::<Value>(content) else {
            return Vec::new();
        };
        let Some(items) = feed.get("items").and_then(Value::as_array) else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| {
                let phone_raw = item
                    .pointer("/user/phone")
                    .or_else(|| item.get("mobile"))
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|p| !p.is_empty())?;

                let name = item
                    .pointer("/user/username")
                    .and_then(Value::as_str)
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty());

                let source_url = item
                    .get("url")
                    .and_then(Value::as_str)
                    .and_then(|u| absolutize(BASE, u))
                    .unwrap_or_else(|| url.to_string());

                Some(RawRecord {
                    source_url,
                    phone_raw: phone_raw.to_string(),
                    name,
                    payload: item.clone(),
                })
            })
            .collect()
    }
}

// ── Tests ──
