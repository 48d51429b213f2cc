use scraper::{Html, Selector};
use serde_json::json;

use super::{absolutize, Extractor, RawRecord};
use crate::discover::Pagination;

const BASE: &str = "https://arenda.az";

/// arenda.az — real estate listings. Two-level: listing pages link to
/// detail pages, the phone sits on the detail page.
pub struct Arenda;

impl Extractor for Arenda {
    fn site(&self) -> &'static str {
        "arenda.az"
    }

    fn pagination(&self) -> Pagination {
        Pagination::Probe {
            url: BASE.to_string(),
            default_pages: 1,
        }
    }

    fn page_url(&self, page: u32) -> String {
        format!("{BASE}/filtirli-axtaris/{page}/?home_search=1&lang=1&site=1")
    }

    fn total_pages(&self, html: &str) -> Option<u32> {
        let doc = Html::parse_document(html);
        let pages = Selector::parse("div.pagination_box a.page-numbers").unwrap();
        doc.select(&pages)
            .last()
            .and_then(|a| a.text().collect::<String>().trim().parse().ok())
    }

    fn listing_urls(&self, page_html: &str) -> Vec<String> {
        let doc = Html::parse_document(page_html);
        let boxes = Selector::parse("li.new_elan_box a[href]").unwrap();
        doc.select(&boxes)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| absolutize(BASE, href))
            .collect()
    }

    fn extract(&self, url: &str, content: &str) -> Vec<RawRecord> {
        let doc = Html::parse_document(content);

        let phone_sel = Selector::parse("p.elan_in_tel_box a.elan_in_tel").unwrap();
        let Some(phone_raw) = doc
            .select(&phone_sel)
            .next()
            .map(|a| a.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
        else {
            return Vec::new();
        };

        let text_of = |css: &str| -> Option<String> {
            let sel = Selector::parse(css).unwrap();
            doc.select(&sel)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .filter(|t| !t.is_empty())
        };

        // Owner names carry a "(...)" suffix with the listing count.
        let name = text_of("div.new_elan_user_info p")
            .map(|n| n.split('(').next().unwrap_or("").trim().to_string())
            .filter(|n| !n.is_empty());

        let props_sel = Selector::parse("ul.property_lists li").unwrap();
        let property_details: Vec<String> = doc
            .select(&props_sel)
            .map(|li| li.text().collect::<String>().trim().to_string())
            .collect();

        vec![RawRecord {
            source_url: url.to_string(),
            phone_raw,
            name,
            payload: json!({
                "description": text_of("div.elan_info_txt"),
                "address": text_of("span.elan_unvan_txt"),
                "price": text_of("div.elan_new_price_box"),
                "property_details": property_details,
            }),
        }]
    }
}

// ── Tests ──
