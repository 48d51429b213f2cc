use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::json;

use super::{absolutize, Extractor, RawRecord};
use crate::discover::Pagination;

const BASE: &str = "https://unvan.az";

/// unvan.az — vehicle listings. Detail links match `/<slug>-NNNNNN.html`;
/// the phone is printed inside the contact block.
pub struct Unvan;

impl Extractor for Unvan {
    fn site(&self) -> &'static str {
        "unvan.az"
    }

    fn pagination(&self) -> Pagination {
        Pagination::Range { first: 1, last: 2 }
    }

    fn page_url(&self, page: u32) -> String {
        format!("{BASE}/avtomobil?start={page}")
    }

    fn listing_urls(&self, page_html: &str) -> Vec<String> {
        let detail = Regex::new(r"/[^/]+-\d{6}\.html$").unwrap();
        let doc = Html::parse_document(page_html);
        let links = Selector::parse("a[href]").unwrap();
        doc.select(&links)
            .filter_map(|a| a.value().attr("href"))
            .filter(|href| detail.is_match(href))
            .filter_map(|href| absolutize(BASE, href))
            .collect()
    }

    fn extract(&self, url: &str, content: &str) -> Vec<RawRecord> {
        let doc = Html::parse_document(content);

        let phone_sel = Selector::parse("div.telzona #telshow").unwrap();
        let Some(phone_raw) = doc
            .select(&phone_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
        else {
            return Vec::new();
        };

        let name = seller_name(&doc);

        // Key/value detail rows: <p><b>Şəhər:</b> Bakı</p>
        let mut details = serde_json::Map::new();
        let rows = Selector::parse("#openhalf p").unwrap();
        let key_sel = Selector::parse("b").unwrap();
        for p in doc.select(&rows) {
            if let Some(b) = p.select(&key_sel).next() {
                let key = b.text().collect::<String>().trim().to_string();
                let full = p.text().collect::<String>();
                let value = full.replacen(&key, "", 1).trim().to_string();
                if !key.is_empty() {
                    details.insert(key, json!(value));
                }
            }
        }

        vec![RawRecord {
            source_url: url.to_string(),
            phone_raw,
            name,
            payload: json!({ "details": details }),
        }]
    }
}

fn seller_name(doc: &Html) -> Option<String> {
    let icon = Selector::parse(".infocontact .glyphicon-user").unwrap();
    let holder = doc
        .select(&icon)
        .next()
        .and_then(|el| el.parent().and_then(ElementRef::wrap))?;
    let name = holder
        .text()
        .collect::<String>()
        .replace("(Bütün Elanları)", "")
        .trim()
        .to_string();
    (!name.is_empty()).then_some(name)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING_PAGE: &str = r#"
        <html><body>
        <a href="/hyundai-accent-123456.html">Hyundai Accent</a>
        <a href="/kia-rio-654321.html">Kia Rio</a>
        <a href="/avtomobil?start=2">next</a>
        <a href="/about.html">about</a>
        </body></html>"#;

    const DETAIL_PAGE: &str = r#"
        <html><body>
        <div class="infocontact">
          <span><span class="glyphicon-user"></span>Samir (Bütün Elanları)</span>
        </div>
        <div class="telzona"><div id="telshow">(055) 234 56 78</div></div>
        <div id="openhalf">
          <p><b>Şəhər:</b> Bakı</p>
          <p><b>Marka:</b> Hyundai</p>
          <p>no key here</p>
        </div>
        </body></html>"#;

    #[test]
    fn listing_urls_match_detail_pattern() {
        let urls = Unvan.listing_urls(LISTING_PAGE);
        assert_eq!(
            urls,
            vec![
                "https://unvan.az/hyundai-accent-123456.html",
                "https://unvan.az/kia-rio-654321.html",
            ]
        );
    }

    #[test]
    fn extracts_phone_name_and_details() {
        let records = Unvan.extract("https://unvan.az/hyundai-accent-123456.html", DETAIL_PAGE);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.phone_raw, "(055) 234 56 78");
        assert_eq!(r.name.as_deref(), Some("Samir"));
        assert_eq!(r.payload["details"]["Şəhər:"], "Bakı");
        assert_eq!(r.payload["details"]["Marka:"], "Hyundai");
    }

    #[test]
    fn missing_phone_block_yields_nothing() {
        assert!(Unvan.extract("https://unvan.az/x", LISTING_PAGE).is_empty());
    }
}
