pub mod arenda;
pub mod lalafo;
pub mod unvan;

use std::sync::Arc;

use url::Url;

use crate::discover::Pagination;

/// Site-neutral bag of fields for one listing, straight off the page.
/// Phones arrive as raw text; normalization happens in the pipeline.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub source_url: String,
    pub phone_raw: String,
    pub name: Option<String>,
    pub payload: serde_json::Value,
}

/// Site-specific extraction plug-in. The pipeline is parametric over
/// this trait and assumes nothing about markup.
pub trait Extractor: Send + Sync {
    /// Stable site identifier, stored in `leads.website`.
    fn site(&self) -> &'static str;

    fn pagination(&self) -> Pagination;

    fn page_url(&self, page: u32) -> String;

    /// Parse a total-page indicator off the probe page.
    fn total_pages(&self, _html: &str) -> Option<u32> {
        None
    }

    /// Detail-page links found on a listing page. Empty for sites whose
    /// listing pages carry the records themselves.
    fn listing_urls(&self, _page_html: &str) -> Vec<String> {
        Vec::new()
    }

    /// Turn one page's content into raw records. Malformed markup
    /// yields fewer records, never an error.
    fn extract(&self, url: &str, content: &str) -> Vec<RawRecord>;
}

/// Static registry: every site ships compiled in, no runtime discovery.
pub fn all() -> Vec<Arc<dyn Extractor>> {
    vec![
        Arc::new(arenda::Arenda),
        Arc::new(lalafo::Lalafo),
        Arc::new(unvan::Unvan),
    ]
}

pub fn find(site: &str) -> Option<Arc<dyn Extractor>> {
    all().into_iter().find(|e| e.site() == site)
}

/// Resolve a possibly-relative listing link against the site base.
pub fn absolutize(base: &str, href: &str) -> Option<String> {
    if href.starts_with("http") {
        return Some(href.to_string());
    }
    Url::parse(base).ok()?.join(href).ok().map(Into::into)
}

// ── Tests ──
