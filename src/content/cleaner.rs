//! Content cleaner collaborator (spec §6: `clean(ScraperResponse) ->
//! ScraperResponse` — "removes ads/scripts/hidden elements and narrows to
//! main content").

use crate::models::ScraperResponse;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;

static STRIP_TAGS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<(script|style|noscript|svg|iframe|nav|footer|aside)\b[^>]*>.*?</\1>"#).unwrap()
});
static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

/// Selectors tried in order to find the main content container; the
/// first match wins.
const MAIN_CONTENT_SELECTORS: &[&str] = &["main", "article", "#content", ".content", "body"];

pub fn clean(mut response: ScraperResponse) -> ScraperResponse {
    let Some(html) = response.html.clone() else {
        return response;
    };

    let stripped = STRIP_TAGS_RE.replace_all(&html, "");
    let stripped = COMMENT_RE.replace_all(&stripped, "");

    let document = Html::parse_document(&stripped);
    let narrowed = MAIN_CONTENT_SELECTORS.iter().find_map(|selector_str| {
        Selector::parse(selector_str)
            .ok()
            .and_then(|selector| document.select(&selector).next())
            .map(|el| strip_hidden(&el.html()))
    });

    let content = narrowed.unwrap_or_else(|| stripped.to_string());
    response.html = Some(content.clone());
    response.content = content;
    response
}

/// Drop any element whose own attributes mark it hidden; a cheap
/// regex pass rather than a full DOM mutation, consistent with the
/// rest of this narrowing step.
fn strip_hidden(fragment: &str) -> String {
    static HIDDEN_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?is)<[a-z0-9]+\b[^>]*\b(hidden|aria-hidden\s*=\s*"true")\b[^>]*>.*?</[a-z0-9]+>"#).unwrap()
    });
    HIDDEN_RE.replace_all(fragment, "").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractorFormat, ScrapeMetadata};
    use std::collections::HashMap;

    fn response(html: &str) -> ScraperResponse {
        ScraperResponse {
            url: "https://example.com".to_string(),
            title: None,
            html: Some(html.to_string()),
            content: html.to_string(),
            content_type: ExtractorFormat::Html,
            links: vec![],
            metadata: ScrapeMetadata {
                status: 200,
                headers: HashMap::new(),
                load_time_ms: 0,
                processing_time_ms: 0,
                used_browser: false,
                ..Default::default()
            },
            error: None,
            extracted_data: None,
            page_analysis: None,
        }
    }

    #[test]
    fn strips_scripts_and_narrows_to_main() {
        let html = "<html><body><script>evil()</script><main><p>Hello</p></main><footer>f</footer></body></html>";
        let cleaned = clean(response(html));
        assert!(!cleaned.content.contains("evil()"));
        assert!(cleaned.content.contains("Hello"));
        assert!(!cleaned.content.contains("<footer"));
    }

    #[test]
    fn falls_back_to_body_when_no_main_content_container() {
        let html = "<html><body><p>Just text</p></body></html>";
        let cleaned = clean(response(html));
        assert!(cleaned.content.contains("Just text"));
    }
}
