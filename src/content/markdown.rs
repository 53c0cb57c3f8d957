//! Markdown transformer collaborator (spec §6: `transform(ScraperResponse
//! {html}) -> ScraperResponse{markdown}`), and the plain-text variant used
//! when `extractor_format = text`.

use crate::models::{ExtractorFormat, ScraperResponse};
use scraper::Html;

pub fn transform(mut response: ScraperResponse, format: ExtractorFormat) -> ScraperResponse {
    let Some(html) = response.html.clone() else {
        return response;
    };

    match format {
        ExtractorFormat::Html => response,
        ExtractorFormat::Markdown => {
            response.content = htmd::convert(&html).unwrap_or(html);
            response.content_type = ExtractorFormat::Markdown;
            response
        }
        ExtractorFormat::Text => {
            response.content = strip_to_text(&html);
            response.content_type = ExtractorFormat::Text;
            response
        }
    }
}

fn strip_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScrapeMetadata;
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
    fn converts_headings_to_markdown() {
        let out = transform(response("<h1>Title</h1><p>Body text</p>"), ExtractorFormat::Markdown);
        assert!(out.content.contains('#'));
        assert!(out.content.contains("Body text"));
    }

    #[test]
    fn text_mode_strips_all_tags() {
        let out = transform(response("<h1>Title</h1><p>Body  text</p>"), ExtractorFormat::Text);
        assert_eq!(out.content, "Title Body text");
    }

    #[test]
    fn html_mode_is_a_passthrough() {
        let out = transform(response("<p>x</p>"), ExtractorFormat::Html);
        assert_eq!(out.content_type, ExtractorFormat::Html);
    }
}
