//! Sitemap discovery (spec §4.4: "`sitemap.xml` at origin is fetched;
//! `<url><loc>` children become seed links; `<sitemap><loc>` entries are
//! recursed (dedup by URL)").

use regex::Regex;
use std::collections::HashSet;
use std::time::Duration;

const MAX_RECURSION: usize = 5;

/// Fetch and fully resolve the sitemap tree rooted at `origin`, returning
/// the deduplicated set of page URLs found in `<url><loc>` entries.
pub async fn discover(client: &reqwest::Client, origin: &str) -> Vec<String> {
    let root = format!("{}/sitemap.xml", origin.trim_end_matches('/'));
    let mut seen_sitemaps = HashSet::new();
    let mut urls = HashSet::new();
    fetch_recursive(client, &root, &mut seen_sitemaps, &mut urls, 0).await;
    urls.into_iter().collect()
}

async fn fetch_recursive(
    client: &reqwest::Client,
    sitemap_url: &str,
    seen_sitemaps: &mut HashSet<String>,
    urls: &mut HashSet<String>,
    depth: usize,
) {
    if depth >= MAX_RECURSION || !seen_sitemaps.insert(sitemap_url.to_string()) {
        return;
    }

    let body = match client
        .get(sitemap_url)
        .timeout(Duration::from_secs(15))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => match resp.text().await {
            Ok(body) => body,
            Err(_) => return,
        },
        _ => return,
    };

    let (page_urls, child_sitemaps) = parse(&body);
    urls.extend(page_urls);

    for child in child_sitemaps {
        Box::pin(fetch_recursive(client, &child, seen_sitemaps, urls, depth + 1)).await;
    }
}

/// Parse sitemap XML text into (page URLs from `<url><loc>`, child
/// sitemap URLs from `<sitemap><loc>`). Tolerant of whitespace and
/// namespace prefixes; not a full XML parser, matching the scope of the
/// two tag shapes the sitemap protocol actually uses here.
fn parse(body: &str) -> (Vec<String>, Vec<String>) {
    let loc_re = Regex::new(r"(?is)<loc>\s*([^<\s][^<]*?)\s*</loc>").unwrap();
    let sitemap_block_re = Regex::new(r"(?is)<sitemap>(.*?)</sitemap>").unwrap();

    let mut sitemap_spans: Vec<(usize, usize)> = Vec::new();
    for m in sitemap_block_re.find_iter(body) {
        sitemap_spans.push((m.start(), m.end()));
    }

    let mut page_urls = Vec::new();
    let mut child_sitemaps = Vec::new();

    for cap in loc_re.captures_iter(body) {
        let m = cap.get(0).unwrap();
        let url = cap[1].trim().to_string();
        let inside_sitemap_block = sitemap_spans
            .iter()
            .any(|(start, end)| m.start() >= *start && m.end() <= *end);
        if inside_sitemap_block {
            child_sitemaps.push(url);
        } else {
            page_urls.push(url);
        }
    }

    (page_urls, child_sitemaps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_urlset_locs() {
        let xml = r#"<?xml version="1.0"?>
            <urlset>
              <url><loc>https://example.com/a</loc></url>
              <url><loc>https://example.com/b</loc></url>
            </urlset>"#;
        let (pages, sitemaps) = parse(xml);
        assert_eq!(pages, vec!["https://example.com/a", "https://example.com/b"]);
        assert!(sitemaps.is_empty());
    }

    #[test]
    fn parses_sitemap_index_locs_separately() {
        let xml = r#"<sitemapindex>
              <sitemap><loc>https://example.com/sitemap-a.xml</loc></sitemap>
              <sitemap><loc>https://example.com/sitemap-b.xml</loc></sitemap>
            </sitemapindex>"#;
        let (pages, sitemaps) = parse(xml);
        assert!(pages.is_empty());
        assert_eq!(sitemaps.len(), 2);
    }
}
