//! The per-link filtering pipeline (spec §4.4, "Filtering pipeline"):
//! nine ordered checks, first failure rejects.

use super::normalize::{normalize, similar_url_class};
use super::robots::RobotsChecker;
use crate::models::CrawlOptions;
use regex::Regex;
use std::collections::HashSet;
use url::Url;

/// Path suffixes that are never worth crawling as pages (spec: "PDF,
/// archives, media, images, scripts, …").
const EXCLUDED_EXTENSIONS: &[&str] = &[
    ".pdf", ".zip", ".rar", ".7z", ".gz", ".tar", ".tgz", ".exe", ".dmg", ".iso", ".mp3", ".mp4",
    ".avi", ".mov", ".wmv", ".mkv", ".flac", ".wav", ".jpg", ".jpeg", ".png", ".gif", ".svg",
    ".webp", ".ico", ".bmp", ".tiff", ".css", ".js", ".mjs", ".woff", ".woff2", ".ttf", ".eot",
    ".json", ".xml", ".csv", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Unparseable,
    AlreadyVisited,
    TooDeep,
    ExcludedByPattern,
    NotIncluded,
    WrongHost,
    Backward,
    RobotsDisallowed,
    ExcludedExtension,
}

pub struct FilterContext<'a> {
    pub base: &'a Url,
    pub options: &'a CrawlOptions,
    pub robots: &'a RobotsChecker,
}

/// Run the 9-step pipeline against one candidate link, returning its
/// normalized form on success. `visited` holds every normalized URL
/// already locked for this crawl; membership is checked through the
/// similar-URL equivalence class, not bare string equality.
pub fn filter_link(
    raw: &str,
    visited: &HashSet<String>,
    ctx: &FilterContext,
) -> Result<String, Rejection> {
    let resolved = ctx.base.join(raw).map_err(|_| Rejection::Unparseable)?;
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return Err(Rejection::Unparseable);
    }

    let normalized = normalize(resolved.as_str()).ok_or(Rejection::Unparseable)?;

    if is_already_visited(&normalized, visited) {
        return Err(Rejection::AlreadyVisited);
    }

    let depth = path_depth(&resolved);
    if depth > ctx.options.max_depth {
        return Err(Rejection::TooDeep);
    }

    if matches_any(&ctx.options.exclude_patterns, &normalized) {
        return Err(Rejection::ExcludedByPattern);
    }

    if !ctx.options.include_patterns.is_empty() && !matches_any(&ctx.options.include_patterns, &normalized) {
        return Err(Rejection::NotIncluded);
    }

    if !host_allowed(ctx.base, &resolved, ctx.options.allow_subdomains, ctx.options.allow_external) {
        return Err(Rejection::WrongHost);
    }

    if !ctx.options.allow_backward && !is_forward(ctx.base, &resolved) {
        return Err(Rejection::Backward);
    }

    if !ctx.options.ignore_robots && !ctx.robots.is_allowed(resolved.path()) {
        return Err(Rejection::RobotsDisallowed);
    }

    if has_excluded_extension(resolved.path()) {
        return Err(Rejection::ExcludedExtension);
    }

    Ok(normalized)
}

fn is_already_visited(normalized: &str, visited: &HashSet<String>) -> bool {
    if visited.contains(normalized) {
        return true;
    }
    similar_url_class(normalized).iter().any(|v| visited.contains(v))
}

fn path_depth(url: &Url) -> u32 {
    url.path_segments()
        .map(|segs| segs.filter(|s| !s.is_empty()).count() as u32)
        .unwrap_or(0)
}

fn matches_any(patterns: &[String], haystack: &str) -> bool {
    patterns.iter().any(|p| {
        Regex::new(p)
            .map(|re| re.is_match(haystack))
            .unwrap_or(false)
    })
}

fn host_allowed(base: &Url, candidate: &Url, allow_subdomains: bool, allow_external: bool) -> bool {
    if allow_external {
        return true;
    }
    let (Some(base_host), Some(cand_host)) = (base.host_str(), candidate.host_str()) else {
        return false;
    };
    if base_host.eq_ignore_ascii_case(cand_host) {
        return true;
    }
    if allow_subdomains {
        return registrable_domain(cand_host).eq_ignore_ascii_case(&registrable_domain(base_host));
    }
    false
}

/// Simplified registrable-domain extraction: last two dot-separated
/// labels. Doesn't consult a public suffix list, so `co.uk`-style
/// second-level TLDs are treated as the registrable domain themselves;
/// acceptable for the subdomain-matching use here.
fn registrable_domain(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        host.to_string()
    } else {
        labels[labels.len() - 2..].join(".")
    }
}

fn is_forward(base: &Url, candidate: &Url) -> bool {
    candidate.path().starts_with(base.path())
}

fn has_excluded_extension(path: &str) -> bool {
    let lower = path.to_lowercase();
    EXCLUDED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Score used by the best-first queue ordering strategy (spec §4.4,
/// "Queue ordering strategies"): penalize deep paths and long query
/// strings, reward doc-ish path fragments, penalize checkout-ish ones.
/// Higher is more desirable to crawl sooner.
pub fn best_first_score(url: &str) -> i64 {
    let Ok(parsed) = Url::parse(url) else {
        return 0;
    };
    let path = parsed.path().to_lowercase();
    let mut score: i64 = 100;

    score -= path_depth(&parsed) as i64 * 5;
    score -= parsed.query().map(|q| q.len() as i64).unwrap_or(0) / 10;

    for good in ["docs", "guide", "about", "tutorial", "help"] {
        if path.contains(good) {
            score += 20;
        }
    }
    for bad in ["login", "signup", "cart", "checkout"] {
        if path.contains(bad) {
            score -= 30;
        }
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::robots::RobotsChecker;

    fn ctx<'a>(base: &'a Url, options: &'a CrawlOptions, robots: &'a RobotsChecker) -> FilterContext<'a> {
        FilterContext { base, options, robots }
    }

    #[test]
    fn rejects_unparseable_and_javascript_links() {
        let base = Url::parse("https://example.com/").unwrap();
        let options = CrawlOptions::default();
        let robots = RobotsChecker::empty();
        let c = ctx(&base, &options, &robots);
        assert_eq!(filter_link("javascript:void(0)", &HashSet::new(), &c), Err(Rejection::Unparseable));
    }

    #[test]
    fn rejects_already_visited_via_similar_url_class() {
        let base = Url::parse("https://example.com/").unwrap();
        let options = CrawlOptions::default();
        let robots = RobotsChecker::empty();
        let mut visited = HashSet::new();
        visited.insert("https://www.example.com/page".to_string());
        let c = ctx(&base, &options, &robots);
        assert_eq!(filter_link("/page", &visited, &c), Err(Rejection::AlreadyVisited));
    }

    #[test]
    fn enforces_depth_limit() {
        let base = Url::parse("https://example.com/").unwrap();
        let mut options = CrawlOptions::default();
        options.max_depth = 1;
        let robots = RobotsChecker::empty();
        let c = ctx(&base, &options, &robots);
        assert_eq!(filter_link("/a/b/c", &HashSet::new(), &c), Err(Rejection::TooDeep));
        assert!(filter_link("/a", &HashSet::new(), &c).is_ok());
    }

    #[test]
    fn rejects_off_host_unless_external_allowed() {
        let base = Url::parse("https://example.com/").unwrap();
        let options = CrawlOptions::default();
        let robots = RobotsChecker::empty();
        let c = ctx(&base, &options, &robots);
        assert_eq!(
            filter_link("https://other.com/page", &HashSet::new(), &c),
            Err(Rejection::WrongHost)
        );
    }

    #[test]
    fn allows_subdomain_when_enabled() {
        let base = Url::parse("https://example.com/").unwrap();
        let mut options = CrawlOptions::default();
        options.allow_subdomains = true;
        let robots = RobotsChecker::empty();
        let c = ctx(&base, &options, &robots);
        assert!(filter_link("https://blog.example.com/post", &HashSet::new(), &c).is_ok());
    }

    #[test]
    fn rejects_backward_paths_unless_allowed() {
        let base = Url::parse("https://example.com/docs/").unwrap();
        let options = CrawlOptions::default();
        let robots = RobotsChecker::empty();
        let c = ctx(&base, &options, &robots);
        assert_eq!(
            filter_link("https://example.com/other", &HashSet::new(), &c),
            Err(Rejection::Backward)
        );
    }

    #[test]
    fn rejects_robots_disallowed_path() {
        let base = Url::parse("https://example.com/").unwrap();
        let options = CrawlOptions::default();
        let robots = RobotsChecker::parse("User-agent: *\nDisallow: /admin\n");
        let c = ctx(&base, &options, &robots);
        assert_eq!(
            filter_link("/admin/page", &HashSet::new(), &c),
            Err(Rejection::RobotsDisallowed)
        );
    }

    #[test]
    fn rejects_excluded_extensions() {
        let base = Url::parse("https://example.com/").unwrap();
        let options = CrawlOptions::default();
        let robots = RobotsChecker::empty();
        let c = ctx(&base, &options, &robots);
        assert_eq!(
            filter_link("/report.pdf", &HashSet::new(), &c),
            Err(Rejection::ExcludedExtension)
        );
    }

    #[test]
    fn scoring_rewards_docs_and_penalizes_checkout() {
        assert!(best_first_score("https://example.com/docs/guide") > best_first_score("https://example.com/cart/checkout"));
    }
}
