//! URL Policy (spec §4.4, component C4): normalization, the similar-URL
//! equivalence class, robots.txt, sitemap discovery, and the nine-step
//! link filtering pipeline.

pub mod filters;
pub mod normalize;
pub mod robots;
pub mod sitemap;

use crate::models::CrawlOptions;
use filters::FilterContext;
use robots::RobotsChecker;
use std::collections::HashSet;
use url::Url;

/// Apply the filtering pipeline to every candidate link discovered on a
/// page. Policy denials are dropped silently (spec §8: "not an error"),
/// returning only the normalized survivors.
pub fn filter_links(
    candidates: &[String],
    base: &Url,
    options: &CrawlOptions,
    robots: &RobotsChecker,
    visited: &HashSet<String>,
) -> Vec<String> {
    let ctx = FilterContext { base, options, robots };
    let mut accepted: Vec<String> = Vec::new();

    for candidate in candidates {
        match filters::filter_link(candidate, visited, &ctx) {
            Ok(normalized) => {
                // Equivalence, not exact-string dedup: two sibling links on the
                // same page can resolve to the same similar-URL class (`/x`
                // and `/x/`, `www.` vs bare host).
                let dup = accepted
                    .iter()
                    .any(|existing| normalize::are_equivalent(existing, &normalized));
                if !dup {
                    accepted.push(normalized);
                }
            }
            Err(rejection) => {
                tracing::trace!(url = %candidate, ?rejection, "link rejected by policy");
            }
        }
    }

    match options.strategy {
        crate::models::CrawlStrategy::Bfs | crate::models::CrawlStrategy::Dfs => {}
        crate::models::CrawlStrategy::BestFirst => {
            accepted.sort_by_key(|u| std::cmp::Reverse(filters::best_first_score(u)));
        }
    }

    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CrawlOptions;

    #[test]
    fn filter_links_drops_duplicates_within_one_batch() {
        let base = Url::parse("https://example.com/").unwrap();
        let options = CrawlOptions::default();
        let robots = RobotsChecker::empty();
        let candidates = vec!["/a".to_string(), "/a".to_string(), "/b".to_string()];
        let accepted = filter_links(&candidates, &base, &options, &robots, &HashSet::new());
        assert_eq!(accepted.len(), 2);
    }
}
