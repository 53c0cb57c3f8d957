//! robots.txt fetch + parse (spec §4.4: "fetched once per crawl at seed
//! time ... the parsed form is stored on the crawl record for worker
//! re-import").

use std::collections::HashMap;
use std::time::Duration;

const USER_AGENT: &str = "CrateCrawler/1.0";

/// Parsed robots.txt: disallow rules per user-agent group, plus any
/// `Sitemap:` directives (consumed by the sitemap step at kickoff).
#[derive(Debug, Clone, Default)]
pub struct RobotsChecker {
    rules: HashMap<String, Vec<String>>,
    pub sitemaps: Vec<String>,
    loaded: bool,
}

impl RobotsChecker {
    pub fn empty() -> Self {
        RobotsChecker::default()
    }

    /// Fetch `{origin}/robots.txt` with a short timeout; a missing or
    /// unreachable robots.txt is treated as "allow everything", not an
    /// error — robots.txt absence is the common case, not a failure.
    pub async fn fetch(client: &reqwest::Client, origin: &str, skip_tls_verify: bool) -> Self {
        let url = format!("{}/robots.txt", origin.trim_end_matches('/'));
        let result = if skip_tls_verify {
            reqwest::Client::builder()
                .danger_accept_invalid_certs(true)
                .timeout(Duration::from_secs(10))
                .build()
                .ok()
        } else {
            None
        };
        let client_ref = result.as_ref().unwrap_or(client);

        match client_ref
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => Self::parse(&body),
                Err(_) => RobotsChecker::empty(),
            },
            _ => RobotsChecker::empty(),
        }
    }

    /// Fetch and return the raw robots.txt body, for callers that need
    /// to persist it on the crawl record (spec §4.4: "stored on the
    /// crawl record for worker re-import") rather than just the parsed
    /// rules.
    pub async fn fetch_text(client: &reqwest::Client, origin: &str, skip_tls_verify: bool) -> Option<String> {
        let url = format!("{}/robots.txt", origin.trim_end_matches('/'));
        let result = if skip_tls_verify {
            reqwest::Client::builder()
                .danger_accept_invalid_certs(true)
                .timeout(Duration::from_secs(10))
                .build()
                .ok()
        } else {
            None
        };
        let client_ref = result.as_ref().unwrap_or(client);

        match client_ref.get(&url).timeout(Duration::from_secs(10)).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.ok(),
            _ => None,
        }
    }

    /// Parse robots.txt text. Only the `*` user-agent group is honored
    /// (spec: "User-agent string is fixed per engine instance"), plus any
    /// `Sitemap:` lines, which apply regardless of the group they appear
    /// in per the robots.txt convention.
    pub fn parse(body: &str) -> Self {
        let mut rules: HashMap<String, Vec<String>> = HashMap::new();
        let mut sitemaps = Vec::new();
        let mut current_agents: Vec<String> = Vec::new();
        let mut seen_rule_since_agent = true;

        for line in body.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if seen_rule_since_agent {
                        current_agents.clear();
                    }
                    current_agents.push(value.to_lowercase());
                    seen_rule_since_agent = false;
                }
                "disallow" if !value.is_empty() => {
                    seen_rule_since_agent = true;
                    for agent in &current_agents {
                        rules.entry(agent.clone()).or_default().push(value.to_string());
                    }
                }
                "sitemap" => {
                    sitemaps.push(value.to_string());
                }
                _ => {}
            }
        }

        RobotsChecker {
            rules,
            sitemaps,
            loaded: true,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Longest-prefix Disallow match against the `*` group.
    pub fn is_allowed(&self, path: &str) -> bool {
        let Some(disallowed) = self.rules.get("*") else {
            return true;
        };
        !disallowed.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disallow_prefix_blocks_matching_paths() {
        let checker = RobotsChecker::parse("User-agent: *\nDisallow: /admin\nDisallow: /b\n");
        assert!(!checker.is_allowed("/admin/login"));
        assert!(!checker.is_allowed("/b"));
        assert!(checker.is_allowed("/a"));
    }

    #[test]
    fn missing_robots_allows_everything() {
        let checker = RobotsChecker::empty();
        assert!(checker.is_allowed("/anything"));
        assert!(!checker.is_loaded());
    }

    #[test]
    fn sitemap_directives_are_captured_regardless_of_group() {
        let checker = RobotsChecker::parse(
            "User-agent: *\nDisallow: /private\nSitemap: https://example.com/sitemap.xml\n",
        );
        assert_eq!(checker.sitemaps, vec!["https://example.com/sitemap.xml".to_string()]);
    }

    #[test]
    fn empty_disallow_value_allows_all() {
        let checker = RobotsChecker::parse("User-agent: *\nDisallow:\n");
        assert!(checker.is_allowed("/anything"));
    }
}
