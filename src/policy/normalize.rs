//! URL normalization and the similar-URL equivalence class (spec §4.4).

use url::Url;

/// Query params stripped during normalization — tracking noise that
/// shouldn't split one logical page into several lock entries.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "msclkid",
    "_ga",
    "mc_cid",
    "mc_eid",
    "ref",
    "source",
    "campaign",
    "medium",
    "term",
    "content",
    "affiliate_id",
];

/// Lowercase the host, drop the fragment, strip tracking query params,
/// sort the rest alphabetically, and strip a trailing slash (except on
/// the root path). Idempotent: `normalize(normalize(u)) == normalize(u)`.
pub fn normalize(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;
    url.set_fragment(None);

    let host = url.host_str()?.to_lowercase();
    url.set_host(Some(&host)).ok()?;

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.to_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort_by(|a, b| a.0.cmp(&b.0));
    if params.is_empty() {
        url.set_query(None);
    } else {
        let pairs = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&pairs));
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    Some(url.to_string())
}

/// The set of variants considered the same page as `normalized`: with and
/// without a trailing slash, with and without a leading `www.`, the
/// http/https swap, and with/without a trailing `/index.html`. Two URLs
/// are equivalent iff one's class contains the other.
pub fn similar_url_class(normalized: &str) -> Vec<String> {
    let mut variants = vec![normalized.to_string()];

    let Ok(url) = Url::parse(normalized) else {
        return variants;
    };

    let with_slash = if normalized.ends_with('/') {
        normalized.to_string()
    } else {
        format!("{normalized}/")
    };
    let without_slash = normalized.trim_end_matches('/').to_string();
    variants.push(with_slash.clone());
    variants.push(without_slash.clone());

    if let Some(host) = url.host_str() {
        for base in [normalized, &with_slash, &without_slash] {
            if let Some(swapped) = swap_www(base, host) {
                variants.push(swapped);
            }
        }
    }

    for base in variants.clone() {
        if let Some(swapped) = swap_scheme(&base) {
            variants.push(swapped);
        }
        if let Some(idx) = index_html_variant(&base) {
            variants.push(idx);
        }
    }

    variants.sort();
    variants.dedup();
    variants
}

fn swap_www(full: &str, host: &str) -> Option<String> {
    if let Some(bare) = host.strip_prefix("www.") {
        Some(full.replacen(host, bare, 1))
    } else {
        Some(full.replacen(host, &format!("www.{host}"), 1))
    }
}

fn swap_scheme(full: &str) -> Option<String> {
    if let Some(rest) = full.strip_prefix("http://") {
        Some(format!("https://{rest}"))
    } else {
        full.strip_prefix("https://").map(|rest| format!("http://{rest}"))
    }
}

fn index_html_variant(full: &str) -> Option<String> {
    if let Some(base) = full.strip_suffix("/index.html") {
        Some(format!("{base}/"))
    } else if full.ends_with('/') {
        Some(format!("{}index.html", full))
    } else {
        None
    }
}

/// Two normalized URLs denote the same page iff either one's class
/// contains the other (i.e. membership, not strict equality of classes).
pub fn are_equivalent(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    similar_url_class(a).contains(&b.to_string()) || similar_url_class(b).contains(&a.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_tracking_params_and_sorts_the_rest() {
        let n = normalize("https://Example.com/page?b=2&utm_source=x&a=1#frag").unwrap();
        assert_eq!(n, "https://example.com/page?a=1&b=2");
    }

    #[test]
    fn strips_trailing_slash_except_root() {
        assert_eq!(normalize("https://example.com/a/").unwrap(), "https://example.com/a");
        assert_eq!(normalize("https://example.com/").unwrap(), "https://example.com/");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize("https://example.com/a/?z=1&utm_campaign=y&a=2").unwrap();
        let twice = normalize(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn similar_class_covers_www_and_scheme_and_slash() {
        let class = similar_url_class("https://example.com/page");
        assert!(class.contains(&"https://www.example.com/page".to_string()));
        assert!(class.contains(&"http://example.com/page".to_string()));
        assert!(class.contains(&"https://example.com/page/".to_string()));
    }

    #[test]
    fn equivalence_is_symmetric_across_variants() {
        assert!(are_equivalent(
            "https://example.com/page",
            "https://www.example.com/page/"
        ));
        assert!(!are_equivalent("https://example.com/page", "https://example.com/other"));
    }
}
