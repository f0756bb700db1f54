//! Pagination and quota header parsing shared by the provider clients.

use std::time::Duration;

use chrono::{DateTime, Utc};
use url::Url;

use super::errors::PlatformError;
use super::types::RateLimitInfo;
use crate::http::{HttpHeaders, header_get};

/// Relations found in an RFC 8288 `Link` header.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LinkRelations {
    pub next: Option<String>,
    pub last: Option<String>,
}

/// Parse a `Link` header such as
/// `<https://api.github.com/orgs/x/repos?page=2>; rel="next", <...>; rel="last"`.
pub fn parse_link_header(value: &str) -> LinkRelations {
    let mut links = LinkRelations::default();
    for part in value.split(',') {
        let mut pieces = part.split(';');
        let Some(target) = pieces.next() else {
            continue;
        };
        let target = target.trim();
        let Some(url) = target.strip_prefix('<').and_then(|t| t.strip_suffix('>')) else {
            continue;
        };

        for param in pieces {
            let param = param.trim();
            let Some(rel) = param.strip_prefix("rel=") else {
                continue;
            };
            for rel in rel.trim_matches('"').split_whitespace() {
                match rel {
                    "next" => links.next = Some(url.to_string()),
                    "last" => links.last = Some(url.to_string()),
                    _ => {}
                }
            }
        }
    }
    links
}

/// Read the `page` query parameter from a URL.
pub fn page_from_url(url: &str) -> Option<u32> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.parse().ok())
}

/// Cursor of the page after the one in the `Link` header's `rel="next"`.
pub fn next_cursor_from_link(headers: &HttpHeaders) -> Option<String> {
    let link = header_get(headers, "link")?;
    let next = parse_link_header(link).next?;
    page_from_url(&next).map(|page| page.to_string())
}

/// Decode a page cursor. `None` means the first page.
pub fn cursor_to_page(cursor: Option<&str>) -> Result<u32, PlatformError> {
    match cursor {
        None => Ok(1),
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(page) if page >= 1 => Ok(page),
            _ => Err(PlatformError::internal(format!(
                "invalid page cursor: {raw:?}"
            ))),
        },
    }
}

/// Extract quota info from `<prefix>-limit`, `<prefix>-remaining` and
/// `<prefix>-reset` headers, where reset is a Unix timestamp.
///
/// GitHub and Gitea use the `x-ratelimit` prefix; GitLab uses `ratelimit`.
pub fn parse_rate_limit_headers(headers: &HttpHeaders, prefix: &str) -> Option<RateLimitInfo> {
    let limit = header_get(headers, &format!("{prefix}-limit"))?
        .trim()
        .parse::<usize>()
        .ok()?;
    let remaining = header_get(headers, &format!("{prefix}-remaining"))?
        .trim()
        .parse::<usize>()
        .ok()?;
    let reset_epoch = header_get(headers, &format!("{prefix}-reset"))?
        .trim()
        .parse::<i64>()
        .ok()?;
    let reset_at = DateTime::from_timestamp(reset_epoch, 0).unwrap_or_else(Utc::now);

    Some(RateLimitInfo {
        limit,
        remaining,
        reset_at,
        retry_after: parse_retry_after(headers),
    })
}

/// `Retry-After` in its delta-seconds form.
pub fn parse_retry_after(headers: &HttpHeaders) -> Option<Duration> {
    header_get(headers, "retry-after")?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Quota info for a rate-limit response, falling back to a fixed window when
/// the provider sent nothing usable.
pub fn rate_limit_or_fallback(headers: &HttpHeaders, prefix: &str) -> RateLimitInfo {
    parse_rate_limit_headers(headers, prefix).unwrap_or_else(|| {
        let retry_after = parse_retry_after(headers);
        let wait = retry_after
            .unwrap_or(Duration::from_secs(super::rate_limit::rate_limits::FALLBACK_RESET_SECS));
        let reset_at = Utc::now()
            + chrono::Duration::from_std(wait).unwrap_or_else(|_| chrono::Duration::minutes(1));
        RateLimitInfo {
            limit: 0,
            remaining: 0,
            reset_at,
            retry_after,
        }
    })
}

/// Ensure a host has a scheme and no trailing slash.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HttpHeaders {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn parses_next_and_last_relations() {
        let links = parse_link_header(
            "<https://api.github.com/orgs/acme/repos?per_page=100&page=2>; rel=\"next\", \
             <https://api.github.com/orgs/acme/repos?per_page=100&page=7>; rel=\"last\"",
        );
        assert_eq!(
            links.next.as_deref().and_then(page_from_url),
            Some(2)
        );
        assert_eq!(links.last.as_deref().and_then(page_from_url), Some(7));
    }

    #[test]
    fn link_without_next_yields_no_cursor() {
        let h = headers(&[(
            "Link",
            "<https://forge.test/api/v1/orgs/acme/repos?page=1>; rel=\"first\"",
        )]);
        assert_eq!(next_cursor_from_link(&h), None);
        assert_eq!(next_cursor_from_link(&headers(&[])), None);
    }

    #[test]
    fn cursor_decoding() {
        assert_eq!(cursor_to_page(None).expect("first"), 1);
        assert_eq!(cursor_to_page(Some("4")).expect("page"), 4);
        assert!(cursor_to_page(Some("0")).is_err());
        assert!(cursor_to_page(Some("abc")).is_err());
    }

    #[test]
    fn parses_prefixed_rate_limit_headers() {
        let h = headers(&[
            ("X-RateLimit-Limit", "5000"),
            ("X-RateLimit-Remaining", "42"),
            ("X-RateLimit-Reset", "1700000000"),
        ]);
        let info = parse_rate_limit_headers(&h, "x-ratelimit").expect("info");
        assert_eq!(info.limit, 5000);
        assert_eq!(info.remaining, 42);
        assert_eq!(info.reset_at.timestamp(), 1_700_000_000);
        assert_eq!(info.retry_after, None);

        assert!(parse_rate_limit_headers(&h, "ratelimit").is_none());
    }

    #[test]
    fn invalid_numbers_yield_none() {
        let h = headers(&[
            ("RateLimit-Limit", "many"),
            ("RateLimit-Remaining", "1"),
            ("RateLimit-Reset", "1700000000"),
        ]);
        assert!(parse_rate_limit_headers(&h, "ratelimit").is_none());
    }

    #[test]
    fn fallback_uses_retry_after_when_present() {
        let h = headers(&[("Retry-After", "7")]);
        let info = rate_limit_or_fallback(&h, "x-ratelimit");
        assert_eq!(info.retry_after, Some(Duration::from_secs(7)));
        assert_eq!(info.remaining, 0);
        assert!(info.reset_at > Utc::now());
    }

    #[test]
    fn normalize_host_adds_scheme_and_trims() {
        assert_eq!(normalize_host("gitlab.com"), "https://gitlab.com");
        assert_eq!(normalize_host("https://git.example.com//"), "https://git.example.com");
        assert_eq!(normalize_host("http://localhost:3000/"), "http://localhost:3000");
    }
}
