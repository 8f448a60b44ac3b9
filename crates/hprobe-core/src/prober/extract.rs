//! Turn a raw HTTP response into a `ProbeRecord`.
//!
//! Title, technology and CDN detection are header and substring heuristics;
//! there is no HTML parser or fingerprint database.

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

use crate::result::ProbeRecord;

use super::parse::ResponseHeaders;

/// What the HTTP client hands back for one request.
#[derive(Debug, Clone, Default)]
pub(crate) struct RawResponse {
    pub status: u32,
    pub headers: ResponseHeaders,
    pub body: Vec<u8>,
    pub effective_url: Option<String>,
}

pub(crate) fn build_record(
    url: String,
    method: &str,
    response: RawResponse,
    detect_cdn_provider: bool,
) -> ProbeRecord {
    let text = String::from_utf8_lossy(&response.body);
    let content_length = response
        .headers
        .content_length()
        .unwrap_or(response.body.len() as u64);
    let final_url = response.effective_url.filter(|u| *u != url);
    let mut hashes = BTreeMap::new();
    hashes.insert("sha256".to_string(), sha256_hex(&response.body));

    ProbeRecord {
        final_url,
        method: method.to_string(),
        status_code: response.status,
        content_length,
        title: extract_title(&text),
        technologies: detect_technologies(&response.headers, &text),
        hashes,
        words: count_words(&text),
        lines: count_lines(&text),
        cdn: if detect_cdn_provider {
            detect_cdn(&response.headers).map(str::to_string)
        } else {
            None
        },
        url,
    }
}

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub fn count_words(body: &str) -> usize {
    body.split_whitespace().count()
}

pub fn count_lines(body: &str) -> usize {
    body.lines().count()
}

/// Text of the first `<title>` element, whitespace collapsed and basic
/// entities decoded. `None` if absent or empty.
pub fn extract_title(body: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets aligned with `body`.
    let lower = body.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title")?;
    let raw = &body[start..end];
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let title = decode_entities(&collapsed);
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Well-known server products and their display names.
const SERVER_NAMES: &[(&str, &str)] = &[
    ("nginx", "Nginx"),
    ("apache", "Apache HTTP Server"),
    ("microsoft-iis", "IIS"),
    ("litespeed", "LiteSpeed"),
    ("openresty", "OpenResty"),
    ("caddy", "Caddy"),
    ("cloudflare", "Cloudflare"),
    ("envoy", "Envoy"),
    ("gunicorn", "Gunicorn"),
    ("jetty", "Jetty"),
    ("tomcat", "Apache Tomcat"),
    ("akamaighost", "Akamai"),
];

/// Substrings in the body that identify a framework or CMS.
const BODY_MARKERS: &[(&str, &str)] = &[
    ("/wp-content/", "WordPress"),
    ("/wp-includes/", "WordPress"),
    ("drupal.settings", "Drupal"),
    ("/sites/default/files/", "Drupal"),
    ("/media/jui/", "Joomla"),
    ("__next_data__", "Next.js"),
    ("window.__nuxt__", "Nuxt.js"),
    ("data-reactroot", "React"),
    ("ng-version=", "Angular"),
    ("data-v-app", "Vue.js"),
];

/// Session cookie names that reveal the backend platform.
const COOKIE_MARKERS: &[(&str, &str)] = &[
    ("phpsessid=", "PHP"),
    ("jsessionid=", "Java"),
    ("asp.net_sessionid=", "ASP.NET"),
    ("laravel_session=", "Laravel"),
];

/// Technologies suggested by headers, cookies, and body markers. Sorted, unique.
pub fn detect_technologies(headers: &ResponseHeaders, body: &str) -> Vec<String> {
    let mut found = BTreeSet::new();

    if let Some(server) = headers.get("server") {
        if let Some(product) = server.split_whitespace().next() {
            found.insert(product_label(product, SERVER_NAMES));
        }
    }
    for header in ["x-powered-by", "x-generator"] {
        for value in headers.get_all(header) {
            for part in value.split(',') {
                let part = part.trim();
                if !part.is_empty() {
                    found.insert(product_label(part, &[]));
                }
            }
        }
    }
    for cookie in headers.get_all("set-cookie") {
        let cookie = cookie.to_ascii_lowercase();
        for (marker, tech) in COOKIE_MARKERS {
            if cookie.starts_with(marker) {
                found.insert((*tech).to_string());
            }
        }
    }

    let lower = body.to_ascii_lowercase();
    for (marker, tech) in BODY_MARKERS {
        if lower.contains(marker) {
            found.insert((*tech).to_string());
        }
    }
    if let Some(generator) = meta_generator(&lower, body) {
        found.insert(generator);
    }

    found.into_iter().collect()
}

/// `name/version` becomes `Name:version`, using a display name if known.
fn product_label(product: &str, names: &[(&str, &str)]) -> String {
    let (name, version) = match product.split_once('/') {
        Some((n, v)) => (n, Some(v)),
        None => (product, None),
    };
    let display = names
        .iter()
        .find(|(key, _)| name.eq_ignore_ascii_case(key))
        .map(|(_, label)| (*label).to_string())
        .unwrap_or_else(|| name.to_string());
    match version {
        Some(v) if !v.is_empty() => format!("{display}:{v}"),
        _ => display,
    }
}

/// Product name from `<meta name="generator" content="WordPress 6.4">`.
fn meta_generator(lower: &str, body: &str) -> Option<String> {
    let at = lower.find("name=\"generator\"")?;
    let tag_start = lower[..at].rfind('<')?;
    let tag_end = at + lower[at..].find('>')?;
    let tag = &lower[tag_start..tag_end];
    let content = tag_start + tag.find("content=\"")? + "content=\"".len();
    let len = lower[content..].find('"')?;
    let value = body[content..content + len].trim();
    let product = value.split_whitespace().next()?;
    Some(product.to_string())
}

/// How a CDN shows up in response headers.
enum CdnRule {
    Header(&'static str),
    HeaderContains(&'static str, &'static str),
}

const CDN_RULES: &[(&str, CdnRule)] = &[
    ("cloudflare", CdnRule::Header("cf-ray")),
    ("cloudflare", CdnRule::HeaderContains("server", "cloudflare")),
    ("cloudfront", CdnRule::Header("x-amz-cf-id")),
    ("cloudfront", CdnRule::HeaderContains("via", "cloudfront")),
    ("fastly", CdnRule::Header("x-fastly-request-id")),
    ("fastly", CdnRule::HeaderContains("x-served-by", "cache-")),
    ("akamai", CdnRule::Header("x-akamai-transformed")),
    ("akamai", CdnRule::HeaderContains("server", "akamaighost")),
    ("azure", CdnRule::Header("x-azure-ref")),
    ("azure", CdnRule::Header("x-msedge-ref")),
    ("google", CdnRule::HeaderContains("via", "google")),
    ("sucuri", CdnRule::Header("x-sucuri-id")),
    ("incapsula", CdnRule::Header("x-iinfo")),
    ("incapsula", CdnRule::HeaderContains("x-cdn", "incapsula")),
];

/// Name of the CDN serving the response, if any rule matches.
pub fn detect_cdn(headers: &ResponseHeaders) -> Option<&'static str> {
    CDN_RULES.iter().find_map(|(provider, rule)| {
        let hit = match rule {
            CdnRule::Header(name) => headers.contains(name),
            CdnRule::HeaderContains(name, needle) => headers
                .get_all(name)
                .any(|v| v.to_ascii_lowercase().contains(needle)),
        };
        hit.then_some(*provider)
    })
}
