//! Extraction handoff and link discovery.
//!
//! Real article extraction is an external collaborator; [`Extractor`] is
//! the seam. [`BasicExtractor`] is the built-in stand-in: title from the
//! configured selector or `<title>`, body text by tag stripping.

use std::sync::LazyLock;

use regex::Regex;

use newsriver_common::ExtractionSelectors;

/// What extraction produced for one page.
#[derive(Debug, Clone, Default)]
pub struct Extracted {
    pub title: String,
    pub body_text: String,
}

pub trait Extractor: Send + Sync {
    fn extract(&self, html: &str, selectors: &ExtractionSelectors) -> Extracted;
}

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex")
});
static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>")
        .expect("valid regex")
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid regex"));

pub struct BasicExtractor;

impl Extractor for BasicExtractor {
    fn extract(&self, html: &str, selectors: &ExtractionSelectors) -> Extracted {
        let scoped = scope_to_selector(html, selectors.body.as_deref());

        let title = TITLE_RE
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| collapse_whitespace(&decode_entities(m.as_str())))
            .unwrap_or_default();

        let stripped = SCRIPT_RE.replace_all(&scoped, " ");
        let text = TAG_RE.replace_all(&stripped, " ");
        let body_text = collapse_whitespace(&decode_entities(&text));

        Extracted { title, body_text }
    }
}

/// Narrow the HTML to the configured body container when one is set and
/// found; otherwise extract from the whole document. Selector support is
/// deliberately shallow (`#id`, `.class`, tag name); the real extractor
/// lives outside this system.
fn scope_to_selector(html: &str, selector: Option<&str>) -> String {
    let Some(selector) = selector else {
        return html.to_string();
    };
    let attr_pattern = if let Some(id) = selector.strip_prefix('#') {
        format!(r#"(?is)<[a-z][^>]*\bid\s*=\s*["']{}["'][^>]*>(.*)"#, regex::escape(id))
    } else if let Some(class) = selector.strip_prefix('.') {
        format!(
            r#"(?is)<[a-z][^>]*\bclass\s*=\s*["'][^"']*\b{}\b[^"']*["'][^>]*>(.*)"#,
            regex::escape(class)
        )
    } else {
        format!(r"(?is)<{0}[^>]*>(.*?)</{0}>", regex::escape(selector))
    };

    match Regex::new(&attr_pattern).ok().and_then(|re| {
        re.captures(html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }) {
        Some(scoped) => scoped,
        None => html.to_string(),
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<&str>>().join(" ")
}

// --- Link discovery (spider) ---

/// Matches `href` attributes: `<a href>`, `<link href>`, `<area href>`.
static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).expect("valid regex"));

/// Resolve a raw href against a base URL; absolute result, fragment gone.
fn resolve_href(raw: &str, base: Option<&url::Url>) -> Option<String> {
    let mut parsed = if raw.starts_with("http://") || raw.starts_with("https://") {
        url::Url::parse(raw).ok()?
    } else {
        base?.join(raw).ok()?
    };
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

/// Extract same-host links from a page for spidering. Only `href`
/// attributes count; relative hrefs resolve against `base_url`;
/// duplicates and cross-host links are dropped.
pub fn extract_spider_links(html: &str, base_url: &str) -> Vec<String> {
    let base = url::Url::parse(base_url).ok();
    let base_host = base.as_ref().and_then(|b| b.host_str()).map(str::to_lowercase);
    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();

    for cap in HREF_RE.captures_iter(html) {
        let Some(resolved) = resolve_href(&cap[1], base.as_ref()) else {
            continue;
        };
        let same_host = url::Url::parse(&resolved)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase))
            .as_deref()
            == base_host.as_deref();
        if same_host && seen.insert(resolved.clone()) {
            links.push(resolved);
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selectors(body: Option<&str>) -> ExtractionSelectors {
        ExtractionSelectors {
            title: None,
            body: body.map(String::from),
            exclude: vec![],
        }
    }

    #[test]
    fn extracts_title_and_text() {
        let html = r#"<html><head><title>Mill closure announced</title>
            <script>var x = 1;</script></head>
            <body><p>The mill will close in  June.</p></body></html>"#;
        let out = BasicExtractor.extract(html, &selectors(None));
        assert_eq!(out.title, "Mill closure announced");
        assert!(out.body_text.contains("The mill will close in June."));
        assert!(!out.body_text.contains("var x"));
    }

    #[test]
    fn body_selector_scopes_extraction() {
        let html = r#"<div class="nav">Menu Home About</div>
            <div id="article-body"><p>Council passed the bylaw.</p></div>"#;
        let out = BasicExtractor.extract(html, &selectors(Some("#article-body")));
        assert!(out.body_text.contains("Council passed the bylaw."));
        assert!(!out.body_text.contains("Menu"));
    }

    #[test]
    fn missing_selector_falls_back_to_whole_page() {
        let html = "<p>Short report.</p>";
        let out = BasicExtractor.extract(html, &selectors(Some("#does-not-exist")));
        assert_eq!(out.body_text, "Short report.");
    }

    #[test]
    fn entities_are_decoded() {
        let html = "<p>Profits &amp; losses &lt;2024&gt;</p>";
        let out = BasicExtractor.extract(html, &selectors(None));
        assert_eq!(out.body_text, "Profits & losses <2024>");
    }

    #[test]
    fn spider_links_same_host_only() {
        let html = r#"
            <a href="/local/story-1">one</a>
            <a href="https://example.com/local/story-2">two</a>
            <a href="https://other.example/away">elsewhere</a>
            <a href="/local/story-1#comments">dupe</a>
        "#;
        let links = extract_spider_links(html, "https://example.com/section");
        assert_eq!(
            links,
            vec![
                "https://example.com/local/story-1",
                "https://example.com/local/story-2",
            ]
        );
    }

    #[test]
    fn spider_links_ignore_non_href_urls() {
        let html = r#"<img src="https://example.com/a.png"><script src="https://example.com/app.js"></script>"#;
        assert!(extract_spider_links(html, "https://example.com").is_empty());
    }
}
