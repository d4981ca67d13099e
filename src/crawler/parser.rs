//! HTML parser for extracting links and SEO metadata
//!
//! This module handles parsing HTML content to extract:
//! - Links to follow, with anchor text, placement and `nofollow`
//! - Title, meta description, meta robots, canonical URL, language
//! - H1/H2 headings, structured-data presence, images without alt text
//! - Visible body text for content analysis

use crate::links::LinkPlacement;
use crate::url::resolve_and_normalize;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

macro_rules! selector {
    ($name:ident, $css:literal) => {
        static $name: Lazy<Selector> =
            Lazy::new(|| Selector::parse($css).expect(concat!("invalid selector: ", $css)));
    };
}

selector!(TITLE, "title");
selector!(META_NAMED, "meta[name][content]");
selector!(CANONICAL, "link[rel][href]");
selector!(BASE, "base[href]");
selector!(HTML_ROOT, "html");
selector!(H1, "h1");
selector!(H2, "h2");
selector!(JSON_LD, "script[type]");
selector!(ITEMSCOPE, "[itemscope]");
selector!(IMG, "img");
selector!(ANCHOR, "a[href]");
selector!(BODY, "body");

/// A link found on a page, already resolved and normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    pub url: Url,
    pub anchor_text: String,
    pub placement: LinkPlacement,
    pub nofollow: bool,
}

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_robots: Option<String>,
    pub canonical_url: Option<String>,
    pub lang: Option<String>,
    pub h1: Vec<String>,
    pub h2: Vec<String>,
    pub has_structured_data: bool,
    pub images_missing_alt: usize,
    pub links: Vec<ExtractedLink>,
    /// Visible text of the body, script and style contents excluded
    pub text: String,
}

/// Parses HTML content and extracts links and metadata
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` anywhere in the document, resolved against `<base>`
///   when present
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` and `data:` links
/// - Fragment-only links (same page anchors)
///
/// `rel="nofollow"` links are returned with `nofollow` set; whether they are
/// followed is the caller's decision.
///
/// # Example
///
/// ```
/// use newt_walker::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &base_url);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links[0].url.as_str(), "https://example.com/page");
/// ```
pub fn parse_html(html: &str, page_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);
    let base_url = document_base(&document, page_url);

    let (meta_description, meta_robots) = extract_meta(&document);

    ParsedPage {
        title: first_text(&document, &TITLE),
        meta_description,
        meta_robots,
        canonical_url: extract_canonical(&document, &base_url),
        lang: document
            .select(&HTML_ROOT)
            .next()
            .and_then(|e| e.value().attr("lang"))
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty()),
        h1: all_text(&document, &H1),
        h2: all_text(&document, &H2),
        has_structured_data: has_structured_data(&document),
        images_missing_alt: document
            .select(&IMG)
            .filter(|img| img.value().attr("alt").map_or(true, |a| a.trim().is_empty()))
            .count(),
        links: extract_links(&document, &base_url),
        text: visible_text(&document),
    }
}

/// The URL relative links resolve against
fn document_base(document: &Html, page_url: &Url) -> Url {
    document
        .select(&BASE)
        .next()
        .and_then(|e| e.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .unwrap_or_else(|| page_url.clone())
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(element_text)
        .filter(|s| !s.is_empty())
}

fn all_text(document: &Html, selector: &Selector) -> Vec<String> {
    document.select(selector).map(element_text).collect()
}

/// Meta description and meta robots; names compare case-insensitively
fn extract_meta(document: &Html) -> (Option<String>, Option<String>) {
    let mut description = None;
    let mut robots = None;

    for meta in document.select(&META_NAMED) {
        let (Some(name), Some(content)) = (meta.value().attr("name"), meta.value().attr("content"))
        else {
            continue;
        };
        let content = content.trim().to_string();
        match name.trim().to_ascii_lowercase().as_str() {
            "description" if description.is_none() => description = Some(content),
            "robots" if robots.is_none() => robots = Some(content),
            _ => {}
        }
    }

    (description, robots)
}

fn extract_canonical(document: &Html, base_url: &Url) -> Option<String> {
    document
        .select(&CANONICAL)
        .find(|e| {
            e.value()
                .attr("rel")
                .map_or(false, |rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("canonical")))
        })
        .and_then(|e| e.value().attr("href"))
        .and_then(|href| base_url.join(href.trim()).ok())
        .map(|u| u.to_string())
}

fn has_structured_data(document: &Html) -> bool {
    document.select(&JSON_LD).any(|s| {
        s.value()
            .attr("type")
            .map_or(false, |t| t.trim().eq_ignore_ascii_case("application/ld+json"))
    }) || document.select(&ITEMSCOPE).next().is_some()
}

/// Whether an href can never lead to a crawlable page
fn is_skippable_href(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    href.is_empty()
        || href.starts_with('#')
        || ["javascript:", "mailto:", "tel:", "data:"]
            .iter()
            .any(|scheme| lower.starts_with(scheme))
}

/// Section of the page an element sits in, from its nearest landmark ancestor
fn placement_of(element: ElementRef<'_>) -> LinkPlacement {
    for ancestor in element.ancestors().filter_map(ElementRef::wrap) {
        let value = ancestor.value();
        if value.attr("role").map_or(false, |r| r.eq_ignore_ascii_case("navigation")) {
            return LinkPlacement::Navigation;
        }
        match value.name() {
            "nav" => return LinkPlacement::Navigation,
            "header" => return LinkPlacement::Header,
            "footer" => return LinkPlacement::Footer,
            "aside" => return LinkPlacement::Sidebar,
            _ => {}
        }
    }
    LinkPlacement::Body
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<ExtractedLink> {
    let mut links = Vec::new();

    for element in document.select(&ANCHOR) {
        let value = element.value();
        if value.attr("download").is_some() {
            continue;
        }
        let Some(href) = value.attr("href").map(str::trim) else {
            continue;
        };
        if is_skippable_href(href) {
            continue;
        }
        let Some(url) = resolve_and_normalize(base_url, href) else {
            continue;
        };

        let nofollow = value.attr("rel").map_or(false, |rel| {
            rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("nofollow"))
        });

        links.push(ExtractedLink {
            url,
            anchor_text: element_text(element),
            placement: placement_of(element),
            nofollow,
        });
    }

    links
}

fn visible_text(document: &Html) -> String {
    let Some(body) = document.select(&BODY).next() else {
        return String::new();
    };

    let mut words = Vec::new();
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().filter_map(ElementRef::wrap).any(|e| {
            matches!(e.value().name(), "script" | "style" | "noscript" | "template")
        });
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }
    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    fn urls(parsed: &ParsedPage) -> Vec<&str> {
        parsed.links.iter().map(|l| l.url.as_str()).collect()
    }

    #[test]
    fn test_extract_title_with_whitespace() {
        let html = r#"<html><head><title>  Test
            Page  </title></head><body></body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(parsed.title, Some("Test Page".to_string()));
    }

    #[test]
    fn test_no_title() {
        let parsed = parse_html("<html><head></head><body></body></html>", &base_url());
        assert_eq!(parsed.title, None);
    }

    #[test]
    fn test_meta_tags() {
        let html = r#"<html lang="en-GB"><head>
            <meta name="Description" content=" About us ">
            <meta name="ROBOTS" content="noindex, nofollow">
            <link rel="canonical" href="/canonical">
        </head><body></body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(parsed.meta_description.as_deref(), Some("About us"));
        assert_eq!(parsed.meta_robots.as_deref(), Some("noindex, nofollow"));
        assert_eq!(parsed.canonical_url.as_deref(), Some("https://example.com/canonical"));
        assert_eq!(parsed.lang.as_deref(), Some("en-GB"));
    }

    #[test]
    fn test_headings_and_images() {
        let html = r#"<html><body>
            <h1>One</h1><h1>Two</h1><h2>Sub</h2>
            <img src="a.png" alt="A"><img src="b.png"><img src="c.png" alt="  ">
        </body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(parsed.h1, vec!["One", "Two"]);
        assert_eq!(parsed.h2, vec!["Sub"]);
        assert_eq!(parsed.images_missing_alt, 2);
    }

    #[test]
    fn test_structured_data() {
        let html = r#"<html><head><script type="application/ld+json">{}</script></head><body></body></html>"#;
        assert!(parse_html(html, &base_url()).has_structured_data);
        assert!(!parse_html("<html><body></body></html>", &base_url()).has_structured_data);
    }

    #[test]
    fn test_extract_relative_links_normalized() {
        let html = r#"<html><body>
            <a href="other">Relative</a>
            <a href="/x/../docs/?utm_source=a#frag">Root</a>
            <a href="https://other.com/page">Abs</a>
        </body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(
            urls(&parsed),
            vec![
                "https://example.com/other",
                "https://example.com/docs/",
                "https://other.com/page"
            ]
        );
    }

    #[test]
    fn test_base_href() {
        let html = r#"<html><head><base href="https://cdn.example.com/root/"></head>
            <body><a href="child">C</a></body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(urls(&parsed), vec!["https://cdn.example.com/root/child"]);
    }

    #[test]
    fn test_skipped_links() {
        let html = r##"<html><body>
            <a href="javascript:void(0)">js</a>
            <a href="MAILTO:test@example.com">mail</a>
            <a href="tel:+1234567890">tel</a>
            <a href="data:text/html,hi">data</a>
            <a href="#section">jump</a>
            <a href="/file.pdf" download>dl</a>
            <a href="ftp://example.com/x">ftp</a>
            <a href="/valid">ok</a>
        </body></html>"##;
        let parsed = parse_html(html, &base_url());
        assert_eq!(urls(&parsed), vec!["https://example.com/valid"]);
    }

    #[test]
    fn test_link_placement_and_nofollow() {
        let html = r#"<html><body>
            <header><a href="/h">H</a></header>
            <nav><ul><li><a href="/n">N</a></li></ul></nav>
            <div role="navigation"><a href="/r">R</a></div>
            <aside><a href="/s">S</a></aside>
            <main><a href="/b" rel="external NoFollow"> Body   link </a></main>
            <footer><a href="/f">F</a></footer>
        </body></html>"#;
        let parsed = parse_html(html, &base_url());
        let placements: Vec<_> = parsed.links.iter().map(|l| l.placement).collect();
        assert_eq!(
            placements,
            vec![
                LinkPlacement::Header,
                LinkPlacement::Navigation,
                LinkPlacement::Navigation,
                LinkPlacement::Sidebar,
                LinkPlacement::Body,
                LinkPlacement::Footer,
            ]
        );
        assert!(parsed.links[4].nofollow);
        assert_eq!(parsed.links[4].anchor_text, "Body link");
        assert!(!parsed.links[0].nofollow);
    }

    #[test]
    fn test_visible_text_skips_scripts() {
        let html = r#"<html><head><title>T</title></head><body>
            <p>Hello   world.</p><script>var x = 1;</script><style>p{}</style><p>Bye</p>
        </body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(parsed.text, "Hello world. Bye");
    }
}
