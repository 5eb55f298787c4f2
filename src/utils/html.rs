//! Readable-text extraction from HTML pages.
//!
//! Strips navigation, headers, footers, scripts and comment sections, keeps
//! tables as `cell | cell` rows, and optionally renders hyperlink targets
//! inline as `text (url)` so the extraction step can recover reference URLs.

use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, warn};
use url::Url;

/// Elements whose subtree never contributes readable text.
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "svg", "canvas", "object", "select",
    "button",
];

/// Page chrome dropped by readable extraction but kept by the naive fallback.
const BOILERPLATE_ELEMENTS: &[&str] = &["nav", "header", "footer", "aside", "form", "menu"];

/// Class/id fragments marking boilerplate containers.
const BOILERPLATE_MARKERS: &[&str] = &[
    "breadcrumb",
    "sidebar",
    "gnav",
    "global-nav",
    "globalnav",
    "menu",
    "share",
    "sns",
    "cookie",
    "pagetop",
    "comments",
    "comment-",
];

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "main", "ul", "ol", "li", "dl", "dt", "dd", "h1", "h2",
    "h3", "h4", "h5", "h6", "blockquote", "pre", "table", "thead", "tbody", "tr", "hr", "figure",
    "figcaption", "address", "caption",
];

/// Main-content containers, in order of preference.
const CONTENT_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[role=\"main\"]",
    "#main-content",
    "#content",
    "#main",
    ".entry-content",
    ".post-content",
    ".content",
];

/// Extract readable text, falling back to a naive conversion when the
/// readable pass yields nothing.
pub fn extract_readable_text(html: &str, include_links: bool) -> String {
    extract_readable_text_with_base(html, None, include_links)
}

/// Like [`extract_readable_text`], resolving relative link targets against `base`.
pub fn extract_readable_text_with_base(html: &str, base: Option<&Url>, include_links: bool) -> String {
    let text = readable_text(html, base, include_links);
    if !text.is_empty() {
        return text;
    }

    let fallback = html_to_text(html);
    if include_links {
        warn!(
            "Readable extraction produced no text; using plain conversion ({} chars)",
            fallback.len()
        );
    } else {
        debug!("Readable extraction empty, hashing plain conversion");
    }
    fallback
}

/// Naive HTML to text: every text node outside scripts and styles.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut writer = TextWriter::new(false, None, false);
    writer.walk(document.root_element());
    writer.finish()
}

fn readable_text(html: &str, base: Option<&Url>, include_links: bool) -> String {
    let document = Html::parse_document(html);

    for selector_str in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        for element in document.select(&selector) {
            let text = render(element, base, include_links);
            if !text.is_empty() {
                return text;
            }
        }
    }

    let body = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next())
        .unwrap_or_else(|| document.root_element());
    render(body, base, include_links)
}

fn render(root: ElementRef<'_>, base: Option<&Url>, include_links: bool) -> String {
    let mut writer = TextWriter::new(include_links, base, true);
    writer.walk(root);
    writer.finish()
}

fn is_boilerplate_container(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    if value.attr("role") == Some("navigation") || value.attr("hidden").is_some() {
        return true;
    }
    let id = value.id().unwrap_or("").to_ascii_lowercase();
    let matches_marker = |name: &str| BOILERPLATE_MARKERS.iter().any(|m| name.contains(m));
    matches_marker(&id) || value.classes().any(|c| matches_marker(&c.to_ascii_lowercase()))
}

struct TextWriter<'a> {
    out: String,
    include_links: bool,
    base: Option<&'a Url>,
    drop_boilerplate: bool,
}

impl<'a> TextWriter<'a> {
    fn new(include_links: bool, base: Option<&'a Url>, drop_boilerplate: bool) -> Self {
        Self {
            out: String::new(),
            include_links,
            base,
            drop_boilerplate,
        }
    }

    fn walk(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.push_text(text),
                Node::Element(_) => {
                    if let Some(child_element) = ElementRef::wrap(child) {
                        self.visit(child_element);
                    }
                }
                // Comments, doctypes and processing instructions
                _ => {}
            }
        }
    }

    fn visit(&mut self, element: ElementRef<'_>) {
        let name = element.value().name();
        if SKIPPED_ELEMENTS.contains(&name) {
            return;
        }
        if self.drop_boilerplate
            && (BOILERPLATE_ELEMENTS.contains(&name) || is_boilerplate_container(&element))
        {
            return;
        }

        match name {
            "br" => self.newline(),
            "a" => {
                let before = self.out.len();
                self.walk(element);
                if self.include_links {
                    let link_text = self.out[before..].trim().to_string();
                    if let Some(target) = element.value().attr("href").and_then(|h| self.resolve(h)) {
                        if link_text != target {
                            self.out.push_str(" (");
                            self.out.push_str(&target);
                            self.out.push(')');
                        }
                    }
                }
            }
            "td" | "th" => {
                self.walk(element);
                self.out.push_str(" | ");
            }
            _ if BLOCK_ELEMENTS.contains(&name) => {
                self.newline();
                self.walk(element);
                self.newline();
            }
            _ => self.walk(element),
        }
    }

    fn resolve(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            return None;
        }
        match self.base {
            Some(base) => base.join(href).ok().map(|u| u.to_string()),
            None => Some(href.to_string()),
        }
    }

    fn push_text(&mut self, text: &str) {
        for c in text.chars() {
            if c.is_whitespace() && c != '\u{3000}' {
                if !self.out.ends_with(' ') && !self.out.ends_with('\n') && !self.out.is_empty() {
                    self.out.push(' ');
                }
            } else {
                self.out.push(c);
            }
        }
    }

    fn newline(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn finish(self) -> String {
        self.out
            .lines()
            .map(|line| line.trim().trim_end_matches('|').trim())
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
