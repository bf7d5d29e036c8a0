//! HTML extraction strategies.
//!
//! Markup on the source site drifts, so each extraction is an ordered list of
//! pure functions over a parsed page. The first one that yields something wins.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};

use crate::types::RawArticle;

/// One way of reading search results off a page.
pub type SearchStrategy = fn(&Html, usize) -> Vec<RawArticle>;

/// Tried in this order.
pub const SEARCH_STRATEGIES: &[(&str, SearchStrategy)] = &[
    ("news_area_cards", news_area_cards),
    ("title_anchors", title_anchors),
    ("news_link_anchors", news_link_anchors),
];

/// Article body containers across common Korean news sites.
pub const BODY_SELECTORS: &[&str] = &[
    "#news_body",
    ".news_body",
    "#articleBody",
    ".article_body",
    ".article-body",
    "div[itemprop='articleBody']",
    "article",
    ".article_view",
    "#articeBody",
    ".content_body",
    ".news_view",
    "#newsct_article",
    "main article",
];

/// Last resort when no article container matched.
pub const FALLBACK_CONTAINER_SELECTORS: &[&str] = &["main", "#main", ".main", "#content"];

const MIN_BODY_CHARS: usize = 100;
const MIN_FALLBACK_CHARS: usize = 80;
const MIN_TITLE_CHARS: usize = 5;

/// Run the search strategies in order; the first non-empty result wins.
pub fn extract_search_results(html: &str, max_items: usize) -> (Option<&'static str>, Vec<RawArticle>) {
    let doc = Html::parse_document(html);
    for (name, strategy) in SEARCH_STRATEGIES {
        let found = strategy(&doc, max_items);
        if !found.is_empty() {
            return (Some(*name), found);
        }
    }
    (None, Vec::new())
}

/// Extracted article text, or an empty string when nothing substantial matched.
pub fn extract_article_body(html: &str) -> String {
    let doc = Html::parse_document(html);
    first_text_over(&doc, BODY_SELECTORS, MIN_BODY_CHARS)
        .or_else(|| first_text_over(&doc, FALLBACK_CONTAINER_SELECTORS, MIN_FALLBACK_CHARS))
        .unwrap_or_default()
}

/// Trim `text` to `max_chars` characters, marking truncation with `...`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Strip the `<b>` highlight tags search results wrap around query terms.
pub fn strip_highlight(title: &str) -> String {
    title.replace("<b>", "").replace("</b>", "")
}

// ---------------------------------------------------------------------------
// Search-result strategies
// ---------------------------------------------------------------------------

fn news_area_cards(doc: &Html, max_items: usize) -> Vec<RawArticle> {
    let (Some(card), Some(title_sel), Some(title_alt)) = (
        selector("div.news_area"),
        selector("a.news_tit"),
        selector("a[href*='news'], a[href*='article']"),
    ) else {
        return Vec::new();
    };
    let desc_sel = selector("div.news_dsc, a.dsc_wrap, span.news_dsc, a.link_tit");
    let info_sel = selector("span.info, span.info_group");

    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    for group in doc.select(&card).take(max_items * 2) {
        let Some(tit) = group
            .select(&title_sel)
            .next()
            .or_else(|| group.select(&title_alt).next())
        else {
            continue;
        };
        let href = tit.value().attr("href").unwrap_or("");
        let key = href.split('?').next().unwrap_or("").to_string();
        if !seen.insert(key) {
            continue;
        }
        let description = desc_sel
            .as_ref()
            .and_then(|s| group.select(s).next())
            .map(|e| element_text(e, ""))
            .unwrap_or_default();
        let pub_date = info_sel
            .as_ref()
            .and_then(|s| group.select(s).next())
            .map(|e| element_text(e, ""))
            .unwrap_or_default();
        rows.push(RawArticle {
            title: element_text(tit, ""),
            link: href.to_string(),
            description,
            pub_date,
        });
        if rows.len() >= max_items {
            break;
        }
    }
    rows
}

fn title_anchors(doc: &Html, max_items: usize) -> Vec<RawArticle> {
    let Some(sel) = selector("a.news_tit") else {
        return Vec::new();
    };
    anchors_matching(doc, &sel, max_items, |title| title.chars().count() > MIN_TITLE_CHARS)
}

fn news_link_anchors(doc: &Html, max_items: usize) -> Vec<RawArticle> {
    let Some(sel) = selector(
        "ul.list_news a[href*='article'], div.bx a[href*='news'], div.bx a[href*='article']",
    ) else {
        return Vec::new();
    };
    anchors_matching(doc, &sel, max_items, |title| title.chars().count() >= MIN_TITLE_CHARS)
}

fn anchors_matching(
    doc: &Html,
    sel: &Selector,
    max_items: usize,
    title_ok: impl Fn(&str) -> bool,
) -> Vec<RawArticle> {
    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    for a in doc.select(sel) {
        if rows.len() >= max_items {
            break;
        }
        let href = a.value().attr("href").unwrap_or("");
        if href.is_empty() || seen.contains(href) {
            continue;
        }
        let title = element_text(a, "");
        if !title_ok(&title) {
            continue;
        }
        seen.insert(href.to_string());
        rows.push(RawArticle {
            title,
            link: href.to_string(),
            ..Default::default()
        });
    }
    rows
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn first_text_over(doc: &Html, selectors: &[&str], min_chars: usize) -> Option<String> {
    selectors.iter().filter_map(|css| selector(css)).find_map(|sel| {
        doc.select(&sel)
            .map(|el| element_text(el, " "))
            .find(|t| t.chars().count() > min_chars)
    })
}

/// Text of an element with each text node trimmed and empty ones dropped,
/// ignoring anything inside `<script>` or `<style>`.
fn element_text(el: ElementRef<'_>, separator: &str) -> String {
    el.descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let in_code = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|e| matches!(e.name(), "script" | "style"))
            });
            (!in_code).then(|| text.trim())
        })
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}
