//! Parsed HTML page with the lookups every extraction stage shares.

use std::cell::OnceCell;

use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use tracing::debug;

use crate::models::normalized_host;

type JsonObject = Map<String, Value>;

/// A fetched document plus its source URL.
///
/// `scraper::Html` is not `Send`, so a `Page` is built and dropped inside
/// one synchronous call; never hold one across an `.await`.
pub struct Page {
    document: Html,
    url: String,
    host: String,
    text: OnceCell<String>,
    jsonld: OnceCell<Vec<JsonObject>>,
}

impl Page {
    pub fn parse(html: &str, url: &str) -> Self {
        Self {
            document: Html::parse_document(html),
            url: url.to_string(),
            host: normalized_host(url),
            text: OnceCell::new(),
            jsonld: OnceCell::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Lowercased host without `www.`.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Elements matching a CSS selector. Invalid selectors (usually from
    /// operator overrides) match nothing.
    pub fn select(&self, selector: &str) -> Vec<ElementRef<'_>> {
        match Selector::parse(selector) {
            Ok(sel) => self.document.select(&sel).collect(),
            Err(_) => {
                debug!("Ignoring invalid selector {:?}", selector);
                Vec::new()
            }
        }
    }

    pub fn select_first(&self, selector: &str) -> Option<ElementRef<'_>> {
        let sel = Selector::parse(selector).ok()?;
        self.document.select(&sel).next()
    }

    /// Total matches across a selector list.
    pub fn match_count(&self, selectors: &[String]) -> usize {
        selectors.iter().map(|s| self.select(s).len()).sum()
    }

    pub fn any_match(&self, selectors: &[String]) -> bool {
        selectors
            .iter()
            .any(|s| !s.trim().is_empty() && self.select_first(s).is_some())
    }

    /// Visible document text (scripts and styles skipped), whitespace-trimmed
    /// pieces joined by spaces.
    pub fn text(&self) -> &str {
        self.text.get_or_init(|| {
            self.document
                .root_element()
                .descendants()
                .filter(|node| {
                    node.parent()
                        .and_then(ElementRef::wrap)
                        .map_or(true, |parent| {
                            !matches!(parent.value().name(), "script" | "style" | "template")
                        })
                })
                .filter_map(|node| node.value().as_text())
                .map(|text| text.trim())
                .filter(|piece| !piece.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
    }

    pub fn lower_text(&self) -> String {
        self.text().to_lowercase()
    }

    pub fn h1(&self) -> Option<String> {
        self.select_first("h1")
            .map(element_text)
            .filter(|t| !t.is_empty())
    }

    /// `content` of the first `<meta property=...>`.
    pub fn meta_property(&self, property: &str) -> Option<String> {
        self.meta_by("property", property)
    }

    /// `content` of the first `<meta name=...>`.
    pub fn meta_name(&self, name: &str) -> Option<String> {
        self.meta_by("name", name)
    }

    fn meta_by(&self, attr: &str, value: &str) -> Option<String> {
        self.select("meta")
            .into_iter()
            .find(|meta| meta.value().attr(attr) == Some(value))
            .and_then(|meta| meta.value().attr("content"))
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
    }

    /// `<title>` text, else `og:title`.
    pub fn title(&self) -> Option<String> {
        self.select_first("title")
            .map(element_text)
            .filter(|t| !t.is_empty())
            .or_else(|| self.meta_property("og:title"))
    }

    /// Heading text, else `og:title`.
    pub fn heading_or_og_title(&self) -> Option<String> {
        self.h1().or_else(|| self.meta_property("og:title"))
    }

    /// `article:tag` meta values.
    pub fn tags(&self) -> Vec<String> {
        self.select("meta")
            .into_iter()
            .filter(|meta| meta.value().attr("property") == Some("article:tag"))
            .filter_map(|meta| meta.value().attr("content"))
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .collect()
    }

    /// Every JSON-LD object on the page, with arrays and `@graph` flattened.
    /// Scripts that fail to parse are skipped.
    pub fn jsonld(&self) -> &[JsonObject] {
        self.jsonld.get_or_init(|| {
            let mut items = Vec::new();
            for script in self.select(r#"script[type="application/ld+json"]"#) {
                let raw: String = script.text().collect();
                let raw = raw.trim();
                if raw.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(raw) {
                    Ok(value) => flatten_jsonld(value, &mut items),
                    Err(e) => debug!("Skipping malformed JSON-LD on {}: {}", self.url, e),
                }
            }
            items
        })
    }

    /// Text of list items and paragraphs under the first heading whose label
    /// contains one of `keywords`.
    ///
    /// Headings are `h2`/`h3`/`h4`/`strong`. The section is the nearest
    /// enclosing `section`/`div`/`article` (else the direct parent); its
    /// `li`/`p` rows of at least two words are taken. When the section
    /// yields nothing, the heading's next `ul`/`ol` sibling is tried.
    pub fn section_list_items(&self, keywords: &[String]) -> Vec<String> {
        let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
        let mut collected = Vec::new();
        for heading in self.select("h2, h3, h4, strong") {
            let label = element_text(heading).to_lowercase();
            if label.is_empty() || !keywords.iter().any(|k| label.contains(k.as_str())) {
                continue;
            }
            let section = heading
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|el| matches!(el.value().name(), "section" | "div" | "article"))
                .or_else(|| heading.parent().and_then(ElementRef::wrap));
            let Some(section) = section else {
                continue;
            };
            if let Ok(rows) = Selector::parse("li, p") {
                for node in section.select(&rows) {
                    let text = element_text(node);
                    if !text.is_empty() && text.split_whitespace().count() >= 2 {
                        collected.push(text);
                    }
                }
            }
            if !collected.is_empty() {
                return collected;
            }
            let sibling = heading
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .find(|el| matches!(el.value().name(), "ul" | "ol"));
            if let (Some(list), Ok(li)) = (sibling, Selector::parse("li")) {
                collected.extend(
                    list.select(&li)
                        .map(element_text)
                        .filter(|text| !text.is_empty()),
                );
            }
            if !collected.is_empty() {
                return collected;
            }
        }
        collected
    }
}

fn flatten_jsonld(value: Value, out: &mut Vec<JsonObject>) {
    match value {
        Value::Array(entries) => {
            for entry in entries {
                flatten_jsonld(entry, out);
            }
        }
        Value::Object(mut obj) => match obj.remove("@graph") {
            Some(Value::Array(graph)) => {
                for entry in graph {
                    flatten_jsonld(entry, out);
                }
            }
            Some(other) => {
                obj.insert("@graph".to_string(), other);
                out.push(obj);
            }
            None => out.push(obj),
        },
        _ => {}
    }
}

/// Element text with each text node trimmed, joined by single spaces.
pub fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Element text split into non-empty lines, one per text node or line break.
pub fn element_lines(el: ElementRef<'_>) -> Vec<String> {
    el.text()
        .flat_map(str::lines)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// `content`/`value` attribute, else the element text.
pub fn meta_value(el: ElementRef<'_>) -> Option<String> {
    let attrs = el.value();
    if let Some(content) = attrs
        .attr("content")
        .or_else(|| attrs.attr("value"))
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some(content.to_string());
    }
    Some(element_text(el)).filter(|t| !t.is_empty())
}
