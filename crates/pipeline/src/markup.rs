//! Helpers for reading element markup captured from the page.

use flightbot_core::{Error, Result};
use scraper::{ElementRef, Html, Node, Selector};

/// Parse the `outerHTML` of one element.
pub fn parse_fragment(markup: &str) -> Html {
    Html::parse_fragment(markup)
}

/// Selector for `tag` elements carrying every class in `class_names`
/// (space separated, as written in a `class` attribute).
pub fn class_selector(tag: &str, class_names: &str) -> Result<Selector> {
    let classes: Vec<&str> = class_names.split_whitespace().collect();
    if classes.is_empty() {
        return Err(Error::Config(format!("empty class name for <{}>", tag)));
    }
    let css = format!("{}.{}", tag, classes.join("."));
    Selector::parse(&css).map_err(|e| Error::Config(format!("bad selector '{}': {:?}", css, e)))
}

/// Text content of an element, trimmed.
pub fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Text of the first node after `el` that has any, whether a bare text node
/// or an element. Blank nodes from indentation are skipped.
pub fn next_sibling_text(el: ElementRef<'_>) -> Option<String> {
    el.next_siblings()
        .filter_map(|sibling| match sibling.value() {
            Node::Text(text) => Some(text.trim().to_string()),
            Node::Element(_) => ElementRef::wrap(sibling).map(text_of),
            _ => None,
        })
        .find(|text| !text.is_empty())
}

/// Texts of all `tag.class` matches in document order.
pub fn texts_by_class(doc: &Html, tag: &str, class_names: &str) -> Result<Vec<String>> {
    let selector = class_selector(tag, class_names)?;
    Ok(doc.select(&selector).map(text_of).collect())
}
