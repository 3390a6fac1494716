//! HTML query abstraction used by the page parsers

use scraper::Node;

/// Block-level tags that end a line when rendering element text
const BLOCK_TAGS: &[&str] = &["p", "div", "li", "h1", "h2", "h3", "section", "article"];

/// Trait representing an HTML element that can be queried with CSS selectors
///
/// Parsers are written against this trait rather than against `scraper`
/// directly so that selector handling and text cleanup live in one place.
pub trait ElementRef {
    /// Select a single descendant element matching the CSS selector
    ///
    /// Returns `None` if no element matches or if the selector is invalid.
    fn select_one(&self, selector: &str) -> Option<Self>
    where
        Self: Sized;

    /// Select all descendant elements matching the CSS selector
    ///
    /// Returns an empty vector if no elements match or if the selector is invalid.
    fn select_all(&self, selector: &str) -> Vec<Self>
    where
        Self: Sized;

    /// Text content of this element and its descendants, whitespace-trimmed
    fn text(&self) -> String;

    /// Text content with `<br>` and block elements rendered as line breaks
    ///
    /// Each line is trimmed and blank lines are dropped.
    fn text_with_line_breaks(&self) -> String;

    /// Get the value of an HTML attribute
    fn attr(&self, name: &str) -> Option<&str>;

    /// Trimmed text of the first descendant matching `selector`, if non-empty
    fn select_text(&self, selector: &str) -> Option<String>
    where
        Self: Sized,
    {
        self.select_one(selector)
            .map(|el| el.text())
            .filter(|text| !text.is_empty())
    }

    /// Attribute of the first descendant matching `selector`, if non-empty
    fn select_attr(&self, selector: &str, name: &str) -> Option<String>
    where
        Self: Sized,
    {
        self.select_one(selector)
            .and_then(|el| el.attr(name).map(|v| v.trim().to_string()))
            .filter(|value| !value.is_empty())
    }
}

impl<'a> ElementRef for scraper::ElementRef<'a> {
    fn select_one(&self, selector: &str) -> Option<Self> {
        let selector = scraper::Selector::parse(selector).ok()?;
        self.select(&selector).next()
    }

    fn select_all(&self, selector: &str) -> Vec<Self> {
        let selector = match scraper::Selector::parse(selector) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        self.select(&selector).collect()
    }

    fn text(&self) -> String {
        let raw: String = scraper::ElementRef::text(self).collect();
        raw.trim().to_string()
    }

    fn text_with_line_breaks(&self) -> String {
        let mut raw = String::new();
        render_lines(self, &mut raw);
        raw.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.value().attr(name)
    }
}

fn render_lines(element: &scraper::ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                if let Some(child_el) = scraper::ElementRef::wrap(child) {
                    render_lines(&child_el, out);
                }
                if BLOCK_TAGS.contains(&name) {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}
