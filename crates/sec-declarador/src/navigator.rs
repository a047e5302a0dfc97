//! Structural queries over the portal's server-rendered pages.
//!
//! The portal lays its data out in nested tables with fixed ids and
//! label/spacer/value cell triples. These helpers locate exactly those
//! shapes and nothing more.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Element not found: {0}")]
    NotFound(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Failed to parse date: {0}")]
    DateParse(String),
}

static SEL_ANY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("*").expect("invalid selector: any"));

static SEL_TD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("invalid selector: td"));

static SEL_LOGIN_FIELD: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"input[name="declaRut"]"#).expect("invalid selector: login field")
});

/// A parsed portal page. The source text is kept alongside the tree so
/// callers can persist the page exactly as the server sent it.
#[derive(Debug, Clone)]
pub struct Document {
    html: Html,
    source: String,
}

impl Document {
    pub fn parse(source: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            html: Html::parse_document(&source),
            source,
        }
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when the page is the portal's login form, which is what the
    /// server answers with once the session cookie is missing or stale.
    pub fn is_login_page(&self) -> bool {
        self.html.select(&SEL_LOGIN_FIELD).next().is_some()
    }
}

pub(crate) fn elem_text(element: ElementRef) -> String {
    element.text().collect::<String>()
}

fn child_elements(element: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    element.children().filter_map(ElementRef::wrap)
}

/// All elements carrying `id`, in document order. The portal reuses ids.
pub fn find_all_by_id<'a>(doc: &'a Document, id: &str) -> Vec<ElementRef<'a>> {
    doc.html
        .select(&SEL_ANY)
        .filter(|e| e.value().id() == Some(id))
        .collect()
}

pub fn find_by_id<'a>(doc: &'a Document, id: &str) -> Result<ElementRef<'a>, ParseError> {
    doc.html
        .select(&SEL_ANY)
        .find(|e| e.value().id() == Some(id))
        .ok_or_else(|| ParseError::NotFound(format!("element with id '{}'", id)))
}

/// Like [`find_by_id`], restricted to `tag` elements.
pub fn find_tag_by_id<'a>(
    doc: &'a Document,
    tag: &str,
    id: &str,
) -> Result<ElementRef<'a>, ParseError> {
    doc.html
        .select(&SEL_ANY)
        .find(|e| e.value().name() == tag && e.value().id() == Some(id))
        .ok_or_else(|| ParseError::NotFound(format!("<{}> with id '{}'", tag, id)))
}

/// First `tag` element strictly below `element`.
pub fn find_descendant<'a>(element: ElementRef<'a>, tag: &str) -> Result<ElementRef<'a>, ParseError> {
    element
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == tag)
        .ok_or_else(|| ParseError::NotFound(format!("<{}> inside <{}>", tag, element.value().name())))
}

/// Rows belonging to `table` itself, looking through the implicit
/// `thead`/`tbody`/`tfoot` wrappers but never into nested tables.
pub fn find_rows(table: ElementRef<'_>, skip_header: bool) -> Vec<ElementRef<'_>> {
    let rows = child_elements(table).flat_map(|child| match child.value().name() {
        "tr" => vec![child],
        "thead" | "tbody" | "tfoot" => child_elements(child)
            .filter(|e| e.value().name() == "tr")
            .collect(),
        _ => Vec::new(),
    });

    if skip_header {
        rows.skip(1).collect()
    } else {
        rows.collect()
    }
}

pub fn cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    child_elements(row)
        .filter(|e| e.value().name() == "td")
        .collect()
}

pub fn cell_text(row: ElementRef<'_>, index: usize) -> Result<String, ParseError> {
    cells(row)
        .get(index)
        .map(|cell| elem_text(*cell).trim().to_string())
        .ok_or_else(|| ParseError::MissingField(format!("cell {} of table row", index)))
}

/// `href` of the first anchor inside `cell`.
pub fn anchor_href(cell: ElementRef<'_>) -> Result<String, ParseError> {
    cell.descendants()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "a")
        .find_map(|a| a.value().attr("href"))
        .map(str::to_string)
        .ok_or_else(|| ParseError::MissingField("anchor href".to_string()))
}

/// Finds the first leaf cell whose text matches `label` and returns the text
/// of the cell two positions after it. Detail tables alternate
/// label, spacer and value cells.
pub fn find_label_value(doc: &Document, label: &Regex) -> Result<String, ParseError> {
    let label_cell = doc
        .html
        .select(&SEL_TD)
        .filter(|td| td.select(&SEL_TD).next().is_none())
        .find(|td| label.is_match(elem_text(*td).trim()))
        .ok_or_else(|| ParseError::NotFound(format!("label matching '{}'", label)))?;

    label_cell
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .nth(1)
        .map(|value| elem_text(value).trim().to_string())
        .ok_or_else(|| ParseError::MissingField(format!("value for label '{}'", label)))
}
