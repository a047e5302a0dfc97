use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use scraper::ElementRef;

use crate::navigator::{
    Document, ParseError, anchor_href, cell_text, cells, elem_text, find_all_by_id, find_by_id,
    find_descendant, find_label_value, find_rows, find_tag_by_id,
};

const LISTING_TABLE_ID: &str = "kakits";
const DETAIL_TABLE_ID: &str = "table2";
const ATTACHMENTS_TABLE_ID: &str = "adjuntos";

static RE_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}/\d{2}/\d{4}$").expect("invalid regex: date"));

static RE_LABEL_KIND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("Tipo de Trámite").expect("invalid regex: kind label"));

static RE_LABEL_LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("Ubicación").expect("invalid regex: location label"));

static RE_LABEL_STATUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("Estado").expect("invalid regex: status label"));

static RE_LABEL_DECLARANT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("Nombre Declarador").expect("invalid regex: declarant label"));

static RE_LABEL_DECLARANT_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&regex::escape("R.U.T. Declarador:")).expect("invalid regex: rut label")
});

/// One data row of the filings listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FilingRow {
    pub folio: String,
    pub registration_date: String,
    pub kind: String,
    pub channel: String,
    pub submission: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttachmentRow {
    pub file_name: String,
    pub file_size: String,
    pub relative_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SummaryPage {
    pub folio: String,
    pub registration_date: NaiveDate,
    pub kind: String,
    pub location: String,
    pub status: String,
    pub declarant_name: String,
    pub declarant_id: String,
    pub attachments: Vec<AttachmentRow>,
}

/// Strict `DD/MM/YYYY`.
pub(crate) fn parse_registration_date(text: &str) -> Result<NaiveDate, ParseError> {
    let text = text.trim();
    if !RE_DATE.is_match(text) {
        return Err(ParseError::DateParse(format!(
            "Expected DD/MM/YYYY, got '{}'",
            text
        )));
    }
    NaiveDate::parse_from_str(text, "%d/%m/%Y")
        .map_err(|e| ParseError::DateParse(format!("Invalid date '{}': {}", text, e)))
}

/// Returns `None` when the page has no listing table at all.
pub(crate) fn parse_filing_list(doc: &Document) -> Result<Option<Vec<FilingRow>>, ParseError> {
    let Ok(table) = find_by_id(doc, LISTING_TABLE_ID) else {
        return Ok(None);
    };

    let mut filings = Vec::new();
    for row in find_rows(table, true) {
        let values: Vec<String> = cells(row)
            .into_iter()
            .map(|cell| elem_text(cell).trim().to_string())
            .collect();

        let [folio, registration_date, kind, channel, submission, ..] = values.as_slice() else {
            return Err(ParseError::MissingField(format!(
                "listing row with {} cell(s), expected at least 5",
                values.len()
            )));
        };

        filings.push(FilingRow {
            folio: folio.clone(),
            registration_date: registration_date.clone(),
            kind: kind.clone(),
            channel: channel.clone(),
            submission: submission.clone(),
        });
    }

    Ok(Some(filings))
}

pub(crate) fn parse_filing_summary(doc: &Document) -> Result<SummaryPage, ParseError> {
    let detail_tables = find_all_by_id(doc, DETAIL_TABLE_ID);
    let [folio_table, date_table, ..] = detail_tables.as_slice() else {
        return Err(ParseError::NotFound(format!(
            "two tables with id '{}', found {}",
            DETAIL_TABLE_ID,
            detail_tables.len()
        )));
    };

    let first_row_value = |table: ElementRef<'_>| {
        find_rows(table, false)
            .first()
            .ok_or_else(|| ParseError::MissingField(format!("row in '{}'", DETAIL_TABLE_ID)))
            .and_then(|row| cell_text(*row, 1))
    };

    let folio = first_row_value(*folio_table)?;
    let registration_date = parse_registration_date(&first_row_value(*date_table)?)?;

    let kind = find_label_value(doc, &RE_LABEL_KIND)?;
    let location = find_label_value(doc, &RE_LABEL_LOCATION)?;
    let status = find_label_value(doc, &RE_LABEL_STATUS)?;
    let declarant_name = find_label_value(doc, &RE_LABEL_DECLARANT_NAME)?;
    let declarant_id = find_label_value(doc, &RE_LABEL_DECLARANT_ID)?;

    let attachments = parse_attachments(doc)?;

    Ok(SummaryPage {
        folio,
        registration_date,
        kind,
        location,
        status,
        declarant_name,
        declarant_id,
        attachments,
    })
}

fn parse_attachments(doc: &Document) -> Result<Vec<AttachmentRow>, ParseError> {
    let container = find_tag_by_id(doc, "table", ATTACHMENTS_TABLE_ID)?;
    let table = find_descendant(find_descendant(container, "table")?, "table")?;

    find_rows(table, true)
        .into_iter()
        .map(|row| -> Result<AttachmentRow, ParseError> {
            let link_cell = cells(row)
                .get(2)
                .copied()
                .ok_or_else(|| ParseError::MissingField("attachment link cell".to_string()))?;

            Ok(AttachmentRow {
                file_name: cell_text(row, 0)?,
                file_size: cell_text(row, 1)?,
                relative_url: anchor_href(link_cell)?,
            })
        })
        .collect()
}
