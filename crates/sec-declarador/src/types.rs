use crate::client::{ScraperError, SecClient};
use crate::navigator::{Document, ParseError};
use crate::parser::{FilingRow, parse_registration_date};
use crate::session::{HttpSession, Transport};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::convert::Infallible;
use std::fmt::Display;
use std::str::FromStr;

/// Filing identifier as the portal prints it. Not necessarily numeric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Folio(String);

impl Folio {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Folio {
    fn from(value: String) -> Self {
        Folio(value)
    }
}

impl From<&str> for Folio {
    fn from(value: &str) -> Self {
        Folio(value.to_string())
    }
}

impl FromStr for Folio {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Folio::from(s.trim()))
    }
}

impl Display for Folio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// Fills `cell` on the first successful `init`. Failures leave it empty.
fn memoized<'a, V>(
    cell: &'a OnceCell<V>,
    init: impl FnOnce() -> Result<V, ScraperError>,
) -> Result<&'a V, ScraperError> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = init()?;
    Ok(cell.get_or_init(|| value))
}

/// HTML receipt and signed PDF confirming a filing.
#[derive(Debug, Clone)]
pub struct Certificates {
    pub html: Document,
    pub pdf: Vec<u8>,
}

/// One row of the declarant's filings listing.
///
/// The summary and the certificates are fetched through the client on first
/// access and kept for the lifetime of this value.
#[derive(Debug, Serialize)]
#[serde(bound(serialize = ""))]
pub struct Filing<'c, T: Transport = HttpSession> {
    pub folio: Folio,
    /// As printed in the listing, usually `DD/MM/YYYY`.
    pub registration_date: String,
    pub kind: String,
    pub channel: String,
    pub submission: String,
    #[serde(skip)]
    client: &'c SecClient<T>,
    #[serde(skip)]
    summary: OnceCell<FilingSummary<'c, T>>,
    #[serde(skip)]
    certificates: OnceCell<Certificates>,
}

impl<'c, T: Transport> Filing<'c, T> {
    pub(crate) fn new(row: FilingRow, client: &'c SecClient<T>) -> Self {
        Self {
            folio: Folio::from(row.folio),
            registration_date: row.registration_date,
            kind: row.kind,
            channel: row.channel,
            submission: row.submission,
            client,
            summary: OnceCell::new(),
            certificates: OnceCell::new(),
        }
    }

    pub fn parsed_registration_date(&self) -> Result<NaiveDate, ParseError> {
        parse_registration_date(&self.registration_date)
    }

    pub fn summary(&self) -> Result<&FilingSummary<'c, T>, ScraperError> {
        memoized(&self.summary, || self.client.filing_summary(&self.folio))
    }

    pub fn certificates(&self) -> Result<&Certificates, ScraperError> {
        memoized(&self.certificates, || {
            self.client.filing_certificates(&self.folio)
        })
    }

    pub fn certificate_html(&self) -> Result<&Document, ScraperError> {
        Ok(&self.certificates()?.html)
    }

    pub fn certificate_pdf(&self) -> Result<&[u8], ScraperError> {
        Ok(&self.certificates()?.pdf)
    }
}

impl<T: Transport> Display for Filing<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} folio {} registered on {}",
            self.kind, self.folio, self.registration_date
        )
    }
}

/// Detail page of a filing.
#[derive(Debug, Serialize)]
#[serde(bound(serialize = ""))]
pub struct FilingSummary<'c, T: Transport = HttpSession> {
    pub folio: Folio,
    pub registration_date: NaiveDate,
    pub kind: String,
    pub location: String,
    pub status: String,
    pub declarant_name: String,
    pub declarant_id: String,
    /// In the order the page lists them.
    pub attachments: Vec<Attachment<'c, T>>,
}

impl<'c, T: Transport> FilingSummary<'c, T> {
    pub(crate) fn add_attachment(&mut self, attachment: Attachment<'c, T>) {
        self.attachments.push(attachment);
    }
}

impl<T: Transport> Display for FilingSummary<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "┌─ Folio {} ─ {}", self.folio, self.registration_date)?;
        writeln!(f, "│  Kind:      {}", self.kind)?;
        writeln!(f, "│  Location:  {}", self.location)?;
        writeln!(f, "│  Status:    {}", self.status)?;
        writeln!(
            f,
            "│  Declarant: {} ({})",
            self.declarant_name, self.declarant_id
        )?;
        writeln!(f, "└─ {} attachment(s)", self.attachments.len())?;
        for (i, attachment) in self.attachments.iter().enumerate() {
            writeln!(f, "{:>3}. {}", i + 1, attachment)?;
        }
        Ok(())
    }
}

/// A file linked from a filing summary.
#[derive(Debug, Serialize)]
#[serde(bound(serialize = ""))]
pub struct Attachment<'c, T: Transport = HttpSession> {
    pub file_name: String,
    /// Size as displayed by the portal, e.g. `1,2 MB`.
    pub file_size: String,
    pub relative_url: String,
    #[serde(skip)]
    client: &'c SecClient<T>,
    #[serde(skip)]
    content: OnceCell<Vec<u8>>,
}

impl<'c, T: Transport> Attachment<'c, T> {
    pub(crate) fn new(
        file_name: String,
        file_size: String,
        relative_url: String,
        client: &'c SecClient<T>,
    ) -> Self {
        Self {
            file_name,
            file_size,
            relative_url,
            client,
            content: OnceCell::new(),
        }
    }

    /// Downloads the file on first call.
    pub fn content(&self) -> Result<&[u8], ScraperError> {
        memoized(&self.content, || {
            self.client.attachment_content(&self.relative_url)
        })
        .map(Vec::as_slice)
    }
}

impl<T: Transport> Display for Attachment<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.file_name, self.file_size)
    }
}
