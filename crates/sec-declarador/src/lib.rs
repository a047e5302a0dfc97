pub mod navigator;
mod parser;
pub mod client;
pub mod session;
pub mod types;
pub mod utils;

pub use client::{ScraperError, SecClient};
pub use navigator::{Document, ParseError};
pub use session::{ClientConfig, HttpSession, Transport};
pub use types::{Attachment, Certificates, Filing, FilingSummary, Folio};

pub(crate) const BASE_URL: &str = "https://wlhttp.sec.cl/edeclarador/";
