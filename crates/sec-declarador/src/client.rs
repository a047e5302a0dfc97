use crate::navigator::{Document, ParseError};
use crate::parser::{FilingRow, parse_filing_list, parse_filing_summary};
use crate::session::{ClientConfig, HttpSession, Params, Transport};
use crate::types::{Attachment, Certificates, Filing, FilingSummary, Folio};

use std::fmt::Display;

const LOGIN_PATH: &str = "autentificacion.do";
const FILINGS_PATH: &str = "usuarioDeclarador.do";
const PRINT_PATH: &str = "Firma";

const USER_TYPE: &str = "6";
const ELECTRONIC_CHANNEL: &str = "ELECTRÓNICO";

#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Login rejected for rut {0}")]
    LoginRejected(String),
    #[error("Session expired or not authenticated while requesting {0}")]
    SessionExpired(String),
}

/// An authenticated session against the e-declarador portal.
///
/// One client holds one identity. Requests go out strictly one at a time
/// and in call order; the certificate PDF in particular depends on the
/// popup request that precedes it.
#[derive(Debug)]
pub struct SecClient<T: Transport = HttpSession> {
    transport: T,
    config: ClientConfig,
    rut: Option<String>,
}

impl SecClient<HttpSession> {
    /// Builds a client with the default configuration and logs in.
    pub fn new(rut: &str, password: &str) -> Result<Self, ScraperError> {
        Self::with_config(ClientConfig::default(), rut, password)
    }

    pub fn with_config(
        config: ClientConfig,
        rut: &str,
        password: &str,
    ) -> Result<Self, ScraperError> {
        let transport = HttpSession::new(&config)?;
        let mut client = Self::with_transport(transport, config);
        client.login(rut, password)?;
        Ok(client)
    }
}

impl<T: Transport> SecClient<T> {
    /// Wraps a transport without logging in.
    pub fn with_transport(transport: T, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            rut: None,
        }
    }

    pub fn rut(&self) -> Option<&str> {
        self.rut.as_deref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Posts the credentials. The portal keeps the session in a cookie held
    /// by the transport.
    ///
    /// With `verify_login` off nothing is checked here and bad credentials
    /// only show up later as [`ScraperError::SessionExpired`].
    pub fn login(&mut self, rut: &str, password: &str) -> Result<(), ScraperError> {
        log::info!("Logging in as {}...", rut);
        let query = [
            ("accion", "ingresar_usuario"),
            ("accion2", "persona"),
            ("tipoUsuario", USER_TYPE),
            ("declaRut", rut),
            ("password", password),
        ];
        let html = self.transport.post_text(LOGIN_PATH, &query, &[])?;

        if self.config.verify_login && Document::parse(html).is_login_page() {
            log::warn!("Portal answered the login request with the login form");
            return Err(ScraperError::LoginRejected(rut.to_string()));
        }

        self.rut = Some(rut.to_string());
        Ok(())
    }

    pub fn get(&self, path: &str, query: &Params<'_>) -> Result<Document, ScraperError> {
        let html = self.transport.get_text(path, query)?;
        self.authenticated_document(path, html)
    }

    pub fn post(
        &self,
        path: &str,
        query: &Params<'_>,
        form: &Params<'_>,
    ) -> Result<Document, ScraperError> {
        let html = self.transport.post_text(path, query, form)?;
        self.authenticated_document(path, html)
    }

    /// Binary bodies are checked too: an expired session answers downloads
    /// with the login form instead of the file.
    pub fn get_bytes(&self, path: &str, query: &Params<'_>) -> Result<Vec<u8>, ScraperError> {
        let bytes = self.transport.get_bytes(path, query)?;
        if looks_like_html(&bytes)
            && Document::parse(String::from_utf8_lossy(&bytes)).is_login_page()
        {
            log::warn!("Redirected to the login form while downloading {}", path);
            return Err(ScraperError::SessionExpired(path.to_string()));
        }
        Ok(bytes)
    }

    fn authenticated_document(&self, path: &str, html: String) -> Result<Document, ScraperError> {
        let document = Document::parse(html);
        if document.is_login_page() {
            log::warn!("Redirected to the login form while requesting {}", path);
            return Err(ScraperError::SessionExpired(path.to_string()));
        }
        Ok(document)
    }

    /// Every filing of the logged-in declarant, one listing page at a time.
    ///
    /// Pages are requested only when the rows of the previous one run out.
    /// The sequence ends at the first page without the listing table or
    /// without data rows.
    pub fn filings(&self) -> Filings<'_, T> {
        Filings {
            client: self,
            next_page: Some(0),
            rows: Vec::new().into_iter(),
        }
    }

    fn fetch_filings_page(&self, page: u32) -> Result<Option<Vec<FilingRow>>, ScraperError> {
        log::info!("Fetching filings page {}...", page);
        let page_number = page.to_string();
        let document = if page == 0 {
            self.get(
                FILINGS_PATH,
                &[
                    ("accion", "menu.usuarioDeclarador.declaracionesInscritas"),
                    (
                        "accionEspecifica",
                        "menu.usuarioDeclarador.declaracionesInscritas.buscar",
                    ),
                    ("pagActual", page_number.as_str()),
                    ("tipoTramiteINP", "0"),
                    ("folioInscripcionINP", ""),
                ],
            )?
        } else {
            self.get(
                FILINGS_PATH,
                &[
                    ("accion", "menu.usuarioDeclarador.declaracionesInscritas.paginar"),
                    ("pagActual", page_number.as_str()),
                    ("tipoOrden", "asc"),
                    ("columnaOrden", "-1"),
                ],
            )?
        };
        Ok(parse_filing_list(&document)?)
    }

    pub fn filing_summary(&self, folio: &Folio) -> Result<FilingSummary<'_, T>, ScraperError> {
        log::info!("Fetching summary of filing {}...", folio);
        let document = self.get(
            FILINGS_PATH,
            &[
                ("accion", "menu.usuarioDeclarador.declaracionesInscritas.visualizar"),
                ("folio", folio.as_str()),
                ("medio", ELECTRONIC_CHANNEL),
            ],
        )?;
        let page = parse_filing_summary(&document)?;

        let mut summary = FilingSummary {
            folio: Folio::from(page.folio),
            registration_date: page.registration_date,
            kind: page.kind,
            location: page.location,
            status: page.status,
            declarant_name: page.declarant_name,
            declarant_id: page.declarant_id,
            attachments: Vec::new(),
        };
        for row in page.attachments {
            summary.add_attachment(Attachment::new(
                row.file_name,
                row.file_size,
                row.relative_url,
                self,
            ));
        }
        log::debug!(
            "Filing {} has {} attachment(s)",
            folio,
            summary.attachments.len()
        );

        Ok(summary)
    }

    /// The HTML receipt and the signed PDF of a filing. The two requests
    /// must run back to back: the print endpoint renders whatever folio the
    /// popup request selected in the session.
    pub fn filing_certificates(&self, folio: &Folio) -> Result<Certificates, ScraperError> {
        log::info!("Fetching certificates of filing {}...", folio);
        let html = self.get(
            FILINGS_PATH,
            &[
                ("accion", "verInscripcionPopUp"),
                ("folioPresentacion", folio.as_str()),
            ],
        )?;
        let pdf = self.get_bytes(PRINT_PATH, &[("sub", "PRINT")])?;

        Ok(Certificates { html, pdf })
    }

    /// Raw bytes behind an attachment link taken from a summary page.
    pub fn attachment_content(&self, relative_url: &str) -> Result<Vec<u8>, ScraperError> {
        log::info!("Downloading attachment {}...", relative_url);
        self.get_bytes(relative_url, &[])
    }
}

fn looks_like_html(bytes: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]).to_lowercase();
    let head = head.trim_start();
    head.starts_with("<!doctype html") || head.starts_with("<html") || head.contains("<form")
}

impl<T: Transport> Display for SecClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.rut {
            Some(rut) => write!(f, "SEC client for rut {}", rut),
            None => write!(f, "SEC client (not logged in)"),
        }
    }
}

/// Lazy, forward-only sequence of filings produced by [`SecClient::filings`].
///
/// Fused after the last page or after the first error.
#[derive(Debug)]
pub struct Filings<'c, T: Transport> {
    client: &'c SecClient<T>,
    next_page: Option<u32>,
    rows: std::vec::IntoIter<FilingRow>,
}

impl<'c, T: Transport> Iterator for Filings<'c, T> {
    type Item = Result<Filing<'c, T>, ScraperError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.rows.next() {
                return Some(Ok(Filing::new(row, self.client)));
            }

            let page = self.next_page.take()?;
            match self.client.fetch_filings_page(page) {
                Ok(Some(rows)) if !rows.is_empty() => {
                    self.next_page = Some(page + 1);
                    self.rows = rows.into_iter();
                }
                Ok(_) => {
                    log::info!("No filings on page {}, listing finished", page);
                    return None;
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
