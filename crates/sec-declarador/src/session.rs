use crate::client::ScraperError;

use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use url::{Url, form_urlencoded};

pub type Params<'a> = [(&'a str, &'a str)];

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
    /// Fail `login` when the portal answers with the login form again.
    pub verify_login: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: crate::BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            verify_login: true,
        }
    }
}

/// The HTTP exchanges the portal client needs. An implementation carries
/// the session cookie of exactly one identity across all its calls.
pub trait Transport {
    fn get_text(&self, path: &str, query: &Params<'_>) -> Result<String, ScraperError>;

    fn post_text(
        &self,
        path: &str,
        query: &Params<'_>,
        form: &Params<'_>,
    ) -> Result<String, ScraperError>;

    fn get_bytes(&self, path: &str, query: &Params<'_>) -> Result<Vec<u8>, ScraperError>;
}

#[derive(Debug, Clone)]
pub struct HttpSession {
    client: Client,
    base_url: Url,
}

impl HttpSession {
    pub fn new(config: &ClientConfig) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ScraperError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;

        Ok(Self { client, base_url })
    }

    /// Resolves `path` against the portal root. Absolute URLs pass through.
    fn resolve(&self, path: &str, query: &Params<'_>) -> Result<Url, ScraperError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| ScraperError::InvalidUrl(format!("{}: {}", path, e)))?;

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn get(&self, path: &str, query: &Params<'_>) -> Result<Response, ScraperError> {
        let url = self.resolve(path, query)?;
        log::debug!("GET {}", url);
        Ok(self
            .client
            .get(url)
            .send()
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))?
            .error_for_status()?)
    }
}

impl Transport for HttpSession {
    fn get_text(&self, path: &str, query: &Params<'_>) -> Result<String, ScraperError> {
        Ok(self
            .get(path, query)?
            .text()
            .inspect_err(|e| log::error!("Decode error: {e:?}"))?)
    }

    fn post_text(
        &self,
        path: &str,
        query: &Params<'_>,
        form: &Params<'_>,
    ) -> Result<String, ScraperError> {
        let url = self.resolve(path, query)?;
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();
        log::debug!("POST {}", url);

        Ok(self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))?
            .error_for_status()?
            .text()
            .inspect_err(|e| log::error!("Decode error: {e:?}"))?)
    }

    fn get_bytes(&self, path: &str, query: &Params<'_>) -> Result<Vec<u8>, ScraperError> {
        Ok(self
            .get(path, query)?
            .bytes()
            .inspect_err(|e| log::error!("Decode error: {e:?}"))?
            .to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> HttpSession {
        HttpSession::new(&ClientConfig::default()).expect("Failed to build session")
    }

    #[test]
    fn test_resolve_relative_path_with_query() {
        let url = session()
            .resolve(
                "usuarioDeclarador.do",
                &[("accion", "verInscripcionPopUp"), ("folioPresentacion", "1204587")],
            )
            .unwrap();

        assert_eq!(
            url.as_str(),
            "https://wlhttp.sec.cl/edeclarador/usuarioDeclarador.do?accion=verInscripcionPopUp&folioPresentacion=1204587"
        );
    }

    #[test]
    fn test_resolve_encodes_non_ascii_values() {
        let url = session()
            .resolve("usuarioDeclarador.do", &[("medio", "ELECTRÓNICO")])
            .unwrap();

        assert_eq!(url.query(), Some("medio=ELECTR%C3%93NICO"));
    }

    #[test]
    fn test_resolve_absolute_url_passes_through() {
        let url = session()
            .resolve("https://example.org/archivo.pdf", &[])
            .unwrap();

        assert_eq!(url.as_str(), "https://example.org/archivo.pdf");
    }

    #[test]
    fn test_resolve_relative_path_starting_with_http() {
        let url = session()
            .resolve("httpDescarga.do?idArchivo=9", &[])
            .unwrap();

        assert_eq!(
            url.as_str(),
            "https://wlhttp.sec.cl/edeclarador/httpDescarga.do?idArchivo=9"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let config = ClientConfig {
            base_url: "not a url".to_string(),
            ..ClientConfig::default()
        };

        assert!(matches!(
            HttpSession::new(&config),
            Err(ScraperError::InvalidUrl(_))
        ));
    }
}
