use crate::client::ScraperError;
use crate::session::Transport;
use crate::types::Filing;

#[derive(Debug, Default)]
pub struct FilingFilter {
    /// Case-insensitive match on the filing kind, e.g. `TE1`.
    pub kind: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl FilingFilter {
    /// Applies the filter lazily so that a limit stops pagination as soon as
    /// enough filings were seen. Errors always pass through.
    pub fn apply<'c, T, I>(
        self,
        filings: I,
    ) -> impl Iterator<Item = Result<Filing<'c, T>, ScraperError>>
    where
        T: Transport + 'c,
        I: Iterator<Item = Result<Filing<'c, T>, ScraperError>>,
    {
        let kind = self.kind.map(|k| k.to_lowercase());
        filings
            .filter(move |result| match (result, &kind) {
                (Ok(filing), Some(kind)) => filing.kind.to_lowercase() == *kind,
                _ => true,
            })
            .skip(self.offset.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
    }

    pub fn validate(self) -> Result<Self, String> {
        if self.offset.is_some_and(|o| o == 0) {
            return Err("Offset must be greater than 0".to_string());
        }
        if self.limit.is_some_and(|l| l == 0) {
            return Err("Limit must be greater than 0".to_string());
        }
        if self.kind.as_deref().is_some_and(|k| k.trim().is_empty()) {
            return Err("Kind must not be empty".to_string());
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{Reply, client};

    fn listing(rows: &[(&str, &str)]) -> Reply {
        let rows: String = rows
            .iter()
            .map(|(folio, kind)| {
                format!(
                    "<tr><td>{}</td><td>01/01/2020</td><td>{}</td><td>ELECTRÓNICO</td><td>PRESENTADA</td><td></td></tr>",
                    folio, kind
                )
            })
            .collect();
        Reply::Html(format!(
            "<table id=\"kakits\"><tr><td>Folio</td></tr>{}</table>",
            rows
        ))
    }

    #[test]
    fn test_limit_stops_pagination() {
        let client = client([
            listing(&[("1", "TE1"), ("2", "TE1")]),
            listing(&[("3", "TE1")]),
        ]);
        let filter = FilingFilter {
            limit: Some(2),
            ..FilingFilter::default()
        };

        let folios: Vec<String> = filter
            .apply(client.filings())
            .map(|f| f.unwrap().folio.to_string())
            .collect();

        assert_eq!(folios, ["1", "2"]);
        assert_eq!(client.transport().requests().len(), 1);
    }

    #[test]
    fn test_kind_and_offset() {
        let client = client([
            listing(&[("1", "TE1"), ("2", "te2"), ("3", "TE2"), ("4", "TE2")]),
            listing(&[]),
        ]);
        let filter = FilingFilter {
            kind: Some("TE2".to_string()),
            offset: Some(1),
            ..FilingFilter::default()
        };

        let folios: Vec<String> = filter
            .apply(client.filings())
            .map(|f| f.unwrap().folio.to_string())
            .collect();

        assert_eq!(folios, ["3", "4"]);
    }

    #[test]
    fn test_validate() {
        assert!(FilingFilter::default().validate().is_ok());
        assert!(
            FilingFilter {
                limit: Some(0),
                ..FilingFilter::default()
            }
            .validate()
            .is_err()
        );
        assert!(
            FilingFilter {
                offset: Some(0),
                ..FilingFilter::default()
            }
            .validate()
            .is_err()
        );
        assert!(
            FilingFilter {
                kind: Some("  ".to_string()),
                ..FilingFilter::default()
            }
            .validate()
            .is_err()
        );
    }
}
