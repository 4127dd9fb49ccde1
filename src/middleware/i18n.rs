// src/middleware/i18n.rs

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

pub const DEFAULT_LANGUAGE: &str = "en";

// Idioma preferido do cliente, lido do Accept-Language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale(pub String);

impl Locale {
    fn from_header(header_str: &str) -> Option<Self> {
        accept_language::parse(header_str)
            .first()
            // "pt-BR" -> "pt"
            .and_then(|tag| tag.split('-').next())
            .filter(|lang| !lang.is_empty())
            .map(|lang| Locale(lang.to_ascii_lowercase()))
    }
}

impl<S> FromRequestParts<S> for Locale
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let lang = parts
            .headers
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|header_value| header_value.to_str().ok())
            .and_then(Locale::from_header)
            .unwrap_or_else(|| Locale(DEFAULT_LANGUAGE.to_string()));

        Ok(lang)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_highest_quality_primary_tag() {
        assert_eq!(
            Locale::from_header("pt-BR,pt;q=0.9,en;q=0.5"),
            Some(Locale("pt".into()))
        );
        assert_eq!(Locale::from_header("en;q=0.4, fr-CA"), Some(Locale("fr".into())));
        assert_eq!(Locale::from_header(""), None);
    }
}
