// src/cep.rs
//! Brazilian postal codes (CEP) and the lookup providers raced by default.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::race::types::Source;

pub const DEFAULT_CEP: &str = "17128072";

/// Placeholder substituted in provider URL templates.
pub const CEP_PLACEHOLDER: &str = "{cep}";

/// Built-in providers: (name, URL template).
pub const DEFAULT_PROVIDERS: [(&str, &str); 2] = [
    ("brasilapi", "https://brasilapi.com.br/api/cep/v1/{cep}"),
    ("viacep", "http://viacep.com.br/ws/{cep}/json/"),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CepError {
    #[error("CEP `{0}` must have exactly 8 digits")]
    Length(String),
    #[error("CEP `{0}` contains characters other than digits and a single hyphen")]
    Charset(String),
}

/// An 8-digit CEP, stored without punctuation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cep(String);

impl Cep {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `17128-072` style rendering.
    pub fn formatted(&self) -> String {
        format!("{}-{}", &self.0[..5], &self.0[5..])
    }
}

impl FromStr for Cep {
    type Err = CepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let hyphens = raw.matches('-').count();
        // Only the canonical 5-3 hyphen position is accepted.
        if hyphens > 1 || (hyphens == 1 && raw.find('-') != Some(5)) {
            return Err(CepError::Charset(raw.to_string()));
        }
        let digits: String = raw.chars().filter(|c| *c != '-').collect();
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(CepError::Charset(raw.to_string()));
        }
        if digits.len() != 8 {
            return Err(CepError::Length(raw.to_string()));
        }
        Ok(Cep(digits))
    }
}

impl fmt::Display for Cep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named URL template such as `http://viacep.com.br/ws/{cep}/json/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTemplate {
    pub name: String,
    pub url: String,
}

impl ProviderTemplate {
    pub fn render(&self, cep: &Cep) -> Source {
        Source::named(self.name.clone(), self.url.replace(CEP_PLACEHOLDER, cep.as_str()))
    }
}

pub fn default_providers() -> Vec<ProviderTemplate> {
    DEFAULT_PROVIDERS
        .iter()
        .map(|(name, url)| ProviderTemplate {
            name: (*name).to_string(),
            url: (*url).to_string(),
        })
        .collect()
}

/// Build the race sources for `cep`, one per template.
pub fn sources_for(cep: &Cep, templates: &[ProviderTemplate]) -> Vec<Source> {
    templates.iter().map(|t| t.render(cep)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_hyphenated() {
        let a: Cep = "17128072".parse().unwrap();
        let b: Cep = " 17128-072 ".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.formatted(), "17128-072");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!("1712807".parse::<Cep>(), Err(CepError::Length(_))));
        assert!(matches!("1712807a".parse::<Cep>(), Err(CepError::Charset(_))));
        assert!(matches!("171-28072".parse::<Cep>(), Err(CepError::Charset(_))));
        assert!(matches!("17128--072".parse::<Cep>(), Err(CepError::Charset(_))));
    }

    #[test]
    fn default_sources_match_known_endpoints() {
        let cep: Cep = DEFAULT_CEP.parse().unwrap();
        let srcs = sources_for(&cep, &default_providers());
        assert_eq!(
            srcs,
            vec![
                Source::named("brasilapi", "https://brasilapi.com.br/api/cep/v1/17128072"),
                Source::named("viacep", "http://viacep.com.br/ws/17128072/json/"),
            ]
        );
    }
}
