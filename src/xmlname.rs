//! Party-name extraction from downloaded NFS-e XML payloads.
//!
//! Municipal layouts disagree on tag names and namespaces; names show up
//! under `RazaoSocial`, `xNome` or `NomeFantasia`, ideally inside
//! `PrestadorServico`/`TomadorServico` blocks. The extracted names become
//! filename prefixes, shortened to their first two words.

use download_watch::sanitize_component;
use once_cell::sync::Lazy;
use regex::Regex;

static NAME_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(?:\w+:)?(?:RazaoSocial|xNome|NomeFantasia)[^>]*>([^<]+)<")
        .expect("name-tag pattern compiles")
});

static PROVIDER_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:\w+:)?PrestadorServico[^>]*>(.*?)</(?:\w+:)?PrestadorServico>")
        .expect("provider-block pattern compiles")
});

static TAKER_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:\w+:)?TomadorServico[^>]*>(.*?)</(?:\w+:)?TomadorServico>")
        .expect("taker-block pattern compiles")
});

/// Provider (prestador) and taker (tomador) names found in one document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartyNames {
    pub provider: Option<String>,
    pub taker: Option<String>,
}

impl PartyNames {
    /// Prefix to stamp on emitted-note artifacts: provider first.
    pub fn emitted_prefix(&self) -> String {
        self.provider
            .clone()
            .or_else(|| self.taker.clone())
            .unwrap_or_else(|| "NFSE".to_string())
    }

    /// Prefix for received-note artifacts: taker first.
    pub fn received_prefix(&self) -> String {
        self.taker
            .clone()
            .or_else(|| self.provider.clone())
            .unwrap_or_else(|| "NFSE".to_string())
    }
}

fn names_in(fragment: &str) -> Vec<String> {
    NAME_TAGS
        .captures_iter(fragment)
        .map(|captures| captures[1].trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Shorten to the first two words, upper-cased and filesystem-safe.
pub fn shorten_name(name: &str) -> String {
    let upper = name.trim().to_uppercase();
    let short = upper.split_whitespace().take(2).collect::<Vec<_>>().join(" ");
    sanitize_component(&short)
}

/// Pull provider/taker names out of an NFS-e XML payload.
pub fn extract_party_names(xml: &str) -> PartyNames {
    let mut result = PartyNames::default();

    // Generic pass: first name is the provider, the first different name
    // the taker.
    let generic = names_in(xml);
    if let Some(first) = generic.first() {
        result.provider = Some(shorten_name(first));
        result.taker = generic
            .iter()
            .skip(1)
            .find(|name| *name != first)
            .map(|name| shorten_name(name));
    }

    // Block pass wins where the layout is explicit.
    if let Some(block) = PROVIDER_BLOCK.captures(xml) {
        if let Some(name) = names_in(&block[1]).into_iter().next() {
            result.provider = Some(shorten_name(&name));
        }
    }
    if let Some(block) = TAKER_BLOCK.captures(xml) {
        if let Some(name) = names_in(&block[1]).into_iter().next() {
            result.taker = Some(shorten_name(&name));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<CompNfse xmlns="http://www.abrasf.org.br/nfse.xsd">
  <Nfse><InfNfse>
    <PrestadorServico>
      <RazaoSocial>Padaria Estrela do Sul Ltda</RazaoSocial>
      <NomeFantasia>Estrela do Sul</NomeFantasia>
    </PrestadorServico>
    <TomadorServico>
      <RazaoSocial>Mercado Bom Preço EIRELI</RazaoSocial>
    </TomadorServico>
  </InfNfse></Nfse>
</CompNfse>"#;

    #[test]
    fn extracts_provider_and_taker_from_blocks() {
        let names = extract_party_names(SAMPLE);
        assert_eq!(names.provider.as_deref(), Some("PADARIA ESTRELA"));
        assert_eq!(names.taker.as_deref(), Some("MERCADO BOM"));
    }

    #[test]
    fn generic_pass_handles_namespaced_national_layout() {
        let xml = r#"<NFSe xmlns:ns2="http://sped"><ns2:xNome>Oficina Central SA</ns2:xNome>
            <ns2:xNome>Cliente Final ME</ns2:xNome></NFSe>"#;
        let names = extract_party_names(xml);
        assert_eq!(names.provider.as_deref(), Some("OFICINA CENTRAL"));
        assert_eq!(names.taker.as_deref(), Some("CLIENTE FINAL"));
    }

    #[test]
    fn prefix_selection_follows_direction() {
        let names = extract_party_names(SAMPLE);
        assert_eq!(names.emitted_prefix(), "PADARIA ESTRELA");
        assert_eq!(names.received_prefix(), "MERCADO BOM");
    }

    #[test]
    fn missing_names_fall_back_to_generic_prefix() {
        let names = extract_party_names("<Nfse></Nfse>");
        assert_eq!(names.emitted_prefix(), "NFSE");
        assert_eq!(names.received_prefix(), "NFSE");
    }

    #[test]
    fn shorten_caps_at_two_words_and_sanitizes() {
        assert_eq!(shorten_name("Comercial São João / Filial 2"), "COMERCIAL SÃO");
        assert_eq!(shorten_name("único"), "ÚNICO");
    }
}
