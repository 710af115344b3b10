//! Accent-insensitive text matching for pt-BR portal labels.

/// Lower-case and strip the accents that appear in Brazilian portal copy,
/// so "Março" matches "marco" and "RELATÓRIO" matches "relatorio".
pub fn fold_pt(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' | 'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'a',
            'é' | 'è' | 'ê' | 'É' | 'È' | 'Ê' => 'e',
            'í' | 'ì' | 'î' | 'Í' | 'Ì' | 'Î' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => 'u',
            'ç' | 'Ç' => 'c',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

/// Accent- and case-insensitive containment test.
pub fn contains_folded(haystack: &str, needle: &str) -> bool {
    fold_pt(haystack).contains(&fold_pt(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_portuguese_accents() {
        assert_eq!(fold_pt("Março"), "marco");
        assert_eq!(fold_pt("GERAR RELATÓRIO"), "gerar relatorio");
        assert_eq!(fold_pt("Emissão"), "emissao");
    }

    #[test]
    fn containment_ignores_case_and_accents() {
        assert!(contains_folded("Exportar Notas para Arquivo", "EXPORTAR notas"));
        assert!(contains_folded("setembro", "Setembro"));
        assert!(!contains_folded("janeiro", "fevereiro"));
    }
}
