/// Value substituted when nothing of the input survives normalization.
pub const FALLBACK_IDENTIFIER: &str = "field";

/// Converts arbitrary column or file names into SQLite-safe identifiers.
///
/// The result only contains `[a-z0-9_]`, never starts or ends with `_` unless a
/// leading digit forced an `_` prefix, and never contains `__`. Normalizing an
/// already normalized identifier returns it unchanged.
pub fn normalize_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_separator = false;

    for character in name.chars().map(fold_latin) {
        if character.is_ascii_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.push(character.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    if out.is_empty() {
        return FALLBACK_IDENTIFIER.to_string();
    }

    if out.starts_with(|character: char| character.is_ascii_digit()) {
        out.insert(0, '_');
    }

    out
}

/// Maps accented Latin letters onto their ASCII base letter so that
/// `Nom_du_Ministère` keeps its `e`. Everything else passes through.
fn fold_latin(character: char) -> char {
    match character {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'A',
        'ç' => 'c',
        'Ç' => 'C',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'È' | 'É' | 'Ê' | 'Ë' => 'E',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'Ì' | 'Í' | 'Î' | 'Ï' => 'I',
        'ñ' => 'n',
        'Ñ' => 'N',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'Ù' | 'Ú' | 'Û' | 'Ü' => 'U',
        'ý' | 'ÿ' => 'y',
        'Ý' => 'Y',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use regex::Regex;

    use super::*;

    #[test]
    fn normalize_identifier_lowercases_and_collapses_separators() {
        assert_eq!(normalize_identifier("Service Name (EN)"), "service_name_en");
        assert_eq!(normalize_identifier("  fiscal--yr  "), "fiscal_yr");
        assert_eq!(normalize_identifier("__owner_org__"), "owner_org");
        assert_eq!(normalize_identifier("Nom du Ministère"), "nom_du_ministere");
    }

    #[test]
    fn normalize_identifier_handles_fallback_and_leading_digit() {
        assert_eq!(normalize_identifier(""), FALLBACK_IDENTIFIER);
        assert_eq!(normalize_identifier("?!--"), FALLBACK_IDENTIFIER);
        assert_eq!(normalize_identifier("2018-2023 inventory"), "_2018_2023_inventory");
    }

    #[test]
    fn normalize_identifier_is_idempotent_and_safe() {
        let pattern = Regex::new(r"^_?[a-z0-9_]+$").unwrap();
        let inputs = [
            "Service ID",
            "service_inventory_2018-2023",
            "\"; DROP TABLE data_sources; --",
            "7 day average",
            "électeurs inscrits",
            "日本語",
            "a__b",
            "_leading",
        ];

        for input in inputs {
            let once = normalize_identifier(input);
            assert!(pattern.is_match(&once), "{input:?} -> {once:?}");
            assert_eq!(normalize_identifier(&once), once, "{input:?}");
        }
    }
}
