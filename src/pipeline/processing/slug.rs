use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s-]").expect("static regex"));
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
static HYPHEN_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"-{2,}").expect("static regex"));

/// Derive the identity token used for dedup comparison and `categorySlug`.
///
/// Lossy and deterministic: diacritics are folded away (`Café` → `cafe`), anything
/// outside `[a-z0-9]`, hyphen and whitespace is dropped, whitespace runs become a
/// single hyphen and the result is trimmed of hyphens. An empty result means the
/// text has no stable identity.
pub fn slugify(text: &str) -> String {
    let folded: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();

    let kept = DISALLOWED.replace_all(&folded, "");
    let hyphenated = WHITESPACE_RUN.replace_all(kept.trim(), "-");
    let collapsed = HYPHEN_RUN.replace_all(&hyphenated, "-");
    collapsed.trim_matches('-').to_string()
}

/// Slug of `text`, or `None` when it has no stable identity.
pub fn identity_of(text: &str) -> Option<String> {
    let slug = slugify(text);
    if slug.is_empty() {
        None
    } else {
        Some(slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_and_diacritics_fold_to_same_slug() {
        assert_eq!(slugify("Café Tacuba"), slugify("CAFE TACUBA"));
        assert_eq!(slugify("Café Tacuba"), "cafe-tacuba");
        assert_eq!(slugify("Peluquería Ñandú"), "peluqueria-nandu");
    }

    #[test]
    fn whitespace_runs_collapse_and_edges_trim() {
        assert_eq!(slugify("  Pando  3ra  Etapa "), "pando-3ra-etapa");
        assert_eq!(slugify("\tLa\nEsquina "), "la-esquina");
    }

    #[test]
    fn repeated_hyphens_collapse() {
        assert_eq!(slugify("Pollos -- a la -- Brasa"), "pollos-a-la-brasa");
        assert_eq!(slugify("--Taller--"), "taller");
    }

    #[test]
    fn symbols_are_removed() {
        assert_eq!(slugify("Dr. Pérez & Hijos!"), "dr-perez-hijos");
        assert_eq!(slugify("Mamá's Kitchen"), "mamas-kitchen");
    }

    #[test]
    fn empty_or_symbolic_input_has_no_identity() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("   "), "");
        assert_eq!(slugify("★ ☆ !!"), "");
        assert_eq!(identity_of("¿?"), None);
        assert_eq!(identity_of("Bodega 24"), Some("bodega-24".to_string()));
    }

    #[test]
    fn slugify_is_idempotent() {
        for input in ["Café Lima", "  Pando  3ra  Etapa ", "A--B", "Ñ"] {
            let once = slugify(input);
            assert_eq!(slugify(&once), once);
        }
    }
}
