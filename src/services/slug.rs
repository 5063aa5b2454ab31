//! URL slugs
//!
//! French titles are folded to ASCII (`Été à Noël` becomes `ete-a-noel`).
//! Collisions are resolved by the caller walking [`candidates`].

/// Longest base slug kept before suffixing
const MAX_BASE_LEN: usize = 240;

/// Turn a title or name into a lowercase, hyphen-separated ASCII slug.
///
/// May return an empty string when nothing sluggable is left.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        let folded = match c {
            'a'..='z' | '0'..='9' => None,
            _ => match fold(c) {
                Some(ascii) => Some(ascii),
                None => {
                    if !c.is_alphanumeric() {
                        pending_hyphen = true;
                    }
                    continue;
                }
            },
        };

        if pending_hyphen && !slug.is_empty() {
            slug.push('-');
        }
        pending_hyphen = false;
        match folded {
            Some(ascii) => slug.push_str(ascii),
            None => slug.push(c),
        }
    }

    if slug.len() > MAX_BASE_LEN {
        slug.truncate(MAX_BASE_LEN);
        let trimmed = slug.trim_end_matches('-').len();
        slug.truncate(trimmed);
    }
    slug
}

/// [`slugify`] with a fallback for titles that slug to nothing
pub fn slugify_or(text: &str, fallback: &str) -> String {
    let slug = slugify(text);
    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug
    }
}

/// `base`, then `base-2`, `base-3`, ... without end
pub fn candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(base.to_string()).chain((2u64..).map(move |n| format!("{}-{}", base, n)))
}

fn fold(c: char) -> Option<&'static str> {
    let ascii = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'æ' => "ae",
        'ç' => "c",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => "o",
        'œ' => "oe",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'ý' | 'ÿ' => "y",
        'ß' => "ss",
        _ => return None,
    };
    Some(ascii)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_slugify_french_titles() {
        assert_eq!(slugify("Été à Noël"), "ete-a-noel");
        assert_eq!(slugify("L'œuvre de Molière"), "l-oeuvre-de-moliere");
        assert_eq!(slugify("  Ça marche !  "), "ca-marche");
        assert_eq!(slugify("Rust 2026 -- édition"), "rust-2026-edition");
    }

    #[test]
    fn test_slugify_drops_unknown_scripts() {
        assert_eq!(slugify("日本"), "");
        assert_eq!(slugify_or("日本", "article"), "article");
        assert_eq!(slugify("Café 東京 bar"), "cafe-bar");
    }

    #[test]
    fn test_candidates() {
        let first: Vec<_> = candidates("bonjour").take(3).collect();
        assert_eq!(first, vec!["bonjour", "bonjour-2", "bonjour-3"]);
    }

    #[test]
    fn test_long_titles_are_truncated() {
        let slug = slugify(&"mot ".repeat(200));
        assert!(slug.len() <= MAX_BASE_LEN);
        assert!(!slug.ends_with('-'));
    }

    proptest! {
        #[test]
        fn slugs_are_url_safe(text in "\\PC{0,80}") {
            let slug = slugify(&text);
            prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
        }
    }
}
