//! Stable identity derivation for categories and members
//!
//! Slugs are lowercase ASCII with non-alphanumeric runs collapsed to single
//! hyphens. Polish and common Latin diacritics fold to their base letters;
//! any other non-ASCII character acts as a separator. Member ids combine the
//! slug of the file name with a truncated MD5 of the relative path, so they
//! survive rescans and do not depend on file content.

use md5::{Digest, Md5};

const MAX_SLUG_LEN: usize = 80;

/// Fold a lowercase character to its ASCII base letter where we know one
fn fold(ch: char) -> char {
    match ch {
        'ą' => 'a',
        'ć' => 'c',
        'ę' => 'e',
        'ł' => 'l',
        'ń' => 'n',
        'ó' => 'o',
        'ś' => 's',
        'ź' | 'ż' => 'z',
        'á' | 'à' | 'â' | 'ä' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        'ç' => 'c',
        'ñ' => 'n',
        'ß' => 's',
        other => other,
    }
}

/// Normalize a display name into a stable slug.
///
/// Never returns an empty string; names that normalize to nothing become
/// `"item"`. Output is capped at 80 characters.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_separator = false;

    for ch in name.trim().chars().flat_map(char::to_lowercase) {
        let ch = fold(ch);
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(ch);
        } else {
            pending_separator = true;
        }
    }

    if slug.is_empty() {
        return "item".to_string();
    }
    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// Last path segment of a relative path, tolerating both separators
pub fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Lowercased extension of a file name, including the leading dot
pub fn extension(file_name: &str) -> String {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => file_name[idx..].to_lowercase(),
        _ => String::new(),
    }
}

/// Stable member id: `slugify(basename) + "-" + first 10 hex of MD5(rel path)`.
///
/// One id per (category, relative-path) pair, independent of rescans and of
/// file content.
pub fn member_id(rel_path: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(rel_path.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}-{}", slugify(base_name(rel_path)), &digest[..10])
}

/// First 4 bytes of MD5 as a big-endian integer, used to seed the
/// deterministic price offset
pub fn md5_seed(key: &str) -> u32 {
    let mut hasher = Md5::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_polish_diacritics() {
        assert_eq!(slugify("Laminacja brwi"), "laminacja-brwi");
        assert_eq!(slugify("Makijaż permanentny (PMU)"), "makijaz-permanentny-pmu");
        assert_eq!(slugify("Zgoda na zabieg — uniwersalny wzór"), "zgoda-na-zabieg-uniwersalny-wzor");
    }

    #[test]
    fn test_slugify_collapses_runs_and_trims() {
        assert_eq!(slugify("  A -- b  "), "a-b");
        assert_eq!(slugify("a...b"), "a-b");
        assert_eq!(slugify("-a-"), "a");
    }

    #[test]
    fn test_slugify_empty_falls_back() {
        assert_eq!(slugify(""), "item");
        assert_eq!(slugify("___"), "item");
        assert_eq!(slugify("żźć"), "zzc");
    }

    #[test]
    fn test_slugify_caps_length() {
        let long = "x".repeat(300);
        assert_eq!(slugify(&long).len(), 80);
    }

    #[test]
    fn test_member_id_stable() {
        // md5("Zgoda na zabieg.pdf") = f091cebfb2...
        assert_eq!(member_id("Zgoda na zabieg.pdf"), "zgoda-na-zabieg-pdf-f091cebfb2");
        // md5("docs/wywiad.pdf") = 14941b5873...
        assert_eq!(member_id("docs/wywiad.pdf"), "wywiad-pdf-14941b5873");
    }

    #[test]
    fn test_member_id_distinguishes_paths_with_same_name() {
        let a = member_id("a/zgoda.pdf");
        let b = member_id("b/zgoda.pdf");
        assert_ne!(a, b);
        assert!(a.starts_with("zgoda-pdf-"));
        assert!(b.starts_with("zgoda-pdf-"));
    }

    #[test]
    fn test_base_name_and_extension() {
        assert_eq!(base_name("a/b/c.PDF"), "c.PDF");
        assert_eq!(base_name("a\\b\\c.pdf"), "c.pdf");
        assert_eq!(extension("c.PDF"), ".pdf");
        assert_eq!(extension("noext"), "");
        assert_eq!(extension(".hidden"), "");
    }
}
