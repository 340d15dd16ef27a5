// File name derivation from document titles.
//
// Names: lowercase, word characters kept, every run of non-word characters
// becomes one `_`, no leading or trailing separator.
// Collisions: `name`, `name_1`, `name_2`, …

/// Separator inserted for runs of non-word characters.
const SEPARATOR: char = '_';

/// Used when a title contains no word characters at all.
pub const FALLBACK_NAME: &str = "untitled";

/// Derive a filesystem-safe file name from a title.
///
/// - Lowercases all characters
/// - Keeps Unicode alphanumerics and `_`
/// - Collapses each run of other characters into a single `_`
/// - Never starts or ends with an inserted `_`
///
/// Returns [`FALLBACK_NAME`] if nothing survives.
pub fn derive_name(title: &str) -> String {
    let mut name = String::with_capacity(title.len());
    let mut pending_separator = false;

    for ch in title.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() || ch == SEPARATOR {
            if pending_separator && !name.is_empty() {
                name.push(SEPARATOR);
            }
            pending_separator = false;
            name.push(ch);
        } else {
            pending_separator = true;
        }
    }

    if name.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        name
    }
}

/// Append a numeric disambiguator. `attempt == 0` returns `base` unchanged.
pub fn disambiguate(base: &str, attempt: usize) -> String {
    if attempt == 0 {
        base.to_string()
    } else {
        format!("{base}{SEPARATOR}{attempt}")
    }
}

/// True if `name` is `base` or `base` with a numeric disambiguator.
///
/// Saving `my_note_1` with the title "My Note" must not rename it, since that
/// name was produced from the same title.
pub fn is_variant_of(name: &str, base: &str) -> bool {
    if name == base {
        return true;
    }
    name.strip_prefix(base)
        .and_then(|rest| rest.strip_prefix(SEPARATOR))
        .is_some_and(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
}
