use once_cell::sync::Lazy;
use regex::Regex;

static SES_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^SES[\-\s./]*").expect("SES prefix pattern is valid"));

/// Map a raw region string such as `"SES-PR"` to its two-letter UF code.
///
/// The issuing-authority prefix `SES` (with any run of `-`, whitespace, `.`
/// or `/` after it) is removed first. If what is left ends in two ASCII
/// capital letters those are the code; otherwise the first two characters
/// are used. Blank input, or input that is nothing but the prefix, yields
/// `None`.
pub fn normalize_sigla(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }

    let upper = raw.to_uppercase();
    let rest = SES_PREFIX.replace(&upper, "");
    if rest.is_empty() {
        return None;
    }

    let tail: Vec<char> = rest.chars().rev().take(2).collect();
    if tail.len() == 2 && tail.iter().all(|c| c.is_ascii_uppercase()) {
        return Some(tail.iter().rev().collect());
    }

    Some(rest.chars().take(2).collect())
}
