//! Extraction of form codes and tax years from free text.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Letter prefixes of recognized government form codes.
const FORM_PREFIXES: &[&str] = &["T", "TD", "TL", "RC", "NR", "GST", "CPT", "PD", "RRSP"];

/// Years accepted before and after the current one.
pub const YEARS_BACK: i32 = 10;
pub const YEARS_AHEAD: i32 = 1;

static RE_FORM: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{1,4})(\d{1,5})([A-Z]{0,4})\b").ok());

static RE_YEAR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").ok());

static RE_TAX_YEAR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\btax(?:ation)?\s+years?\s*(?:of\s+)?((?:19|20)\d{2})\b").ok());

/// Uppercase form codes such as `T1`, `T2125`, `RC62` or `T4RSP`.
pub fn extract_forms(text: &str) -> BTreeSet<String> {
    let Some(re) = RE_FORM.as_ref() else {
        return BTreeSet::new();
    };

    re.captures_iter(text)
        .filter(|caps| {
            caps.get(1)
                .is_some_and(|prefix| FORM_PREFIXES.contains(&prefix.as_str()))
        })
        .filter_map(|caps| caps.get(0).map(|m| m.as_str().to_string()))
        .collect()
}

/// Four-digit years within `current_year - 10 ..= current_year + 1`.
pub fn extract_years(text: &str, current_year: i32) -> BTreeSet<i32> {
    let Some(re) = RE_YEAR.as_ref() else {
        return BTreeSet::new();
    };

    re.captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<i32>().ok())
        .filter(|year| in_window(*year, current_year))
        .collect()
}

/// The year a passage is about: an explicit "tax year NNNN" wins, otherwise
/// the first recent bare year.
pub fn extract_tax_year(text: &str, current_year: i32) -> Option<i32> {
    let explicit = RE_TAX_YEAR.as_ref().and_then(|re| {
        re.captures_iter(text)
            .filter_map(|caps| caps.get(1)?.as_str().parse::<i32>().ok())
            .find(|year| in_window(*year, current_year))
    });

    explicit.or_else(|| {
        RE_YEAR.as_ref().and_then(|re| {
            re.captures_iter(text)
                .filter_map(|caps| caps.get(1)?.as_str().parse::<i32>().ok())
                .find(|year| in_window(*year, current_year))
        })
    })
}

fn in_window(year: i32, current_year: i32) -> bool {
    (current_year - YEARS_BACK..=current_year + YEARS_AHEAD).contains(&year)
}
