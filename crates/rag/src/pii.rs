//! PII redaction applied to user text before it is logged, cached or sent
//! to any provider.
//!
//! Detectors run in a fixed order over the progressively redacted text.
//! Each detector is a pattern plus an optional validator; a match that
//! fails validation is left untouched.

use regex::{Captures, Regex};
use serde::Serialize;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiType {
    Email,
    PaymentCard,
    Sin,
    BankAccount,
    Phone,
    PostalCode,
    StreetAddress,
}

impl PiiType {
    pub fn placeholder(&self) -> &'static str {
        match self {
            PiiType::Email => "[EMAIL_REDACTED]",
            PiiType::PaymentCard => "[CARD_REDACTED]",
            PiiType::Sin => "[SIN_REDACTED]",
            PiiType::BankAccount => "[ACCOUNT_REDACTED]",
            PiiType::Phone => "[PHONE_REDACTED]",
            PiiType::PostalCode => "[POSTAL_CODE_REDACTED]",
            PiiType::StreetAddress => "[ADDRESS_REDACTED]",
        }
    }
}

/// Result of a redaction pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redaction {
    pub text: String,
    pub had_pii: bool,
    /// Types that actually fired, in detector order
    pub detected_types: Vec<PiiType>,
}

struct Detector {
    kind: PiiType,
    regex: &'static LazyLock<Option<Regex>>,
    /// Receives the sensitive value (capture group 1 if present, else the
    /// whole match)
    validate: Option<fn(&str) -> bool>,
}

macro_rules! pii_pattern {
    ($name:ident, $regex_str:expr) => {
        static $name: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new($regex_str).ok());
    };
}

pii_pattern!(RE_EMAIL, r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}");

pii_pattern!(
    RE_CARD,
    r"\b(?:\d{4} \d{4} \d{4} \d{1,7}|\d{4}-\d{4}-\d{4}-\d{1,7}|\d{4} \d{6} \d{4,5}|\d{4}-\d{6}-\d{4,5}|\d{13,19})\b"
);

pii_pattern!(RE_SIN, r"\b\d{3}[ \-]?\d{3}[ \-]?\d{3}\b");

pii_pattern!(
    RE_BANK_ACCOUNT,
    r"(?i)\b(?:bank\s+)?(?:account|acct|a/c)\s*(?:number|no\.?|num|#)?\s*[:#]?\s*(\d[\d\- ]{4,15}\d)\b"
);

pii_pattern!(
    RE_PHONE,
    r"(?:\+?1[\-.\s]?)?(?:\(\d{3}\)|\b\d{3})[\-.\s]?\d{3}[\-.\s]\d{4}\b"
);

pii_pattern!(
    RE_POSTAL_CODE,
    r"(?i)\b[ABCEGHJ-NPRSTVXY]\d[ABCEGHJ-NPRSTV-Z][ \-]?\d[ABCEGHJ-NPRSTV-Z]\d\b"
);

pii_pattern!(
    RE_STREET_ADDRESS,
    r"\b\d{1,6}\s+(?:[A-Z][a-zA-Z'\-]*\s+){1,4}(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Drive|Dr|Lane|Ln|Court|Ct|Crescent|Cres|Way|Place|Pl|Terrace|Circle|Trail|Parkway)\b\.?"
);

static DETECTORS: &[Detector] = &[
    Detector {
        kind: PiiType::Email,
        regex: &RE_EMAIL,
        validate: None,
    },
    Detector {
        kind: PiiType::PaymentCard,
        regex: &RE_CARD,
        validate: Some(valid_card),
    },
    Detector {
        kind: PiiType::Sin,
        regex: &RE_SIN,
        validate: Some(valid_sin),
    },
    Detector {
        kind: PiiType::BankAccount,
        regex: &RE_BANK_ACCOUNT,
        validate: None,
    },
    Detector {
        kind: PiiType::Phone,
        regex: &RE_PHONE,
        validate: None,
    },
    Detector {
        kind: PiiType::PostalCode,
        regex: &RE_POSTAL_CODE,
        validate: None,
    },
    Detector {
        kind: PiiType::StreetAddress,
        regex: &RE_STREET_ADDRESS,
        validate: None,
    },
];

/// Replace every validated PII match with its placeholder.
pub fn redact(text: &str) -> Redaction {
    let mut current = text.to_string();
    let mut detected_types = Vec::new();

    for detector in DETECTORS {
        let Some(re) = detector.regex.as_ref() else {
            continue;
        };

        let mut fired = false;
        let replaced = re.replace_all(&current, |caps: &Captures| {
            replace_match(caps, detector, &mut fired)
        });

        if fired {
            current = replaced.into_owned();
            detected_types.push(detector.kind);
        }
    }

    Redaction {
        had_pii: !detected_types.is_empty(),
        text: current,
        detected_types,
    }
}

fn replace_match(caps: &Captures, detector: &Detector, fired: &mut bool) -> String {
    let Some(whole) = caps.get(0) else {
        return String::new();
    };
    let value = caps.get(1).unwrap_or(whole);

    if let Some(validate) = detector.validate {
        if !validate(value.as_str()) {
            return whole.as_str().to_string();
        }
    }

    *fired = true;

    // Keep any label text around the sensitive value
    let start = value.start() - whole.start();
    let end = value.end() - whole.start();
    let whole = whole.as_str();
    format!(
        "{}{}{}",
        &whole[..start],
        detector.kind.placeholder(),
        &whole[end..]
    )
}

fn digits(value: &str) -> Vec<u32> {
    value.chars().filter_map(|c| c.to_digit(10)).collect()
}

/// Card numbers are 13 to 19 digits and pass the Luhn check.
fn valid_card(value: &str) -> bool {
    let digits = digits(value);
    (13..=19).contains(&digits.len()) && luhn(&digits)
}

/// Nine digits passing the Luhn check.
pub fn valid_sin(value: &str) -> bool {
    let digits = digits(value);
    digits.len() == 9 && luhn(&digits)
}

/// Weighted sum from the rightmost digit (every second digit doubled,
/// minus 9 when above 9) is a multiple of 10.
fn luhn(digits: &[u32]) -> bool {
    let total: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                *d
            }
        })
        .sum();

    total % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_sin_checksum() {
        assert!(valid_sin("046 454 286"));
        assert!(valid_sin("046-454-286"));
        assert!(!valid_sin("046 454 287"));
        assert!(!valid_sin("12345678"));
    }

    #[test]
    fn test_redacts_valid_sin() {
        let r = redact("My SIN is 046 454 286, what now?");
        assert_eq!(r.text, "My SIN is [SIN_REDACTED], what now?");
        assert!(r.had_pii);
        assert_eq!(r.detected_types, vec![PiiType::Sin]);
    }

    #[test]
    fn test_invalid_sin_left_alone() {
        let r = redact("Reference 123 456 789 on the notice");
        assert!(!r.detected_types.contains(&PiiType::Sin));
        assert!(r.text.contains("123 456 789"));
    }

    #[test]
    fn test_redacts_email_and_phone() {
        let r = redact("Reach me at jane.doe@example.com or (416) 555-0199.");
        assert_eq!(
            r.text,
            "Reach me at [EMAIL_REDACTED] or [PHONE_REDACTED]."
        );
        assert_eq!(r.detected_types, vec![PiiType::Email, PiiType::Phone]);
    }

    #[test]
    fn test_redacts_card() {
        let r = redact("Card 4111 1111 1111 1111 was charged");
        assert_eq!(r.text, "Card [CARD_REDACTED] was charged");
        assert_eq!(r.detected_types, vec![PiiType::PaymentCard]);
    }

    #[test]
    fn test_redacts_contiguous_and_amex_cards() {
        let r = redact("numbers 5555555555554444 and 3782 822463 10005");
        assert_eq!(r.text, "numbers [CARD_REDACTED] and [CARD_REDACTED]");
    }

    #[test]
    fn test_year_list_is_not_a_card() {
        let text = "What were the RRSP limits for 2021 2022 2023 2024?";
        let r = redact(text);
        assert_eq!(r.text, text);
        assert!(!r.had_pii);
    }

    #[test]
    fn test_mixed_separators_are_not_a_card() {
        let text = "Compare 4111 1111-1111 1111 with last year";
        assert_eq!(redact(text).text, text);
    }

    #[test]
    fn test_bank_account_keeps_label() {
        let r = redact("deposit to account number 0012345678 please");
        assert_eq!(r.text, "deposit to account number [ACCOUNT_REDACTED] please");
    }

    #[test]
    fn test_postal_code_and_address() {
        let r = redact("I live at 221 Maple Leaf Drive, Toronto ON M5V 2T6");
        assert!(r.text.contains("[ADDRESS_REDACTED]"));
        assert!(r.text.contains("[POSTAL_CODE_REDACTED]"));
        assert!(!r.text.contains("M5V"));
    }

    #[test]
    fn test_clean_text_unchanged() {
        let text = "What is the 2024 RRSP deduction limit for line 20800?";
        let r = redact(text);
        assert_eq!(r.text, text);
        assert!(!r.had_pii);
        assert!(r.detected_types.is_empty());
    }
}
