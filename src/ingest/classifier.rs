//! Keyword-based transaction type classification

use bigdecimal::{BigDecimal, Zero};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::traits::TransactionClassifier;
use crate::types::TransactionType;

static CHECK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    // Bare "ck" is too common in bank shorthand; it needs a number marker
    Regex::new(r"(?i)\b(?:check|chk|cheque|ck\s*(?:no\.?|#))\s*(?:no\.?|#)?\s*(\d{3,})\b")
        .expect("check pattern is a valid regex")
});

const FEE_KEYWORDS: &[&str] = &[
    "fee",
    "service charge",
    "overdraft",
    "nsf",
    "maintenance charge",
    "finance charge",
];

const TRANSFER_KEYWORDS: &[&str] = &["transfer", "xfer", "trnsfr"];

/// Default classifier driven by description keywords and amount sign
///
/// Precedence: a recognized type hint, then a check number pattern, then
/// fee keywords, then transfer keywords, then the amount sign.
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier {
    extra_fee_keywords: Vec<String>,
}

impl KeywordClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add bank-specific phrases that should classify as a fee
    pub fn with_fee_keywords<I, K>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.extra_fee_keywords
            .extend(keywords.into_iter().map(|k| k.into().to_lowercase()));
        self
    }

    fn is_fee(&self, description: &str) -> bool {
        FEE_KEYWORDS.iter().any(|k| contains_word(description, k))
            || self
                .extra_fee_keywords
                .iter()
                .any(|k| contains_word(description, k))
    }
}

/// Whole-word containment, so "coffee" does not read as a fee
fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

impl TransactionClassifier for KeywordClassifier {
    fn classify(
        &self,
        description: &str,
        amount: &BigDecimal,
        raw_type: Option<&str>,
    ) -> (TransactionType, Option<String>) {
        let check_number = CHECK_PATTERN
            .captures(description)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());

        if let Some(hinted) = raw_type.and_then(TransactionType::from_hint) {
            return (hinted, check_number);
        }

        if check_number.is_some() {
            return (TransactionType::Check, check_number);
        }

        let lowered = description.to_lowercase();
        if self.is_fee(&lowered) {
            return (TransactionType::Fee, None);
        }
        if TRANSFER_KEYWORDS.iter().any(|k| contains_word(&lowered, k)) {
            return (TransactionType::Transfer, None);
        }

        let kind = if *amount > BigDecimal::zero() {
            TransactionType::Deposit
        } else if *amount < BigDecimal::zero() {
            TransactionType::Withdrawal
        } else {
            TransactionType::Other
        };
        (kind, None)
    }
}
