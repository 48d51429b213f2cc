use thiserror::Error;

/// Two-digit carrier prefixes currently assigned in Azerbaijan.
pub const VALID_PREFIXES: [&str; 9] = ["10", "12", "50", "51", "55", "60", "70", "77", "99"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("wrong length: {0} digits after cleanup (need 9)")]
    WrongLength(usize),
    #[error("invalid carrier prefix: {0}")]
    InvalidPrefix(String),
    #[error("subscriber number starts with {0}")]
    InvalidSubscriberDigit(char),
}

/// Normalize raw phone text to the canonical 9-digit local form.
///
/// Strips non-digits, the `994` country code and a single domestic `0`
/// trunk prefix, then validates: exactly 9 digits, a known two-digit
/// carrier prefix, and a subscriber number that does not start with `0`
/// or `1`. The subscriber check inspects index 2 of the cleaned string,
/// i.e. the digit right after the carrier prefix.
///
/// Idempotent: feeding a canonical number back in returns it unchanged.
pub fn normalize(raw: &str) -> Result<String, RejectReason> {
    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if let Some(rest) = digits.strip_prefix("994") {
        digits = rest.to_string();
    }
    if let Some(rest) = digits.strip_prefix('0') {
        digits = rest.to_string();
    }

    if digits.len() != 9 {
        return Err(RejectReason::WrongLength(digits.len()));
    }

    let prefix = &digits[..2];
    if !VALID_PREFIXES.contains(&prefix) {
        return Err(RejectReason::InvalidPrefix(prefix.to_string()));
    }

    let subscriber = digits.as_bytes()[2] as char;
    if subscriber == '0' || subscriber == '1' {
        return Err(RejectReason::InvalidSubscriberDigit(subscriber));
    }

    Ok(digits)
}

/// Carrier prefix of an already-canonical number.
pub fn prefix(canonical: &str) -> &str {
    &canonical[..2.min(canonical.len())]
}

// ── Tests ──
