// Fixed-point money handling.
// All arithmetic in the pipeline runs over integer centavos (i64); decimal
// strings with exactly two fraction digits are the edge representation.
// Binary floating point never touches a comparison.

/// Amounts in centavos. $1.234,56 is stored as 123456.
pub type Centavos = i64;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MoneyError {
    #[error("cadena decimal inválida: {0:?}")]
    InvalidDecimal(String),
}

/// Parse a normalized decimal string ("1234.56", "-50", "0.5") into centavos.
///
/// Accepts an optional sign, an integer part, and up to two fraction digits
/// after a dot. This is the strict parser for values that are already in
/// ledger form; use [`parse_amount`] for raw receipt tokens.
pub fn parse_decimal(s: &str) -> Result<Centavos, MoneyError> {
    let s = s.trim();
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(MoneyError::InvalidDecimal(s.to_string()));
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
        || frac_part.len() > 2
    {
        return Err(MoneyError::InvalidDecimal(s.to_string()));
    }

    let int_val: i64 = if int_part.is_empty() {
        0
    } else {
        int_part
            .parse()
            .map_err(|_| MoneyError::InvalidDecimal(s.to_string()))?
    };

    let frac_val: i64 = match frac_part.len() {
        0 => 0,
        1 => frac_part.parse::<i64>().unwrap_or(0) * 10,
        _ => frac_part.parse::<i64>().unwrap_or(0),
    };

    let cents = int_val
        .checked_mul(100)
        .and_then(|v| v.checked_add(frac_val))
        .ok_or_else(|| MoneyError::InvalidDecimal(s.to_string()))?;

    Ok(if neg { -cents } else { cents })
}

/// Format centavos as a sign-preserving decimal string with two fraction
/// digits. Inverse of [`parse_decimal`] for every valid 2-digit input.
pub fn format_centavos(cents: Centavos) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Parse a raw numeric token from receipt text, accepting both Argentine
/// ("1.234,56") and anglo ("1,234.56") conventions.
///
/// The rightmost of '.' and ',' is taken as the decimal separator; the other
/// one is a thousands separator and is dropped. A token with a single
/// separator treats it as the decimal point.
///
/// Returns `None` for tokens that are not a plausible amount.
pub fn parse_amount(raw: &str) -> Option<Centavos> {
    let s = raw.trim();
    let (neg, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if s.is_empty() {
        return None;
    }

    let last_dot = s.rfind('.');
    let last_comma = s.rfind(',');

    let dec_pos = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(d.max(c)),
        (Some(d), None) => Some(d),
        (None, Some(c)) => Some(c),
        (None, None) => None,
    };

    let (int_raw, frac_raw) = match dec_pos {
        Some(p) => (&s[..p], &s[p + 1..]),
        None => (s, ""),
    };

    // Thousands separators drop out of the integer part; anything else
    // left over means this token is not a number.
    let int_digits: String = int_raw
        .chars()
        .filter(|c| !matches!(c, '.' | ','))
        .collect();
    if !int_digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !frac_raw.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if int_digits.is_empty() && frac_raw.is_empty() {
        return None;
    }

    let int_val: i64 = if int_digits.is_empty() {
        0
    } else {
        int_digits.parse().ok()?
    };

    // Scale the fraction to two digits, rounding half-up on the third.
    let frac_val: i64 = match frac_raw.len() {
        0 => 0,
        1 => frac_raw.parse::<i64>().ok()? * 10,
        2 => frac_raw.parse::<i64>().ok()?,
        _ => {
            let head: i64 = frac_raw[..2].parse().ok()?;
            let next = frac_raw.as_bytes()[2] - b'0';
            head + if next >= 5 { 1 } else { 0 }
        }
    };

    let cents = int_val.checked_mul(100)?.checked_add(frac_val)?;
    Some(if neg { -cents } else { cents })
}
