//! Checksum validators for Brazilian identifiers
//!
//! These are pure `&str -> bool` functions handed to the [`Validator`]
//! rather than called directly, so callers can swap them out.
//!
//! [`Validator`]: super::Validator

/// Person tax ID (CPF): eleven digits with two weighted modulo-11 check
/// digits. Punctuation is ignored.
pub fn is_valid_cpf(raw: &str) -> bool {
    let digits: Vec<u32> = raw.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 11 {
        return false;
    }
    if digits.iter().all(|d| *d == digits[0]) {
        return false;
    }

    check_digit(&digits[..9]) == digits[9] && check_digit(&digits[..10]) == digits[10]
}

/// Weights run from `len + 1` down to 2
fn check_digit(digits: &[u32]) -> u32 {
    let weight_start = digits.len() as u32 + 1;
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| d * (weight_start - i as u32))
        .sum();
    match 11 - (sum % 11) {
        d if d > 9 => 0,
        d => d,
    }
}
