//! Text normalization shared by catalog resolution and intent classification.

/// Lowercases and removes all whitespace so that matching is case- and
/// spacing-insensitive ("NP 01" and "np01" compare equal).
pub fn normalize_key(text: &str) -> String {
    text.chars().filter(|character| !character.is_whitespace()).flat_map(char::to_lowercase).collect()
}

/// Maps Thai digits (๐-๙) onto ASCII digits, leaving everything else untouched.
pub fn ascii_digits(text: &str) -> String {
    text.chars()
        .map(|character| match character {
            '\u{0E50}'..='\u{0E59}' => {
                char::from_digit(character as u32 - 0x0E50, 10).unwrap_or(character)
            }
            other => other,
        })
        .collect()
}

/// Splits a spreadsheet cell such as `"a, b ,c"` into trimmed, non-empty parts.
pub fn split_list(cell: &str) -> Vec<String> {
    cell.split(',').map(str::trim).filter(|part| !part.is_empty()).map(str::to_string).collect()
}

pub fn format_amount(amount: u64) -> String {
    let digits = amount.to_string();
    let mut output = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            output.push(',');
        }
        output.push(digit);
    }
    output
}
