//! Text helpers shared by the POS cart parser and the import pipeline.

use crate::error::{AppError, AppResult};

/// Normalize a name for duplicate detection: lowercase, trim, strip
/// diacritics, collapse internal whitespace. Equality of normalized forms is
/// the only notion of equality the import pipeline uses.
pub fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;
    for ch in input.trim().chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        for lower in ch.to_lowercase() {
            out.push(fold_diacritic(lower));
        }
    }
    out
}

fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'ã' | 'å' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        other => other,
    }
}

/// A free-text POS cart entry parsed into its parts.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEntry {
    pub quantity: i32,
    pub name: String,
    pub price: i64,
}

/// Parse a free-text cart line like `"2 coca cola 2500"`.
///
/// Tokenizes on whitespace: an optional leading integer is the quantity
/// (default 1), the trailing numeric token is the price (required), and the
/// middle tokens joined form the name. Fails with `UnparsableText` when no
/// trailing numeric token or no name remains.
pub fn parse_manual_entry(text: &str) -> AppResult<ParsedEntry> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() < 2 {
        return Err(AppError::UnparsableText(format!(
            "expected at least a name and a price in '{text}'"
        )));
    }

    let price = parse_price(tokens[tokens.len() - 1]).ok_or_else(|| {
        AppError::UnparsableText(format!("no trailing price found in '{text}'"))
    })?;

    let mut name_tokens = &tokens[..tokens.len() - 1];
    let mut quantity = 1_i32;
    if let Ok(leading) = name_tokens[0].parse::<i32>() {
        if leading >= 1 && name_tokens.len() > 1 {
            quantity = leading;
            name_tokens = &name_tokens[1..];
        }
    }

    let name = name_tokens.join(" ");
    if name.is_empty() || name_tokens.iter().all(|t| parse_price(t).is_some()) {
        return Err(AppError::UnparsableText(format!(
            "no product name found in '{text}'"
        )));
    }

    Ok(ParsedEntry {
        quantity,
        name,
        price,
    })
}

// Accepts "2500", "$2500", "2500.50" and "2500,50". Fractional prices round
// to the nearest whole unit, matching how operators type them at the till.
fn parse_price(token: &str) -> Option<i64> {
    let cleaned = token.trim_start_matches('$').replace(',', ".");
    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if !cleaned.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some(value.round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_case_space_and_diacritic_insensitive() {
        assert_eq!(normalize("Café  LATTE"), normalize("cafe latte"));
        assert_eq!(normalize("  Ñandú   criollo "), "nandu criollo");
        assert_eq!(normalize("AGUA"), "agua");
    }

    #[test]
    fn parses_quantity_name_and_price() {
        let parsed = parse_manual_entry("3 agua mineral 900").unwrap();
        assert_eq!(parsed.quantity, 3);
        assert_eq!(parsed.name, "agua mineral");
        assert_eq!(parsed.price, 900);
    }

    #[test]
    fn quantity_defaults_to_one() {
        let parsed = parse_manual_entry("agua 900").unwrap();
        assert_eq!(parsed.quantity, 1);
        assert_eq!(parsed.name, "agua");
        assert_eq!(parsed.price, 900);
    }

    #[test]
    fn multiword_name_with_quantity() {
        let parsed = parse_manual_entry("2 coca cola 2500").unwrap();
        assert_eq!(parsed.quantity, 2);
        assert_eq!(parsed.name, "coca cola");
        assert_eq!(parsed.price, 2500);
    }

    #[test]
    fn rejects_text_without_price() {
        let err = parse_manual_entry("solo texto").unwrap_err();
        assert!(matches!(err, AppError::UnparsableText(_)));
    }

    #[test]
    fn rejects_entry_without_name() {
        let err = parse_manual_entry("2 2500").unwrap_err();
        assert!(matches!(err, AppError::UnparsableText(_)));

        let err = parse_manual_entry("900").unwrap_err();
        assert!(matches!(err, AppError::UnparsableText(_)));
    }

    #[test]
    fn accepts_decimal_and_currency_prefixed_prices() {
        let parsed = parse_manual_entry("pan $150").unwrap();
        assert_eq!(parsed.price, 150);

        let parsed = parse_manual_entry("pan 150,60").unwrap();
        assert_eq!(parsed.price, 151);
    }
}
