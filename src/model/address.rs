//! Address handling for `From`, `To`, `Cc` and `Bcc` headers.
//!
//! Both the sender pair and the recipient lists rely on the same bracket scan
//! ([`split_angle_addr`]): the first `<` and the first `>` after it.

/// Minimum number of bytes (not chars) between `<` and `>` for a recipient
/// token to be replaced by its bracketed address.
const MIN_BRACKETED_LEN: usize = 5;

/// Sender split into display name and bare address.
///
/// # Examples
/// - `"Juan García <juan@ejemplo.com>"` → `display_name = "Juan García"`, `address = "juan@ejemplo.com"`
/// - `"user@example.com"` → both fields are `"user@example.com"`
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct AddressPair {
    /// Text before the `<`, trimmed. The whole raw value when there are no brackets.
    pub display_name: String,
    /// Text between `<` and `>`, trimmed. The whole raw value when there are no brackets.
    pub address: String,
}

impl AddressPair {
    /// Split a raw `From` value.
    ///
    /// Without a `<…>` pair the raw value is used verbatim for both fields,
    /// so an empty header yields two empty strings.
    pub fn parse(raw: &str) -> Self {
        match split_angle_addr(raw) {
            Some((name, addr)) => Self {
                display_name: name.trim().to_string(),
                address: addr.trim().to_string(),
            },
            None => Self {
                display_name: raw.to_string(),
                address: raw.to_string(),
            },
        }
    }
}

/// Split a raw address-list header into one entry per comma-separated token.
///
/// Each token is trimmed. When it holds a `<…>` pair with at least five
/// bytes inside, the entry becomes the text between the brackets;
/// otherwise the trimmed token is kept as is. Empty tokens are kept, so an
/// empty header produces `[""]`.
pub fn normalize_list(raw: &str) -> Vec<String> {
    raw.split(',').map(normalize_token).collect()
}

fn normalize_token(token: &str) -> String {
    match split_angle_addr(token) {
        Some((_, addr)) if addr.len() >= MIN_BRACKETED_LEN => addr.to_string(),
        _ => token.trim().to_string(),
    }
}

/// Find the first `<` and the first `>` after it.
///
/// Returns the text before the `<` and the text strictly between the
/// brackets, both untrimmed.
pub fn split_angle_addr(raw: &str) -> Option<(&str, &str)> {
    let start = raw.find('<')?;
    let len = raw[start + 1..].find('>')?;
    Some((&raw[..start], &raw[start + 1..start + 1 + len]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_name_and_address() {
        let pair = AddressPair::parse("User One <user1@example.com>");
        assert_eq!(pair.display_name, "User One");
        assert_eq!(pair.address, "user1@example.com");
    }

    #[test]
    fn test_pair_bare_address_fills_both() {
        let pair = AddressPair::parse("user@example.com");
        assert_eq!(pair.display_name, "user@example.com");
        assert_eq!(pair.address, "user@example.com");
    }

    #[test]
    fn test_pair_angle_only() {
        let pair = AddressPair::parse("<user@example.com>");
        assert_eq!(pair.display_name, "");
        assert_eq!(pair.address, "user@example.com");
    }

    #[test]
    fn test_pair_trims_inside_brackets() {
        let pair = AddressPair::parse("  Alice   < alice@example.com > ");
        assert_eq!(pair.display_name, "Alice");
        assert_eq!(pair.address, "alice@example.com");
    }

    #[test]
    fn test_pair_closing_bracket_before_opening() {
        let raw = "odd> value <";
        let pair = AddressPair::parse(raw);
        assert_eq!(pair.display_name, raw);
        assert_eq!(pair.address, raw);
    }

    #[test]
    fn test_pair_empty() {
        let pair = AddressPair::parse("");
        assert_eq!(pair.display_name, "");
        assert_eq!(pair.address, "");
    }

    #[test]
    fn test_normalize_list_mixed() {
        let list = normalize_list("  A <a@x.com> , b@y.com");
        assert_eq!(list, vec!["a@x.com", "b@y.com"]);
    }

    #[test]
    fn test_normalize_short_bracket_kept_verbatim() {
        assert_eq!(normalize_list(" <a> "), vec!["<a>"]);
        assert_eq!(normalize_list("x <abcd>"), vec!["x <abcd>"]);
        assert_eq!(normalize_list("<abcde>"), vec!["abcde"]);
    }

    #[test]
    fn test_normalize_bracket_length_counts_bytes() {
        // Four characters but eight bytes.
        assert_eq!(normalize_list("Ñ <ñañá>"), vec!["ñañá"]);
        assert_eq!(normalize_list("x <abcd>"), vec!["x <abcd>"]);
    }

    #[test]
    fn test_normalize_empty_header() {
        assert_eq!(normalize_list(""), vec![""]);
    }

    #[test]
    fn test_normalize_keeps_duplicates_and_empties() {
        let list = normalize_list("a@b.com,,a@b.com");
        assert_eq!(list, vec!["a@b.com", "", "a@b.com"]);
    }

    #[test]
    fn test_split_angle_addr() {
        assert_eq!(split_angle_addr("N <a@b>"), Some(("N ", "a@b")));
        assert_eq!(split_angle_addr("> <x"), None);
        assert_eq!(split_angle_addr("plain"), None);
    }
}
