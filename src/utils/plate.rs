/// Canonical comparable form of a licence plate.
///
/// Surrounding and embedded whitespace and hyphens are removed and ASCII
/// letters are uppercased. Two plates are the same plate iff their
/// normalized forms are equal.
pub fn normalize_plate(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_plate() {
        let cases = [
            ("with spaces", "123 ABC 02", "123ABC02"),
            ("lowercase", "123abc02", "123ABC02"),
            ("with dashes", "123-ABC-02", "123ABC02"),
            ("mixed case with spaces", "123 AbC 02", "123ABC02"),
            ("already normalized", "123ABC02", "123ABC02"),
            ("leading and trailing spaces", "  123 ABC 02  ", "123ABC02"),
            ("dashes and lowercase", "123-abc-02", "123ABC02"),
            ("tabs", "123\tABC\t02", "123ABC02"),
        ];

        for (name, input, expected) in cases {
            assert_eq!(normalize_plate(input), expected, "case: {}", name);
        }
    }

    #[test]
    fn empty_and_separator_only_input_normalizes_to_empty() {
        assert_eq!(normalize_plate(""), "");
        assert_eq!(normalize_plate("  - - "), "");
    }

    #[test]
    fn non_ascii_letters_are_left_alone() {
        assert_eq!(normalize_plate("123 аbc 02"), "123аBC02");
    }
}
