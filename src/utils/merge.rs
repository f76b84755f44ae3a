//! Field-priority merging.
//!
//! Every attribute that can come from several sources is resolved by listing
//! its candidates in priority order and taking the first one that carries a
//! value.

/// Trimmed value, or `None` when blank.
pub fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// First candidate that is non-blank after trimming, trimmed.
pub fn first_non_empty<'a, I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates.into_iter().find_map(non_empty)
}

/// Coded identifier rendered as `<tag>:<code>`; blank and "0" codes carry no information.
pub fn tagged_code(tag: &str, code: &str) -> Option<String> {
    let code = code.trim();
    if code.is_empty() || code == "0" {
        None
    } else {
        Some(format!("{}:{}", tag, code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_non_empty_respects_order_and_trims() {
        assert_eq!(
            first_non_empty(["", "  ", " blue ", "white"]),
            Some("blue".to_string())
        );
        assert_eq!(first_non_empty(["white", "blue"]), Some("white".to_string()));
        assert_eq!(first_non_empty(["", " "]), None);
        assert_eq!(first_non_empty(Vec::<&str>::new()), None);
    }

    #[test]
    fn tagged_code_ignores_zero() {
        assert_eq!(tagged_code("brand_id", "1045"), Some("brand_id:1045".to_string()));
        assert_eq!(tagged_code("brand_id", "0"), None);
        assert_eq!(tagged_code("model_id", " "), None);
    }
}
