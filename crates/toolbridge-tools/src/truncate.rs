/// Characters of user code echoed back by analyze/explain/generate.
pub const EXCERPT_CHARS: usize = 500;
/// Refactor echoes a shorter excerpt since it also prints a rewritten version.
pub const REFACTOR_EXCERPT_CHARS: usize = 400;

/// Cut `input` to at most `max_chars` characters, appending `...` when
/// anything was removed. Counts chars, not bytes, so multi-byte input never
/// splits a code point.
pub fn excerpt(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        Some((boundary, _)) => format!("{}...", &input[..boundary]),
        None => input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_truncation_when_within_limit() {
        assert_eq!(excerpt("hello world", 500), "hello world");
    }

    #[test]
    fn truncates_at_limit() {
        let input = "a".repeat(1000);
        let result = excerpt(&input, 100);
        assert_eq!(result.len(), 103);
        assert!(result.ends_with("a..."));
    }

    #[test]
    fn counts_chars_not_bytes() {
        let input = "🦀".repeat(10);
        let result = excerpt(&input, 3);
        assert_eq!(result, "🦀🦀🦀...");
    }

    #[test]
    fn exact_boundary_no_truncation() {
        let input = "a".repeat(100);
        assert_eq!(excerpt(&input, 100), input);
    }

    #[test]
    fn one_over_truncates() {
        let input = "a".repeat(101);
        assert_eq!(excerpt(&input, 100), format!("{}...", "a".repeat(100)));
    }

    #[test]
    fn empty_string() {
        assert_eq!(excerpt("", 100), "");
    }
}
