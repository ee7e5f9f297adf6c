//! Tolerant parsing helpers for model output.

/// Remove one pair of surrounding code fences, with or without a language
/// tag. Text that is not fenced is returned trimmed.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the language tag line, if any.
    match body.find('\n') {
        Some(newline) if !body[..newline].trim().contains(' ') => body[newline + 1..].trim(),
        Some(_) => body.trim(),
        None => body.trim(),
    }
}

/// The outermost JSON array in `text`, after stripping code fences.
pub fn json_array_slice(text: &str) -> Option<&str> {
    let text = strip_code_fences(text);
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences_with_language() {
        assert_eq!(strip_code_fences("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fences("  ```markdown\nHello\n```  "), "Hello");
    }

    #[test]
    fn test_strip_fences_without_language() {
        assert_eq!(strip_code_fences("```\nplain\n```"), "plain");
        assert_eq!(strip_code_fences("```inline```"), "inline");
    }

    #[test]
    fn test_unfenced_text_passes_through() {
        assert_eq!(strip_code_fences("  just text "), "just text");
        assert_eq!(strip_code_fences("```unterminated"), "```unterminated");
        assert_eq!(
            strip_code_fences("Use `x` and ```y``` inside"),
            "Use `x` and ```y``` inside"
        );
    }

    #[test]
    fn test_json_array_slice() {
        assert_eq!(json_array_slice("Here you go: [\"a\"] done"), Some("[\"a\"]"));
        assert_eq!(json_array_slice("```json\n[{\"x\": [1]}]\n```"), Some("[{\"x\": [1]}]"));
        assert_eq!(json_array_slice("no array"), None);
        assert_eq!(json_array_slice("] backwards ["), None);
    }
}
