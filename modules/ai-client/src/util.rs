/// Strip a surrounding markdown code fence (```` ```json ```` or bare ```` ``` ````).
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// The span from the first `[` to the last `]`, if both exist in order.
/// Models often wrap a JSON array in prose; this recovers the array.
pub fn extract_json_array(response: &str) -> Option<&str> {
    let start = response.find('[')?;
    let end = response.rfind(']')?;
    (end > start).then(|| &response[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_blocks("```json\n[]\n```"), "[]");
        assert_eq!(strip_code_blocks("```\n[]\n```"), "[]");
        assert_eq!(strip_code_blocks("  []  "), "[]");
    }

    #[test]
    fn extracts_array_from_prose() {
        let reply = "Here are the narratives:\n[{\"name\": \"a\"}]\nLet me know!";
        assert_eq!(extract_json_array(reply), Some("[{\"name\": \"a\"}]"));
        assert_eq!(extract_json_array("no array here"), None);
        assert_eq!(extract_json_array("] backwards ["), None);
    }
}
