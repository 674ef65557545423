//! Function-body extraction: given a raw script source and a function
//! name, finds the declaration `function <name>(...) { ... }` and
//! returns its full text (the `function` keyword through the matching
//! closing brace).
//!
//! Ported rule-for-rule from the original VM's scanner: a match
//! requires the `function` keyword to be surrounded by non-identifier
//! characters on both sides, and the name that follows it to be
//! followed by a non-identifier character — so `myfunction`,
//! `functionbla`, and `foobar` (when searching for `foo`) are all
//! correctly skipped as decoys.

fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Scan `source` for a `function <name>(...) { ... }` declaration and
/// return its full text, from the `function` keyword through the
/// matching closing brace. Returns `None` if no such declaration exists.
pub fn extract_function_code(source: &str, name: &str) -> Option<&str> {
    let bytes = source.as_bytes();
    let name_bytes = name.as_bytes();
    let keyword = b"function";

    let mut search_from = 0usize;
    while let Some(rel) = find(&bytes[search_from..], keyword) {
        let kw_start = search_from + rel;

        // "function" must not be preceded by an identifier character
        // (else it's the tail of a longer identifier, e.g. "myfunction").
        if kw_start > 0 && is_ident_char(bytes[kw_start - 1]) {
            search_from = kw_start + 1;
            continue;
        }
        let after_kw = kw_start + keyword.len();
        // The character right after "function" must not continue an
        // identifier either (else it's "functionbla").
        if after_kw < bytes.len() && is_ident_char(bytes[after_kw]) {
            search_from = kw_start + 1;
            continue;
        }

        // Skip whitespace/non-identifier characters to the function name.
        let mut name_start = after_kw;
        while name_start < bytes.len() && !is_ident_char(bytes[name_start]) {
            name_start += 1;
        }
        if name_start >= bytes.len() {
            return None;
        }

        let name_end = name_start + name_bytes.len();
        let matches_name = name_end <= bytes.len() && &bytes[name_start..name_end] == name_bytes;
        // The matched name must not be a prefix of a longer identifier
        // (else searching "foo" would match inside "foobar").
        let boundary_ok = name_end >= bytes.len() || !is_ident_char(bytes[name_end]);

        if !matches_name || !boundary_ok {
            search_from = kw_start + 1;
            continue;
        }

        // Found the declaration; scan to the opening brace, then count
        // braces to find the matching close.
        let mut i = name_end;
        while i < bytes.len() && bytes[i] != b'{' {
            i += 1;
        }
        if i >= bytes.len() {
            return None;
        }
        let mut depth = 1i32;
        let mut j = i + 1;
        while j < bytes.len() && depth > 0 {
            match bytes[j] {
                b'{' => depth += 1,
                b'}' => depth -= 1,
                _ => {}
            }
            j += 1;
        }
        if depth != 0 {
            return None;
        }
        return Some(&source[kw_start..j]);
    }
    None
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_simple_function() {
        let src = "function foo($r) { return $r.x; }";
        let body = extract_function_code(src, "foo").unwrap();
        assert_eq!(body, src);
    }

    #[test]
    fn skips_decoys_myfoo_and_foobar() {
        let src = "function myfoo($r) { return 1; } function foo($r) { return 2; } function foobar($r) { return 3; }";
        let body = extract_function_code(src, "foo").unwrap();
        assert_eq!(body, "function foo($r) { return 2; }");
    }

    #[test]
    fn handles_nested_braces() {
        let src = "function foo($r) { if ($r.x) { return 1; } else { return 2; } }";
        let body = extract_function_code(src, "foo").unwrap();
        assert_eq!(body, src);
    }

    #[test]
    fn missing_function_returns_none() {
        let src = "function bar() { return 1; }";
        assert!(extract_function_code(src, "foo").is_none());
    }

    #[test]
    fn property_8_decoy_ordering() {
        // foo appears textually after its decoys; the scan must not stop
        // at the first "function" occurrence.
        let src = "function foobar(){1} function myfoo(){2} function foo(){3}";
        assert_eq!(extract_function_code(src, "foo").unwrap(), "function foo(){3}");
    }
}
