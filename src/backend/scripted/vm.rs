//! Translation from the store's `function($param, ...) { ... }` script
//! surface to valid Rhai, and the small wrapper around `rhai::Engine`
//! the scripted backend drives for `filter` and `execute`.

use std::sync::Arc;

use rhai::{Dynamic, Engine, Scope};
use serde_json::Value;

use crate::error::{Error, Result};

/// Replace every `$identifier` token in `src` with the bare identifier,
/// since Rhai has no variable sigil. String literals are passed through
/// untouched so sigils inside quoted text are not rewritten.
pub fn desigilize(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.char_indices().peekable();
    let mut in_string: Option<char> = None;
    while let Some((_, c)) = chars.next() {
        match in_string {
            Some(q) => {
                out.push(c);
                if c == '\\' {
                    if let Some(&(_, next)) = chars.peek() {
                        out.push(next);
                        chars.next();
                    }
                } else if c == q {
                    in_string = None;
                }
            }
            None => {
                if c == '"' || c == '\'' {
                    in_string = Some(c);
                    out.push(c);
                } else if c == '$' {
                    // skip the sigil; the following identifier is copied
                    // verbatim by the normal path.
                } else {
                    out.push(c);
                }
            }
        }
    }
    out
}

/// A parsed `function(params...) { body }` literal: parameter names
/// (without the `$` sigil) and the raw, not-yet-desigilized body text.
pub struct FunctionLiteral<'a> {
    pub params: Vec<String>,
    pub body: &'a str,
}

/// Parse a function literal (anonymous or named) starting at the first
/// `function` keyword in `src`. Returns the parameter list and the raw
/// body between the outermost braces.
pub fn parse_function_literal(src: &str) -> Result<FunctionLiteral<'_>> {
    let bytes = src.as_bytes();
    let kw = b"function";
    let kw_pos = find(bytes, kw).ok_or_else(|| Error::Invalid("expected 'function' literal".into()))?;
    let mut i = kw_pos + kw.len();
    while i < bytes.len() && bytes[i] != b'(' {
        i += 1;
    }
    let paren_start = i;
    let mut depth = 0i32;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            _ => {}
        }
        i += 1;
    }
    if depth != 0 {
        return Err(Error::Invalid("unterminated parameter list".into()));
    }
    let param_list = &src[paren_start + 1..i];
    let params: Vec<String> = param_list
        .split(',')
        .map(|p| p.trim().trim_start_matches('$').to_string())
        .filter(|p| !p.is_empty())
        .collect();

    while i < bytes.len() && bytes[i] != b'{' {
        i += 1;
    }
    if i >= bytes.len() {
        return Err(Error::Invalid("expected function body".into()));
    }
    let body_start = i + 1;
    let mut depth = 1i32;
    let mut j = body_start;
    while j < bytes.len() && depth > 0 {
        match bytes[j] {
            b'{' => depth += 1,
            b'}' => depth -= 1,
            _ => {}
        }
        j += 1;
    }
    if depth != 0 {
        return Err(Error::Invalid("unterminated function body".into()));
    }
    Ok(FunctionLiteral {
        params,
        body: &src[body_start..j - 1],
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Convert a `serde_json::Value` record into a Rhai `Dynamic`.
pub fn value_to_dynamic(v: &Value) -> Result<Dynamic> {
    rhai::serde::to_dynamic(v).map_err(|e| Error::Invalid(e.to_string()))
}

/// Convert a Rhai `Dynamic` back into a `serde_json::Value`.
pub fn dynamic_to_value(d: Dynamic) -> Result<Value> {
    rhai::serde::from_dynamic(&d).map_err(|e| Error::Invalid(e.to_string()))
}

/// Evaluate a predicate literal against one record, returning whether
/// the record matches.
pub fn eval_predicate(engine: &Engine, predicate: &str, record: &Value) -> Result<bool> {
    let literal = parse_function_literal(predicate)?;
    let param = literal.params.first().cloned().unwrap_or_else(|| "r".to_string());
    let body = desigilize(literal.body);

    let mut scope = Scope::new();
    scope.push(param, value_to_dynamic(record)?);

    let result: Dynamic = engine
        .eval_with_scope(&mut scope, &body)
        .map_err(|e| Error::Invalid(format!("predicate evaluation failed: {e}")))?;
    result
        .as_bool()
        .map_err(|_| Error::Invalid("predicate must evaluate to a boolean".into()))
}

/// Run arbitrary user code and return the requested variables from the
/// resulting scope, serialized back to JSON. `__output__` captures the
/// script's accumulated `print`/`debug` output.
pub fn eval_execute(
    engine: &Engine,
    code: &str,
    vars: &[String],
    bindings: Vec<(String, Value)>,
) -> Result<serde_json::Map<String, Value>> {
    let body = desigilize(code);
    let mut scope = Scope::new();
    for (name, value) in bindings {
        scope.push(name, value_to_dynamic(&value)?);
    }

    let output: Arc<parking_lot::Mutex<String>> = Arc::default();
    let mut engine = engine.clone();
    let out_for_print = output.clone();
    engine.on_print(move |s| {
        out_for_print.lock().push_str(s);
        out_for_print.lock().push('\n');
    });

    engine
        .eval_with_scope::<Dynamic>(&mut scope, &body)
        .map_err(|e| Error::Invalid(format!("script execution failed: {e}")))?;

    let mut captured = serde_json::Map::new();
    for name in vars {
        if name == "__output__" {
            captured.insert(name.clone(), Value::String(output.lock().clone()));
            continue;
        }
        if let Some(value) = scope.get_value::<Dynamic>(name) {
            captured.insert(name.clone(), dynamic_to_value(value)?);
        }
    }
    Ok(captured)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn desigilize_skips_sigils_outside_strings() {
        assert_eq!(desigilize("$r.papers > 35"), "r.papers > 35");
        assert_eq!(desigilize("\"$literal\""), "\"$literal\"");
    }

    #[test]
    fn parses_anonymous_predicate_literal() {
        let lit = parse_function_literal("function($r){return $r.papers>35;}").unwrap();
        assert_eq!(lit.params, vec!["r".to_string()]);
        assert_eq!(lit.body, "return $r.papers>35;");
    }

    #[test]
    fn filter_predicate_s5() {
        let engine = Engine::new();
        let rec = json!({"papers": 40});
        assert!(eval_predicate(&engine, "function($r){return $r.papers>35;}", &rec).unwrap());
        assert!(!eval_predicate(&engine, "function($r){return $r.papers>1000;}", &rec).unwrap());
    }
}
