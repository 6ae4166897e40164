//! Lexical import extraction. No language parser is involved: each line is
//! scanned for a small family of textual patterns per language, matching
//! §4.4 "Import extraction (lexical)". Strings are not parsed beyond the
//! quoted module literal; concatenation or computed arguments yield nothing.

use crate::types::Language;

/// Extracts the raw module strings referenced by `content`, in source
/// order including duplicates — callers dedupe after path resolution.
pub fn extract_module_strings(language: Language, content: &str) -> Vec<String> {
    match language {
        Language::Ts | Language::Js => extract_ts_js(content),
        Language::Py => extract_py(content),
    }
}

fn is_comment_line(trimmed: &str) -> bool {
    trimmed.starts_with("//") || trimmed.starts_with("/*") || trimmed.starts_with('*')
}

fn extract_ts_js(content: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim_start();
        if is_comment_line(trimmed) {
            continue;
        }
        if let Some(m) = find_quoted_after(trimmed, "from") {
            out.push(m);
            continue;
        }
        if let Some(m) = find_call_argument(trimmed, "require(") {
            out.push(m);
            continue;
        }
        if let Some(m) = find_call_argument(trimmed, "import(") {
            out.push(m);
        }
    }
    out
}

fn extract_py(content: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("from ") {
            if let Some(module) = rest.split_whitespace().next() {
                out.push(module.to_string());
            }
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("import ") {
            for candidate in rest.split(',') {
                if let Some(module) = candidate.split_whitespace().next() {
                    out.push(module.to_string());
                }
            }
        }
    }
    out
}

/// Finds `from "M"` / `from 'M'` on a line that also contains `import` or
/// `export` earlier — matches `import x from "M"` and `export x from "M"`.
fn find_quoted_after(line: &str, keyword: &str) -> Option<String> {
    if !(line.contains("import") || line.contains("export")) {
        return None;
    }
    let idx = line.find(keyword)?;
    let rest = &line[idx + keyword.len()..];
    extract_first_quoted(rest)
}

/// Finds `prefix"M"` / `prefix'M'` — used for `require(` and `import(` call
/// forms. Only a single string-literal argument is recognized; anything
/// else (concatenation, a variable) yields no match.
fn find_call_argument(line: &str, prefix: &str) -> Option<String> {
    let idx = line.find(prefix)?;
    let rest = &line[idx + prefix.len()..];
    extract_first_quoted(rest)
}

fn extract_first_quoted(rest: &str) -> Option<String> {
    let rest = rest.trim_start();
    let quote = rest.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let body = &rest[quote.len_utf8()..];
    let end = body.find(quote)?;
    Some(body[..end].to_string())
}
