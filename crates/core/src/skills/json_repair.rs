//! # Permissive JSON
//!
//! Two-stage parsing for model output. A strict `serde_json` parse runs
//! first; when it fails, a repair pass rewrites the common malformations
//! (trailing commas, single quotes, unquoted keys and words, Python/JS
//! literals, comments, raw control characters inside strings, missing
//! commas) and the strict parser runs again.
//!
//! Truncated input is not completed: an unterminated string or an unclosed
//! bracket at end of input is an error, so a half-written payload is never
//! mistaken for a whole one.

use anyhow::{anyhow, bail, Result};
use serde_json::Value;

/// A successfully parsed value and whether the repair pass was needed
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub value: Value,
    pub repaired: bool,
}

/// Parse the first JSON object or array in `text`.
///
/// Leading prose and code fences are skipped, as is anything after the
/// first complete value.
pub fn parse_permissive(text: &str) -> Result<Parsed> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(Parsed {
            value,
            repaired: false,
        });
    }

    let start = trimmed
        .find(['{', '['])
        .ok_or_else(|| anyhow!("no JSON object or array found"))?;
    let candidate = &trimmed[start..];

    // Valid JSON followed by trailing text (closing fence, prose)
    let mut stream = serde_json::Deserializer::from_str(candidate).into_iter::<Value>();
    if let Some(Ok(value)) = stream.next() {
        return Ok(Parsed {
            value,
            repaired: false,
        });
    }

    let repaired = repair(candidate)?;
    let value = serde_json::from_str::<Value>(&repaired)
        .map_err(|e| anyhow!("payload is not valid JSON even after repair: {}", e))?;
    Ok(Parsed {
        value,
        repaired: true,
    })
}

/// Rewrite a JSON-like fragment starting at `{` or `[` into strict JSON.
pub fn repair(input: &str) -> Result<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 16);
    let mut closers: Vec<char> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                separate(&mut out);
                i = copy_string(&chars, i, &mut out)?;
            }
            '{' | '[' => {
                separate(&mut out);
                closers.push(if c == '{' { '}' } else { ']' });
                out.push(c);
                i += 1;
            }
            '}' | ']' => {
                i += 1;
                // Stray closers with no matching opener are dropped
                if let Some(pos) = closers.iter().rposition(|&x| x == c) {
                    while closers.len() > pos + 1 {
                        trim_dangling(&mut out);
                        if let Some(inner) = closers.pop() {
                            out.push(inner);
                        }
                    }
                    trim_dangling(&mut out);
                    closers.pop();
                    out.push(c);
                    if closers.is_empty() {
                        break;
                    }
                }
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
            }
            // A code fence ends the payload
            '`' => break,
            ',' | ':' => {
                out.push(c);
                i += 1;
            }
            c if c.is_whitespace() => {
                out.push(c);
                i += 1;
            }
            c if c.is_alphanumeric() || matches!(c, '_' | '$' | '-' | '+' | '.') => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '$' | '-' | '+' | '.'))
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                separate(&mut out);
                if next_non_space(&chars, i) == Some(':') {
                    out.push_str(&quote(&word));
                } else {
                    out.push_str(&bare_value(&word));
                }
            }
            _ => i += 1,
        }
    }

    if !closers.is_empty() {
        bail!(
            "payload is truncated: {} unclosed bracket(s)",
            closers.len()
        );
    }
    Ok(out)
}

/// Copy a single- or double-quoted string as a JSON string. Returns the
/// index after the closing quote.
fn copy_string(chars: &[char], start: usize, out: &mut String) -> Result<usize> {
    let quote_char = chars[start];
    out.push('"');
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => match chars.get(i + 1) {
                Some('\'') => {
                    out.push('\'');
                    i += 2;
                }
                Some(&next) if "\"\\/bfnrtu".contains(next) => {
                    out.push('\\');
                    out.push(next);
                    i += 2;
                }
                // Unknown escape: keep the backslash literally
                _ => {
                    out.push_str("\\\\");
                    i += 1;
                }
            },
            c if c == quote_char => {
                out.push('"');
                return Ok(i + 1);
            }
            '"' => {
                out.push_str("\\\"");
                i += 1;
            }
            '\n' => {
                out.push_str("\\n");
                i += 1;
            }
            '\r' => {
                out.push_str("\\r");
                i += 1;
            }
            '\t' => {
                out.push_str("\\t");
                i += 1;
            }
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    bail!("payload is truncated: unterminated string")
}

/// Insert a comma when a value directly follows another value
fn separate(out: &mut String) {
    let needs_comma = matches!(
        out.trim_end().chars().last(),
        Some(last) if last == '"' || last == '}' || last == ']' || last.is_alphanumeric()
    );
    if needs_comma {
        let trimmed_len = out.trim_end().len();
        out.insert(trimmed_len, ',');
    }
}

/// Drop a trailing comma and complete a dangling `key:` before a closer
fn trim_dangling(out: &mut String) {
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(',') {
        out.pop();
        let trimmed_len = out.trim_end().len();
        out.truncate(trimmed_len);
    }
    if out.ends_with(':') {
        out.push_str(" null");
    }
}

fn next_non_space(chars: &[char], from: usize) -> Option<char> {
    chars[from..].iter().copied().find(|c| !c.is_whitespace())
}

fn quote(word: &str) -> String {
    Value::String(word.to_string()).to_string()
}

fn bare_value(word: &str) -> String {
    match word {
        "true" | "True" | "TRUE" => return "true".to_string(),
        "false" | "False" | "FALSE" => return "false".to_string(),
        "null" | "Null" | "NULL" | "None" | "none" | "nil" | "undefined" | "NaN" => {
            return "null".to_string()
        }
        _ => {}
    }
    if serde_json::from_str::<serde_json::Number>(word).is_ok() {
        return word.to_string();
    }
    if let Some(number) = word
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
    {
        return number.to_string();
    }
    quote(word)
}
