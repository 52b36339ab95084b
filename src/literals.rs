//! Decodes raw token text into cooked literal values.
//!
//! The lexer never decodes — `Token.text` is always the exact source
//! slice — so string escapes, numeric radixes and regex pattern/flag
//! splitting all happen here, at parse time.

/// Decodes a quoted string literal's token text (including the
/// surrounding `'`/`"` quotes) into its cooked value.
pub fn decode_string(raw: &str) -> String {
    let inner = &raw[1..raw.len() - 1];
    decode_escapes(inner)
}

/// Decodes one `TemplateString` chunk's token text (no surrounding
/// delimiters) into its cooked value.
pub fn decode_string_body(raw: &str) -> String {
    decode_escapes(raw)
}

fn decode_escapes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('v') => out.push('\u{b}'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('`') => out.push('`'),
            Some('\n') => {} // line continuation: escaped newline is elided
            Some('\r') => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                if let Some(ch) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    out.push(ch);
                }
            }
            Some('u') => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    let mut hex = String::new();
                    for c2 in chars.by_ref() {
                        if c2 == '}' {
                            break;
                        }
                        hex.push(c2);
                    }
                    if let Some(ch) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                        out.push(ch);
                    }
                } else {
                    let hex: String = chars.by_ref().take(4).collect();
                    if let Some(ch) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                        out.push(ch);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Decodes a numeric literal's token text, honoring `0x`/`0o`/`0b`
/// radix prefixes and `_` digit separators.
pub fn decode_number(raw: &str) -> f64 {
    let cleaned: String = raw.chars().filter(|c| *c != '_').collect();
    let lower = cleaned.to_ascii_lowercase();
    if let Some(rest) = lower.strip_prefix("0x") {
        return u64::from_str_radix(rest, 16).map(|v| v as f64).unwrap_or(f64::NAN);
    }
    if let Some(rest) = lower.strip_prefix("0o") {
        return u64::from_str_radix(rest, 8).map(|v| v as f64).unwrap_or(f64::NAN);
    }
    if let Some(rest) = lower.strip_prefix("0b") {
        return u64::from_str_radix(rest, 2).map(|v| v as f64).unwrap_or(f64::NAN);
    }
    cleaned.parse::<f64>().unwrap_or(f64::NAN)
}

/// Splits a `/pattern/flags` regex literal's token text into its pattern
/// and flags, respecting character classes and escapes the same way the
/// lexer's `scan_regex` did when it found the closing delimiter.
pub fn decode_regex(raw: &str) -> (String, String) {
    let bytes = raw.as_bytes();
    let mut i = 1usize;
    let mut in_class = false;
    let mut close = raw.len();
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'[' => {
                in_class = true;
                i += 1;
            }
            b']' => {
                in_class = false;
                i += 1;
            }
            b'/' if !in_class => {
                close = i;
                break;
            }
            _ => i += 1,
        }
    }
    (raw[1..close].to_string(), raw[close + 1..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_common_escapes() {
        assert_eq!(decode_string("\"a\\nb\""), "a\nb");
        assert_eq!(decode_string("'it\\'s'"), "it's");
    }

    #[test]
    fn decodes_unicode_escapes() {
        assert_eq!(decode_string("\"\\u0041\""), "A");
        assert_eq!(decode_string("\"\\u{1F600}\""), "\u{1F600}");
    }

    #[test]
    fn decodes_numeric_radixes() {
        assert_eq!(decode_number("0x1F"), 31.0);
        assert_eq!(decode_number("0b101"), 5.0);
        assert_eq!(decode_number("1_000.5"), 1000.5);
    }

    #[test]
    fn splits_regex_pattern_and_flags() {
        assert_eq!(decode_regex("/a\\/b[/]/gi"), ("a\\/b[/]".to_string(), "gi".to_string()));
    }
}
