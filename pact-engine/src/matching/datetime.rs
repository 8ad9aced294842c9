//! Java style date/time patterns (`yyyy-MM-dd'T'HH:mm:ss`) as used in pact
//! files, translated to chrono format strings.

use crate::error::Error;
use chrono::format::{parse, Parsed, StrftimeItems};

/// Converts a pattern like `yyyy-MM-dd HH:mm:ss.SSS` to `%Y-%m-%d %H:%M:%S.%3f`.
pub fn to_chrono_format(pattern: &str) -> Result<String, Error> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut result = String::with_capacity(pattern.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            // '' is a literal quote, otherwise quoted text runs to the next quote
            if chars.get(i + 1) == Some(&'\'') {
                result.push('\'');
                i += 2;
                continue;
            }
            i += 1;
            loop {
                match chars.get(i) {
                    None => {
                        return Err(Error::parse(format!("Unterminated quote in date format '{}'", pattern)))
                    }
                    Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                        result.push('\'');
                        i += 2;
                    }
                    Some('\'') => {
                        i += 1;
                        break;
                    }
                    Some(&other) => {
                        push_literal(&mut result, other);
                        i += 1;
                    }
                }
            }
            continue;
        }

        if !c.is_ascii_alphabetic() {
            push_literal(&mut result, c);
            i += 1;
            continue;
        }

        let mut count = 1;
        while i + count < chars.len() && chars[i + count] == c {
            count += 1;
        }
        i += count;

        let directive = match (c, count) {
            ('y', 2) => "%y",
            ('y', _) | ('u', _) => "%Y",
            ('M', 1) | ('M', 2) | ('L', 1) | ('L', 2) => "%m",
            ('M', 3) | ('L', 3) => "%b",
            ('M', _) | ('L', _) => "%B",
            ('d', _) => "%d",
            ('D', _) => "%j",
            ('E', 1..=3) => "%a",
            ('E', _) => "%A",
            ('a', _) => "%p",
            ('H', _) | ('k', _) => "%H",
            ('h', _) | ('K', _) => "%I",
            ('m', _) => "%M",
            ('s', _) => "%S",
            ('S', 1..=3) => "%3f",
            ('S', 4..=6) => "%6f",
            ('S', _) => "%9f",
            ('Z', _) | ('X', 1) | ('X', 2) | ('x', 1) | ('x', 2) => "%z",
            ('X', _) | ('x', _) => "%:z",
            ('z', _) => "%Z",
            ('w', _) => "%U",
            _ => {
                return Err(Error::parse(format!(
                    "Unsupported pattern letter '{}' in date format '{}'",
                    c, pattern
                )))
            }
        };
        result.push_str(directive);
    }

    Ok(result)
}

fn push_literal(result: &mut String, c: char) {
    if c == '%' {
        result.push_str("%%");
    } else {
        result.push(c);
    }
}

/// Checks that `value` can be read with the Java style `pattern`.
pub fn validate_datetime(value: &str, pattern: &str) -> Result<(), String> {
    let format = to_chrono_format(pattern).map_err(|err| err.to_string())?;
    let mut parsed = Parsed::new();
    parse(&mut parsed, value, StrftimeItems::new(&format)).map_err(|err| {
        format!(
            "Expected '{}' to match a date/time of format '{}': {}",
            value, pattern, err
        )
    })
}
