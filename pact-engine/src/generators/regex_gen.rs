//! Random strings matching a regular expression.

use crate::error::{Error, Result};
use rand::Rng;
use regex_syntax::hir::{Class, Hir, HirKind};
use regex_syntax::ParserBuilder;

/// Extra repetitions allowed for unbounded quantifiers (`*`, `+`, `{n,}`).
const UNBOUNDED_EXTRA: u32 = 8;

/// Produces a random string the pattern accepts. Anchors and word boundaries
/// are ignored.
pub fn generate_from_regex<R: Rng>(pattern: &str, rng: &mut R) -> Result<String> {
    let hir = ParserBuilder::new()
        .build()
        .parse(pattern)
        .map_err(|err| Error::parse(format!("Invalid regex '{}': {}", pattern, err)))?;
    let mut output = String::new();
    append(&hir, rng, &mut output);
    Ok(output)
}

fn append<R: Rng>(hir: &Hir, rng: &mut R, output: &mut String) {
    match hir.kind() {
        HirKind::Empty | HirKind::Look(_) => {}
        HirKind::Literal(literal) => output.push_str(&String::from_utf8_lossy(&literal.0)),
        HirKind::Class(class) => {
            if let Some(c) = pick_from_class(class, rng) {
                output.push(c);
            }
        }
        HirKind::Repetition(repetition) => {
            let max = repetition
                .max
                .unwrap_or_else(|| repetition.min.saturating_add(UNBOUNDED_EXTRA));
            let count = if max > repetition.min {
                rng.gen_range(repetition.min..=max)
            } else {
                repetition.min
            };
            for _ in 0..count {
                append(&repetition.sub, rng, output);
            }
        }
        HirKind::Capture(capture) => append(&capture.sub, rng, output),
        HirKind::Concat(items) => {
            for item in items {
                append(item, rng, output);
            }
        }
        HirKind::Alternation(branches) => {
            if !branches.is_empty() {
                let branch = &branches[rng.gen_range(0..branches.len())];
                append(branch, rng, output);
            }
        }
    }
}

/// Prefers printable ASCII when the class allows it, so `.` and negated
/// classes produce readable output.
fn pick_from_class<R: Rng>(class: &Class, rng: &mut R) -> Option<char> {
    let ranges: Vec<(u32, u32)> = match class {
        Class::Unicode(unicode) => unicode
            .ranges()
            .iter()
            .map(|range| (range.start() as u32, range.end() as u32))
            .collect(),
        Class::Bytes(bytes) => bytes
            .ranges()
            .iter()
            .map(|range| (range.start() as u32, range.end() as u32))
            .collect(),
    };

    let printable: Vec<(u32, u32)> = ranges
        .iter()
        .filter_map(|(start, end)| {
            let (start, end) = ((*start).max(0x20), (*end).min(0x7E));
            (start <= end).then_some((start, end))
        })
        .collect();
    let candidates = if printable.is_empty() { ranges } else { printable };

    let total: u32 = candidates.iter().map(|(start, end)| end - start + 1).sum();
    if total == 0 {
        return None;
    }
    let mut index = rng.gen_range(0..total);
    for (start, end) in candidates {
        let size = end - start + 1;
        if index < size {
            return char::from_u32(start + index);
        }
        index -= size;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use regex::Regex;

    #[test]
    fn generates_matching_strings() {
        let mut rng = rand::thread_rng();
        for pattern in &[
            "\\d{3}-\\d{4}",
            "[A-Z][a-z]+",
            "(red|green|blue)",
            "^\\w+@example\\.com$",
            ".{5}",
            "[^0-9]{2,4}",
            "x?y*z+",
        ] {
            let regex = Regex::new(&format!("^(?:{})$", pattern)).unwrap();
            for _ in 0..20 {
                let value = generate_from_regex(pattern, &mut rng).unwrap();
                assert!(regex.is_match(&value), "'{}' does not match {}", value, pattern);
            }
        }
    }

    #[test]
    fn invalid_patterns_are_errors() {
        assert!(generate_from_regex("(unclosed", &mut rand::thread_rng()).is_err());
    }

    proptest! {
        #[test]
        fn bounded_repetitions_respect_bounds(min in 0u32..5, extra in 0u32..5) {
            let pattern = format!("a{{{},{}}}", min, min + extra);
            let value = generate_from_regex(&pattern, &mut rand::thread_rng()).unwrap();
            prop_assert!(value.len() as u32 >= min && value.len() as u32 <= min + extra);
        }
    }
}
