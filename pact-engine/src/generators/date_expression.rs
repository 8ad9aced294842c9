//! Relative date expressions such as `today + 1 day` or `now - 2 hours`.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Local, Months, NaiveTime};

/// Moves `base` by an expression. An expression starts with an optional base
/// (`now`, `today`, `tomorrow`, `yesterday`), followed by any number of
/// `+ N unit` / `- N unit` adjustments.
pub fn evaluate(expression: &str, base: DateTime<Local>) -> Result<DateTime<Local>> {
    let invalid = |message: &str| Error::parse(format!("Invalid date expression '{}': {}", expression, message));
    let tokens: Vec<String> = tokenize(expression);
    let mut tokens = tokens.iter().map(String::as_str).peekable();

    let mut value = match tokens.peek().copied() {
        Some("now") => {
            tokens.next();
            base
        }
        Some("today") => {
            tokens.next();
            base
        }
        Some("tomorrow") => {
            tokens.next();
            base + Duration::days(1)
        }
        Some("yesterday") => {
            tokens.next();
            base - Duration::days(1)
        }
        Some("midnight") => {
            tokens.next();
            base.date_naive()
                .and_time(NaiveTime::MIN)
                .and_local_timezone(Local)
                .single()
                .unwrap_or(base)
        }
        _ => base,
    };

    while let Some(token) = tokens.next() {
        let sign: i64 = match token {
            "+" => 1,
            "-" => -1,
            other => return Err(invalid(&format!("expected '+' or '-' but found '{}'", other))),
        };
        let amount: i64 = tokens
            .next()
            .ok_or_else(|| invalid("missing amount"))?
            .parse()
            .map_err(|_| invalid("amount is not a number"))?;
        let unit = tokens.next().ok_or_else(|| invalid("missing unit"))?;
        value = adjust(value, sign * amount, unit).ok_or_else(|| invalid(&format!("can not apply '{}'", unit)))?;
    }

    Ok(value)
}

fn tokenize(expression: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in expression.trim().to_lowercase().chars() {
        if c == '+' || c == '-' {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push(c.to_string());
        } else if c.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn adjust(value: DateTime<Local>, amount: i64, unit: &str) -> Option<DateTime<Local>> {
    let unit = unit.trim_end_matches('s');
    match unit {
        "second" => Some(value + Duration::seconds(amount)),
        "minute" => Some(value + Duration::minutes(amount)),
        "hour" => Some(value + Duration::hours(amount)),
        "day" => Some(value + Duration::days(amount)),
        "week" => Some(value + Duration::weeks(amount)),
        "fortnight" => Some(value + Duration::weeks(2 * amount)),
        "month" | "year" => {
            let months = if unit == "year" { amount * 12 } else { amount };
            let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
            if months >= 0 {
                value.checked_add_months(magnitude)
            } else {
                value.checked_sub_months(magnitude)
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    fn base() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 31, 10, 0, 0).single().unwrap()
    }

    #[test]
    fn applies_offsets() {
        assert_eq!(evaluate("", base()).unwrap(), base());
        assert_eq!(evaluate("today + 1 day", base()).unwrap().day(), 1);
        assert_eq!(evaluate("now - 2 hours", base()).unwrap().hour(), 8);
        assert_eq!(evaluate("+1 month", base()).unwrap().month(), 2);
        assert_eq!(evaluate("tomorrow + 1 year", base()).unwrap().year(), 2025);
        assert_eq!(evaluate("yesterday", base()).unwrap().day(), 30);
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert!(evaluate("today * 2 days", base()).is_err());
        assert!(evaluate("+ x days", base()).is_err());
        assert!(evaluate("+ 1 parsec", base()).is_err());
        assert!(evaluate("+ 1", base()).is_err());
    }
}
