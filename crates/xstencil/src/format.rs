/*
 * format.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Value formatting for the formatted-result command.
//!
//! Three datatypes are supported: `date` (strftime patterns over a
//! handful of accepted input shapes), `number` (picture patterns with
//! `0`/`#` placeholders, `,` grouping, `.` fractions, and `;`-separated
//! positive/negative/zero sections), and `string` (`{N}` positional
//! composition). Formatting never fails: an unparseable input or an
//! invalid pattern yields the input text unchanged.

use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

/// Render a date/time value with a strftime pattern. Accepts ISO-8601
/// (`2010-08-26T14:30:51Z`), `YYYY-MM-DD [HH:MM[:SS]]`, and US-style
/// `MM/DD/YYYY [HH:MM[:SS] [AM|PM]]` inputs.
pub fn format_date(value: &str, pattern: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        return String::new();
    }
    let Some(parsed) = parse_date(value) else {
        debug!(value, "unparseable date value");
        return value.to_string();
    };
    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        debug!(pattern, "invalid date format pattern");
        return value.to_string();
    }
    parsed.format_with_items(items.into_iter()).to_string()
}

fn parse_date(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%m/%d/%Y %I:%M:%S %p",
        "%m/%d/%Y %I:%M %p",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ];
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];
    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(value, format) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Render a numeric value with a picture pattern.
///
/// `0` and `#` are digit placeholders filled right-to-left in the
/// integer part (`0` pads, `#` does not) and left-to-right in the
/// fraction (rounded to the placeholder count). `,` anywhere in the
/// integer part turns on 3-digit grouping. Any other character is a
/// literal. A pattern of up to three `;`-separated sections selects by
/// sign: positive;negative;zero. The patterns `x`/`X` render an integer
/// value in hexadecimal.
pub fn format_number(value: &str, pattern: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        return String::new();
    }
    if pattern == "x" || pattern == "X" {
        return match value.parse::<i64>() {
            Ok(n) if pattern == "X" => format!("{n:X}"),
            Ok(n) => format!("{n:x}"),
            Err(_) => value.to_string(),
        };
    }
    let Ok(number) = value.parse::<f64>() else {
        debug!(value, "unparseable numeric value");
        return value.to_string();
    };

    let sections: Vec<&str> = pattern.split(';').collect();
    let (section, explicit_sign) = if number < 0.0 && sections.len() > 1 {
        (sections[1], false)
    } else if number == 0.0 && sections.len() > 2 {
        (sections[2], false)
    } else {
        (sections[0], number < 0.0)
    };
    apply_picture(number.abs(), section, explicit_sign)
}

fn apply_picture(value: f64, picture: &str, negative: bool) -> String {
    if !picture.contains(['#', '0']) {
        // No placeholders: the section is a pure literal.
        return picture.to_string();
    }
    let (int_picture, frac_picture) = match picture.find('.') {
        Some(at) => (&picture[..at], &picture[at + 1..]),
        None => (picture, ""),
    };
    let frac_places = frac_picture.chars().filter(|c| matches!(c, '#' | '0')).count();
    let rendered = format!("{value:.frac_places$}");
    let (int_digits, frac_digits) = match rendered.find('.') {
        Some(at) => (&rendered[..at], &rendered[at + 1..]),
        None => (rendered.as_str(), ""),
    };

    let mut out = render_integer(int_digits, int_picture);
    if negative {
        out.insert(0, '-');
    }
    let frac = render_fraction(frac_digits, frac_picture);
    if !frac.is_empty() {
        out.push('.');
        out.push_str(&frac);
    }
    out
}

/// Fill the integer picture right-to-left; the leftmost placeholder
/// absorbs any overflow digits.
fn render_integer(digits: &str, picture: &str) -> String {
    let grouping = picture.contains(',');
    let placeholder_total = picture.chars().filter(|c| matches!(c, '#' | '0')).count();
    let mut remaining: Vec<char> = digits.chars().collect();
    let mut emitted = 0usize;
    let mut seen = 0usize;
    let mut reversed: Vec<char> = Vec::new();

    let mut push_digit = |c: char, reversed: &mut Vec<char>, emitted: &mut usize| {
        if grouping && *emitted > 0 && *emitted % 3 == 0 {
            reversed.push(',');
        }
        reversed.push(c);
        *emitted += 1;
    };

    for c in picture.chars().rev() {
        match c {
            '#' | '0' => {
                seen += 1;
                match remaining.pop() {
                    Some(digit) => push_digit(digit, &mut reversed, &mut emitted),
                    None if c == '0' => push_digit('0', &mut reversed, &mut emitted),
                    None => {}
                }
                if seen == placeholder_total {
                    // Leftmost placeholder: emit whatever digits are left.
                    while let Some(digit) = remaining.pop() {
                        push_digit(digit, &mut reversed, &mut emitted);
                    }
                }
            }
            ',' => {}
            literal => reversed.push(literal),
        }
    }
    reversed.into_iter().rev().collect()
}

/// Fill the fraction picture left-to-right from the rounded digits,
/// trimming trailing zeros not demanded by a `0` placeholder.
fn render_fraction(digits: &str, picture: &str) -> String {
    let min_digits = picture.chars().filter(|c| *c == '0').count();
    let mut digits: Vec<char> = digits.chars().collect();
    while digits.len() > min_digits && digits.last() == Some(&'0') {
        digits.pop();
    }
    if digits.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    let mut next = digits.into_iter();
    for c in picture.chars() {
        match c {
            '#' | '0' => match next.next() {
                Some(digit) => out.push(digit),
                None if c == '0' => out.push('0'),
                None => {}
            },
            literal => out.push(literal),
        }
    }
    out
}

/// `{N}` positional substitution. `{{`/`}}` escape literal braces; an
/// index with no corresponding value renders as empty.
pub fn format_composite(pattern: &str, values: &[String]) -> String {
    let mut out = String::new();
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut index_text = String::new();
                let mut closed = false;
                for d in chars.by_ref() {
                    if d == '}' {
                        closed = true;
                        break;
                    }
                    index_text.push(d);
                }
                match (closed, index_text.parse::<usize>()) {
                    (true, Ok(index)) => {
                        if let Some(value) = values.get(index) {
                            out.push_str(value);
                        }
                    }
                    _ => {
                        // Not a positional reference: emit as written.
                        out.push('{');
                        out.push_str(&index_text);
                        if closed {
                            out.push('}');
                        }
                    }
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_format_date_strftime() {
        assert_eq!(format_date("2010-08-26T14:30:51Z", "%Y-%m-%d"), "2010-08-26");
        assert_eq!(
            format_date("08/26/2010 02:30:51 PM", "%H:%M"),
            "14:30"
        );
        assert_eq!(format_date("2010-08-26", "%A, %B %e, %Y"), "Thursday, August 26, 2010");
    }

    #[test]
    fn test_format_date_degrades_gracefully() {
        assert_eq!(format_date("", "%Y"), "");
        assert_eq!(format_date("not a date", "%Y"), "not a date");
        assert_eq!(format_date("2010-08-26", "%Q"), "2010-08-26");
    }

    #[test]
    fn test_format_number_grouping() {
        assert_eq!(format_number("1234567890", "#,#"), "1,234,567,890");
        assert_eq!(format_number("1234567890", "#"), "1234567890");
    }

    #[test]
    fn test_format_number_zero_padding() {
        assert_eq!(format_number("123", "000000"), "000123");
        assert_eq!(format_number("123", "##"), "123");
    }

    #[test]
    fn test_format_number_fraction_rounds() {
        assert_eq!(format_number("765.4321", "#.##"), "765.43");
        assert_eq!(format_number("765.456", "#.##"), "765.46");
        assert_eq!(format_number("765", "#.##"), "765");
        assert_eq!(format_number("765.4", "#.00"), "765.40");
    }

    #[test]
    fn test_format_number_literals() {
        assert_eq!(
            format_number("12345678901", "#(###)###-####"),
            "1(234)567-8901"
        );
        assert_eq!(format_number("765.43", "$#,#.##"), "$765.43");
        assert_eq!(format_number("-765.43", "$#,#.##"), "-$765.43");
    }

    #[test]
    fn test_format_number_sections() {
        let pattern = "#.#;(#.#);**Zero**";
        assert_eq!(format_number("765.43", pattern), "765.4");
        assert_eq!(format_number("-765.43", pattern), "(765.4)");
        assert_eq!(format_number("0", pattern), "**Zero**");
    }

    #[test]
    fn test_format_number_hex() {
        assert_eq!(format_number("48813", "X"), "BEAD");
        assert_eq!(format_number("48813", "x"), "bead");
    }

    #[test]
    fn test_format_number_degrades_gracefully() {
        assert_eq!(format_number("", "#"), "");
        assert_eq!(format_number("abc", "#"), "abc");
    }

    #[test]
    fn test_format_composite() {
        assert_eq!(
            format_composite("{0} and {1}", &["a".into(), "b".into()]),
            "a and b"
        );
        assert_eq!(format_composite("{0}{2}", &["a".into()]), "a");
        assert_eq!(format_composite("{{0}}", &["a".into()]), "{0}");
        assert_eq!(format_composite("{x}", &["a".into()]), "{x}");
    }
}
