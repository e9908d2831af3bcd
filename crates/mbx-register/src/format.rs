//! A small printf-style formatter for the `text` format strings used
//! throughout the vendor drivers (e.g. `'%.2f kWh'`, `'%d W'`).
//! Supports the subset `register.py`'s drivers actually use: `%d`,
//! `%.<N>f`, `%s`, `%%`.

use crate::register::RegisterValue;

pub fn format_value(fmt: &str, value: &RegisterValue) -> String {
    let mut out = String::with_capacity(fmt.len());
    let mut chars = fmt.chars().peekable();
    let mut consumed = false;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some('d') => {
                chars.next();
                out.push_str(&format_int(value));
                consumed = true;
            }
            Some('s') => {
                chars.next();
                out.push_str(&format_display(value));
                consumed = true;
            }
            Some('.') => {
                chars.next();
                let mut digits = String::new();
                while let Some(d) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(*d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if chars.peek() == Some(&'f') {
                    chars.next();
                    let prec: usize = digits.parse().unwrap_or(2);
                    out.push_str(&format_float(value, prec));
                    consumed = true;
                }
            }
            _ => out.push('%'),
        }
    }

    if !consumed {
        out = format_display(value);
    }
    out
}

fn format_int(value: &RegisterValue) -> String {
    match value {
        RegisterValue::Int(v) => v.to_string(),
        RegisterValue::Float(v) => (*v as i64).to_string(),
        RegisterValue::Text(s) => s.clone(),
        RegisterValue::Bits(b) => format!("{b:?}"),
    }
}

fn format_float(value: &RegisterValue, prec: usize) -> String {
    match value {
        RegisterValue::Int(v) => format!("{:.*}", prec, *v as f64),
        RegisterValue::Float(v) => format!("{v:.prec$}"),
        RegisterValue::Text(s) => s.clone(),
        RegisterValue::Bits(b) => format!("{b:?}"),
    }
}

fn format_display(value: &RegisterValue) -> String {
    match value {
        RegisterValue::Int(v) => v.to_string(),
        RegisterValue::Float(v) => v.to_string(),
        RegisterValue::Text(s) => s.clone(),
        RegisterValue::Bits(b) => format!("{b:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_watts() {
        assert_eq!(format_value("%d W", &RegisterValue::Int(230)), "230 W");
    }

    #[test]
    fn formats_kwh_with_precision() {
        assert_eq!(
            format_value("%.2f kWh", &RegisterValue::Float(12.345)),
            "12.35 kWh"
        );
    }

    #[test]
    fn passes_through_plain_text() {
        assert_eq!(
            format_value("%s", &RegisterValue::Text("abc".into())),
            "abc"
        );
    }
}
