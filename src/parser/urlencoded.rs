//! Percent-decoding and `application/x-www-form-urlencoded` pairs.

use crate::parser::error::DecodeError;
use crate::parser::param::Parameter;

/// Decode a percent-encoded string. `+` decodes to a space.
///
/// Malformed escapes are reported rather than truncated. Decoded bytes that
/// are not valid UTF-8 are replaced with U+FFFD.
pub fn url_decode(text: &str) -> Result<String, DecodeError> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let high = hex_digit(bytes.get(i + 1))?;
                let low = hex_digit(bytes.get(i + 2))?;
                out.push(high << 4 | low);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }

    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// A digit that is present but not hex is reported before a missing one.
fn hex_digit(b: Option<&u8>) -> Result<u8, DecodeError> {
    match b {
        Some(&b) => hex_value(b).ok_or(DecodeError::InvalidCharacters),
        None => Err(DecodeError::NotEnoughDigits),
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Split `a=1&b=2` into decoded parameters.
///
/// Empty pairs are skipped; a pair without `=` yields an empty value.
pub fn parse_query(query: &str, from_body: bool) -> Result<Vec<Parameter>, DecodeError> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let name = url_decode(name)?;
            let value = url_decode(value)?;
            Ok(if from_body {
                Parameter::form(name, value)
            } else {
                Parameter::query(name, value)
            })
        })
        .collect()
}
