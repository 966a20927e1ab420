//! `%PLACEHOLDER%` substitution applied to response content as it streams.

use std::str;

const DELIMITER: u8 = b'%';
const MAX_PLACEHOLDER_LEN: usize = 32;

/// Callback mapping a placeholder name to its replacement text.
pub type TemplateProcessor = Box<dyn Fn(&str) -> String>;

/// Streaming placeholder expander.
///
/// Content arrives in blocks, so a placeholder may start in one block and end
/// in the next. An opening `%` with no closing `%` yet is carried over until
/// more input arrives, for at most [`MAX_PLACEHOLDER_LEN`] bytes.
pub(crate) struct TemplateFilter {
    processor: TemplateProcessor,
    carry: Vec<u8>,
}

impl TemplateFilter {
    pub(crate) fn new(processor: TemplateProcessor) -> Self {
        Self {
            processor,
            carry: Vec::new(),
        }
    }

    /// Expand placeholders in `input`. With `last` set, nothing is carried over.
    pub(crate) fn process(&mut self, input: &[u8], last: bool) -> Vec<u8> {
        let mut data = std::mem::take(&mut self.carry);
        data.extend_from_slice(input);

        let mut out = Vec::with_capacity(data.len());
        let mut i = 0;
        while i < data.len() {
            if data[i] != DELIMITER {
                out.push(data[i]);
                i += 1;
                continue;
            }

            let rest = &data[i + 1..];
            let window = &rest[..rest.len().min(MAX_PLACEHOLDER_LEN + 1)];
            match window.iter().position(|&b| b == DELIMITER) {
                Some(0) => {
                    out.push(DELIMITER);
                    i += 2;
                }
                Some(end) if is_placeholder(&rest[..end]) => {
                    // is_placeholder guarantees ASCII.
                    let name = str::from_utf8(&rest[..end]).unwrap_or_default();
                    out.extend_from_slice((self.processor)(name).as_bytes());
                    i += end + 2;
                }
                None if !last && rest.len() <= MAX_PLACEHOLDER_LEN && is_placeholder(rest) => {
                    self.carry = data[i..].to_vec();
                    return out;
                }
                _ => {
                    out.push(DELIMITER);
                    i += 1;
                }
            }
        }
        out
    }
}

fn is_placeholder(name: &[u8]) -> bool {
    name.iter()
        .all(|&b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}
