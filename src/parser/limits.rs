//! Per-connection memory bounds for the parsers.

/// Upper bounds on what a single request may make the parser buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Longest request line, header line or multipart part-header line.
    pub max_line_length: usize,
    /// Most header lines accepted in one request head.
    pub max_headers: usize,
    /// Largest URL-encoded body, and largest non-file multipart field value.
    pub max_form_size: usize,
    /// Most form fields and file parts kept from one request body.
    pub max_params: usize,
    /// Bytes of file content buffered before they are flushed to the upload callback.
    pub upload_buffer_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_line_length: 2048,
            max_headers: 64,
            max_form_size: 16 * 1024,
            max_params: 64,
            upload_buffer_size: 1460,
        }
    }
}
