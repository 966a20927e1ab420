//! Query, form and upload parameters.

/// A request parameter taken from the query string or the request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    name: String,
    value: String,
    size: usize,
    from_body: bool,
    is_file: bool,
}

impl Parameter {
    /// A query-string parameter.
    pub fn query(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, value, false)
    }

    /// A form field carried in the request body.
    pub fn form(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, value, true)
    }

    /// A file part of a multipart body. `filename` is stored as the value.
    pub fn file(name: impl Into<String>, filename: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            value: filename.into(),
            size,
            from_body: true,
            is_file: true,
        }
    }

    fn new(name: impl Into<String>, value: impl Into<String>, from_body: bool) -> Self {
        let value = value.into();
        Self {
            name: name.into(),
            size: value.len(),
            value,
            from_body,
            is_file: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Size in bytes: the value length, or the uploaded byte count for files.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_from_body(&self) -> bool {
        self.from_body
    }

    pub fn is_file(&self) -> bool {
        self.is_file
    }
}

/// An ordered list of parameters.
///
/// Duplicates are allowed and names are matched case-sensitively; lookups
/// return the first match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<Parameter>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, param: Parameter) {
        self.entries.push(param);
    }

    /// First parameter with this name, regardless of origin.
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.entries.iter().find(|p| p.name == name)
    }

    /// First parameter with this name and origin.
    pub fn find(&self, name: &str, from_body: bool, is_file: bool) -> Option<&Parameter> {
        self.entries
            .iter()
            .find(|p| p.name == name && p.from_body == from_body && p.is_file == is_file)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(Parameter::value)
    }

    pub fn get_index(&self, index: usize) -> Option<&Parameter> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.entries.iter()
    }
}

impl Extend<Parameter> for Params {
    fn extend<I: IntoIterator<Item = Parameter>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
