//! Row reshaping applied just before a record enters the COPY stream.
//!
//! The destination table carries one composite key column that does not exist
//! in the input: it is the concatenation of two input fields, placed at a fixed
//! column position. Every input field is passed through untouched, so a
//! transformed row always has exactly one more field than its record.

use crate::error::PipelineError;
use crate::record::{Delimiter, Record};
use std::borrow::Cow;

/// Which fields form the composite key and where it is spliced in.
///
/// All indices are zero-based. The key is `fields[first] + fields[second]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRule {
    pub position: usize,
    pub first: usize,
    pub second: usize,
}

impl Default for KeyRule {
    fn default() -> Self {
        Self {
            position: 1,
            first: 3,
            second: 2,
        }
    }
}

impl KeyRule {
    pub fn new(position: usize, first: usize, second: usize) -> Self {
        Self {
            position,
            first,
            second,
        }
    }

    /// Smallest field count a record must have for this rule to apply.
    pub fn required_fields(&self) -> usize {
        (self.first.max(self.second) + 1).max(self.position)
    }

    /// Build the transformed row for `record`.
    pub fn apply<'a>(
        &self,
        record: &'a Record,
        delimiter: Delimiter,
    ) -> Result<TransformedRow<'a>, PipelineError> {
        let fields = record.fields(delimiter);
        let required = self.required_fields();
        if fields.len() < required {
            return Err(PipelineError::MalformedRecord {
                line: record.line(),
                required,
                found: fields.len(),
                record: record.text().to_string(),
            });
        }

        let key = format!("{}{}", fields[self.first], fields[self.second]);

        let mut out: Vec<Cow<'a, str>> = Vec::with_capacity(fields.len() + 1);
        out.extend(fields[..self.position].iter().map(|f| Cow::Borrowed(*f)));
        out.push(Cow::Owned(key));
        out.extend(fields[self.position..].iter().map(|f| Cow::Borrowed(*f)));

        Ok(TransformedRow { fields: out })
    }
}

/// A record in destination column order. Lives only until the sink has it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedRow<'a> {
    fields: Vec<Cow<'a, str>>,
}

impl<'a> TransformedRow<'a> {
    pub fn fields(&self) -> &[Cow<'a, str>] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Rejoin the fields with `delimiter`. Values are not escaped.
    pub fn join(&self, delimiter: Delimiter) -> String {
        let mut sep = [0u8; 4];
        let sep: &str = delimiter.as_char().encode_utf8(&mut sep);
        self.fields.join(sep)
    }
}
