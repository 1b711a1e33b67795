//! Records, batches and the field delimiter.

use crate::error::PipelineError;
use std::fmt;
use std::str::FromStr;

/// Field separator used both to split input lines and inside the COPY stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiter(char);

impl Delimiter {
    pub const COMMA: Delimiter = Delimiter(',');
    pub const TAB: Delimiter = Delimiter('\t');

    /// Parse the command-line form: one ASCII character, or the escape `\t`.
    ///
    /// The COPY stream is byte-oriented, so multibyte characters are rejected.
    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        if s == "\\t" {
            return Ok(Self::TAB);
        }

        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii() && c != '\n' && c != '\r' => Ok(Self(c)),
            _ => Err(PipelineError::InvalidConfig(format!(
                "delimiter must be a single ASCII character or \\t, got {s:?}"
            ))),
        }
    }

    pub fn as_char(self) -> char {
        self.0
    }

    pub fn is_tab(self) -> bool {
        self.0 == '\t'
    }

    /// Characters text-format COPY reserves for escapes and `\.` markers.
    pub fn is_reserved_in_text_copy(self) -> bool {
        matches!(self.0, '\\' | '.' | 'a'..='z' | '0'..='9')
    }
}

impl Default for Delimiter {
    fn default() -> Self {
        Self::COMMA
    }
}

impl FromStr for Delimiter {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_tab() {
            f.write_str("\\t")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// One raw input line, tagged with its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    line: u64,
    text: String,
}

impl Record {
    pub fn new(line: u64, text: impl Into<String>) -> Self {
        Self {
            line,
            text: text.into(),
        }
    }

    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Split the line on `delimiter`. An empty line yields one empty field.
    pub fn fields(&self, delimiter: Delimiter) -> Vec<&str> {
        self.text.split(delimiter.as_char()).collect()
    }
}

/// An ordered group of records loaded in a single transaction.
///
/// Batches are never mutated after the batcher publishes them; the worker that
/// dequeues one owns it outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    sequence: u64,
    records: Vec<Record>,
}

impl Batch {
    pub fn new(sequence: u64, records: Vec<Record>) -> Self {
        Self { sequence, records }
    }

    /// Position of this batch in production order, starting at 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delimiter_parse_single_char() {
        assert_eq!(Delimiter::parse(",").unwrap(), Delimiter::COMMA);
        assert_eq!(Delimiter::parse("|").unwrap().as_char(), '|');
    }

    #[test]
    fn test_delimiter_parse_tab_escape() {
        let escaped = Delimiter::parse("\\t").unwrap();
        assert!(escaped.is_tab());
        assert_eq!(Delimiter::parse("\t").unwrap(), escaped);
        assert_eq!(escaped.to_string(), "\\t");
    }

    #[test]
    fn test_delimiter_rejects_bad_input() {
        assert!(Delimiter::parse("").is_err());
        assert!(Delimiter::parse(",,").is_err());
        assert!(Delimiter::parse("\n").is_err());
        assert!(Delimiter::parse("\r").is_err());
    }

    #[test]
    fn test_delimiter_must_be_one_byte() {
        assert!(matches!(
            Delimiter::parse("§"),
            Err(PipelineError::InvalidConfig(_))
        ));
        assert!(Delimiter::parse("é").is_err());
        assert!(Delimiter::parse("~").is_ok());
    }

    #[test]
    fn test_text_copy_reserved_delimiters() {
        for reserved in ["\\", ".", "a", "z", "0", "5"] {
            assert!(
                Delimiter::parse(reserved).unwrap().is_reserved_in_text_copy(),
                "{reserved:?} should be reserved"
            );
        }
        for usable in [",", "|", ";", "\\t", "A", "~"] {
            assert!(!Delimiter::parse(usable).unwrap().is_reserved_in_text_copy());
        }
    }

    #[test]
    fn test_record_fields() {
        let record = Record::new(7, "a,b,,d");
        assert_eq!(record.line(), 7);
        assert_eq!(record.fields(Delimiter::COMMA), vec!["a", "b", "", "d"]);
        assert_eq!(Record::new(1, "").fields(Delimiter::COMMA), vec![""]);
    }
}
