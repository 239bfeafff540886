//! Raw message structure: header fields, header block and body.

use regex::Regex;

use crate::error::SplitError;

/// A raw message broken into unfolded header fields and the verbatim body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage<'a> {
    /// `(name, value)` pairs in order of appearance, continuation lines joined.
    pub fields: Vec<(String, String)>,
    /// Everything after the blank line, untouched.
    pub body: &'a str,
}

impl<'a> ParsedMessage<'a> {
    /// All values of a header, matched case-insensitively.
    pub fn header_values<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s str> + 's {
        self.fields
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Parse the header section of a raw message.
///
/// Headers run until the first empty line; a line that is neither a
/// `Name: value` field nor a continuation, or running out of input before the
/// empty line, is an error.
pub fn parse_message(raw: &str) -> Result<ParsedMessage<'_>, SplitError> {
    let mut fields: Vec<(String, String)> = Vec::new();
    let mut offset = 0;

    for (idx, line) in raw.split_inclusive('\n').enumerate() {
        offset += line.len();
        let content = line.trim_end_matches('\n').trim_end_matches('\r');

        if content.is_empty() {
            return Ok(ParsedMessage {
                fields,
                body: &raw[offset..],
            });
        }

        if content.starts_with(' ') || content.starts_with('\t') {
            match fields.last_mut() {
                Some((_, value)) => {
                    value.push(' ');
                    value.push_str(content.trim());
                }
                None => {
                    return Err(SplitError::MalformedHeader {
                        line: idx + 1,
                        content: content.to_string(),
                    });
                }
            }
            continue;
        }

        match content.split_once(':') {
            Some((name, value)) if is_field_name(name) => {
                fields.push((name.to_string(), value.trim().to_string()));
            }
            _ => {
                return Err(SplitError::MalformedHeader {
                    line: idx + 1,
                    content: content.to_string(),
                });
            }
        }
    }

    Err(SplitError::MissingSeparator)
}

/// RFC 5322 field names: printable ASCII except colon, no spaces.
fn is_field_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| (33..=126).contains(&b) && b != b':')
}

/// Header block and body of one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitMessage {
    pub header: String,
    pub body: String,
}

/// Body parsing failed; whatever header text was found is kept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{error}")]
pub struct SplitFailure {
    pub partial: SplitMessage,
    pub error: SplitError,
}

/// Splits a raw message into header block and body.
#[derive(Debug, Clone)]
pub struct MessageSplitter {
    header_block: Regex,
}

impl MessageSplitter {
    pub fn new() -> Self {
        Self {
            header_block: Regex::new(r"(?s)^(.+?)\r?\n\r?\n").unwrap(),
        }
    }

    /// Split `raw` into header and body.
    ///
    /// The header is everything before the first blank line, found by plain
    /// text matching. The body comes from structural parsing and is empty if
    /// that fails; the two are independent.
    pub fn split(&self, raw: &str) -> Result<SplitMessage, SplitFailure> {
        let header = self
            .header_block
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        match parse_message(raw) {
            Ok(parsed) => Ok(SplitMessage {
                header,
                body: parsed.body.to_string(),
            }),
            Err(error) => Err(SplitFailure {
                partial: SplitMessage {
                    header,
                    body: String::new(),
                },
                error,
            }),
        }
    }
}

impl Default for MessageSplitter {
    fn default() -> Self {
        Self::new()
    }
}
