//! Correlation token extraction from subject lines.

use regex::Regex;

/// Pulls the correlation token out of a subject line.
///
/// The token is the run of non-whitespace characters after the marker, and it
/// must be the last thing in the subject (trailing whitespace is fine).
#[derive(Debug, Clone)]
pub struct TokenExtractor {
    regex: Regex,
}

impl TokenExtractor {
    /// Build an extractor for the given literal marker.
    pub fn new(marker: &str) -> Result<Self, regex::Error> {
        let pattern = format!(r"{}\s*?(\S+)\s*?$", regex::escape(marker));
        Ok(Self {
            regex: Regex::new(&pattern)?,
        })
    }

    /// Extract the token, or `None` when the marker is missing or not trailing.
    pub fn extract<'a>(&self, subject: &'a str) -> Option<&'a str> {
        self.regex
            .captures(subject)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

impl Default for TokenExtractor {
    fn default() -> Self {
        Self {
            regex: Regex::new(r"guid:\s*?(\S+)\s*?$").unwrap(),
        }
    }
}
