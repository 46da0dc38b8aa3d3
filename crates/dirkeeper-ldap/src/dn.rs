//! Distinguished name parsing and composition.
//!
//! Used to validate entry DNs before they are normalized, to compare role DNs without regard to
//! case or spacing, and to derive container and monitor DNs from configured bases.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use dirkeeper_core::Error as CoreError;

/// Errors that can occur when parsing a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// The distinguished name was empty.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component was syntactically invalid.
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    /// A component had no attribute type before the `=`.
    #[error("distinguished name component missing attribute: {0}")]
    MissingAttribute(String),
    /// A component had no value after the `=`.
    #[error("distinguished name component missing value for attribute {0}")]
    MissingValue(String),
    /// The input ended in the middle of an escape sequence.
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
}

impl From<DistinguishedNameError> for CoreError {
    fn from(err: DistinguishedNameError) -> Self {
        CoreError::InvalidRequest(err.to_string())
    }
}

/// A single `attribute=value` assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativeDistinguishedName {
    attribute: String,
    value: String,
}

impl RelativeDistinguishedName {
    /// Creates an assertion from an attribute type and an unescaped value.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Attribute type (e.g. `cn`).
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Unescaped value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    fn same_as(&self, other: &Self) -> bool {
        self.attribute.eq_ignore_ascii_case(&other.attribute)
            && self.value.trim().eq_ignore_ascii_case(other.value.trim())
    }
}

/// Parsed distinguished name.
///
/// Keeps the canonical string form next to the parsed components. Each outer element is one RDN;
/// multi-valued RDNs (`cn=a+uid=b`) hold more than one assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinguishedName {
    canonical: String,
    rdns: Vec<Vec<RelativeDistinguishedName>>,
}

impl DistinguishedName {
    /// Parses a distinguished name, accepting both `\,` and `\2C` style escapes.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] for empty input or malformed components.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, DistinguishedNameError> {
        let input = input.as_ref().trim();
        if input.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }

        let rdns = Parser::new(input).run()?;
        Ok(Self::from_rdns(rdns))
    }

    fn from_rdns(rdns: Vec<Vec<RelativeDistinguishedName>>) -> Self {
        let canonical = render(&rdns);
        Self { canonical, rdns }
    }

    /// Borrows the canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Number of RDNs.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.rdns.len()
    }

    /// Value of the first assertion whose attribute matches (case-insensitive).
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.rdns
            .iter()
            .flatten()
            .find(|rdn| rdn.attribute.eq_ignore_ascii_case(attribute))
            .map(RelativeDistinguishedName::value)
    }

    /// Value of the leftmost RDN's first assertion.
    #[must_use]
    pub fn leaf_value(&self) -> Option<&str> {
        self.rdns
            .first()
            .and_then(|rdn| rdn.first())
            .map(RelativeDistinguishedName::value)
    }

    /// Returns true if both names denote the same entry, ignoring case and spacing.
    #[must_use]
    pub fn same_entry(&self, other: &DistinguishedName) -> bool {
        self.rdns.len() == other.rdns.len()
            && self
                .rdns
                .iter()
                .zip(&other.rdns)
                .all(|(left, right)| same_rdn(left, right))
    }

    /// Creates a child name by prefixing one RDN.
    #[must_use]
    pub fn with_prefix(mut self, rdn: RelativeDistinguishedName) -> Self {
        self.rdns.insert(0, vec![rdn]);
        Self::from_rdns(self.rdns)
    }
}

fn same_rdn(left: &[RelativeDistinguishedName], right: &[RelativeDistinguishedName]) -> bool {
    left.len() == right.len() && left.iter().all(|l| right.iter().any(|r| l.same_as(r)))
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl FromStr for DistinguishedName {
    type Err = DistinguishedNameError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<DistinguishedName> for String {
    fn from(value: DistinguishedName) -> Self {
        value.canonical
    }
}

/// Single-pass splitter over `,` (RDN), `+` (multi-valued RDN) and the first unescaped `=`.
struct Parser<'a> {
    input: &'a str,
    rdns: Vec<Vec<RelativeDistinguishedName>>,
    current: Vec<RelativeDistinguishedName>,
    attribute: Option<String>,
    buffer: Vec<u8>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            rdns: Vec::new(),
            current: Vec::new(),
            attribute: None,
            buffer: Vec::new(),
        }
    }

    fn run(
        mut self,
    ) -> std::result::Result<Vec<Vec<RelativeDistinguishedName>>, DistinguishedNameError> {
        let mut chars = self.input.chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                '\\' => {
                    let first = chars.next().ok_or(DistinguishedNameError::UnterminatedEscape)?;
                    let hex_pair = first
                        .to_digit(16)
                        .zip(chars.peek().and_then(|second| second.to_digit(16)));
                    if let Some((high, low)) = hex_pair {
                        chars.next();
                        // both digits are < 16, so the byte cannot overflow
                        self.buffer.push(u8::try_from(high * 16 + low).unwrap_or_default());
                    } else {
                        self.push_char(first);
                    }
                }
                '=' if self.attribute.is_none() => {
                    let attribute = self.take_buffer()?.trim().to_string();
                    if attribute.is_empty() {
                        return Err(DistinguishedNameError::MissingAttribute(
                            self.input.to_string(),
                        ));
                    }
                    self.attribute = Some(attribute);
                }
                '+' => self.finish_assertion()?,
                ',' | ';' => {
                    self.finish_assertion()?;
                    self.rdns.push(std::mem::take(&mut self.current));
                }
                other => self.push_char(other),
            }
        }

        self.finish_assertion()?;
        self.rdns.push(std::mem::take(&mut self.current));
        Ok(self.rdns)
    }

    fn push_char(&mut self, ch: char) {
        let mut encoded = [0_u8; 4];
        self.buffer
            .extend_from_slice(ch.encode_utf8(&mut encoded).as_bytes());
    }

    fn take_buffer(&mut self) -> std::result::Result<String, DistinguishedNameError> {
        String::from_utf8(std::mem::take(&mut self.buffer))
            .map_err(|_| DistinguishedNameError::InvalidComponent(self.input.to_string()))
    }

    fn finish_assertion(&mut self) -> std::result::Result<(), DistinguishedNameError> {
        let raw = self.take_buffer()?;
        let Some(attribute) = self.attribute.take() else {
            return Err(DistinguishedNameError::InvalidComponent(if raw.trim().is_empty() {
                self.input.to_string()
            } else {
                raw
            }));
        };
        let value = raw.trim();
        if value.is_empty() {
            return Err(DistinguishedNameError::MissingValue(attribute));
        }
        self.current
            .push(RelativeDistinguishedName::new(attribute, value));
        Ok(())
    }
}

fn escape_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut escaped = String::with_capacity(value.len());
    for (idx, ch) in value.chars().enumerate() {
        let special = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (idx == 0 && matches!(ch, ' ' | '#'))
            || (idx == last && ch == ' ');
        if special {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn render(rdns: &[Vec<RelativeDistinguishedName>]) -> String {
    rdns.iter()
        .map(|rdn| {
            rdn.iter()
                .map(|ava| format!("{}={}", ava.attribute, escape_value(&ava.value)))
                .collect::<Vec<_>>()
                .join("+")
        })
        .collect::<Vec<_>>()
        .join(",")
}
