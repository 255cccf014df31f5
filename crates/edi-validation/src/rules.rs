//! Element validation rules
//!
//! Pure checks of one raw element value against an X12 primitive data type,
//! its length bounds and its code set. Nothing here knows about segments or
//! loops; the engine calls in once per bound element.

use crate::Result;
use crate::codelist::CodeSetLookup;
use chrono::{NaiveDate, NaiveTime};
use edi_ir::ViolationKind;
use edi_schema::{DataType, ElementSpec, Usage};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const NUMERIC_PATTERN: &str = r"^-?[0-9]+$";
const DECIMAL_PATTERN: &str = r"^-?(?:[0-9]+\.?[0-9]*|\.[0-9]+)$";
// Whitespace is ASCII only
const BASIC_PATTERN: &str = r#"^[A-Z0-9!"&'()*+,\-./:;?= \t\n\r\x0B\x0C]*$"#;
const EXTENDED_PATTERN: &str =
    r#"^[A-Za-z0-9!"&'()*+,\-./:;?= \t\n\r\x0B\x0C%~@\[\]_{}\\|<>#$]*$"#;

/// Character set allowed in AN and ID elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Charset {
    /// Uppercase letters, digits, `!"&'()*+,-./:;?=` and spaces
    Basic,
    /// Basic plus lowercase letters and `%~@[]_{}\|<>#$`
    #[default]
    Extended,
}

impl FromStr for Charset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" | "default" | "d" => Ok(Charset::Basic),
            "extended" | "e" => Ok(Charset::Extended),
            other => Err(format!("unknown charset '{other}'")),
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Charset::Basic => f.write_str("basic"),
            Charset::Extended => f.write_str("extended"),
        }
    }
}

/// One problem found with an element value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub kind: ViolationKind,
    pub message: String,
}

impl Finding {
    fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Validate length bounds, counted in characters
#[must_use]
pub fn validate_length(value: &str, min_length: usize, max_length: usize) -> Option<Finding> {
    let len = value.chars().count();
    if len < min_length {
        Some(Finding::new(
            ViolationKind::TooShort,
            format!("value '{value}' has length {len}, minimum is {min_length}"),
        ))
    } else if len > max_length {
        Some(Finding::new(
            ViolationKind::TooLong,
            format!("value '{value}' has length {len}, maximum is {max_length}"),
        ))
    } else {
        None
    }
}

/// Validate a `YYMMDD` or `CCYYMMDD` date
///
/// Two-digit years below 50 fall in the 2000s, the rest in the 1900s.
#[must_use]
pub fn validate_date(value: &str) -> bool {
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let (year, rest) = match value.len() {
        6 => {
            let yy: i32 = parse_digits(&value[..2]);
            (if yy < 50 { 2000 + yy } else { 1900 + yy }, &value[2..])
        }
        8 => (parse_digits(&value[..4]), &value[4..]),
        _ => return false,
    };
    let month: u32 = parse_digits(&rest[..2]);
    let day: u32 = parse_digits(&rest[2..]);
    NaiveDate::from_ymd_opt(year, month, day).is_some()
}

/// Validate an `HHMM`, `HHMMSS` or `HHMMSSdd` time
#[must_use]
pub fn validate_time(value: &str) -> bool {
    if !value.bytes().all(|b| b.is_ascii_digit()) || !matches!(value.len(), 4 | 6 | 8) {
        return false;
    }
    let hour: u32 = parse_digits(&value[..2]);
    let minute: u32 = parse_digits(&value[2..4]);
    let second: u32 = if value.len() >= 6 {
        parse_digits(&value[4..6])
    } else {
        0
    };
    NaiveTime::from_hms_opt(hour, minute, second).is_some()
}

// Callers have already checked the slice is all ASCII digits
fn parse_digits<T: FromStr + Default>(digits: &str) -> T {
    digits.parse().unwrap_or_default()
}

/// Validator for X12 primitive data types
///
/// Holds the compiled patterns so one instance can check any number of
/// values. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct DataTypeValidator {
    numeric: Regex,
    decimal: Regex,
    basic: Regex,
    extended: Regex,
    charset: Charset,
}

impl DataTypeValidator {
    /// Create a validator using `charset` for AN and ID values
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in pattern fails to compile.
    pub fn new(charset: Charset) -> Result<Self> {
        Ok(Self {
            numeric: Regex::new(NUMERIC_PATTERN)?,
            decimal: Regex::new(DECIMAL_PATTERN)?,
            basic: Regex::new(BASIC_PATTERN)?,
            extended: Regex::new(EXTENDED_PATTERN)?,
            charset,
        })
    }

    /// Charset applied by [`DataTypeValidator::validate_element`]
    #[must_use]
    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Whether `value` conforms to `data_type`, ignoring length
    #[must_use]
    pub fn conforms(&self, value: &str, data_type: DataType, charset: Charset) -> bool {
        match data_type {
            DataType::Numeric(_) => self.numeric.is_match(value),
            DataType::Decimal => self.decimal.is_match(value),
            DataType::Date => validate_date(value),
            DataType::Time => validate_time(value),
            DataType::AlphaNumeric | DataType::Identifier => match charset {
                Charset::Basic => self.basic.is_match(value),
                Charset::Extended => self.extended.is_match(value),
            },
            DataType::Binary => true,
        }
    }

    /// Check a value against a data type and length bounds
    ///
    /// Every failed check is reported; an empty value is only checked for
    /// length.
    ///
    /// # Errors
    ///
    /// Returns the findings when any check fails.
    pub fn validate(
        &self,
        value: &str,
        data_type: DataType,
        min_length: usize,
        max_length: usize,
        charset: Charset,
    ) -> std::result::Result<(), Vec<Finding>> {
        let mut findings = Vec::new();
        if !value.is_empty() && !self.conforms(value, data_type, charset) {
            findings.push(Finding::new(
                ViolationKind::InvalidDataType,
                format!("value '{value}' is not a valid {}", describe(data_type)),
            ));
        }
        findings.extend(validate_length(value, min_length, max_length));

        if findings.is_empty() {
            Ok(())
        } else {
            Err(findings)
        }
    }

    /// Run all checks for one element occurrence
    ///
    /// An empty required element yields a single `RequiredMissing`; an
    /// empty situational element yields nothing.
    #[must_use]
    pub fn validate_element(
        &self,
        value: &str,
        spec: &ElementSpec,
        usage: Usage,
        codes: &dyn CodeSetLookup,
    ) -> Vec<Finding> {
        if value.is_empty() {
            return match usage {
                Usage::Required => vec![Finding::new(
                    ViolationKind::RequiredMissing,
                    "required element is missing",
                )],
                Usage::Situational => Vec::new(),
            };
        }

        let mut findings = self
            .validate(
                value,
                spec.data_type,
                spec.min_length,
                spec.max_length,
                self.charset,
            )
            .err()
            .unwrap_or_default();

        if spec.valid_codes.is_empty() {
            if let Some(key) = spec.external_codes.as_deref() {
                if !codes.is_valid_code(key, value) {
                    findings.push(Finding::new(
                        ViolationKind::InvalidCode,
                        format!("'{value}' is not a valid code in code set '{key}'"),
                    ));
                }
            }
        } else if !spec.valid_codes.iter().any(|code| code == value) {
            findings.push(Finding::new(
                ViolationKind::InvalidCode,
                format!(
                    "'{value}' is not one of the valid codes [{}]",
                    spec.valid_codes.join(", ")
                ),
            ));
        }

        findings
    }
}

fn describe(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Numeric(_) => "numeric value",
        DataType::Decimal => "decimal number",
        DataType::Date => "date",
        DataType::Time => "time",
        DataType::AlphaNumeric => "string",
        DataType::Identifier => "identifier",
        DataType::Binary => "binary value",
    }
}
