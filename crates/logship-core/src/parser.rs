//! RecordParser — turns raw access-log lines into [`LogRecord`] values.
//!
//! A line is split on any run of `[`, `]`, `"` or space, then read through a
//! [`FieldLayout`] that names each position once. A line too short for the
//! layout is a [`ParseError::SchemaMismatch`], never an out-of-range panic.
//!
//! Numeric fields are lenient by default: a value that does not parse (nginx
//! writes `-` when there was no upstream) reads as zero. With
//! `strict_numbers` it is a [`ParseError::Number`] instead.

use crate::config::ParserConfig;
use crate::error::{ConfigError, ParseError};
use crate::types::LogRecord;
use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

fn delimiters() -> &'static Regex {
    static DELIMITERS: OnceLock<Regex> = OnceLock::new();
    DELIMITERS.get_or_init(|| Regex::new(r#"[\[\]" ]+"#).expect("delimiter pattern is valid"))
}

/// Split a line into positional fields.
///
/// Leading or trailing delimiters produce empty fields, so positions stay
/// stable for lines that start or end with a bracket or quote.
pub fn split_fields(line: &str) -> Vec<&str> {
    delimiters().split(line).collect()
}

// ---------------------------------------------------------------------------
// Field layout
// ---------------------------------------------------------------------------

/// Built-in field layouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutPreset {
    /// `ip - - [date zone] scheme "METHOD path proto" status bytes "ref" "ua" "xff" request_time upstream_time`
    ///
    /// Request time shares the upstream position; see [`FieldLayout::timings_shared`].
    #[default]
    NginxUpstream,
    /// `ip - - [date zone] "METHOD path proto" status bytes upstream_time request_time`
    ///
    /// There is no scheme column, so `scheme` reads the protocol.
    CombinedTiming,
}

/// Per-field position overrides from `[parser.fields]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldOverrides {
    pub date: Option<usize>,
    pub zone: Option<usize>,
    pub scheme: Option<usize>,
    pub method: Option<usize>,
    pub path: Option<usize>,
    pub status: Option<usize>,
    pub bytes_sent: Option<usize>,
    pub upstream_time: Option<usize>,
    pub request_time: Option<usize>,
}

/// Two fields other than the timing pair read the same position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fields {first} and {second} both read position {index}")]
pub struct LayoutError {
    pub first: &'static str,
    pub second: &'static str,
    pub index: usize,
}

/// Named positions of every field the parser extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    pub date: usize,
    pub zone: usize,
    pub scheme: usize,
    pub method: usize,
    pub path: usize,
    pub status: usize,
    pub bytes_sent: usize,
    pub upstream_time: usize,
    pub request_time: usize,
}

/// A line's fields looked up by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedFields<'a> {
    pub date: &'a str,
    pub zone: &'a str,
    pub scheme: &'a str,
    pub method: &'a str,
    pub path: &'a str,
    pub status: &'a str,
    pub bytes_sent: &'a str,
    pub upstream_time: &'a str,
    pub request_time: &'a str,
}

impl FieldLayout {
    pub fn preset(preset: LayoutPreset) -> Self {
        match preset {
            LayoutPreset::NginxUpstream => Self {
                date: 3,
                zone: 4,
                scheme: 5,
                method: 6,
                path: 7,
                status: 9,
                bytes_sent: 10,
                upstream_time: 15,
                request_time: 15,
            },
            LayoutPreset::CombinedTiming => Self {
                date: 3,
                zone: 4,
                method: 5,
                path: 6,
                scheme: 7,
                status: 8,
                bytes_sent: 9,
                upstream_time: 10,
                request_time: 11,
            },
        }
    }

    pub fn with_overrides(mut self, overrides: &FieldOverrides) -> Self {
        let pairs = [
            (&mut self.date, overrides.date),
            (&mut self.zone, overrides.zone),
            (&mut self.scheme, overrides.scheme),
            (&mut self.method, overrides.method),
            (&mut self.path, overrides.path),
            (&mut self.status, overrides.status),
            (&mut self.bytes_sent, overrides.bytes_sent),
            (&mut self.upstream_time, overrides.upstream_time),
            (&mut self.request_time, overrides.request_time),
        ];
        for (slot, value) in pairs {
            if let Some(index) = value {
                *slot = index;
            }
        }
        self
    }

    fn named(&self) -> [(&'static str, usize); 9] {
        [
            ("date", self.date),
            ("zone", self.zone),
            ("scheme", self.scheme),
            ("method", self.method),
            ("path", self.path),
            ("status", self.status),
            ("bytes_sent", self.bytes_sent),
            ("upstream_time", self.upstream_time),
            ("request_time", self.request_time),
        ]
    }

    /// Fewest fields a line needs for every position to exist.
    pub fn min_fields(&self) -> usize {
        self.named().iter().map(|(_, i)| i + 1).max().unwrap_or(0)
    }

    /// Both timing fields read the same position, so they always agree.
    pub fn timings_shared(&self) -> bool {
        self.upstream_time == self.request_time
    }

    /// Every field must have its own position, except the timing pair.
    pub fn validate(&self) -> Result<(), LayoutError> {
        let named = self.named();
        for (i, (first, a)) in named.iter().enumerate() {
            for (second, b) in &named[i + 1..] {
                let timing_pair = *first == "upstream_time" && *second == "request_time";
                if a == b && !timing_pair {
                    return Err(LayoutError {
                        first,
                        second,
                        index: *a,
                    });
                }
            }
        }
        Ok(())
    }

    /// Look the layout's fields up in a split line.
    pub fn extract<'a>(&self, fields: &[&'a str]) -> Result<NamedFields<'a>, ParseError> {
        let needed = self.min_fields();
        if fields.len() < needed {
            return Err(ParseError::SchemaMismatch {
                needed,
                found: fields.len(),
            });
        }
        Ok(NamedFields {
            date: fields[self.date],
            zone: fields[self.zone],
            scheme: fields[self.scheme],
            method: fields[self.method],
            path: fields[self.path],
            status: fields[self.status],
            bytes_sent: fields[self.bytes_sent],
            upstream_time: fields[self.upstream_time],
            request_time: fields[self.request_time],
        })
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Stateless line parser; one instance can be shared by every parser task.
#[derive(Debug, Clone)]
pub struct RecordParser {
    layout: FieldLayout,
    zone: Tz,
    timestamp_format: String,
    strict_numbers: bool,
}

/// Why a [`RecordParser`] could not be built from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParserSetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

impl RecordParser {
    pub fn new(config: &ParserConfig) -> Result<Self, ParserSetupError> {
        let layout = FieldLayout::preset(config.layout).with_overrides(&config.fields);
        layout.validate()?;
        let zone = config
            .timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::TimeZone(config.timezone.clone()))?;
        Ok(Self::from_parts(
            layout,
            zone,
            config.timestamp_format.clone(),
            config.strict_numbers,
        ))
    }

    pub fn from_parts(
        layout: FieldLayout,
        zone: Tz,
        timestamp_format: impl Into<String>,
        strict_numbers: bool,
    ) -> Self {
        Self {
            layout,
            zone,
            timestamp_format: timestamp_format.into(),
            strict_numbers,
        }
    }

    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    /// Parse one raw line (newline already stripped).
    ///
    /// Invalid UTF-8 is replaced rather than rejected; the extracted strings
    /// are otherwise verbatim.
    pub fn parse(&self, line: &[u8]) -> Result<LogRecord, ParseError> {
        let text = String::from_utf8_lossy(line);
        let fields = split_fields(&text);
        let named = self.layout.extract(&fields)?;

        let timestamp = self.parse_timestamp(named.date, named.zone)?;

        Ok(LogRecord {
            timestamp,
            bytes_sent: self.number("bytes_sent", named.bytes_sent)?,
            path: named.path.to_string(),
            method: named.method.to_string(),
            scheme: named.scheme.to_string(),
            status: named.status.to_string(),
            upstream_time: self.number("upstream_time", named.upstream_time)?,
            request_time: self.number("request_time", named.request_time)?,
        })
    }

    fn parse_timestamp(&self, date: &str, zone: &str) -> Result<chrono::DateTime<Tz>, ParseError> {
        let value = format!("{date} {zone}");
        // The offset text is matched but not applied: the wall clock is
        // interpreted in the configured zone.
        let naive = NaiveDateTime::parse_from_str(&value, &self.timestamp_format).map_err(|e| {
            ParseError::Timestamp {
                value: value.clone(),
                reason: e.to_string(),
            }
        })?;
        self.zone
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| ParseError::LocalTime {
                value,
                zone: self.zone.name().to_string(),
            })
    }

    fn number<T: FromStr + Default>(&self, field: &'static str, value: &str) -> Result<T, ParseError> {
        match value.parse::<T>() {
            Ok(n) => Ok(n),
            Err(_) if self.strict_numbers => Err(ParseError::Number {
                field,
                value: value.to_string(),
            }),
            Err(_) => Ok(T::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
