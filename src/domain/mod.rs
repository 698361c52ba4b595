use std::error::Error;
use std::fmt;

pub mod artifact;
pub mod group;
pub mod metadata;
pub mod schedule;
pub mod update;
pub mod work;

labeled_enum! {
    /// Which document family an id belongs to.
    pub enum EntityKind as "entity kind" {
        Work => "work",
        Artifact => "artifact",
        Group => "group",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLabelError {
    kind: &'static str,
    value: String,
    expected: &'static [&'static str],
}

impl ParseLabelError {
    pub fn new(kind: &'static str, value: &str, expected: &'static [&'static str]) -> Self {
        Self {
            kind,
            value: value.to_string(),
            expected,
        }
    }
}

impl fmt::Display for ParseLabelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {} '{}': expected one of {}",
            self.kind,
            self.value,
            self.expected.join(", ")
        )
    }
}

impl Error for ParseLabelError {}
