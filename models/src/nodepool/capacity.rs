use super::error::{self, MarkerError};

use snafu::{ensure, ResultExt};
use std::fmt;
use std::str::FromStr;
use tracing::{event, Level};

const MARKER_SEPARATOR: char = '/';
const MARKER_FIELDS: usize = 3;

/// The min/max/count triple of a node pool, as remembered by a capacity marker.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CapacityRange {
    pub min: i32,
    pub max: i32,
    pub count: i32,
}

impl CapacityRange {
    pub fn new(min: i32, max: i32, count: i32) -> Self {
        CapacityRange { min, max, count }
    }

    /// Encodes the range into its `min/max/count` marker form.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Decodes a `min/max/count` marker.
    ///
    /// `count` is load-bearing: if it cannot be parsed the whole marker is rejected. An unparsable
    /// `min` or `max` falls back to `count` independently of the other.
    pub fn decode(marker: &str) -> Result<Self, MarkerError> {
        let fields: Vec<&str> = marker.split(MARKER_SEPARATOR).collect();
        ensure!(
            fields.len() == MARKER_FIELDS,
            error::FieldCountSnafu {
                marker,
                fields: fields.len(),
            }
        );

        let count = fields[2]
            .parse::<i32>()
            .context(error::CountSnafu { marker })?;
        let min = parse_or_count(marker, "min", fields[0], count);
        let max = parse_or_count(marker, "max", fields[1], count);

        Ok(CapacityRange { min, max, count })
    }
}

fn parse_or_count(marker: &str, field: &str, value: &str, count: i32) -> i32 {
    value.parse::<i32>().unwrap_or_else(|err| {
        event!(
            Level::WARN,
            marker,
            field,
            error = %err,
            "Unable to parse capacity marker field, falling back to count."
        );
        count
    })
}

impl fmt::Display for CapacityRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.min,
            self.max,
            self.count,
            sep = MARKER_SEPARATOR
        )
    }
}

impl FromStr for CapacityRange {
    type Err = MarkerError;

    fn from_str(marker: &str) -> Result<Self, Self::Err> {
        Self::decode(marker)
    }
}

/// Encodes a min/max/count triple into a capacity marker.
pub fn encode_capacity(min: i32, max: i32, count: i32) -> String {
    CapacityRange::new(min, max, count).encode()
}

/// Decodes a capacity marker produced by `encode_capacity`.
pub fn decode_capacity(marker: &str) -> Result<CapacityRange, MarkerError> {
    CapacityRange::decode(marker)
}
