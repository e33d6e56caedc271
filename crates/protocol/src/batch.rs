//! Batch model
//!
//! A [`Batch`] is the unit the relay routes and buffers: an ordered list of
//! points addressed to one database, retention policy and precision. Two
//! batches sharing all three of those (the coalescing key) may be merged
//! into one.

use crate::error::ProtocolError;
use crate::point::Point;

/// A database write unit
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    database: String,
    retention_policy: String,
    precision: String,
    points: Vec<Point>,
}

impl Batch {
    /// Create an empty batch
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::EmptyDatabase`] when `database` is empty.
    pub fn new(
        database: impl Into<String>,
        retention_policy: impl Into<String>,
        precision: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        let database = database.into();
        if database.is_empty() {
            return Err(ProtocolError::EmptyDatabase);
        }
        Ok(Self {
            database,
            retention_policy: retention_policy.into(),
            precision: precision.into(),
            points: Vec::new(),
        })
    }

    /// Parse a newline-separated block of line protocol into a batch
    ///
    /// Blank lines are skipped. Any malformed line fails the whole batch
    /// with the 1-based line number attached.
    pub fn parse_lines(
        database: impl Into<String>,
        retention_policy: impl Into<String>,
        precision: impl Into<String>,
        text: &str,
    ) -> Result<Self, ProtocolError> {
        let mut batch = Self::new(database, retention_policy, precision)?;
        for (number, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let point = Point::parse(line).map_err(|e| e.at_line(number + 1))?;
            batch.points.push(point);
        }
        Ok(batch)
    }

    /// Append a point
    pub fn add_point(&mut self, point: Point) {
        self.points.push(point);
    }

    /// Database name (never empty)
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Retention policy (may be empty)
    pub fn retention_policy(&self) -> &str {
        &self.retention_policy
    }

    /// Timestamp precision unit (may be empty, meaning nanoseconds)
    pub fn precision(&self) -> &str {
        &self.precision
    }

    /// The points, in insertion order
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Number of points
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// True when the batch holds no points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The coalescing key: (database, retention policy, precision)
    pub fn coalesce_key(&self) -> (&str, &str, &str) {
        (&self.database, &self.retention_policy, &self.precision)
    }

    /// Whether `other` may be merged into this batch
    pub fn can_coalesce(&self, other: &Batch) -> bool {
        self.coalesce_key() == other.coalesce_key()
    }

    /// Append all of `other`'s points after this batch's points
    ///
    /// Callers group by [`Self::coalesce_key`] first; merging batches with
    /// different keys loses the other batch's addressing.
    pub fn merge(&mut self, other: Batch) {
        debug_assert!(self.can_coalesce(&other));
        self.points.extend(other.points);
    }

    /// Render all points as newline-joined line protocol
    pub fn to_line_protocol(&self) -> String {
        let mut out = String::new();
        for (i, point) in self.points.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&point.to_string());
        }
        out
    }
}

#[cfg(test)]
#[path = "batch_test.rs"]
mod batch_test;
