//! SIR - Protocol
//!
//! The line-protocol data model shared by the front door and the backend
//! fleet. A [`Point`] is one timestamped measurement; a [`Batch`] is an
//! ordered set of points addressed to one database, retention policy and
//! timestamp precision.
//!
//! Batches render to and parse from the textual line-protocol form:
//!
//! ```text
//! weather,station=k2,region=north temp=-3.5,gusts=42i 1465839830100400200
//! ```
//!
//! # Example
//!
//! ```
//! use sir_protocol::{Batch, FieldValue, Point};
//!
//! let point = Point::new("cpu")
//!     .with_tag("host", "web01")
//!     .with_field("idle", FieldValue::Float(1.0));
//!
//! let mut batch = Batch::new("metrics", "", "s").unwrap();
//! batch.add_point(point);
//!
//! let text = batch.to_line_protocol();
//! let reparsed = Batch::parse_lines("metrics", "", "s", &text).unwrap();
//! assert_eq!(batch, reparsed);
//! ```

mod batch;
mod error;
mod point;

pub use batch::Batch;
pub use error::ProtocolError;
pub use point::{FieldValue, Point};
