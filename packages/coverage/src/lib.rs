#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Coverage resolution for population areas.
//!
//! The heart of the pipeline: resolves every area to its minimum covering
//! time band in two phases (representative-point join, then a polygon
//! fallback for the areas the point test missed), attributes each covered
//! area to its fastest provider, and assembles one tagged result row per
//! area. The three phase outputs partition the area set exactly; the
//! assembler refuses to produce output if they do not.

pub mod assemble;
pub mod attribute;
pub mod progress;
pub mod resolver;

use thiserror::Error;

/// Partition-invariant violations caught at assembly time.
///
/// Any of these means a logic defect in phase separation, not bad input
/// data; the run halts before writing output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    /// An area id appeared in more than one phase (or twice in one phase).
    #[error("Area '{area_id}' appears in more than one resolution phase")]
    DuplicateArea {
        /// The double-counted identifier.
        area_id: String,
    },

    /// A phase produced an area id that was never in the input set.
    #[error("Area '{area_id}' is not in the input area set")]
    UnknownArea {
        /// The foreign identifier.
        area_id: String,
    },

    /// An input area id is missing from every phase.
    #[error("Area '{area_id}' is missing from all resolution phases")]
    MissingArea {
        /// The dropped identifier.
        area_id: String,
    },
}
