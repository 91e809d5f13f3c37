//! Turn-processing engine for a mortgage assistant that answers lending questions and
//! walks applicants through a slot-filling application ending in a rate lookup.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
