//! Parsed run configuration.
//!
//! The input deck is the configuration: parameter sections are read into a
//! [`ParameterList`] tree whose sublists mirror the `/`-separated section
//! names (`IO/RUNTIME VTK OUTPUT` lives in sublist `IO`, sublist
//! `RUNTIME VTK OUTPUT`).

pub mod parameters;

pub use parameters::{ParameterList, ParameterValue};
