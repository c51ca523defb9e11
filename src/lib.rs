//! Geomagnetic field computation launcher.
//!
//! Collects run parameters, hands a polygon layer to an external worker
//! process and loads the NetCDF grid it produces back into a project.

pub mod artifact;
pub mod collector;
pub mod config;
pub mod host;
pub mod invoker;
pub mod worker;
