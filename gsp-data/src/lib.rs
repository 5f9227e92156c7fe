//! Per-site processing stages for GSP power-meter exports.
//!
//! Each stage takes the output of the previous one by value:
//! [`ingest`] → [`sanitize`] → [`dedupe`] → [`interpolation`], and
//! [`align`] joins the normalized series of many sites into one table.

pub mod align;
pub mod dedupe;
pub mod ingest;
pub mod interpolation;
pub mod sanitize;
