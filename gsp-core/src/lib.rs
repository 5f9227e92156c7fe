pub mod config;
pub mod dataset;
pub mod diagnostic;
pub mod error;
pub mod grid;
pub mod series;
pub mod site;
