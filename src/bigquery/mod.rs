// src/bigquery/mod.rs

pub mod client;
pub mod rows;

pub use client::{BigQuery, Job};
pub use rows::{CellValue, ResultRow};
