//! Admission exam leveling report.
//!
//! Reads an exam results workbook, classifies every student's attendance,
//! admission condition and required leveling areas, and writes the results
//! workbook consumed by the enrollment system.

pub mod analyzer;
pub mod errors;
pub mod models;
pub mod normalizer;
pub mod progress;
pub mod reader;
pub mod writer;
