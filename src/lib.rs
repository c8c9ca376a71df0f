//! Student Essays — synthetic student writing at sampled skill levels.
//!
//! Draws a competency triplet (knowledge, grammar, flow) for each simulated
//! student, turns it into role instructions for a text-generation service,
//! and hands the finished batch to a sink: a text file, a CSV export, or a
//! SQLite-backed record store whose data files keep their human comments.

pub mod core;
pub mod schema;
pub mod store;
