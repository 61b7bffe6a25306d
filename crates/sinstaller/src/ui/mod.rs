//! Terminal presentation: progress spinners and result summaries

pub mod spinner;
pub mod summary;
