//! Loading, editing and saving of clustered data tables (CDT) together with
//! their row (GTR) and column (ATR) tree files.

pub mod data;
pub mod error;
