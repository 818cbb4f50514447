//! From knockoffs to selections: importance scoring, the knockoff filter and
//! multi-trial aggregation.

pub mod ako;
pub mod importance;
pub mod lasso;
pub mod progress;
pub mod result;
pub mod threshold;
