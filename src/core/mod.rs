//! Core screening logic and abstractions

pub mod cache;
pub mod config;
pub mod export;
pub mod fundamentals;
pub mod log;
pub mod metric;
pub mod request;
pub mod row;
pub mod screener;

// Re-export main types for cleaner imports
pub use fundamentals::{Fundamentals, FundamentalsProvider};
pub use metric::{PegyError, compute_pegy};
pub use request::{GrowthSource, PeMode, ScreenParams, ScreenRequest, TickerRequest};
pub use row::{FundamentalsSnapshot, ResolvedGrowth};
pub use screener::{ExclusionReason, ScreenReport, ScreenResult, run_screen};
