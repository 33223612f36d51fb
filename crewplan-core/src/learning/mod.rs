//! Feedback-driven learning loop: collection, pattern analysis and weight adjustment

pub mod adjuster;
pub mod collector;
pub mod patterns;

pub use adjuster::{WeightAdjuster, WeightAdjustment};
pub use collector::{wants_continuation, CollectedFeedback, FeedbackCollector};
pub use patterns::{PatternAnalyzer, PatternReport, SkippedStrategy, StrategySignal};
