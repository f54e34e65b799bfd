pub mod metrics;
pub mod mirror;

pub use metrics::{metrics_for, DerivedMetrics, SideLiquidity};
pub use mirror::{DeltaStatus, MakerOrder, MakerOrderError, MarketMirror, MirrorRegistry, MirrorView, OrderDelta};
