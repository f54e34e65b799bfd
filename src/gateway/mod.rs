pub mod http;
pub mod paper;
pub mod retry;
pub mod types;

pub use http::HttpOrderGateway;
pub use paper::{PaperGatewayConfig, PaperOrderGateway};
pub use types::{CancelOutcome, OrderGateway};
