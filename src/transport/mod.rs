pub mod fallback;
pub mod poll;
pub mod push;
pub mod types;

pub use fallback::FallbackTransport;
pub use poll::PollTransport;
pub use push::PushTransport;
pub use types::{DeltaHandler, Subscription, Transport, WireMakerOrder};
