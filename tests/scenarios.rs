//! End-to-end scenario tests driving `MakerCore` against a scriptable fake
//! transport and the paper order gateway. Each test mirrors one of the
//! quoting scenarios the core is built around: first quote, repost on market
//! movement, risk pause, partial fill, a fill landing on an already-cancelled
//! order, and completion.

use async_trait::async_trait;
use makerbot_core::book::{DeltaStatus, MakerOrder, OrderDelta};
use makerbot_core::config::CoreConfig;
use makerbot_core::errors::CoreError;
use makerbot_core::gateway::{PaperGatewayConfig, PaperOrderGateway};
use makerbot_core::ids::{MakerId, MarketId};
use makerbot_core::position::{PositionSpec, Side};
use makerbot_core::transport::{DeltaHandler, Subscription, Transport, WireMakerOrder};
use makerbot_core::MakerCore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;
use std::time::Duration;

const ODDS_UNIT: u64 = 1_000_000;
const LADDER_STEP: u64 = 1_000;

/// A `Transport` whose snapshot and subscription the test controls directly:
/// `push` hands a delta batch straight to whatever handler `subscribe`
/// registered, synchronously, as if it had just arrived off the wire.
struct FakeTransport {
    snapshot: Mutex<Vec<MakerOrder>>,
    registered: Mutex<Option<(MarketId, DeltaHandler)>>,
    sequence: AtomicU64,
}

impl FakeTransport {
    fn new(initial_snapshot: Vec<MakerOrder>) -> Arc<Self> {
        Arc::new(Self {
            snapshot: Mutex::new(initial_snapshot),
            registered: Mutex::new(None),
            sequence: AtomicU64::new(100),
        })
    }

    fn next_update_time(&self) -> u64 {
        self.sequence.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }

    fn push(&self, deltas: Vec<OrderDelta>) {
        let registered = self.registered.lock();
        let (market_id, handler) = registered.as_ref().expect("subscribe not called yet");
        handler(market_id.clone(), deltas);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch_snapshot(&self, _market_id: &MarketId) -> Result<Vec<MakerOrder>, CoreError> {
        Ok(self.snapshot.lock().clone())
    }

    fn subscribe(&self, market_id: MarketId, handler: DeltaHandler) -> Subscription {
        *self.registered.lock() = Some((market_id, handler));
        Subscription::new(Arc::new(AtomicBool::new(false)))
    }
}

fn counterparty_order(id: &str, side_a: bool, odds_wire: u64, stake: u64, update_time: u64) -> MakerOrder {
    WireMakerOrder {
        id: id.to_string(),
        market_id: "m1".to_string(),
        maker_id: "counterparty".to_string(),
        total_stake: stake,
        filled_stake: 0,
        maker_odds: odds_wire,
        maker_side_is_a: side_a,
        update_time,
    }
    .into_maker_order(ODDS_UNIT)
    .unwrap()
}

fn own_order_delta(order_id: &str, side_a: bool, odds_wire: u64, total_stake: u64, filled_stake: u64, update_time: u64) -> OrderDelta {
    OrderDelta {
        order: WireMakerOrder {
            id: order_id.to_string(),
            market_id: "m1".to_string(),
            maker_id: "self-maker".to_string(),
            total_stake,
            filled_stake,
            maker_odds: odds_wire,
            maker_side_is_a: side_a,
            update_time,
        }
        .into_maker_order(ODDS_UNIT)
        .unwrap(),
        status: DeltaStatus::Active,
    }
}

fn test_config() -> Arc<CoreConfig> {
    Arc::new(CoreConfig {
        min_order_update_interval: Duration::from_millis(0),
        ..CoreConfig::default()
    })
}

fn test_gateway() -> Arc<PaperOrderGateway> {
    Arc::new(PaperOrderGateway::new(PaperGatewayConfig {
        base_latency: Duration::from_millis(1),
        latency_jitter: Duration::from_millis(1),
        ladder_step: LADDER_STEP,
        odds_unit: ODDS_UNIT,
        ..PaperGatewayConfig::default()
    }))
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

#[tokio::test]
async fn s1_basic_quote_placement() {
    let transport = FakeTransport::new(vec![counterparty_order("cp1", false, 600_000, 100, 1)]);
    let core = MakerCore::new(
        MakerId::new("self-maker"),
        transport.clone(),
        test_gateway(),
        test_config(),
    );

    let id = core
        .create_position(PositionSpec {
            market_id: MarketId::new("m1"),
            chosen_side: Side::A,
            max_stake: 50,
            premium_bps: 1_000,
            max_vig: 100_000,
            min_liquidity: 0,
            min_for_odds: 10,
            min_for_vig: 10,
        })
        .await
        .unwrap();
    settle().await;

    let position = core.get_position(id).unwrap();
    assert!(position.active_order_id.is_some());
    assert_eq!(position.last_quoted_maker_odds, Some(360_000));
}

#[tokio::test]
async fn s2_market_moves_order_reposted() {
    let transport = FakeTransport::new(vec![counterparty_order("cp1", false, 600_000, 100, 1)]);
    let core = MakerCore::new(
        MakerId::new("self-maker"),
        transport.clone(),
        test_gateway(),
        test_config(),
    );

    let id = core
        .create_position(PositionSpec {
            market_id: MarketId::new("m1"),
            chosen_side: Side::A,
            max_stake: 50,
            premium_bps: 1_000,
            max_vig: 100_000,
            min_liquidity: 0,
            min_for_odds: 10,
            min_for_vig: 10,
        })
        .await
        .unwrap();
    settle().await;
    let first_order = core.get_position(id).unwrap().active_order_id;

    let t = transport.next_update_time();
    transport.push(vec![OrderDelta {
        order: counterparty_order("cp2", false, 650_000, 100, t),
        status: DeltaStatus::Active,
    }]);
    settle().await;

    let position = core.get_position(id).unwrap();
    assert_ne!(position.active_order_id, first_order);
    assert_eq!(position.last_quoted_maker_odds, Some(315_000));
}

#[tokio::test]
async fn s3_vig_breach_pauses_until_recovery() {
    let transport = FakeTransport::new(vec![counterparty_order("cp1", false, 600_000, 100, 1)]);
    let core = MakerCore::new(
        MakerId::new("self-maker"),
        transport.clone(),
        test_gateway(),
        test_config(),
    );

    let id = core
        .create_position(PositionSpec {
            market_id: MarketId::new("m1"),
            chosen_side: Side::A,
            max_stake: 50,
            premium_bps: 1_000,
            max_vig: 10_000,
            min_liquidity: 0,
            min_for_odds: 10,
            min_for_vig: 10,
        })
        .await
        .unwrap();
    settle().await;
    assert!(core.get_position(id).unwrap().active_order_id.is_some());

    // Matching side-A maker pushes vig well past 10_000 (1%).
    let t = transport.next_update_time();
    transport.push(vec![OrderDelta {
        order: counterparty_order("cp-a", true, 300_000, 100, t),
        status: DeltaStatus::Active,
    }]);
    settle().await;

    let position = core.get_position(id).unwrap();
    assert_eq!(position.status, makerbot_core::PositionStatus::RiskPaused);
    assert!(position.active_order_id.is_none());

    // Vig drops back: remove the side-A maker.
    let t = transport.next_update_time();
    transport.push(vec![OrderDelta {
        order: counterparty_order("cp-a", true, 300_000, 100, t),
        status: DeltaStatus::Inactive,
    }]);
    settle().await;

    let position = core.get_position(id).unwrap();
    assert_eq!(position.status, makerbot_core::PositionStatus::Active);
    assert!(position.active_order_id.is_some());
}

#[tokio::test]
async fn s4_partial_fill_reflects_remaining_stake() {
    let transport = FakeTransport::new(vec![counterparty_order("cp1", false, 600_000, 100, 1)]);
    let core = MakerCore::new(
        MakerId::new("self-maker"),
        transport.clone(),
        test_gateway(),
        test_config(),
    );

    let id = core
        .create_position(PositionSpec {
            market_id: MarketId::new("m1"),
            chosen_side: Side::A,
            max_stake: 50,
            premium_bps: 1_000,
            max_vig: 100_000,
            min_liquidity: 0,
            min_for_odds: 10,
            min_for_vig: 10,
        })
        .await
        .unwrap();
    settle().await;
    let order_id = core.get_position(id).unwrap().active_order_id.unwrap();

    let t = transport.next_update_time();
    transport.push(vec![own_order_delta(order_id.as_str(), true, 360_000, 50, 20, t)]);
    settle().await;

    let position = core.get_position(id).unwrap();
    assert_eq!(position.filled_stake, 20);
    assert_eq!(position.max_stake - position.filled_stake, 30);
    assert_ne!(position.status, makerbot_core::PositionStatus::Completed);
}

#[tokio::test]
async fn s5_late_fill_after_cancel_is_still_credited() {
    let transport = FakeTransport::new(vec![counterparty_order("cp1", false, 600_000, 100, 1)]);
    let core = MakerCore::new(
        MakerId::new("self-maker"),
        transport.clone(),
        test_gateway(),
        test_config(),
    );

    let id = core
        .create_position(PositionSpec {
            market_id: MarketId::new("m1"),
            chosen_side: Side::A,
            max_stake: 50,
            premium_bps: 1_000,
            max_vig: 100_000,
            min_liquidity: 0,
            min_for_odds: 10,
            min_for_vig: 10,
        })
        .await
        .unwrap();
    settle().await;
    let original_order_id = core.get_position(id).unwrap().active_order_id.unwrap();

    // Market moves: triggers cancel of `original_order_id` and a repost.
    let t = transport.next_update_time();
    transport.push(vec![OrderDelta {
        order: counterparty_order("cp2", false, 650_000, 100, t),
        status: DeltaStatus::Active,
    }]);
    settle().await;

    let position = core.get_position(id).unwrap();
    let reposted_order_id = position.active_order_id.unwrap();
    assert_ne!(reposted_order_id, original_order_id);

    // A fill against the now-cancelled original order still arrives. The
    // market monitor's recently-cancelled map attributes it to this position.
    let t = transport.next_update_time();
    transport.push(vec![own_order_delta(original_order_id.as_str(), true, 360_000, 50, 15, t)]);
    settle().await;

    let position = core.get_position(id).unwrap();
    assert_eq!(position.filled_stake, 15);
    assert_eq!(position.active_order_id, Some(reposted_order_id));
}

#[tokio::test]
async fn s6_completion_cancels_and_stops_quoting() {
    let transport = FakeTransport::new(vec![counterparty_order("cp1", false, 600_000, 100, 1)]);
    let core = MakerCore::new(
        MakerId::new("self-maker"),
        transport.clone(),
        test_gateway(),
        test_config(),
    );

    let id = core
        .create_position(PositionSpec {
            market_id: MarketId::new("m1"),
            chosen_side: Side::A,
            max_stake: 100,
            premium_bps: 1_000,
            max_vig: 100_000,
            min_liquidity: 0,
            min_for_odds: 10,
            min_for_vig: 10,
        })
        .await
        .unwrap();
    settle().await;
    let order_id = core.get_position(id).unwrap().active_order_id.unwrap();

    let t = transport.next_update_time();
    transport.push(vec![own_order_delta(order_id.as_str(), true, 360_000, 100, 99, t)]);
    settle().await;

    let position = core.get_position(id).unwrap();
    assert_eq!(position.status, makerbot_core::PositionStatus::Completed);
    assert!(position.active_order_id.is_none());

    // A further market move must not resurrect quoting on a completed position.
    let t = transport.next_update_time();
    transport.push(vec![OrderDelta {
        order: counterparty_order("cp3", false, 700_000, 100, t),
        status: DeltaStatus::Active,
    }]);
    settle().await;

    let position = core.get_position(id).unwrap();
    assert_eq!(position.status, makerbot_core::PositionStatus::Completed);
    assert!(position.active_order_id.is_none());
}
