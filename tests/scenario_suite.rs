//! Scenario catalogue against the simulated cluster
//!
//! Every test runs on tokio's paused clock: index delays, cool-downs and
//! redemption delays pass without real waiting.
//!
//! Run with: cargo test -p relaycheck-tests --test scenario_suite

use relaycheck_api::mock::{MockCluster, MockClusterConfig};
use relaycheck_api::NodeApi;
use relaycheck_core::parse_balance;
use relaycheck_harness::{CheckError, Cluster, ScenarioConfig, ScenarioKind, Session};
use relaycheck_logging::init_test_logging;

// =========================================================================
// Helpers
// =========================================================================

async fn session_with(mock_config: MockClusterConfig, config: ScenarioConfig) -> (MockCluster, Session) {
    init_test_logging();
    let (mock, cluster) = Cluster::simulated(mock_config).await.unwrap();
    let session = Session::prepare(cluster, config).await.unwrap();
    (mock, session)
}

async fn session() -> (MockCluster, Session) {
    session_with(MockClusterConfig::default(), ScenarioConfig::default()).await
}

/// Cluster and scenarios agreeing on a smaller aggregation threshold
async fn session_with_threshold(threshold: u32) -> (MockCluster, Session) {
    let mock_config = MockClusterConfig {
        aggregation_threshold: threshold,
        ..Default::default()
    };
    let config = ScenarioConfig {
        aggregation_threshold: threshold,
        ..Default::default()
    };
    session_with(mock_config, config).await
}

async fn run_ok(session: &Session, kind: ScenarioKind) {
    if let Err(e) = session.run(kind).await {
        panic!("{} failed: {}", kind, e);
    }
}

/// Sum of one statistics field over every node
async fn total(session: &Session, field: fn(&relaycheck_core::TicketStatistics) -> u64) -> u64 {
    let mut sum = 0;
    for node in session.cluster().nodes() {
        sum += field(&node.api.tickets_statistics().await.unwrap());
    }
    sum
}

// =========================================================================
// Full catalogue
// =========================================================================

#[tokio::test(start_paused = true)]
async fn full_catalogue_passes() {
    let (mock, session) = session().await;

    let reports = session.run_all(&ScenarioKind::ALL).await;

    assert_eq!(reports.len(), ScenarioKind::ALL.len());
    for report in &reports {
        assert!(report.passed(), "{} failed: {:?}", report.kind, report.result);
    }
    assert_eq!(mock.unclosed_channels(), 0, "every scenario channel is closed");
}

#[tokio::test(start_paused = true)]
async fn run_all_continues_after_failure() {
    let (_mock, session) = session().await;

    // nothing was ever closed on a fresh cluster
    let reports = session
        .run_all(&[ScenarioKind::ChannelStatusSanity, ScenarioKind::TicketPrice])
        .await;

    assert!(matches!(reports[0].result, Err(CheckError::Assertion(_))));
    assert!(reports[1].passed());
}

// =========================================================================
// Individual scenarios
// =========================================================================

#[tokio::test(start_paused = true)]
async fn redeem_in_channel_pays_the_passive_relay() {
    let (_mock, session) = session().await;
    run_ok(&session, ScenarioKind::RedeemInChannel).await;

    let passive = session.cluster().passive_node().unwrap();
    let stats = passive.api.tickets_statistics().await.unwrap();
    assert_eq!(stats.redeemed, 2);
    assert_eq!(stats.redeemed_amount().unwrap(), 200);
    assert_eq!(stats.unredeemed, 0);
}

#[tokio::test(start_paused = true)]
async fn aggregate_in_channel_redeems_one_ticket() {
    let (_mock, session) = session().await;
    run_ok(&session, ScenarioKind::AggregateInChannel).await;

    let passive = session.cluster().passive_node().unwrap();
    let stats = passive.api.tickets_statistics().await.unwrap();
    assert_eq!(stats.redeemed, 1);
    assert_eq!(stats.redeemed_amount().unwrap(), 200);
}

#[tokio::test(start_paused = true)]
async fn out_of_funding_rejects_exactly_the_uncovered_ticket() {
    let (mock, session) = session().await;
    run_ok(&session, ScenarioKind::OutOfFunding).await;

    assert_eq!(total(&session, |s| s.rejected).await, 1);
    assert_eq!(total(&session, |s| s.redeemed).await, 2);
    assert_eq!(mock.unclosed_channels(), 0);
}

#[tokio::test(start_paused = true)]
async fn one_hop_to_self_with_small_threshold() {
    let (_mock, session) = session_with_threshold(20).await;
    run_ok(&session, ScenarioKind::OneHopToSelf).await;

    let passive = session.cluster().passive_node().unwrap();
    let stats = passive.api.tickets_statistics().await.unwrap();
    assert_eq!(stats.redeemed, 18);
    assert_eq!(stats.redeemed_amount().unwrap(), 1800);
}

#[tokio::test(start_paused = true)]
async fn auto_aggregation_redeems_one_aggregated_ticket() {
    let (_mock, session) = session_with_threshold(20).await;
    run_ok(&session, ScenarioKind::AutoAggregation).await;

    assert_eq!(total(&session, |s| s.redeemed).await, 1);
    let mut redeemed_value = 0;
    for node in session.cluster().nodes() {
        let stats = node.api.tickets_statistics().await.unwrap();
        redeemed_value += parse_balance(&stats.redeemed_value).unwrap();
    }
    assert_eq!(redeemed_value, 20 * 100);
}

#[tokio::test(start_paused = true)]
async fn close_with_unredeemed_neglects_relay_tickets() {
    let (mock, session) = session().await;
    run_ok(&session, ScenarioKind::CloseWithUnredeemed).await;

    assert_eq!(mock.unclosed_channels(), 0);
    assert_eq!(total(&session, |s| s.neglected).await, 2);
    assert_eq!(total(&session, |s| s.unredeemed).await, 0);
}

#[tokio::test(start_paused = true)]
async fn n_hop_leaves_nothing_unredeemed() {
    let (_mock, session) = session().await;
    run_ok(&session, ScenarioKind::NHop).await;

    assert_eq!(total(&session, |s| s.redeemed).await, 10);
    assert_eq!(total(&session, |s| s.unredeemed).await, 0);
}

#[tokio::test(start_paused = true)]
async fn channel_status_sanity_after_a_closed_channel() {
    let (_mock, session) = session().await;
    run_ok(&session, ScenarioKind::OpenCloseWithoutTickets).await;
    run_ok(&session, ScenarioKind::ChannelStatusSanity).await;
}

#[tokio::test(start_paused = true)]
async fn open_close_without_tickets_uses_default_nodes() {
    let (mock, session) = session().await;
    run_ok(&session, ScenarioKind::OpenCloseWithoutTickets).await;

    let passive = session.cluster().passive_node().unwrap();
    let listing = passive.api.all_channels(true).await.unwrap();
    assert_eq!(listing.all.len(), 1);
    let channel = &listing.all[0];
    assert_ne!(channel.source_address, passive.address);
    assert_ne!(channel.destination_address, passive.address);
    assert_eq!(mock.unclosed_channels(), 0);
}

#[tokio::test(start_paused = true)]
async fn fund_channel_moves_safe_funds() {
    let (mock, session) = session().await;
    let passive = session.cluster().passive_node().unwrap();
    let before = parse_balance(&passive.api.balances().await.unwrap().safe_hopr).unwrap();

    run_ok(&session, ScenarioKind::FundChannel).await;

    // opening and funding both come back with the close refund
    let after = parse_balance(&passive.api.balances().await.unwrap().safe_hopr).unwrap();
    assert_eq!(after, before);
    assert_eq!(mock.unclosed_channels(), 0);
}

#[tokio::test(start_paused = true)]
async fn no_unredeemed_fails_once_tickets_exist() {
    let (_mock, session) = session().await;
    let cluster = session.cluster();
    let sender = cluster.node("1").unwrap();
    let relay = cluster.node("2").unwrap();

    sender.api.open_channel(&relay.address, 1000).await.unwrap().unwrap();
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    let path = vec![relay.peer_id.clone()];
    assert!(sender.api.send_message(&sender.peer_id, "paid", &path, 4242).await.unwrap());

    match session.run(ScenarioKind::NoUnredeemedWithoutTraffic).await {
        Err(CheckError::Assertion(message)) => assert!(message.contains("node 2")),
        other => panic!("unexpected {other:?}"),
    }
}
