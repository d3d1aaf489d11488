//! Lifecycle tests for the subscription-session connector over the mock
//! backend

use chainflow_common::{ConnectorStatus, TimeframeNetwork};
use data_aggregator::OhlcAggregator;
use market_connector::{BloombergConfig, BloombergConnector, Connector};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn connector_for(security: &str) -> (BloombergConnector, Arc<Mutex<OhlcAggregator>>) {
    let network = TimeframeNetwork::from_labels(&["1s", "1m"]).unwrap();
    let aggregator = Arc::new(Mutex::new(OhlcAggregator::new(security, network)));
    let config = BloombergConfig {
        securities: vec![security.to_string()],
        tick_interval: Duration::from_millis(5),
        ..BloombergConfig::default()
    };
    (
        BloombergConnector::new(config, Arc::clone(&aggregator)),
        aggregator,
    )
}

#[tokio::test]
async fn connect_reports_connected_health() {
    let (mut connector, _aggregator) = connector_for("IBM US Equity");

    assert_eq!(connector.health().status, ConnectorStatus::Disconnected);
    connector.connect().await.unwrap();
    assert_eq!(connector.health().status, ConnectorStatus::Connected);

    connector.shutdown().await.unwrap();
    assert_eq!(connector.health().status, ConnectorStatus::Disconnected);
}

#[tokio::test]
async fn synthetic_ticks_flow_into_the_aggregator() {
    let (mut connector, aggregator) = connector_for("IBM US Equity");

    connector.connect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    connector.shutdown().await.unwrap();

    let health = connector.health();
    assert!(health.last_message_at.is_some(), "no message recorded");

    let mut agg = aggregator.lock();
    agg.force_finalize_all();
    let buffer = agg.buffer("1s").unwrap();
    assert!(buffer.lock().len() > 0, "no candles finalized");
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    let (mut connector, _aggregator) = connector_for("IBM US Equity");

    connector.connect().await.unwrap();
    connector.shutdown().await.unwrap();
    connector.shutdown().await.unwrap();

    assert_eq!(connector.health().status, ConnectorStatus::Disconnected);
}

#[tokio::test]
async fn shutdown_before_connect_is_safe() {
    let (mut connector, _aggregator) = connector_for("IBM US Equity");
    connector.shutdown().await.unwrap();
    assert_eq!(connector.health().status, ConnectorStatus::Disconnected);
}

#[tokio::test]
async fn dynamic_add_feeds_a_second_security() {
    // the aggregator keys on one symbol, so the added security's ticks are
    // delivered and then dropped there; the health counter still advances
    let (mut connector, _aggregator) = connector_for("IBM US Equity");

    connector.connect().await.unwrap();
    connector.add_securities(vec!["MSFT US Equity".to_string()]);
    tokio::time::sleep(Duration::from_millis(40)).await;
    connector.remove_securities(vec!["MSFT US Equity".to_string()]);
    tokio::time::sleep(Duration::from_millis(20)).await;
    connector.shutdown().await.unwrap();

    assert!(connector.health().last_message_at.is_some());
}
