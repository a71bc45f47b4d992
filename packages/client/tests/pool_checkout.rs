//! Pool capacity and waiter behavior.

mod common;

use std::time::Duration;

use peregrine_client::{HttpClient, HttpConfig, HttpError};

use common::{read_request, respond_text, spawn_server};

fn single_connection_config(acquire_timeout: Option<Duration>) -> HttpConfig {
    HttpConfig {
        pool_max_per_host: 1,
        pool_max_idle_per_host: 1,
        pool_acquire_timeout: acquire_timeout,
        ..HttpConfig::default()
    }
}

#[tokio::test]
async fn saturated_pool_times_out_waiters() {
    let base = spawn_server(|mut stream| async move {
        read_request(&mut stream).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        respond_text(&mut stream, "slow").await;
    })
    .await;

    let client =
        HttpClient::with_config(single_connection_config(Some(Duration::from_millis(100))))
            .unwrap();

    let slow = {
        let client = client.clone();
        let base = base.clone();
        tokio::spawn(async move { client.get(&base).await })
    };
    // Let the first request claim the only slot.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = client.get(&base).await.unwrap_err();
    assert!(matches!(err, HttpError::QueueTimeout));

    assert_eq!(slow.await.unwrap().unwrap().text(), "slow");
}

#[tokio::test]
async fn released_connection_is_handed_to_the_waiter() {
    let base = spawn_server(|mut stream| async move {
        loop {
            let request = read_request(&mut stream).await;
            if request.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            respond_text(&mut stream, "ok").await;
        }
    })
    .await;

    let client = HttpClient::with_config(single_connection_config(None)).unwrap();

    let mut tasks = Vec::new();
    for _ in 0..3 {
        let client = client.clone();
        let base = base.clone();
        tasks.push(tokio::spawn(async move { client.get(&base).await }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap().text(), "ok");
    }

    // One slot, three exchanges: the connection was dialed once and handed
    // from waiter to waiter.
    let stats = client.pool_stats();
    assert_eq!(stats.connections_created, 1);
    assert_eq!(stats.connections_reused, 2);
    assert_eq!(stats.active, 0);
}

#[tokio::test]
async fn dead_idle_connections_are_replaced_silently() {
    let base = spawn_server(|mut stream| async move {
        read_request(&mut stream).await;
        respond_text(&mut stream, "ok").await;
        // Close instead of lingering; the client parked this connection.
    })
    .await;

    let client = HttpClient::with_config(single_connection_config(None)).unwrap();
    client.get(&base).await.unwrap();

    // Give the server time to close the parked connection.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = client.get(&base).await.unwrap();
    assert_eq!(response.text(), "ok");
    assert_eq!(client.pool_stats().connections_created, 2);
}
