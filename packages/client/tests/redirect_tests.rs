//! Redirect following against stub servers.

mod common;

use peregrine_client::redirect::Policy;
use peregrine_client::{HttpClient, HttpConfig, HttpError};
use tokio::io::AsyncWriteExt;

use common::{read_request, respond_text, spawn_server};

async fn redirect_to(stream: &mut tokio::net::TcpStream, status: &str, location: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nlocation: {location}\r\ncontent-length: 0\r\n\r\n"
    );
    stream.write_all(response.as_bytes()).await.unwrap();
}

#[tokio::test]
async fn follows_relative_redirects() {
    let base = spawn_server(|mut stream| async move {
        loop {
            let request = read_request(&mut stream).await;
            if request.is_empty() {
                return;
            }
            if request.starts_with("GET /a ") {
                redirect_to(&mut stream, "302 Found", "/b").await;
            } else {
                assert!(request.starts_with("GET /b "));
                respond_text(&mut stream, "landed").await;
            }
        }
    })
    .await;

    let client = HttpClient::new();
    let response = client.get(format!("{base}/a")).await.unwrap();
    assert_eq!(response.text(), "landed");
}

#[tokio::test]
async fn redirect_loops_hit_the_hop_limit() {
    let base = spawn_server(|mut stream| async move {
        loop {
            let request = read_request(&mut stream).await;
            if request.is_empty() {
                return;
            }
            redirect_to(&mut stream, "302 Found", "/loop").await;
        }
    })
    .await;

    let client = HttpClient::new();
    let err = client
        .request(format!("{base}/loop"), |spec| {
            spec.max_redirects(3);
        })
        .await
        .unwrap_err();
    assert!(matches!(err, HttpError::TooManyRedirects(3)));
}

#[tokio::test]
async fn redirects_can_be_disabled_per_request() {
    let base = spawn_server(|mut stream| async move {
        read_request(&mut stream).await;
        redirect_to(&mut stream, "301 Moved Permanently", "/elsewhere").await;
    })
    .await;

    let client = HttpClient::new();
    let response = client
        .request(&base, |spec| {
            spec.follow_redirects(false);
        })
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 301);
    assert_eq!(response.header("location"), Some("/elsewhere"));
}

#[tokio::test]
async fn redirects_can_be_disabled_by_config_policy() {
    let base = spawn_server(|mut stream| async move {
        read_request(&mut stream).await;
        redirect_to(&mut stream, "302 Found", "/elsewhere").await;
    })
    .await;

    let config = HttpConfig {
        redirect: Policy::none(),
        ..HttpConfig::default()
    };
    let client = HttpClient::with_config(config).unwrap();
    let response = client.get(&base).await.unwrap();
    assert_eq!(response.status().as_u16(), 302);
}

#[tokio::test]
async fn see_other_demotes_post_to_get() {
    let base = spawn_server(|mut stream| async move {
        loop {
            let request = read_request(&mut stream).await;
            if request.is_empty() {
                return;
            }
            if request.starts_with("POST /submit ") {
                redirect_to(&mut stream, "303 See Other", "/result").await;
            } else {
                assert!(request.starts_with("GET /result "));
                assert!(!request.to_lowercase().contains("content-length"));
                respond_text(&mut stream, "created").await;
            }
        }
    })
    .await;

    let client = HttpClient::new();
    let response = client
        .post(format!("{base}/submit"), |spec| {
            spec.body_text("payload");
        })
        .await
        .unwrap();
    assert_eq!(response.text(), "created");
}

#[tokio::test]
async fn cross_host_redirects_drop_authorization() {
    // Second server on a different port is a different host for header
    // purposes.
    let target = spawn_server(|mut stream| async move {
        let request = read_request(&mut stream).await;
        assert!(!request.to_lowercase().contains("authorization"));
        respond_text(&mut stream, "clean").await;
    })
    .await;

    let origin = {
        let target = target.clone();
        spawn_server(move |mut stream| {
            let target = target.clone();
            async move {
                let request = read_request(&mut stream).await;
                assert!(request.to_lowercase().contains("authorization: bearer token"));
                redirect_to(&mut stream, "302 Found", &target).await;
            }
        })
        .await
    };

    let client = HttpClient::new();
    let response = client
        .request(&origin, |spec| {
            spec.header("authorization", "Bearer token");
        })
        .await
        .unwrap();
    assert_eq!(response.text(), "clean");
}

#[tokio::test]
async fn referer_is_sent_on_followed_redirects() {
    let base = spawn_server(|mut stream| async move {
        loop {
            let request = read_request(&mut stream).await;
            if request.is_empty() {
                return;
            }
            if request.starts_with("GET /from ") {
                redirect_to(&mut stream, "302 Found", "/to").await;
            } else {
                assert!(request.to_lowercase().contains("referer: http://"));
                respond_text(&mut stream, "ok").await;
            }
        }
    })
    .await;

    let client = HttpClient::new();
    let response = client.get(format!("{base}/from")).await.unwrap();
    assert_eq!(response.text(), "ok");
}

#[tokio::test]
async fn custom_policies_decide_per_hop() {
    let base = spawn_server(|mut stream| async move {
        loop {
            let request = read_request(&mut stream).await;
            if request.is_empty() {
                return;
            }
            if request.starts_with("GET /start ") {
                redirect_to(&mut stream, "302 Found", "/blocked").await;
            } else {
                respond_text(&mut stream, "should not be reached").await;
            }
        }
    })
    .await;

    let config = HttpConfig {
        redirect: Policy::custom(|attempt| {
            if attempt.url().path() == "/blocked" {
                attempt.stop()
            } else {
                attempt.follow()
            }
        }),
        ..HttpConfig::default()
    };
    let client = HttpClient::with_config(config).unwrap();
    let response = client.get(format!("{base}/start")).await.unwrap();
    assert_eq!(response.status().as_u16(), 302);
}
