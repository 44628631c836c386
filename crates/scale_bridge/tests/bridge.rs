//! End-to-end tests: envelope in, host tick, envelope out.

mod common;

use std::time::{Duration, Instant};

use serde_json::json;
use tokio::io::duplex;

use scale_bridge::transport::{PipeLimits, serve_connection};
use scale_bridge::{Bridge, ScaleHost};
use scale_net::names::{self, messages};
use scale_net::{PipeConnection, Request, Response, ResponseType, read_message, write_message};

use common::{drive, host, loopback_config};

/// Send `request` over an in-memory pipe, tick the host until it answers.
async fn exchange(bridge: &Bridge<ScaleHost>, host: &mut ScaleHost, request: &Request) -> Response {
    let (mut client, server) = duplex(64 * 1024);
    let dispatcher = bridge.dispatcher();
    let limits = PipeLimits::new(64 * 1024, Duration::from_secs(5));
    let task = tokio::spawn(async move { serve_connection(server, &dispatcher, limits).await });

    write_message(&mut client, request).await.unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while bridge.drain_once(host) == 0 {
        assert!(Instant::now() < deadline, "request never reached the queue");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let reply = read_message(&mut client, 64 * 1024).await.unwrap();
    task.await.unwrap().unwrap();
    reply
}

#[tokio::test]
async fn test_set_then_get_current_scales() {
    let bridge = Bridge::new(ScaleHost::command_registry());
    let mut host = host("set_get");

    let set = Request::new(names::SET_SCALES).with_data(json!({
        "scales": [{ "id": 7, "scale": 1.5 }],
        "overwrite": true
    }));
    let reply = exchange(&bridge, &mut host, &set).await;
    assert_eq!(reply.kind, ResponseType::Success);
    assert_eq!(reply.message.as_deref(), Some(messages::SET_SCALES_OK));

    let get = Request::new(names::GET_CURRENT_SCALES).with_uuid("abc");
    let reply = exchange(&bridge, &mut host, &get).await;
    assert_eq!(reply.uuid.as_deref(), Some("abc"));
    assert_eq!(reply.kind, ResponseType::Success);
    assert_eq!(reply.data, Some(json!({ "scales": [{ "id": 7, "scale": 1.5 }] })));
}

#[tokio::test]
async fn test_invalid_command_name() {
    let bridge = Bridge::new(ScaleHost::command_registry());
    let mut host = host("invalid_name");

    let request = Request::new("Nope;").with_uuid("x");
    let reply = exchange(&bridge, &mut host, &request).await;
    assert_eq!(reply.kind, ResponseType::Error);
    assert_eq!(reply.uuid.as_deref(), Some("x"));
}

#[tokio::test]
async fn test_zero_param_command_without_data() {
    let bridge = Bridge::new(ScaleHost::command_registry());
    let mut host = host("zero_param");

    let reply = exchange(&bridge, &mut host, &Request::new(names::GET_GAME_SETTINGS)).await;
    assert_eq!(reply.kind, ResponseType::Success);
    let data = reply.data.unwrap();
    assert_eq!(data["game"], "TEST");
    assert_eq!(data["scaleAddress"], host.store().region().scale_handle());
}

#[tokio::test]
async fn test_missing_required_parameter() {
    let bridge = Bridge::new(ScaleHost::command_registry());
    let mut host = host("missing_param");

    let request = Request::new(names::SET_SCALES).with_data(json!({ "overwrite": true }));
    let reply = exchange(&bridge, &mut host, &request).await;
    assert_eq!(reply.kind, ResponseType::Error);
    assert_eq!(reply.message.as_deref(), Some(messages::INVALID_PARAMETERS));
    assert!(host.store().read_scales().is_empty());
}

#[tokio::test]
async fn test_active_change_pushes_once() {
    let mut bridge = Bridge::new(ScaleHost::command_registry());
    let mut host = host("push");
    host.forward_active_changes(bridge.push_sender());

    host.store_mut().write_active_ids(&[5, 3, 3, 1]).unwrap();
    host.store_mut().write_active_ids(&[1, 3, 5]).unwrap();

    let pushes = bridge.pending_pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].context.as_deref(), Some(names::ACTIVE_CHARACTER_CHANGE));
    assert_eq!(pushes[0].data, Some(json!([1, 3, 5])));

    let reply = exchange(&bridge, &mut host, &Request::new(names::GET_ACTIVE_CHARACTER_IDS)).await;
    assert_eq!(reply.data, Some(json!({ "ids": [1, 3, 5] })));
}

#[test]
fn test_listening_bridge_over_tcp() {
    let mut bridge = Bridge::new(ScaleHost::command_registry());
    bridge.listen(&loopback_config()).unwrap();
    assert!(bridge.is_listening());
    let client = PipeConnection::new(bridge.pipe_addr().unwrap().to_string());

    let mut host = host("tcp");
    let (set, get) = drive(&bridge, &mut host, async move {
        let set = client
            .request(
                names::SET_SCALES,
                Some(json!({ "scales": [{ "id": 2, "scale": 0.75 }] })),
            )
            .await
            .unwrap();
        let get = client.request(names::GET_CURRENT_SCALES, None).await.unwrap();
        (set, get)
    });

    assert_eq!(set.kind, ResponseType::Success);
    assert!(set.uuid.is_some());
    assert_eq!(get.data, Some(json!({ "scales": [{ "id": 2, "scale": 0.75 }] })));

    bridge.shutdown();
    assert!(!bridge.is_listening());
}

#[test]
fn test_silent_pipe_client_does_not_stall_others() {
    let mut bridge = Bridge::new(ScaleHost::command_registry());
    bridge.listen(&loopback_config()).unwrap();
    let addr = bridge.pipe_addr().unwrap();

    let mut host = host("silent");
    let reply = drive(&bridge, &mut host, async move {
        let _silent = tokio::net::TcpStream::connect(addr).await.unwrap();
        let client = PipeConnection::new(addr.to_string());
        tokio::time::timeout(
            Duration::from_secs(3),
            client.request(names::GET_GAME_SETTINGS, None),
        )
        .await
    });

    let reply = reply.expect("second client was not served").unwrap();
    assert_eq!(reply.kind, ResponseType::Success);
    bridge.shutdown();
}
