//! Correlation, cancellation and dispatch properties.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use riptide::{ClientError, ConnectionState, Expected, TransportError};

use super::{chat, match_data, setup, Realtime, RealtimeKind};

const CONCURRENT_REQUESTS: usize = 32;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_receive_their_own_response() {
    let (client, mut server) = setup();
    client.connect().await.expect("connect");

    let mut callers = Vec::new();
    for i in 0..CONCURRENT_REQUESTS {
        let client = client.clone();
        callers.push(tokio::spawn(async move {
            let name = format!("match-{i}");
            let reply = client
                .call(Realtime::MatchCreate { name: name.clone() }, RealtimeKind::Match)
                .await;
            (name, reply)
        }));
    }

    // Collect every request first, then answer in reverse arrival order.
    let mut requests = Vec::new();
    for _ in 0..CONCURRENT_REQUESTS {
        requests.push(server.next().await);
    }
    let mut seen_ids = HashMap::new();
    for request in requests.iter().rev() {
        let Realtime::MatchCreate { name } = &request.payload else {
            panic!("unexpected request {:?}", request.payload);
        };
        assert!(
            seen_ids.insert(request.correlation_id.clone(), name.clone()).is_none(),
            "correlation id reused while pending"
        );
        server.respond(&request.correlation_id, match_data(name));
    }

    for caller in callers {
        let (name, reply) = caller.await.expect("join");
        assert_eq!(reply.expect("reply"), match_data(&name));
    }
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_remote_close_fails_every_pending_request() {
    let (client, mut server) = setup();
    client.connect().await.expect("connect");

    let mut callers = Vec::new();
    for _ in 0..5 {
        let client = client.clone();
        callers.push(tokio::spawn(async move {
            client.request_ack(Realtime::Ping {}).await
        }));
    }
    for _ in 0..5 {
        server.next().await;
    }
    assert_eq!(client.pending_count(), 5);

    assert!(server.peer().close("server restarting"));

    for caller in callers {
        match caller.await.expect("join") {
            Err(ClientError::ConnectionClosed { reason }) => {
                assert_eq!(reason, "closed: server restarting");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(client.pending_count(), 0);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_fails_pending_before_hook_runs() {
    let (client, mut server) = setup();
    let pending_at_hook = Arc::new(AtomicUsize::new(usize::MAX));

    let watcher = client.clone();
    let observed = pending_at_hook.clone();
    client.on_disconnect(move |_| {
        observed.store(watcher.pending_count(), Ordering::SeqCst);
    });
    client.connect().await.expect("connect");

    let caller = tokio::spawn({
        let client = client.clone();
        async move { client.call(Realtime::Ping {}, RealtimeKind::Pong).await }
    });
    server.next().await;

    client.disconnect().await;

    assert!(matches!(
        caller.await.expect("join"),
        Err(ClientError::ConnectionClosed { .. })
    ));
    assert_eq!(pending_at_hook.load(Ordering::SeqCst), 0);
    client.clear_disconnect();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_request_racing_disconnect_always_settles() {
    let (client, _server) = setup();

    for round in 0..64 {
        client.connect().await.expect("connect");

        let caller = tokio::spawn({
            let client = client.clone();
            async move { client.request_ack(Realtime::Ping {}).await }
        });
        let closer = tokio::spawn({
            let client = client.clone();
            async move { client.disconnect().await }
        });

        let outcome = tokio::time::timeout(std::time::Duration::from_secs(2), caller)
            .await
            .unwrap_or_else(|_| panic!("round {round}: request left waiting"))
            .expect("join");
        closer.await.expect("join");

        // Nobody answers, so the only way out is a connection failure.
        match outcome {
            Err(ClientError::ConnectionClosed { .. })
            | Err(ClientError::Transport(TransportError::NotConnected)) => {}
            other => panic!("round {round}: unexpected {other:?}"),
        }
        assert_eq!(client.pending_count(), 0);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}

#[tokio::test]
async fn test_orphan_response_is_ignored() {
    let (client, mut server) = setup();
    let errors = Arc::new(AtomicUsize::new(0));
    let counter = errors.clone();
    client.on_error(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    client.connect().await.expect("connect");

    server.respond("999", match_data("nobody asked"));
    server.respond("not-a-number", match_data("nobody asked"));

    // The connection keeps working after the orphans.
    let (reply, ()) = tokio::join!(
        client.call(Realtime::Ping {}, RealtimeKind::Pong),
        async {
            let request = server.next().await;
            server.respond(&request.correlation_id, Realtime::Pong {});
        }
    );
    assert_eq!(reply.expect("pong"), Realtime::Pong {});
    assert_eq!(errors.load(Ordering::SeqCst), 0);
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_unhandled_push_has_no_side_effects() {
    let (client, mut server) = setup();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    client.on_push(RealtimeKind::Match, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    client.connect().await.expect("connect");

    let (reply, ()) = tokio::join!(
        client.request(Realtime::Ping {}, Expected::NoValue),
        async {
            let request = server.next().await;
            server.push(chat("no handler for me"));
            server.respond(&request.correlation_id, Realtime::Pong {});
        }
    );

    // The push neither settled the no-value request nor reached another kind's handler.
    assert!(reply.expect("ack").is_ack());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_malformed_frame_reports_decode_error_and_continues() {
    let (client, mut server) = setup();
    let (tx, mut errors) = tokio::sync::mpsc::unbounded_channel();
    client.on_error(move |err| {
        let _ = tx.send(matches!(err, ClientError::Decode(_)));
    });
    client.connect().await.expect("connect");

    server.push_raw(b"definitely not an envelope".to_vec());
    assert_eq!(errors.recv().await, Some(true));

    let (reply, ()) = tokio::join!(
        client.call(Realtime::Ping {}, RealtimeKind::Pong),
        async {
            let request = server.next().await;
            server.respond(&request.correlation_id, Realtime::Pong {});
        }
    );
    assert_eq!(reply.expect("pong"), Realtime::Pong {});
}

#[tokio::test]
async fn test_timeout_forgets_the_request() {
    let (client, mut server) = setup();
    client.connect().await.expect("connect");

    let outcome = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        client.call(Realtime::Ping {}, RealtimeKind::Pong),
    )
    .await;
    assert!(outcome.is_err(), "no response was sent");
    assert_eq!(client.pending_count(), 0);

    // The late response is an orphan.
    let request = server.next().await;
    server.respond(&request.correlation_id, Realtime::Pong {});
    assert_eq!(client.state(), ConnectionState::Connected);
}
