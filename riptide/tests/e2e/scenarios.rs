//! The canonical request/response scenarios, run on one connection so the
//! correlation ids are the first five the client allocates.

use std::sync::Arc;

use riptide::{ClientError, ConnectionState, Expected, RemoteError, Reply};

use super::{chat, match_data, setup, Counter, Realtime, RealtimeKind};

#[tokio::test]
async fn test_scenarios_in_sequence() {
    let (client, mut server) = setup();
    client.connect().await.expect("connect");

    // A: id 1 expects a match and receives it.
    let (result, ()) = tokio::join!(
        client.call(
            Realtime::MatchCreate {
                name: "arena".to_string()
            },
            RealtimeKind::Match
        ),
        async {
            let request = server.next().await;
            assert_eq!(request.correlation_id, "1");
            server.respond("1", match_data("m-1"));
        }
    );
    assert_eq!(result.expect("scenario A"), match_data("m-1"));

    // B: id 2 receives the server's error variant.
    let (result, ()) = tokio::join!(
        client.call(
            Realtime::MatchJoin {
                match_id: "missing".to_string()
            },
            RealtimeKind::Match
        ),
        async {
            let request = server.next().await;
            assert_eq!(request.correlation_id, "2");
            server.respond("2", Realtime::Error(RemoteError::new(5, "not found")));
        }
    );
    match result {
        Err(ClientError::Remote { code, message }) => {
            assert_eq!(code, 5);
            assert_eq!(message, "not found");
        }
        other => panic!("scenario B: unexpected {other:?}"),
    }

    // C: id 3 expects no value; any non-error payload acknowledges it.
    let (result, ()) = tokio::join!(
        client.request_ack(Realtime::MatchLeave {
            match_id: "m-1".to_string()
        }),
        async {
            let request = server.next().await;
            assert_eq!(request.correlation_id, "3");
            server.respond("3", Realtime::Empty {});
        }
    );
    result.expect("scenario C");

    // D: ids 4 and 5 go out back to back; 5 is answered first.
    let (four, five, ()) = tokio::join!(
        client.call(
            Realtime::ChannelJoin {
                target: "lobby".to_string()
            },
            RealtimeKind::Channel
        ),
        client.call(
            Realtime::MatchCreate {
                name: "second".to_string()
            },
            RealtimeKind::Match
        ),
        async {
            let first = server.next().await;
            let second = server.next().await;
            assert_eq!(first.correlation_id, "4");
            assert_eq!(second.correlation_id, "5");
            server.respond("5", match_data("m-5"));
            server.respond(
                "4",
                Realtime::Channel {
                    id: "lobby".to_string(),
                },
            );
        }
    );
    assert_eq!(
        four.expect("scenario D, id 4"),
        Realtime::Channel {
            id: "lobby".to_string()
        }
    );
    assert_eq!(five.expect("scenario D, id 5"), match_data("m-5"));

    // E: an unsolicited chat message reaches its handler exactly once.
    let seen = Arc::new(Counter::new());
    let sink = seen.clone();
    client.on_push(RealtimeKind::ChannelMessage, move |payload| sink.record(payload));

    let (tx, mut delivered) = tokio::sync::mpsc::unbounded_channel();
    client.on_error(move |err| {
        let _ = tx.send(err.to_string());
    });
    server.push(chat("hello"));
    // A second frame behind the push proves the push was processed.
    server.push_raw(vec![0xde, 0xad]);
    assert!(delivered.recv().await.is_some());

    assert_eq!(seen.calls(), 1);
    assert_eq!(seen.last(), Some(chat("hello")));
    assert_eq!(client.pending_count(), 0);
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_push_does_not_touch_pending_requests() {
    let (client, mut server) = setup();
    let seen = Arc::new(Counter::new());
    let sink = seen.clone();
    client.on_push(RealtimeKind::ChannelMessage, move |payload| sink.record(payload));
    client.connect().await.expect("connect");

    let (result, ()) = tokio::join!(
        client.request(
            Realtime::ChannelMessageSend {
                channel_id: "lobby".to_string(),
                content: "hi".to_string()
            },
            Expected::NoValue
        ),
        async {
            let request = server.next().await;
            // The push arrives while the request is pending and must not
            // settle it, even though the request accepts any kind.
            server.push(chat("interleaved"));
            tokio::task::yield_now().await;
            assert_eq!(client.pending_count(), 1);
            server.respond(&request.correlation_id, Realtime::Empty {});
        }
    );

    assert_eq!(result.expect("ack"), Reply::Ack);
    assert_eq!(seen.calls(), 1);
    assert_eq!(seen.last(), Some(chat("interleaved")));
}

#[tokio::test]
async fn test_ack_request_accepts_payload_of_any_kind() {
    let (client, mut server) = setup();
    client.connect().await.expect("connect");

    let (result, ()) = tokio::join!(
        client.request(
            Realtime::StatusUpdate {
                status: "away".to_string()
            },
            Expected::NoValue
        ),
        async {
            let request = server.next().await;
            server.respond(&request.correlation_id, match_data("surprise"));
        }
    );

    // The payload is discarded; only success is reported.
    assert!(result.expect("ack").is_ack());
}

#[tokio::test]
async fn test_mismatched_response_kind() {
    let (client, mut server) = setup();
    client.connect().await.expect("connect");

    let (result, ()) = tokio::join!(
        client.call(Realtime::Ping {}, RealtimeKind::Pong),
        async {
            let request = server.next().await;
            server.respond(&request.correlation_id, chat("not a pong"));
        }
    );

    match result {
        Err(ClientError::ProtocolMismatch { expected, got }) => {
            assert_eq!(expected, "Pong");
            assert_eq!(got, "ChannelMessage");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(client.state(), ConnectionState::Connected);
}
