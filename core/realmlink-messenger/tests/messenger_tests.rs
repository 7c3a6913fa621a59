use futures::future::join_all;
use pretty_assertions::assert_eq;
use realmlink_messenger::{
    Channel, ConnectionState, GroupChannel, Messenger, MessengerConfig, MessengerError,
    PairedEndpoint,
};
use realmlink_types::protocol::{
    FileReply, FileRequest, FileRequestPayload, Listen, ListenState, Run, RunOutcome, RunRequest,
};
use realmlink_types::{
    CorrelationId, Envelope, MessageKind, RealmContext, RealmId, RealmRole, error_marker,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ── Helpers ─────────────────────────────────────────────────────

fn make_contexts() -> (RealmContext, RealmContext) {
    (
        RealmContext::new(RealmRole::Top, "https://host.test"),
        RealmContext::new(RealmRole::Nested, "https://host.test"),
    )
}

fn make_config() -> MessengerConfig {
    MessengerConfig {
        handshake_timeout: Duration::from_secs(2),
    }
}

/// Host and sandbox messengers over a fresh paired channel.
fn make_pair() -> (Messenger, Messenger, PairedEndpoint, PairedEndpoint) {
    let (host_ctx, sandbox_ctx) = make_contexts();
    let (host_end, sandbox_end) = PairedEndpoint::pair(host_ctx.id, sandbox_ctx.id);
    let host = Messenger::new(host_ctx, Arc::new(host_end.clone()), make_config());
    let sandbox = Messenger::new(sandbox_ctx, Arc::new(sandbox_end.clone()), make_config());
    (host, sandbox, host_end, sandbox_end)
}

/// Registers a file responder that echoes the requested path as the body.
fn echo_files(messenger: &Messenger, token: &CancellationToken) -> realmlink_messenger::Registration {
    messenger.respond_to::<FileRequest, _, _, String>(
        |req: FileRequestPayload| async move { Ok(FileReply::found(req.path.into_bytes())) },
        token,
    )
}

// ── Handshake ───────────────────────────────────────────────────

#[tokio::test]
async fn handshake_when_host_connects_first() {
    let (host_ctx, sandbox_ctx) = make_contexts();
    let (host_end, sandbox_end) = PairedEndpoint::pair(host_ctx.id, sandbox_ctx.id);
    let host = Messenger::new(host_ctx, Arc::new(host_end), make_config());

    let connecting = host.clone();
    let host_connect = tokio::spawn(async move { connecting.connect().await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // The host's first probe was lost; the sandbox's probe settles both.
    let sandbox = Messenger::new(sandbox_ctx, Arc::new(sandbox_end), make_config());
    sandbox.connect().await.unwrap();
    host_connect.await.unwrap().unwrap();

    assert_eq!(host.state(), ConnectionState::Connected);
    assert_eq!(sandbox.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn handshake_when_sandbox_connects_first() {
    let (host, sandbox, _, _) = make_pair();
    sandbox.connect().await.unwrap();
    host.connect().await.unwrap();
    assert_eq!(host.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn concurrent_connects_share_one_attempt() {
    let (host, sandbox, _, _) = make_pair();
    let results = join_all((0..5).map(|_| sandbox.connect())).await;
    assert!(results.iter().all(Result::is_ok));
    host.connect().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn handshake_times_out_without_peer() {
    let (host_ctx, sandbox_ctx) = make_contexts();
    let (host_end, _sandbox_end) = PairedEndpoint::pair(host_ctx.id, sandbox_ctx.id);
    let host = Messenger::new(host_ctx, Arc::new(host_end), make_config());

    let err = host.connect().await.unwrap_err();
    assert!(matches!(err, MessengerError::HandshakeTimeout(d) if d == Duration::from_secs(2)));
    assert_eq!(host.state(), ConnectionState::Unconnected);
    assert_eq!(host.pending_requests(), 0);
}

#[tokio::test]
async fn group_connects_immediately() {
    let group = GroupChannel::new("file-server");
    let ctx = RealmContext::new(RealmRole::Top, "https://host.test");
    let messenger = Messenger::new(ctx, Arc::new(group.join()), make_config());
    messenger.connect().await.unwrap();
    assert_eq!(messenger.state(), ConnectionState::Connected);
}

// ── Requests ────────────────────────────────────────────────────

#[tokio::test]
async fn send_resolves_with_handler_result() {
    let (host, sandbox, _, _) = make_pair();
    let token = CancellationToken::new();
    let _reg = echo_files(&host, &token);

    let reply = sandbox
        .send::<FileRequest>(FileRequestPayload {
            path: "/file/a.txt".into(),
        })
        .await
        .unwrap();
    assert_eq!(reply, FileReply::found(b"/file/a.txt".to_vec()));
    assert_eq!(sandbox.pending_requests(), 0);
}

#[tokio::test]
async fn concurrent_sends_resolve_independently() {
    let (host, sandbox, _, _) = make_pair();
    let token = CancellationToken::new();

    // Later requests answer sooner, so responses arrive out of order.
    let _files = host.respond_to::<FileRequest, _, _, String>(
        |req: FileRequestPayload| async move {
            let n: u64 = req.path.trim_start_matches("/file/").parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(40 - n * 2)).await;
            Ok(FileReply::found(req.path.into_bytes()))
        },
        &token,
    );
    let _runs = host.respond_to::<Run, _, _, String>(
        |req: RunRequest| async move { Ok(RunOutcome { ok: req.name == "pass", refresh: false }) },
        &token,
    );

    let files = join_all((0..16u64).map(|n| {
        let sandbox = sandbox.clone();
        async move {
            sandbox
                .send::<FileRequest>(FileRequestPayload {
                    path: format!("/file/{n}"),
                })
                .await
        }
    }));
    let runs = join_all(["pass", "fail"].map(|name| {
        let sandbox = sandbox.clone();
        async move { sandbox.send::<Run>(RunRequest { name: name.into() }).await }
    }));
    let (files, runs) = tokio::join!(files, runs);

    for (n, reply) in files.into_iter().enumerate() {
        assert_eq!(reply.unwrap().body.unwrap(), format!("/file/{n}").into_bytes());
    }
    assert!(runs[0].as_ref().unwrap().ok);
    assert!(!runs[1].as_ref().unwrap().ok);
    assert_eq!(sandbox.pending_requests(), 0);
}

#[tokio::test]
async fn request_burst_beyond_queue_depth_all_resolve() {
    let (host, sandbox, _, _) = make_pair();
    let token = CancellationToken::new();
    let _files = echo_files(&host, &token);

    let sends = join_all((0..400u32).map(|n| {
        let sandbox = sandbox.clone();
        async move {
            sandbox
                .send::<FileRequest>(FileRequestPayload {
                    path: format!("/file/{n}"),
                })
                .await
        }
    }));
    let replies = tokio::time::timeout(Duration::from_secs(5), sends)
        .await
        .expect("burst of sends stalled");

    for (n, reply) in replies.into_iter().enumerate() {
        assert_eq!(reply.unwrap().body.unwrap(), format!("/file/{n}").into_bytes());
    }
    assert_eq!(sandbox.pending_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn late_response_after_timeout_is_ignored() {
    let (host, sandbox, _, _) = make_pair();
    let token = CancellationToken::new();
    let answered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&answered);
    let _reg = host.respond_to::<FileRequest, _, _, String>(
        move |_req: FileRequestPayload| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(FileReply::not_found())
            }
        },
        &token,
    );
    sandbox.connect().await.unwrap();

    let raced = tokio::time::timeout(
        Duration::from_secs(1),
        sandbox.send::<FileRequest>(FileRequestPayload {
            path: "/file/slow".into(),
        }),
    )
    .await;
    assert!(raced.is_err());
    assert_eq!(sandbox.pending_requests(), 0);

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(answered.load(Ordering::SeqCst), 1);
    assert_eq!(sandbox.pending_requests(), 0);
}

// ── Handler failures ────────────────────────────────────────────

#[tokio::test]
async fn handler_error_surfaces_as_remote() {
    let (host, sandbox, _, _) = make_pair();
    let token = CancellationToken::new();
    let _reg = host.respond_to::<Run, _, _, String>(
        |_req: RunRequest| async move { Err("boom".to_string()) },
        &token,
    );

    let err = sandbox
        .send::<Run>(RunRequest { name: "x".into() })
        .await
        .unwrap_err();
    assert!(matches!(err, MessengerError::Remote(ref m) if m == "boom"));
}

#[tokio::test]
async fn panicking_handler_still_answers() {
    let (host, sandbox, _, _) = make_pair();
    let token = CancellationToken::new();
    let _reg = host.respond_to::<Run, _, _, String>(
        |req: RunRequest| async move {
            if req.name == "explode" {
                panic!("kaboom");
            }
            Ok(RunOutcome::pass())
        },
        &token,
    );

    let err = sandbox
        .send::<Run>(RunRequest {
            name: "explode".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, MessengerError::Remote(ref m) if m.contains("panicked")));

    // The responder survives the panic.
    let ok = sandbox.send::<Run>(RunRequest { name: "x".into() }).await.unwrap();
    assert_eq!(ok, RunOutcome::pass());
}

#[tokio::test]
async fn undecodable_request_answers_error_marker() {
    let (host, _sandbox, _host_end, sandbox_end) = make_pair();
    let token = CancellationToken::new();
    let _reg = echo_files(&host, &token);

    let mut rx = sandbox_end.subscribe();
    let id = CorrelationId::new();
    sandbox_end
        .post(Envelope::request(MessageKind::FileRequest, id, json!(42)))
        .unwrap();

    let reply = loop {
        let delivery = rx.recv().await.unwrap();
        if delivery.envelope.correlation_id == id && delivery.envelope.is_response() {
            break delivery.envelope;
        }
    };
    assert!(error_marker(&reply.payload).unwrap().contains("invalid fileRequest payload"));
}

// ── Source verification & unknown kinds ─────────────────────────

#[tokio::test]
async fn messages_from_strangers_are_dropped() {
    let (host, _sandbox, host_end, sandbox_end) = make_pair();
    let token = CancellationToken::new();
    let _reg = echo_files(&host, &token);
    let mut rx = sandbox_end.subscribe();

    let request = |id| {
        Envelope::request(
            MessageKind::FileRequest,
            id,
            json!({"path": "/file/a.txt"}),
        )
    };

    let stranger = CorrelationId::new();
    host_end.inject(RealmId::new(), request(stranger)).unwrap();
    let local = CorrelationId::new();
    host_end.dispatch_local(request(local)).unwrap();

    // Only the same-realm dispatch is answered.
    let mut answered = Vec::new();
    while let Ok(Some(delivery)) =
        tokio::time::timeout(Duration::from_millis(100), rx.recv()).await
    {
        if delivery.envelope.is_response() {
            answered.push(delivery.envelope.correlation_id);
        }
    }
    assert_eq!(answered, vec![local]);
}

#[tokio::test]
async fn unknown_kinds_are_ignored() {
    let (host, sandbox, host_end, sandbox_end) = make_pair();
    let token = CancellationToken::new();
    let _reg = echo_files(&host, &token);

    let raw = json!({
        "kind": "teleport",
        "correlationId": CorrelationId::new().to_string(),
        "payload": {"path": "/file/a.txt"},
    });
    let envelope = Envelope::from_json(&raw.to_string()).unwrap();
    host_end.inject(sandbox_end.local_id(), envelope).unwrap();

    let reply = sandbox
        .send::<FileRequest>(FileRequestPayload {
            path: "/file/b.txt".into(),
        })
        .await
        .unwrap();
    assert_eq!(reply.body.unwrap(), b"/file/b.txt".to_vec());
}

// ── Registration lifetime ───────────────────────────────────────

#[tokio::test]
async fn dropping_registration_unregisters() {
    let (host, _sandbox, _, _) = make_pair();
    let token = CancellationToken::new();
    let reg = echo_files(&host, &token);
    assert!(reg.is_active());
    assert_eq!(host.responder_count(MessageKind::FileRequest), 1);

    drop(reg);
    assert_eq!(host.responder_count(MessageKind::FileRequest), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_token_unregisters() {
    let (host, sandbox, _, _) = make_pair();
    let token = CancellationToken::new();
    let reg = echo_files(&host, &token);

    token.cancel();
    assert!(!reg.is_active());
    assert_eq!(host.responder_count(MessageKind::FileRequest), 0);

    let raced = tokio::time::timeout(
        Duration::from_secs(1),
        sandbox.send::<FileRequest>(FileRequestPayload {
            path: "/file/a.txt".into(),
        }),
    )
    .await;
    assert!(raced.is_err());
}

// ── Notifications over a group ──────────────────────────────────

#[tokio::test]
async fn group_notifications_reach_other_members_only() {
    let group = GroupChannel::new("file-server");
    let a = Messenger::new(
        RealmContext::new(RealmRole::Top, "https://host.test"),
        Arc::new(group.join()),
        make_config(),
    );
    let b = Messenger::new(
        RealmContext::new(RealmRole::Nested, "https://host.test"),
        Arc::new(group.join()),
        make_config(),
    );
    let token = CancellationToken::new();

    let (a_tx, mut a_rx) = mpsc::unbounded_channel();
    let _a_sub = a.subscribe::<Listen, _, _>(
        move |state: ListenState| {
            let a_tx = a_tx.clone();
            async move {
                let _ = a_tx.send(state);
            }
        },
        &token,
    );
    let (b_tx, mut b_rx) = mpsc::unbounded_channel();
    let _b_sub = b.subscribe::<Listen, _, _>(
        move |state: ListenState| {
            let b_tx = b_tx.clone();
            async move {
                let _ = b_tx.send(state);
            }
        },
        &token,
    );

    a.notify::<Listen>(ListenState { listening: true }).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(1), b_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, ListenState { listening: true });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(a_rx.try_recv().is_err());
}

// ── Close ───────────────────────────────────────────────────────

#[tokio::test]
async fn close_fails_pending_sends() {
    let (host, sandbox, _, _) = make_pair();
    let token = CancellationToken::new();
    let _reg = host.respond_to::<Run, _, _, String>(
        |_req: RunRequest| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(RunOutcome::pass())
        },
        &token,
    );
    sandbox.connect().await.unwrap();

    let sender = sandbox.clone();
    let pending = tokio::spawn(async move { sender.send::<Run>(RunRequest { name: "x".into() }).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    sandbox.close();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, MessengerError::ChannelClosed));
    assert!(sandbox.is_closed());
    assert!(matches!(sandbox.connect().await, Err(MessengerError::ChannelClosed)));
}

#[tokio::test]
async fn closing_the_channel_stops_both_sides() {
    let (host, sandbox, host_end, _) = make_pair();
    sandbox.connect().await.unwrap();
    host_end.close();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(host.is_closed());
    assert!(sandbox.is_closed());
    let err = sandbox
        .send::<Run>(RunRequest { name: "x".into() })
        .await
        .unwrap_err();
    assert!(matches!(err, MessengerError::ChannelClosed));
}
