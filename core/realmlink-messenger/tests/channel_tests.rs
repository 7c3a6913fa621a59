use realmlink_messenger::{Channel, ChannelKind, GroupChannel, MessengerError, PairedEndpoint};
use realmlink_types::{CorrelationId, Envelope, MessageKind, RealmId};
use serde_json::Value;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_test::{assert_err, assert_ok};

fn make_envelope() -> Envelope {
    Envelope::request(MessageKind::Log, CorrelationId::new(), Value::Null)
}

// ── Paired ──────────────────────────────────────────────────────

#[tokio::test]
async fn paired_post_reaches_peer_with_source() {
    let (a_id, b_id) = (RealmId::new(), RealmId::new());
    let (a, b) = PairedEndpoint::pair(a_id, b_id);
    assert_eq!(a.kind(), ChannelKind::Paired);
    assert_eq!(a.peer_id(), Some(b_id));
    assert_eq!(b.peer_id(), Some(a_id));

    let mut rx = b.subscribe();
    let envelope = make_envelope();
    a.post(envelope.clone()).unwrap();

    let delivery = rx.recv().await.unwrap();
    assert_eq!(delivery.source, Some(a_id));
    assert_eq!(delivery.envelope, envelope);
}

#[tokio::test]
async fn paired_post_does_not_echo() {
    let (a, _b) = PairedEndpoint::pair(RealmId::new(), RealmId::new());
    let mut rx = a.subscribe();
    assert_ok!(a.post(make_envelope()));
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn posting_without_subscribers_is_lost() {
    let (a, b) = PairedEndpoint::pair(RealmId::new(), RealmId::new());
    assert_ok!(a.post(make_envelope()));

    let mut rx = b.subscribe();
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn dispatch_local_has_no_source() {
    let (a, _b) = PairedEndpoint::pair(RealmId::new(), RealmId::new());
    let mut rx = a.subscribe();
    a.dispatch_local(make_envelope()).unwrap();
    assert_eq!(rx.recv().await.unwrap().source, None);
}

#[tokio::test]
async fn closed_pair_rejects_posts_and_ends_subscriptions() {
    let (a, b) = PairedEndpoint::pair(RealmId::new(), RealmId::new());
    let mut rx = b.subscribe();
    b.close();

    assert!(a.is_closed());
    assert_err!(b.post(make_envelope()));
    assert!(matches!(a.post(make_envelope()), Err(MessengerError::ChannelClosed)));
    assert!(rx.recv().await.is_none());
    assert!(a.subscribe().recv().await.is_none());
}

#[tokio::test]
async fn burst_without_reader_is_fully_queued() {
    let (a, b) = PairedEndpoint::pair(RealmId::new(), RealmId::new());
    let mut rx = b.subscribe();

    let sent: Vec<Envelope> = (0..1000).map(|_| make_envelope()).collect();
    for envelope in &sent {
        assert_ok!(a.post(envelope.clone()));
    }

    for envelope in &sent {
        assert_eq!(&rx.try_recv().unwrap().envelope, envelope);
    }
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn dropped_subscriber_does_not_block_others() {
    let (a, b) = PairedEndpoint::pair(RealmId::new(), RealmId::new());
    let gone = b.subscribe();
    let mut rx = b.subscribe();
    drop(gone);

    assert_ok!(a.post(make_envelope()));
    assert_eq!(rx.recv().await.unwrap().source, Some(a.local_id()));
}

// ── Group ───────────────────────────────────────────────────────

#[tokio::test]
async fn group_broadcasts_to_every_member() {
    let group = GroupChannel::new("file-server");
    assert_eq!(group.name(), "file-server");
    let a = group.join();
    let b = group.join();
    let c = group.join();
    assert_eq!(a.kind(), ChannelKind::Group);
    assert_eq!(a.peer_id(), None);

    let mut b_rx = b.subscribe();
    let mut c_rx = c.subscribe();
    a.post(make_envelope()).unwrap();

    assert_eq!(b_rx.recv().await.unwrap().source, Some(a.local_id()));
    assert_eq!(c_rx.recv().await.unwrap().source, Some(a.local_id()));
}

#[tokio::test]
async fn closed_group_rejects_posts() {
    let group = GroupChannel::new("file-server");
    let member = group.join();
    group.close();
    assert!(member.is_closed());
    assert!(matches!(
        member.post(make_envelope()),
        Err(MessengerError::ChannelClosed)
    ));
}
