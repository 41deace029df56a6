use pyramid_engine::mocks::{record_in_round, started_record, HOST};
use pyramid_engine::{
    create_transaction, respond_to_transaction, reveal_next_card, Decision, RevealOutcome,
};
use pyramid_types::{GameDelta, Mutation, TxId};

use super::*;

fn room() -> RoomCode {
    RoomCode::parse("ABCD").unwrap()
}

#[tokio::test]
async fn test_subscribe_delivers_initial_snapshot() {
    let gateway = Gateway::new();
    let record = started_record(3);
    let created = gateway.create_room(record.clone()).await.unwrap();
    assert_eq!(created.version, 1);

    let subscription = gateway.subscribe(&room()).await.unwrap();
    assert_eq!(subscription.initial.version, 1);
    assert_eq!(subscription.initial.record.as_ref(), &record);
    assert!(!subscription.initial.bytes.is_empty());
}

#[tokio::test]
async fn test_unknown_room_not_found() {
    let gateway = Gateway::new();
    let missing = room();
    assert!(matches!(
        gateway.subscribe(&missing).await,
        Err(StoreError::RoomNotFound { .. })
    ));
    assert!(matches!(
        gateway.get_fresh(&missing).await,
        Err(StoreError::RoomNotFound { .. })
    ));
    assert!(matches!(
        gateway.mutate(&missing, &Mutation::default()).await,
        Err(StoreError::RoomNotFound { .. })
    ));
}

#[tokio::test]
async fn test_duplicate_room_rejected() {
    let gateway = Gateway::new();
    gateway.create_room(started_record(2)).await.unwrap();
    assert!(matches!(
        gateway.create_room(started_record(2)).await,
        Err(StoreError::RoomAlreadyExists { .. })
    ));
}

#[tokio::test]
async fn test_commits_fan_out_in_order() {
    let gateway = Gateway::new();
    let (record, _) = record_in_round(3);
    gateway.create_room(record).await.unwrap();
    let mut subscription = gateway.subscribe(&room()).await.unwrap();

    let base = subscription.initial.record.clone();
    let call = create_transaction(&base, TxId(1), "uid-1", "uid-2").unwrap();
    let v2 = gateway.mutate(&room(), &call.mutation).await.unwrap();
    assert_eq!(v2.version, 2);

    let accept =
        respond_to_transaction(&v2.record, "uid-2", TxId(1), Decision::Accept).unwrap();
    let v3 = gateway.mutate(&room(), &accept.mutation).await.unwrap();
    assert_eq!(v3.version, 3);

    let first = subscription.receiver.recv().await.unwrap();
    let second = subscription.receiver.recv().await.unwrap();
    assert_eq!(first.version, 2);
    assert_eq!(second.version, 3);
    assert_eq!(second.record.as_ref(), v3.record.as_ref());
    assert_eq!(
        second.record.player("uid-2").unwrap().drinks,
        1,
        "accepted row-1 call charges one drink"
    );
}

#[tokio::test]
async fn test_get_fresh_reflects_own_write() {
    let gateway = Gateway::new();
    let record = started_record(2);
    gateway.create_room(record).await.unwrap();

    let base = gateway.get_fresh(&room()).await.unwrap();
    let opened = match reveal_next_card(&base.record, HOST).unwrap() {
        RevealOutcome::Opened { applied, .. } => applied,
        RevealOutcome::Finished { .. } => panic!("fresh pyramid cannot be exhausted"),
    };
    let committed = gateway.mutate(&room(), &opened.mutation).await.unwrap();

    let fresh = gateway.get_fresh(&room()).await.unwrap();
    assert_eq!(fresh.version, committed.version);
    assert!(fresh.record.current_round.is_some());
}

#[tokio::test]
async fn test_version_conflict_detected_and_recovered() {
    let gateway = Gateway::new();
    let (record, _) = record_in_round(3);
    gateway.create_room(record).await.unwrap();

    // Two clients read the same snapshot and build calls independently.
    let base_a = gateway.get_fresh(&room()).await.unwrap();
    let base_b = gateway.get_fresh(&room()).await.unwrap();
    let call_a = create_transaction(&base_a.record, TxId(1), "uid-1", "uid-2").unwrap();
    let call_b = create_transaction(&base_b.record, TxId(2), "uid-2", "uid-0").unwrap();

    gateway
        .mutate_if(&room(), base_a.version, &call_a.mutation)
        .await
        .unwrap();

    // The second conditional write observes the conflict instead of
    // silently losing either call.
    let err = gateway
        .mutate_if(&room(), base_b.version, &call_b.mutation)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::VersionConflict { .. }));
    assert!(err.is_retryable());

    // Retry against a fresh read succeeds and both calls survive.
    let fresh = gateway.get_fresh(&room()).await.unwrap();
    let retry = create_transaction(&fresh.record, TxId(2), "uid-2", "uid-0").unwrap();
    let committed = gateway
        .mutate_if(&room(), fresh.version, &retry.mutation)
        .await
        .unwrap();
    let transactions = &committed.record.open_round().unwrap().transactions;
    assert_eq!(transactions.len(), 2);
}

#[tokio::test]
async fn test_list_replace_last_write_wins() {
    // The documented limitation: unconditional whole-list writes race, and
    // the store keeps whichever lands last.
    let gateway = Gateway::new();
    let record = started_record(2);
    gateway.create_room(record).await.unwrap();

    let base = gateway.get_fresh(&room()).await.unwrap();
    let mut rotated = base.record.deck.clone();
    rotated.rotate_left(1);
    let mut reversed = base.record.deck.clone();
    reversed.reverse();

    gateway
        .mutate(&room(), &Mutation::single(GameDelta::SetDeck(rotated)))
        .await
        .unwrap();
    gateway
        .mutate(
            &room(),
            &Mutation::single(GameDelta::SetDeck(reversed.clone())),
        )
        .await
        .unwrap();

    let fresh = gateway.get_fresh(&room()).await.unwrap();
    assert_eq!(fresh.record.deck, reversed);
}

#[tokio::test]
async fn test_corrupting_mutation_rejected() {
    let gateway = Gateway::new();
    let record = started_record(2);
    gateway.create_room(record).await.unwrap();
    let before = gateway.get_fresh(&room()).await.unwrap();

    // Dropping the whole deck would lose cards from the 52-card partition.
    let err = gateway
        .mutate(&room(), &Mutation::single(GameDelta::SetDeck(Vec::new())))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Invariant(_)));

    let after = gateway.get_fresh(&room()).await.unwrap();
    assert_eq!(after.version, before.version);
    assert_eq!(after.record.as_ref(), before.record.as_ref());
}

#[tokio::test]
async fn test_remove_room_closes_feeds() {
    let gateway = Gateway::new();
    gateway.create_room(started_record(2)).await.unwrap();
    let mut subscription = gateway.subscribe(&room()).await.unwrap();

    assert!(gateway.remove_room(&room()).await);
    assert!(!gateway.remove_room(&room()).await);
    assert!(matches!(
        subscription.receiver.recv().await,
        Err(broadcast::error::RecvError::Closed)
    ));
}

#[tokio::test]
async fn test_subscriber_count_tracks_drops() {
    let gateway = Gateway::new();
    gateway.create_room(started_record(2)).await.unwrap();

    let first = gateway.subscribe(&room()).await.unwrap();
    let second = gateway.subscribe(&room()).await.unwrap();
    assert_eq!(gateway.subscriber_count(&room()).await, 2);

    drop(first);
    assert_eq!(gateway.subscriber_count(&room()).await, 1);
    drop(second);
    assert_eq!(gateway.subscriber_count(&room()).await, 0);
}
