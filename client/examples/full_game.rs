//! Reference game flow.
//!
//! Drives one complete game through the gateway: a host and two players
//! converge on the shared record, play a call and a challenge in round one,
//! then the host burns through the pyramid to the final summary.

use std::sync::Arc;

use pyramid_client::host::{HostSession, Reveal};
use pyramid_client::player::PlayerSession;
use pyramid_client::session::unix_time_ms;
use pyramid_engine::Decision;
use pyramid_gateway::Gateway;
use pyramid_types::RoomCode;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let gateway = Arc::new(Gateway::new());
    let room = RoomCode::parse("DEMO")?;

    let host = HostSession::create(
        Arc::clone(&gateway),
        room.clone(),
        "host",
        "Host",
        unix_time_ms(),
    )
    .await?;
    let alice = PlayerSession::join(Arc::clone(&gateway), room.clone(), "alice", "Alice").await?;
    let bob = PlayerSession::join(Arc::clone(&gateway), room.clone(), "bob", "Bob").await?;

    host.deal_hands().await?;
    host.start().await?;

    let mut feed = host.session().subscribe().await?;

    // Round 1: Alice calls Bob; Bob disputes; Alice reveals a proof card.
    let (_, reveal) = host.reveal_next().await?;
    if let Reveal::Opened(round) = reveal {
        println!("round {} opened on card {} (row {})", round.number, round.card, round.row);
    }
    let (_, tx_id) = alice.call("bob").await?;
    bob.respond(tx_id, Decision::Bullshit).await?;
    let snapshot = alice.session().snapshot().await?;
    let proof_card = snapshot.record.player("alice").expect("alice joined").hand[0].card;
    let (_, proof) = alice.prove(tx_id, proof_card).await?;
    println!("challenge resolved: {:?}, replacement {:?}", proof.outcome, proof.replacement);

    // Host reveals the rest of the pyramid.
    let summary = loop {
        match host.reveal_next().await?.1 {
            Reveal::Opened(round) => println!("round {} opened", round.number),
            Reveal::Finished(summary) => break summary,
        }
    };
    println!("game over:");
    for (uid, drinks) in summary {
        println!("  {uid}: {drinks} drinks");
    }

    // Drain whatever the feed saw; every snapshot is a full immutable view.
    while let Ok(Some(Ok(snapshot))) =
        tokio::time::timeout(std::time::Duration::from_millis(100), feed.next()).await
    {
        if snapshot.record.meta.finished {
            break;
        }
    }
    Ok(())
}
