//! End-of-game summary replay.
//!
//! The summary is not accumulated during play: it is recomputed by replaying
//! every recorded round's transactions, so the stored drink counters can be
//! audited against it. Charging rules:
//! - `Accepted` charges the target the round's row value.
//! - `BullshitCorrect` charges the target double the row value.
//! - `BullshitWrong` charges the caller double the row value.
//! - Unresolved transactions (dropped at round close) charge nothing.

use std::collections::BTreeMap;

use pyramid_types::{GameRecord, TransactionStatus};

/// Replay all rounds into per-player drink totals, sorted by uid.
///
/// Every registered player appears, including those who never drank.
pub fn compute_summary(record: &GameRecord) -> Vec<(String, u32)> {
    let mut totals: BTreeMap<String, u32> = record
        .players
        .keys()
        .map(|uid| (uid.clone(), 0))
        .collect();

    for round in record.rounds.values() {
        let row = round.row as u32;
        for tx in round.transactions.values() {
            match tx.status {
                TransactionStatus::Accepted => {
                    *totals.entry(tx.to.clone()).or_default() += row;
                }
                TransactionStatus::BullshitCorrect => {
                    *totals.entry(tx.to.clone()).or_default() += 2 * row;
                }
                TransactionStatus::BullshitWrong => {
                    *totals.entry(tx.from.clone()).or_default() += 2 * row;
                }
                TransactionStatus::Waiting | TransactionStatus::Bullshit => {}
            }
        }
    }

    totals.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyramid_types::{RoundRecord, Transaction, TxId};

    use crate::mocks::started_record;

    #[test]
    fn test_replay_charges_by_status() {
        let mut record = started_record(3);
        record.pyramid[0].shown = true;
        record.pyramid[5].shown = true;

        let mut round1 = RoundRecord::new(1, 1, record.pyramid[0].card);
        let mut accepted = Transaction::call(TxId(1), "uid-0".into(), "uid-1".into());
        accepted.status = TransactionStatus::Accepted;
        round1.transactions.insert(accepted.id, accepted);
        let mut wrong = Transaction::call(TxId(2), "uid-1".into(), "uid-2".into());
        wrong.status = TransactionStatus::BullshitWrong;
        round1.transactions.insert(wrong.id, wrong);
        record.rounds.insert(1, round1);

        let mut round2 = RoundRecord::new(2, 2, record.pyramid[5].card);
        let mut correct = Transaction::call(TxId(3), "uid-2".into(), "uid-0".into());
        correct.status = TransactionStatus::BullshitCorrect;
        round2.transactions.insert(correct.id, correct);
        // Abandoned at round close: contributes nothing.
        round2
            .transactions
            .insert(TxId(4), Transaction::call(TxId(4), "uid-1".into(), "uid-0".into()));
        record.rounds.insert(2, round2);

        let summary = compute_summary(&record);
        let lookup: BTreeMap<_, _> = summary.into_iter().collect();
        // uid-0: target of round-2 bullshit_correct, 2 x row 2.
        assert_eq!(lookup["uid-0"], 4);
        // uid-1: accepted round-1 call (row 1) + lost own challenge (2 x row 1).
        assert_eq!(lookup["uid-1"], 3);
        // uid-2: never charged.
        assert_eq!(lookup["uid-2"], 0);
    }
}
