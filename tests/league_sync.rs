//! Two clients sharing one document store see each other's changes.

use std::{sync::Arc, time::Duration};

use fantasy_golf_back::{
    dao::{document_store::memory::MemoryDocumentStore, models::LeagueDocument},
    services::sync_service::{
        AdjustmentReply, Backoff, SyncController, SyncHandle, SyncSettings, SyncStatus,
    },
    state::{
        cost::{CostPolicy, Money},
        league::League,
        scoring,
        sync_machine::SyncPhase,
    },
};
use tokio::time::{sleep, timeout};

const KEY: &str = "leagueState";
const WAIT: Duration = Duration::from_secs(2);

fn roster() -> Vec<String> {
    (1..=12).map(|n| format!("Team {n}")).collect()
}

fn settings() -> SyncSettings {
    SyncSettings::new(KEY, roster(), CostPolicy::STEEP).with_backoff(Backoff {
        initial: Duration::from_millis(10),
        max: Duration::from_millis(40),
    })
}

async fn client(store: &MemoryDocumentStore) -> SyncHandle {
    let handle = SyncController::spawn(settings()).unwrap();
    handle.install_store(Arc::new(store.clone())).await.unwrap();
    let mut status = handle.watch_status();
    timeout(WAIT, status.wait_for(|s: &SyncStatus| s.phase == SyncPhase::Synced))
        .await
        .expect("client did not sync")
        .unwrap();
    handle
}

async fn wait_for_league(handle: &SyncHandle, f: impl FnMut(&Arc<League>) -> bool) -> Arc<League> {
    let mut league = handle.watch_league();
    timeout(WAIT, league.wait_for(f))
        .await
        .expect("league never reached the expected state")
        .unwrap()
        .clone()
}

#[tokio::test]
async fn score_entered_on_one_client_reaches_the_other() {
    let store = MemoryDocumentStore::new();
    let first = client(&store).await;
    let second = client(&store).await;

    first.record_score(4, 0, 5).await.unwrap();

    let seen = wait_for_league(&second, |league| league.teams()[4].strokes[0] == 5).await;
    assert_eq!(scoring::total_strokes(&seen.teams()[4]), 5);
}

#[tokio::test]
async fn adjustments_flow_both_ways() {
    let store = MemoryDocumentStore::new();
    let first = client(&store).await;
    let second = client(&store).await;

    let reply = first.record_adjustment(7, 2, 0).await.unwrap();
    assert!(matches!(reply, AdjustmentReply::Applied { .. }));
    wait_for_league(&second, |league| league.teams()[7].adjustments == 2).await;

    let reply = second.record_adjustment(1, -1, 1).await.unwrap();
    let AdjustmentReply::Applied { transaction, .. } = reply else {
        panic!("self removal should be applied");
    };
    assert_eq!(transaction.cost, Money::from_cents(500));

    let league = wait_for_league(&first, |league| league.teams()[1].adjustments == -1).await;
    assert_eq!(league.teams()[7].adjustments, 2);
    assert_eq!(scoring::pot(&league), Money::from_cents(1000));
}

#[tokio::test]
async fn persisted_league_reloads_identically() {
    let store = MemoryDocumentStore::new();
    let first = client(&store).await;

    first.record_score(0, 0, 4).await.unwrap();
    first.record_score(0, 1, 6).await.unwrap();
    first.record_adjustment(3, 1, 0).await.unwrap();
    first.record_adjustment(0, -2, 0).await.unwrap();

    let expected = first.league();
    timeout(WAIT, async {
        while store
            .peek(KEY)
            .and_then(|doc| League::try_from(doc).ok())
            .as_ref()
            != Some(expected.as_ref())
        {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("store never caught up");

    let reloaded = client(&store).await;
    assert_eq!(*reloaded.league(), *expected);
    assert_eq!(
        store.peek(KEY).unwrap(),
        LeagueDocument::from(expected.as_ref())
    );
    assert_eq!(
        scoring::pot(&reloaded.league()),
        Money::from_cents(500 + 875)
    );
}
