//! Sync controller: a single task owning the local league revision.
//!
//! The task reconciles, one message at a time, local commands coming from
//! [`SyncHandle`], snapshots pushed by the document subscription, outcomes of
//! the background persister and reports from the storage supervisor. Readers
//! never talk to the task: they observe the league and the sync status through
//! `watch` channels.
//!
//! Writes are last-writer-wins on the whole `teams` field. While a local
//! revision has not been written yet, incoming snapshots are held back and
//! only the latest one is applied once the write lands, so an echo of an older
//! local write cannot roll the screen back.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use futures::StreamExt;
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, info, warn};

use crate::{
    dao::{
        document_store::DocumentStore,
        models::LeagueDocument,
        storage::{StorageError, StorageResult},
    },
    error::ServiceError,
    state::{
        cost::CostPolicy,
        league::{AdjustmentOutcome, AdjustmentRejection, League, LeagueError, Transaction},
        sync_machine::{SyncEvent, SyncPhase, SyncStateMachine},
    },
};

const COMMAND_BUFFER: usize = 32;
const INTERNAL_BUFFER: usize = 64;
const DEFAULT_PERSIST_ATTEMPTS: u32 = 5;

/// Exponential backoff bounds shared by load, subscription and write retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// First retry delay.
    pub initial: Duration,
    /// Upper bound of the retry delay.
    pub max: Duration,
}

impl Backoff {
    /// Half a second doubling up to ten seconds.
    pub const DEFAULT: Backoff = Backoff {
        initial: Duration::from_millis(500),
        max: Duration::from_secs(10),
    };

    fn next(&self, current: Duration) -> Duration {
        (current * 2).min(self.max)
    }
}

/// Everything the controller needs besides the store itself.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Name of the shared document.
    pub document_key: String,
    /// Team names used when the document has to be created.
    pub roster: Vec<String>,
    /// Cost curve applied to adjustments.
    pub policy: CostPolicy,
    /// Retry bounds for loads, subscriptions and writes.
    pub backoff: Backoff,
    /// Write attempts before the controller reports an error.
    pub persist_attempts: u32,
}

impl SyncSettings {
    /// Settings with default backoff and write attempts.
    pub fn new(document_key: impl Into<String>, roster: Vec<String>, policy: CostPolicy) -> Self {
        Self {
            document_key: document_key.into(),
            roster,
            policy,
            backoff: Backoff::DEFAULT,
            persist_attempts: DEFAULT_PERSIST_ATTEMPTS,
        }
    }

    /// Override the retry bounds.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Override the write attempts, at least one.
    pub fn with_persist_attempts(mut self, attempts: u32) -> Self {
        self.persist_attempts = attempts.max(1);
        self
    }
}

/// Published view of the synchronisation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// Current phase.
    pub phase: SyncPhase,
    /// Incremented on every phase transition.
    pub version: usize,
    /// Message of the last failure, cleared on recovery.
    pub last_error: Option<String>,
    /// Last time the local league was confirmed equal to the shared document.
    pub last_synced_at: Option<SystemTime>,
    /// A local revision is waiting to be written.
    pub pending_writes: bool,
}

/// Answer to an adjustment command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjustmentReply {
    /// The transaction was recorded.
    Applied {
        /// League revision including the transaction.
        league: Arc<League>,
        /// Recorded transaction.
        transaction: Transaction,
    },
    /// The request was a no-op.
    Rejected(AdjustmentRejection),
}

type Reply<T> = oneshot::Sender<Result<T, ServiceError>>;

enum Command {
    InstallStore(Arc<dyn DocumentStore>),
    StoreFailed(String),
    StoreRecovered,
    RecordScore {
        team: usize,
        hole: usize,
        value: u32,
        reply: Reply<Arc<League>>,
    },
    RecordAdjustment {
        target: usize,
        amount: i32,
        acting: usize,
        reply: Reply<AdjustmentReply>,
    },
}

enum Internal {
    LoadRetrying,
    LoadFailed(String),
    Loaded(League),
    Remote(Option<LeagueDocument>),
    SubscriptionLost(String),
    Persisted {
        revision: u64,
        result: Result<(), String>,
    },
}

/// Internal message tagged with the store generation that produced it, so
/// late messages from a replaced store are dropped.
struct Tagged {
    generation: u64,
    message: Internal,
}

#[derive(Clone)]
struct TaggedSender {
    generation: u64,
    tx: mpsc::Sender<Tagged>,
}

impl TaggedSender {
    /// Returns `false` once the controller is gone.
    async fn send(&self, message: Internal) -> bool {
        self.tx
            .send(Tagged {
                generation: self.generation,
                message,
            })
            .await
            .is_ok()
    }
}

#[derive(Debug, Error)]
enum LoadError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("malformed league document: {0}")]
    Malformed(#[from] LeagueError),
}

#[derive(Clone)]
struct PersistJob {
    revision: u64,
    league: Arc<League>,
}

/// Background tasks bound to one installed store.
struct Backend {
    store: Arc<dyn DocumentStore>,
    persist_tx: watch::Sender<Option<PersistJob>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for Backend {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Cloneable entry point to a running [`SyncController`].
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::Sender<Command>,
    league: watch::Receiver<Arc<League>>,
    status: watch::Receiver<SyncStatus>,
}

impl SyncHandle {
    /// Current league revision.
    pub fn league(&self) -> Arc<League> {
        self.league.borrow().clone()
    }

    /// Current sync status.
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every league revision.
    pub fn watch_league(&self) -> watch::Receiver<Arc<League>> {
        self.league.clone()
    }

    /// Receiver notified on every status change.
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    /// Hand a connected store to the controller. The first store starts the
    /// initial load; later ones replace the previous connection.
    pub async fn install_store(&self, store: Arc<dyn DocumentStore>) -> Result<(), ServiceError> {
        self.send(Command::InstallStore(store)).await
    }

    /// Tell the controller the store stopped answering.
    pub async fn report_store_failure(&self, reason: impl Into<String>) -> Result<(), ServiceError> {
        self.send(Command::StoreFailed(reason.into())).await
    }

    /// Tell the controller the store answers again.
    pub async fn report_store_recovered(&self) -> Result<(), ServiceError> {
        self.send(Command::StoreRecovered).await
    }

    /// Set the strokes of `team` on `hole` and return the new revision.
    pub async fn record_score(
        &self,
        team: usize,
        hole: usize,
        value: u32,
    ) -> Result<Arc<League>, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::RecordScore {
            team,
            hole,
            value,
            reply,
        })
        .await?;
        response.await.map_err(|_| ServiceError::Stopped)?
    }

    /// Buy an adjustment of `amount` strokes on `target` for `acting`.
    pub async fn record_adjustment(
        &self,
        target: usize,
        amount: i32,
        acting: usize,
    ) -> Result<AdjustmentReply, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::RecordAdjustment {
            target,
            amount,
            acting,
            reply,
        })
        .await?;
        response.await.map_err(|_| ServiceError::Stopped)?
    }

    async fn send(&self, command: Command) -> Result<(), ServiceError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ServiceError::Stopped)
    }
}

/// Task owning the league; driven through [`SyncHandle`].
pub struct SyncController {
    settings: SyncSettings,
    machine: SyncStateMachine,
    league: Arc<League>,
    /// Bumped on every local mutation.
    revision: u64,
    /// Highest local revision confirmed written.
    saved_revision: u64,
    deferred_remote: Option<League>,
    last_synced_at: Option<SystemTime>,
    league_tx: watch::Sender<Arc<League>>,
    status_tx: watch::Sender<SyncStatus>,
    internal_tx: mpsc::Sender<Tagged>,
    generation: u64,
    backend: Option<Backend>,
}

impl SyncController {
    /// Start the controller task. It stays [`SyncPhase::Uninitialized`] until a
    /// store is installed through the returned handle, and stops once every
    /// handle is dropped.
    pub fn spawn(settings: SyncSettings) -> Result<SyncHandle, LeagueError> {
        let league = Arc::new(League::with_roster(settings.roster.iter().cloned())?);
        let machine = SyncStateMachine::new();

        let (league_tx, league_rx) = watch::channel(league.clone());
        let (status_tx, status_rx) = watch::channel(SyncStatus {
            phase: machine.phase(),
            version: 0,
            last_error: None,
            last_synced_at: None,
            pending_writes: false,
        });
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (internal_tx, internal_rx) = mpsc::channel(INTERNAL_BUFFER);

        let controller = Self {
            settings,
            machine,
            league,
            revision: 0,
            saved_revision: 0,
            deferred_remote: None,
            last_synced_at: None,
            league_tx,
            status_tx,
            internal_tx,
            generation: 0,
            backend: None,
        };
        tokio::spawn(controller.run(commands_rx, internal_rx));

        Ok(SyncHandle {
            commands: commands_tx,
            league: league_rx,
            status: status_rx,
        })
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut internal: mpsc::Receiver<Tagged>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(Tagged { generation, message }) = internal.recv() => {
                    if generation == self.generation {
                        self.handle_internal(message);
                    }
                }
            }
            self.publish_status();
        }

        debug!(key = %self.settings.document_key, "sync controller stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::InstallStore(store) => self.install_store(store),
            Command::StoreFailed(reason) => self.transition(SyncEvent::Failed(reason)),
            Command::StoreRecovered => self.store_recovered(),
            Command::RecordScore {
                team,
                hole,
                value,
                reply,
            } => {
                let _ = reply.send(self.record_score(team, hole, value));
            }
            Command::RecordAdjustment {
                target,
                amount,
                acting,
                reply,
            } => {
                let _ = reply.send(self.record_adjustment(target, amount, acting));
            }
        }
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::LoadRetrying => self.transition(SyncEvent::Retry),
            Internal::LoadFailed(reason) => self.transition(SyncEvent::Failed(reason)),
            Internal::Loaded(league) => {
                self.transition(SyncEvent::Loaded);
                self.last_synced_at = Some(SystemTime::now());
                self.adopt(league);
                if let Some(remote) = self.deferred_remote.take() {
                    self.adopt(remote);
                }
                info!(key = %self.settings.document_key, "league loaded");
            }
            Internal::Remote(Some(document)) => self.remote_snapshot(document),
            Internal::Remote(None) => self.remote_deleted(),
            Internal::SubscriptionLost(reason) => {
                warn!(key = %self.settings.document_key, %reason, "document subscription lost; resubscribing");
            }
            Internal::Persisted { revision, result } => match result {
                Ok(()) => {
                    self.saved_revision = self.saved_revision.max(revision);
                    self.last_synced_at = Some(SystemTime::now());
                    if self.machine.phase() == SyncPhase::Error {
                        self.transition(SyncEvent::Recovered);
                    }
                    // A held-back snapshot may predate the write that just landed.
                    if !self.has_unsaved()
                        && self
                            .deferred_remote
                            .take()
                            .is_some_and(|remote| remote != *self.league)
                    {
                        self.refresh();
                    }
                }
                Err(reason) => {
                    warn!(revision, %reason, "giving up on league write");
                    self.transition(SyncEvent::Failed(reason));
                }
            },
        }
    }

    fn install_store(&mut self, store: Arc<dyn DocumentStore>) {
        self.generation += 1;
        // Dropping the previous backend aborts its tasks.
        self.backend = None;

        let key = self.settings.document_key.clone();
        let backoff = self.settings.backoff;
        let sender = self.sender();
        let (persist_tx, persist_rx) = watch::channel(None);

        let mut tasks = vec![
            tokio::spawn(run_subscription(
                store.clone(),
                key.clone(),
                backoff,
                sender.clone(),
            )),
            tokio::spawn(run_persister(
                store.clone(),
                key.clone(),
                backoff,
                self.settings.persist_attempts,
                persist_rx,
                sender.clone(),
            )),
        ];

        if self.machine.accepts_commands() {
            info!(%key, "storage connection replaced");
            if self.has_unsaved() {
                persist_tx.send_replace(Some(self.persist_job()));
            } else if self.machine.phase() == SyncPhase::Error {
                self.transition(SyncEvent::Recovered);
            }
        } else {
            match self.machine.phase() {
                SyncPhase::Uninitialized => self.transition(SyncEvent::Start),
                SyncPhase::Error => self.transition(SyncEvent::Retry),
                SyncPhase::Loading | SyncPhase::Synced => {}
            }
            tasks.push(tokio::spawn(run_loader(
                store.clone(),
                key,
                self.settings.roster.clone(),
                backoff,
                sender,
            )));
        }

        self.backend = Some(Backend {
            store,
            persist_tx,
            tasks,
        });
    }

    fn sender(&self) -> TaggedSender {
        TaggedSender {
            generation: self.generation,
            tx: self.internal_tx.clone(),
        }
    }

    /// Read the document again and feed it back as a remote snapshot.
    fn refresh(&mut self) {
        let sender = self.sender();
        let key = self.settings.document_key.clone();
        let Some(backend) = &mut self.backend else {
            return;
        };
        let store = backend.store.clone();
        backend.tasks.retain(|task| !task.is_finished());
        backend.tasks.push(tokio::spawn(async move {
            match store.fetch(&key).await {
                Ok(document) => {
                    sender.send(Internal::Remote(document)).await;
                }
                Err(err) => debug!(%key, error = %err, "league refresh failed"),
            }
        }));
    }

    fn store_recovered(&mut self) {
        if self.machine.phase() != SyncPhase::Error || !self.machine.accepts_commands() {
            // The loader keeps retrying on its own until the first load.
            return;
        }
        if self.has_unsaved() {
            self.queue_persist();
        } else {
            self.transition(SyncEvent::Recovered);
        }
    }

    fn record_score(
        &mut self,
        team: usize,
        hole: usize,
        value: u32,
    ) -> Result<Arc<League>, ServiceError> {
        self.ensure_loaded()?;
        let next = self.league.record_score(team, hole, value)?;
        Ok(self.commit(next))
    }

    fn record_adjustment(
        &mut self,
        target: usize,
        amount: i32,
        acting: usize,
    ) -> Result<AdjustmentReply, ServiceError> {
        self.ensure_loaded()?;
        match self
            .league
            .record_adjustment(target, amount, acting, &self.settings.policy)?
        {
            AdjustmentOutcome::Applied {
                league,
                transaction,
            } => {
                info!(
                    target,
                    acting,
                    amount,
                    cost = %transaction.cost,
                    "adjustment recorded"
                );
                let league = self.commit(league);
                Ok(AdjustmentReply::Applied {
                    league,
                    transaction,
                })
            }
            AdjustmentOutcome::Rejected(rejection) => {
                debug!(target, acting, amount, ?rejection, "adjustment ignored");
                Ok(AdjustmentReply::Rejected(rejection))
            }
        }
    }

    fn ensure_loaded(&self) -> Result<(), ServiceError> {
        if self.machine.accepts_commands() {
            Ok(())
        } else {
            Err(ServiceError::InvalidState(format!(
                "league is not loaded yet (sync phase {:?})",
                self.machine.phase()
            )))
        }
    }

    /// Publish a locally produced revision and queue it for persistence.
    fn commit(&mut self, next: League) -> Arc<League> {
        self.revision += 1;
        self.league = Arc::new(next);
        self.league_tx.send_replace(self.league.clone());
        self.queue_persist();
        self.league.clone()
    }

    fn remote_snapshot(&mut self, document: LeagueDocument) {
        let league = match League::try_from(document) {
            Ok(league) => league,
            Err(err) => {
                warn!(key = %self.settings.document_key, error = %err, "ignoring malformed remote snapshot");
                return;
            }
        };

        if !self.machine.accepts_commands() || self.has_unsaved() {
            self.deferred_remote = Some(league);
            return;
        }

        self.last_synced_at = Some(SystemTime::now());
        self.adopt(league);
    }

    fn remote_deleted(&mut self) {
        if !self.machine.accepts_commands() {
            return;
        }
        info!(key = %self.settings.document_key, "league document disappeared; recreating it from local state");
        self.deferred_remote = None;
        self.queue_persist();
    }

    fn adopt(&mut self, league: League) {
        if *self.league != league {
            self.league = Arc::new(league);
            self.league_tx.send_replace(self.league.clone());
        }
    }

    fn persist_job(&self) -> PersistJob {
        PersistJob {
            revision: self.revision,
            league: self.league.clone(),
        }
    }

    fn queue_persist(&mut self) {
        let job = self.persist_job();
        if let Some(backend) = &self.backend {
            backend.persist_tx.send_replace(Some(job));
        }
    }

    fn has_unsaved(&self) -> bool {
        self.saved_revision < self.revision
    }

    fn transition(&mut self, event: SyncEvent) {
        match self.machine.apply(event) {
            Ok(phase) => debug!(?phase, "sync phase changed"),
            Err(err) => debug!(error = %err, "ignoring sync event"),
        }
    }

    fn publish_status(&self) {
        let snapshot = self.machine.snapshot();
        let next = SyncStatus {
            phase: snapshot.phase,
            version: snapshot.version,
            last_error: snapshot.last_error,
            last_synced_at: self.last_synced_at,
            pending_writes: self.has_unsaved(),
        };
        self.status_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

async fn load_or_create(
    store: &dyn DocumentStore,
    key: &str,
    roster: &[String],
) -> Result<League, LoadError> {
    match store.fetch(key).await? {
        Some(document) => Ok(League::try_from(document)?),
        None => {
            let league = League::with_roster(roster.iter().cloned())?;
            store.create(key, LeagueDocument::from(&league)).await?;
            info!(key, "league document created with the configured roster");
            Ok(league)
        }
    }
}

async fn run_loader(
    store: Arc<dyn DocumentStore>,
    key: String,
    roster: Vec<String>,
    backoff: Backoff,
    sender: TaggedSender,
) {
    let mut delay = backoff.initial;
    loop {
        match load_or_create(store.as_ref(), &key, &roster).await {
            Ok(league) => {
                sender.send(Internal::Loaded(league)).await;
                return;
            }
            Err(err) => {
                warn!(%key, error = %err, retry_in_ms = delay.as_millis() as u64, "failed to load league document");
                if !sender.send(Internal::LoadFailed(err.to_string())).await {
                    return;
                }
                sleep(delay).await;
                delay = backoff.next(delay);
                if !sender.send(Internal::LoadRetrying).await {
                    return;
                }
            }
        }
    }
}

async fn run_subscription(
    store: Arc<dyn DocumentStore>,
    key: String,
    backoff: Backoff,
    sender: TaggedSender,
) {
    let mut delay = backoff.initial;
    loop {
        let mut changes = store.subscribe(&key);
        let reason = loop {
            match changes.next().await {
                Some(Ok(document)) => {
                    delay = backoff.initial;
                    if !sender.send(Internal::Remote(document)).await {
                        return;
                    }
                }
                Some(Err(err)) => break err.to_string(),
                None => break "change stream ended".to_owned(),
            }
        };
        drop(changes);

        if !sender.send(Internal::SubscriptionLost(reason)).await {
            return;
        }
        sleep(delay).await;
        delay = backoff.next(delay);
    }
}

enum WriteOutcome {
    Done(Result<(), String>),
    Superseded(PersistJob),
}

async fn run_persister(
    store: Arc<dyn DocumentStore>,
    key: String,
    backoff: Backoff,
    attempts: u32,
    mut jobs: watch::Receiver<Option<PersistJob>>,
    sender: TaggedSender,
) {
    let mut pending = None;
    loop {
        let job = match pending.take() {
            Some(job) => job,
            None => {
                if jobs.changed().await.is_err() {
                    return;
                }
                let next = jobs.borrow_and_update().clone();
                match next {
                    Some(job) => job,
                    None => continue,
                }
            }
        };

        match write_with_retry(store.as_ref(), &key, &job, backoff, attempts, &mut jobs).await {
            WriteOutcome::Done(result) => {
                let message = Internal::Persisted {
                    revision: job.revision,
                    result,
                };
                if !sender.send(message).await {
                    return;
                }
            }
            WriteOutcome::Superseded(next) => pending = Some(next),
        }
    }
}

async fn write_with_retry(
    store: &dyn DocumentStore,
    key: &str,
    job: &PersistJob,
    backoff: Backoff,
    attempts: u32,
    jobs: &mut watch::Receiver<Option<PersistJob>>,
) -> WriteOutcome {
    let document = LeagueDocument::from(job.league.as_ref());
    let mut delay = backoff.initial;
    let mut attempt = 1;

    loop {
        let err = match write_league(store, key, &document).await {
            Ok(()) => {
                debug!(key, revision = job.revision, "league written");
                return WriteOutcome::Done(Ok(()));
            }
            Err(err) => err,
        };

        if attempt >= attempts {
            return WriteOutcome::Done(Err(err.to_string()));
        }
        debug!(key, attempt, error = %err, "league write failed; retrying");

        // A newer revision replaces the one being retried.
        tokio::select! {
            _ = sleep(delay) => {}
            changed = jobs.changed() => {
                if changed.is_err() {
                    return WriteOutcome::Done(Err(err.to_string()));
                }
                let next = jobs.borrow_and_update().clone();
                if let Some(next) = next {
                    return WriteOutcome::Superseded(next);
                }
            }
        }

        attempt += 1;
        delay = backoff.next(delay);
    }
}

/// Update the `teams` field, recreating the document if it vanished.
async fn write_league(
    store: &dyn DocumentStore,
    key: &str,
    document: &LeagueDocument,
) -> StorageResult<()> {
    match store.update_teams(key, document.teams.clone()).await {
        Err(StorageError::MissingDocument { .. }) => {
            info!(key, "league document missing on write; recreating it");
            store.create(key, document.clone()).await
        }
        other => other,
    }
}
