mod error;
mod mutations;
mod overlap;
mod queries;

pub use error::EngineError;
pub use overlap::find_conflict;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedSchedule = Arc<RwLock<Schedule>>;

/// Resource-existence collaborator. Catalogs whose inventory lives in an
/// external system (books) verify before inserting; catalogs without a
/// directory (spaces) trust the caller.
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    /// Whether `resource_id` exists upstream. An `Err` here is a failure of
    /// the directory itself, not a missing resource.
    async fn resource_exists(&self, resource_id: &str) -> Result<bool, EngineError>;
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// Durable reservation store for one catalog (spaces or books).
///
/// Owns every reservation row. The per-resource `RwLock` is the isolation
/// boundary: the availability check, the WAL append and the in-memory apply
/// all happen under the schedule's write guard, so check-then-insert is
/// indivisible per resource and independent across resources.
pub struct ReservationStore {
    schedules: DashMap<ResourceId, SharedSchedule>,
    /// Reverse lookup: reservation id → resource id.
    index: DashMap<ReservationId, ResourceId>,
    /// Requester id → reservation ids in creation order.
    by_requester: DashMap<RequesterId, Vec<ReservationId>>,
    wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    directory: Option<Arc<dyn ResourceDirectory>>,
}

impl ReservationStore {
    pub fn open(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        directory: Option<Arc<dyn ResourceDirectory>>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = Self {
            schedules: DashMap::new(),
            index: DashMap::new(),
            by_requester: DashMap::new(),
            wal_tx,
            notify,
            directory,
        };

        // Replay — we're the sole owner of these Arcs, so try_write always
        // succeeds instantly (no contention). Never use blocking_write here
        // because this may run inside an async context (lazy catalog creation).
        for event in &events {
            store.apply_replay(event);
        }

        Ok(store)
    }

    fn apply_replay(&self, event: &Event) {
        match event {
            Event::Created {
                id,
                resource_id,
                requester_id,
                interval,
                reason,
                at,
            } => {
                let sched = self.get_or_create_schedule(resource_id);
                let mut guard = sched.try_write().expect("replay: uncontended write");
                guard.insert(Reservation {
                    id: *id,
                    resource_id: resource_id.clone(),
                    requester_id: requester_id.clone(),
                    interval: *interval,
                    reason: reason.clone(),
                    status: Status::Pending,
                    created_at: *at,
                    updated_at: *at,
                });
                self.index.insert(*id, resource_id.clone());
                self.by_requester
                    .entry(requester_id.clone())
                    .or_default()
                    .push(*id);
            }
            Event::StatusChanged { id, resource_id, status, at } => {
                if let Some(sched) = self.get_schedule(resource_id) {
                    let mut guard = sched.try_write().expect("replay: uncontended write");
                    if let Some(row) = guard.get_mut(*id) {
                        row.status = *status;
                        row.updated_at = *at;
                    }
                }
            }
            Event::Rescheduled {
                id,
                resource_id,
                new_resource_id,
                interval,
                reason,
                at,
            } => {
                let Some(source) = self.get_schedule(resource_id) else {
                    return;
                };
                let mut source_guard = source.try_write().expect("replay: uncontended write");
                let Some(mut row) = source_guard.remove(*id) else {
                    return;
                };
                row.resource_id = new_resource_id.clone();
                row.interval = *interval;
                if reason.is_some() {
                    row.reason = reason.clone();
                }
                row.updated_at = *at;
                if new_resource_id == resource_id {
                    source_guard.insert(row);
                } else {
                    drop(source_guard);
                    let target = self.get_or_create_schedule(new_resource_id);
                    let mut target_guard =
                        target.try_write().expect("replay: uncontended write");
                    target_guard.insert(row);
                    self.index.insert(*id, new_resource_id.clone());
                }
            }
            Event::Deleted { id, resource_id } => {
                if let Some(sched) = self.get_schedule(resource_id) {
                    let mut guard = sched.try_write().expect("replay: uncontended write");
                    if let Some(removed) = guard.remove(*id) {
                        self.index.remove(id);
                        if let Some(mut ids) = self.by_requester.get_mut(&removed.requester_id) {
                            ids.retain(|r| r != id);
                        }
                    }
                }
            }
        }
    }

    /// Write an event to the WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    pub(super) fn get_schedule(&self, resource_id: &str) -> Option<SharedSchedule> {
        self.schedules.get(resource_id).map(|e| e.value().clone())
    }

    /// Schedules are created lazily — resource inventory lives outside this
    /// engine, so the first reservation for a resource materializes its row.
    pub(super) fn get_or_create_schedule(&self, resource_id: &str) -> SharedSchedule {
        self.schedules
            .entry(resource_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(Schedule::new(resource_id.to_string()))))
            .value()
            .clone()
    }

    pub(super) fn resource_of(&self, id: &ReservationId) -> Option<ResourceId> {
        self.index.get(id).map(|e| e.value().clone())
    }

    pub(super) fn directory(&self) -> Option<&Arc<dyn ResourceDirectory>> {
        self.directory.as_ref()
    }

    /// Lookup reservation → resource, then take the schedule's write lock.
    pub(super) async fn resolve_write(
        &self,
        id: &ReservationId,
    ) -> Result<(ResourceId, tokio::sync::OwnedRwLockWriteGuard<Schedule>), EngineError> {
        let resource_id = self.resource_of(id).ok_or(EngineError::NotFound(*id))?;
        let sched = self
            .get_schedule(&resource_id)
            .ok_or(EngineError::NotFound(*id))?;
        let guard = sched.write_owned().await;
        Ok((resource_id, guard))
    }

    pub(super) fn record_insert(&self, reservation: &Reservation) {
        self.index
            .insert(reservation.id, reservation.resource_id.clone());
        self.by_requester
            .entry(reservation.requester_id.clone())
            .or_default()
            .push(reservation.id);
    }

    pub(super) fn record_delete(&self, reservation: &Reservation) {
        self.index.remove(&reservation.id);
        if let Some(mut ids) = self.by_requester.get_mut(&reservation.requester_id) {
            ids.retain(|r| *r != reservation.id);
        }
    }
}
