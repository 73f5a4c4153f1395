use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use shared::{
    domain::{SearchMode, SearchQuery, TicketOffer},
    protocol::{RawTicketRow, StopRequest, StreamPayload},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub mod config;
pub mod error;
pub mod transport;

pub use config::ClientSettings;
pub use error::{SessionError, TransportError};
pub use transport::{CrawlerControlPlane, EventStream, EventStreamConnector, HttpBackend};

/// Delay between a terminal batch (no route, or no tickets without monitoring)
/// and the automatic stop.
pub const AUTO_STOP_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Loading,
    Results {
        offers: Vec<TicketOffer>,
        updated_at: DateTime<Utc>,
    },
    Monitoring {
        updated_at: DateTime<Utc>,
    },
    NoData,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }

    pub fn offers(&self) -> &[TicketOffer] {
        match self {
            SessionState::Results { offers, .. } => offers,
            _ => &[],
        }
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        match self {
            SessionState::Results { updated_at, .. } | SessionState::Monitoring { updated_at } => {
                Some(*updated_at)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u64);

#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged {
        mode: SearchMode,
        state: SessionState,
    },
    UpstreamError {
        mode: SearchMode,
        stream_id: StreamId,
        message: String,
    },
    /// The backend closed the stream or the connection dropped. No reconnect follows.
    StreamEnded {
        mode: SearchMode,
        stream_id: StreamId,
    },
    BackendStopped {
        mode: SearchMode,
        acknowledged: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    Acknowledged,
    Unacknowledged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderFlow {
    Continue,
    Stop,
}

struct StreamHandle {
    id: StreamId,
    reader: Option<JoinHandle<()>>,
    open: bool,
}

impl StreamHandle {
    fn pending(id: StreamId) -> Self {
        Self {
            id,
            reader: None,
            open: true,
        }
    }

    fn is_live(&self, id: StreamId) -> bool {
        self.open && self.id == id
    }

    fn close(&mut self) {
        self.open = false;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }

    /// Marks the stream closed from inside its own reader task.
    fn release(&mut self) {
        self.open = false;
        self.reader = None;
    }
}

struct PendingAutoStop {
    stream_id: StreamId,
    timer: JoinHandle<()>,
}

struct ActiveSession {
    query: SearchQuery,
    stream: StreamHandle,
    auto_stop: Option<PendingAutoStop>,
}

impl ActiveSession {
    fn teardown(&mut self) {
        self.stream.close();
        if let Some(pending) = self.auto_stop.take() {
            pending.timer.abort();
        }
    }
}

#[derive(Default)]
struct ControllerState {
    sessions: HashMap<SearchMode, ActiveSession>,
    states: HashMap<SearchMode, SessionState>,
}

/// Owns at most one live ticket stream per search mode and derives the
/// presentation state from the batches it receives.
pub struct SessionController {
    connector: Arc<dyn EventStreamConnector>,
    control: Arc<dyn CrawlerControlPlane>,
    auto_stop_delay: Duration,
    next_stream_id: AtomicU64,
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(settings: &ClientSettings) -> Arc<Self> {
        let backend = Arc::new(HttpBackend::new(settings.backend_url.clone()));
        Self::new_with_dependencies(backend.clone(), backend, settings.event_buffer)
    }

    pub fn new_with_dependencies(
        connector: Arc<dyn EventStreamConnector>,
        control: Arc<dyn CrawlerControlPlane>,
        event_buffer: usize,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Arc::new(Self {
            connector,
            control,
            auto_stop_delay: AUTO_STOP_DELAY,
            next_stream_id: AtomicU64::new(0),
            inner: Mutex::new(ControllerState::default()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self, mode: SearchMode) -> SessionState {
        let guard = self.inner.lock().await;
        guard.states.get(&mode).cloned().unwrap_or_default()
    }

    pub async fn active_query(&self, mode: SearchMode) -> Option<SearchQuery> {
        let guard = self.inner.lock().await;
        guard.sessions.get(&mode).map(|session| session.query.clone())
    }

    pub async fn is_stream_open(&self, mode: SearchMode) -> bool {
        let guard = self.inner.lock().await;
        guard
            .sessions
            .get(&mode)
            .is_some_and(|session| session.stream.open)
    }

    /// Starts a search, replacing any session already running for the same mode.
    pub async fn start_search(
        self: &Arc<Self>,
        query: SearchQuery,
    ) -> Result<StreamId, SessionError> {
        query.validate()?;
        let query = query.normalized();
        let mode = query.mode();
        let stream_id = StreamId(self.next_stream_id.fetch_add(1, Ordering::Relaxed) + 1);

        {
            let mut guard = self.inner.lock().await;
            let ControllerState { sessions, states } = &mut *guard;
            if let Some(mut previous) = sessions.remove(&mode) {
                debug!(%mode, previous = previous.stream.id.0, "closing previous stream");
                previous.teardown();
            }
            sessions.insert(
                mode,
                ActiveSession {
                    query: query.clone(),
                    stream: StreamHandle::pending(stream_id),
                    auto_stop: None,
                },
            );
            self.transition(states, mode, SessionState::Loading);
        }

        info!(%mode, stream = stream_id.0, "opening ticket stream");
        let stream = match self.connector.open(&query).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(%mode, stream = stream_id.0, error = %err, "failed to open ticket stream");
                let mut guard = self.inner.lock().await;
                let ControllerState { sessions, states } = &mut *guard;
                if sessions
                    .get(&mode)
                    .is_some_and(|session| session.stream.id == stream_id)
                {
                    sessions.remove(&mode);
                    self.transition(states, mode, SessionState::Idle);
                }
                return Err(SessionError::Connectivity(err));
            }
        };

        let mut guard = self.inner.lock().await;
        let Some(session) = guard
            .sessions
            .get_mut(&mode)
            .filter(|session| session.stream.is_live(stream_id))
        else {
            debug!(%mode, stream = stream_id.0, "search replaced or stopped while connecting");
            return Err(SessionError::Cancelled);
        };
        session.stream.reader = Some(self.spawn_reader(mode, stream_id, stream));
        Ok(stream_id)
    }

    /// Closes the mode's stream and asks the backend to stop polling.
    /// Local state is Idle before the backend is contacted.
    pub async fn stop_search(&self, mode: SearchMode) -> StopOutcome {
        let query = {
            let mut guard = self.inner.lock().await;
            let ControllerState { sessions, states } = &mut *guard;
            let Some(mut session) = sessions.remove(&mode) else {
                return StopOutcome::NotRunning;
            };
            session.teardown();
            self.transition(states, mode, SessionState::Idle);
            session.query
        };

        info!(%mode, "search stopped");
        self.request_backend_stop(mode, &query).await
    }

    /// Closes every open stream without contacting the backend.
    pub async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        let ControllerState { sessions, states } = &mut *guard;
        for (mode, mut session) in sessions.drain() {
            session.teardown();
            self.transition(states, mode, SessionState::Idle);
        }
    }

    fn transition(
        &self,
        states: &mut HashMap<SearchMode, SessionState>,
        mode: SearchMode,
        next: SessionState,
    ) {
        let current = states.entry(mode).or_default();
        if *current == next {
            return;
        }
        *current = next.clone();
        let _ = self
            .events
            .send(SessionEvent::StateChanged { mode, state: next });
    }

    fn spawn_reader(
        self: &Arc<Self>,
        mode: SearchMode,
        stream_id: StreamId,
        mut stream: EventStream,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                let Some(controller) = weak.upgrade() else {
                    return;
                };

                let data = match item {
                    Ok(data) => data,
                    Err(err) if err.is_fatal() => {
                        warn!(%mode, stream = stream_id.0, error = %err, "ticket stream failed");
                        break;
                    }
                    Err(err) => {
                        warn!(%mode, stream = stream_id.0, error = %err, "dropping undecodable event");
                        continue;
                    }
                };

                let payload = match StreamPayload::decode(&data) {
                    Ok(Some(payload)) => payload,
                    Ok(None) => {
                        debug!(%mode, stream = stream_id.0, "empty event");
                        continue;
                    }
                    Err(err) => {
                        warn!(%mode, stream = stream_id.0, error = %err, "dropping malformed event");
                        continue;
                    }
                };

                if controller.apply_payload(mode, stream_id, payload).await == ReaderFlow::Stop {
                    return;
                }
            }

            if let Some(controller) = weak.upgrade() {
                controller.finish_stream(mode, stream_id).await;
            }
        })
    }

    async fn apply_payload(
        self: &Arc<Self>,
        mode: SearchMode,
        stream_id: StreamId,
        payload: StreamPayload,
    ) -> ReaderFlow {
        let mut guard = self.inner.lock().await;
        let ControllerState { sessions, states } = &mut *guard;
        let Some(session) = sessions
            .get_mut(&mode)
            .filter(|session| session.stream.is_live(stream_id))
        else {
            debug!(%mode, stream = stream_id.0, "ignoring event from stale stream");
            return ReaderFlow::Stop;
        };

        match payload {
            StreamPayload::UpstreamError(message) => {
                warn!(%mode, stream = stream_id.0, %message, "backend reported an error; closing stream");
                session.stream.release();
                let _ = self.events.send(SessionEvent::UpstreamError {
                    mode,
                    stream_id,
                    message,
                });
                ReaderFlow::Stop
            }
            StreamPayload::NoRouteData => {
                info!(%mode, stream = stream_id.0, "route does not exist; stopping shortly");
                self.transition(states, mode, SessionState::NoData);
                self.schedule_auto_stop(session, mode, stream_id);
                ReaderFlow::Continue
            }
            StreamPayload::Batch(rows) if rows.is_empty() => {
                let updated_at = Utc::now();
                if session.query.auto_monitor {
                    debug!(%mode, stream = stream_id.0, "no tickets yet; monitoring");
                    self.transition(states, mode, SessionState::Monitoring { updated_at });
                } else {
                    info!(%mode, stream = stream_id.0, "no tickets and monitoring disabled; stopping shortly");
                    self.transition(
                        states,
                        mode,
                        SessionState::Results {
                            offers: Vec::new(),
                            updated_at,
                        },
                    );
                    self.schedule_auto_stop(session, mode, stream_id);
                }
                ReaderFlow::Continue
            }
            StreamPayload::Batch(rows) => {
                let offers: Vec<TicketOffer> = rows.iter().flat_map(RawTicketRow::offers).collect();
                if offers.is_empty() {
                    debug!(%mode, rows = rows.len(), "batch had no seat counts; keeping current state");
                } else {
                    debug!(%mode, offers = offers.len(), "ticket batch received");
                    self.transition(
                        states,
                        mode,
                        SessionState::Results {
                            offers,
                            updated_at: Utc::now(),
                        },
                    );
                }
                ReaderFlow::Continue
            }
        }
    }

    fn schedule_auto_stop(
        self: &Arc<Self>,
        session: &mut ActiveSession,
        mode: SearchMode,
        stream_id: StreamId,
    ) {
        if session.auto_stop.is_some() {
            return;
        }

        let weak = Arc::downgrade(self);
        let delay = self.auto_stop_delay;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(controller) = weak.upgrade() {
                controller.run_auto_stop(mode, stream_id).await;
            }
        });
        session.auto_stop = Some(PendingAutoStop { stream_id, timer });
    }

    async fn run_auto_stop(&self, mode: SearchMode, stream_id: StreamId) {
        let query = {
            let mut guard = self.inner.lock().await;
            let ControllerState { sessions, states } = &mut *guard;
            let scheduled = sessions.get(&mode).is_some_and(|session| {
                session.stream.id == stream_id
                    && session
                        .auto_stop
                        .as_ref()
                        .is_some_and(|pending| pending.stream_id == stream_id)
            });
            if !scheduled {
                debug!(%mode, stream = stream_id.0, "auto-stop no longer applies");
                return;
            }
            let Some(mut session) = sessions.remove(&mode) else {
                return;
            };
            // This task is the timer; detach its handle rather than aborting it.
            session.auto_stop = None;
            session.stream.close();
            self.transition(states, mode, SessionState::Idle);
            session.query
        };

        info!(%mode, stream = stream_id.0, "search auto-stopped");
        self.request_backend_stop(mode, &query).await;
    }

    async fn finish_stream(&self, mode: SearchMode, stream_id: StreamId) {
        let mut guard = self.inner.lock().await;
        let Some(session) = guard
            .sessions
            .get_mut(&mode)
            .filter(|session| session.stream.is_live(stream_id))
        else {
            return;
        };
        session.stream.release();
        info!(%mode, stream = stream_id.0, "ticket stream ended");
        let _ = self
            .events
            .send(SessionEvent::StreamEnded { mode, stream_id });
    }

    async fn request_backend_stop(&self, mode: SearchMode, query: &SearchQuery) -> StopOutcome {
        let request = StopRequest::for_query(query);
        let outcome = match self.control.stop(&request).await {
            Ok(response) if response.is_success() => StopOutcome::Acknowledged,
            Ok(response) => {
                warn!(%mode, status = %response.status, "backend did not acknowledge stop");
                StopOutcome::Unacknowledged
            }
            Err(err) => {
                warn!(%mode, error = %err, "stop request failed");
                StopOutcome::Unacknowledged
            }
        };

        let _ = self.events.send(SessionEvent::BackendStopped {
            mode,
            acknowledged: outcome == StopOutcome::Acknowledged,
        });
        outcome
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        for session in self.inner.get_mut().sessions.values_mut() {
            session.teardown();
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
