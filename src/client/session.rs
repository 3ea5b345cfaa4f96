//! One open room on a client: the poll loop, optimistic intents and feedback events.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use tokio::{
    sync::{Mutex as AsyncMutex, broadcast, watch},
    task::JoinHandle,
    time::{MissedTickBehavior, interval, sleep},
};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    client::{
        api::{ClientError, ClientResult, RoomApi},
        reconcile::{Reconciler, sort_participants},
    },
    clock::now_millis,
    dto::{
        action::JoinParticipant,
        room::{ParticipantDto, RoomDto, RoomSnapshotResponse},
    },
};

const EVENT_CAPACITY: usize = 32;

/// Lifecycle of a room session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Not polling.
    Idle,
    /// Waiting for the first snapshot.
    Loading,
    /// Room loaded; this device has not joined it.
    Spectating,
    /// Room loaded and this device counts in it.
    Joined,
    /// The room reached its target.
    Completed,
    /// The last poll failed.
    Error(SessionFailure),
}

/// Why a session is in [`SessionStatus::Error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFailure {
    /// The room does not exist. Polling has stopped.
    RoomNotFound,
    /// The first snapshot could not be fetched. Polling continues.
    Unreachable(String),
}

/// Vibration feedback kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Haptic {
    /// Short pulse on every local tap.
    Tap,
    /// Pattern played once when the room completes.
    Completion,
}

impl Haptic {
    /// Vibration pattern in milliseconds, alternating on and off.
    pub fn pattern(self) -> &'static [u64] {
        match self {
            Haptic::Tap => &[5],
            Haptic::Completion => &[500, 200, 500],
        }
    }
}

/// Side effects for the presentation layer to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Vibrate with the given feedback.
    Haptic(Haptic),
    /// Play the completion chime.
    CompletionChime,
}

/// Everything a view needs to render the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    /// Room as last polled, with `total_count` replaced by the displayed total.
    pub room: Option<RoomDto>,
    /// Participants ordered by personal count, highest first.
    pub participants: Vec<ParticipantDto>,
    pub current_participant_id: Option<String>,
    /// Whether this device created the room.
    pub is_owner: bool,
    pub status: SessionStatus,
    pub vibration_enabled: bool,
}

/// Tuning of a [`RoomSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub poll_interval: Duration,
    /// Delay before re-reading the room after a target change.
    pub target_refresh_delay: Duration,
    pub vibration_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1_500),
            target_refresh_delay: Duration::from_millis(500),
            vibration_enabled: true,
        }
    }
}

struct LocalState {
    room: Option<RoomDto>,
    participants: Vec<ParticipantDto>,
    participant_id: Option<String>,
    reconciler: Reconciler,
    status: SessionStatus,
    vibration_enabled: bool,
    /// Set once the session is dropped; later poll results are discarded.
    closed: bool,
}

impl LocalState {
    fn settled_status(&self) -> SessionStatus {
        match &self.room {
            Some(room) if room.is_completed => SessionStatus::Completed,
            Some(_) if self.participant_id.is_some() => SessionStatus::Joined,
            Some(_) => SessionStatus::Spectating,
            None => SessionStatus::Loading,
        }
    }
}

struct SessionInner {
    api: Arc<dyn RoomApi>,
    code: String,
    device_id: String,
    config: SessionConfig,
    local: Mutex<LocalState>,
    view: watch::Sender<SessionView>,
    events: broadcast::Sender<SessionEvent>,
    poll_gate: AsyncMutex<()>,
}

/// Whether the poll loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollOutcome {
    Continue,
    RoomGone,
}

impl SessionInner {
    fn local(&self) -> MutexGuard<'_, LocalState> {
        self.local.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self) {
        let view = {
            let local = self.local();
            let room = local.room.clone().map(|mut room| {
                room.total_count = local.reconciler.visual_total();
                room
            });
            SessionView {
                is_owner: room.as_ref().is_some_and(|room| room.owner_id == self.device_id),
                room,
                participants: local.participants.clone(),
                current_participant_id: local.participant_id.clone(),
                status: local.status.clone(),
                vibration_enabled: local.vibration_enabled,
            }
        };
        self.view.send_replace(view);
    }

    fn emit(&self, event: SessionEvent) {
        // No subscriber is fine.
        let _ = self.events.send(event);
    }

    async fn refresh(&self) -> ClientResult<()> {
        let _gate = self.poll_gate.lock().await;
        self.poll_locked().await.1
    }

    /// Poll unless a fetch is already in flight.
    async fn tick(&self) -> PollOutcome {
        let Ok(_gate) = self.poll_gate.try_lock() else {
            debug!(code = %self.code, "previous poll still in flight; skipping tick");
            return PollOutcome::Continue;
        };
        self.poll_locked().await.0
    }

    async fn poll_locked(&self) -> (PollOutcome, ClientResult<()>) {
        let result = self.api.fetch_snapshot(&self.code).await;
        let outcome = match result {
            Ok(snapshot) => {
                self.apply_snapshot(snapshot);
                (PollOutcome::Continue, Ok(()))
            }
            Err(ClientError::NotFound) => {
                info!(code = %self.code, "room not found; stopping poll");
                {
                    let mut local = self.local();
                    if !local.closed {
                        local.room = None;
                        local.status = SessionStatus::Error(SessionFailure::RoomNotFound);
                    }
                }
                (PollOutcome::RoomGone, Err(ClientError::NotFound))
            }
            Err(err) => {
                warn!(code = %self.code, error = %err, "room poll failed");
                {
                    let mut local = self.local();
                    if local.room.is_none() && !local.closed {
                        local.status = SessionStatus::Error(SessionFailure::Unreachable(err.to_string()));
                    }
                }
                (PollOutcome::Continue, Err(err))
            }
        };
        self.publish();
        outcome
    }

    fn apply_snapshot(&self, snapshot: RoomSnapshotResponse) {
        let RoomSnapshotResponse {
            room,
            mut participants,
        } = snapshot;
        sort_participants(&mut participants);

        let observation = {
            let mut local = self.local();
            if local.closed {
                return;
            }
            let observation = local.reconciler.observe(room.total_count, room.is_completed);
            local.room = Some(room);
            local.participants = participants;
            local.status = local.settled_status();
            observation
        };

        if observation.completed_now {
            info!(code = %self.code, "room completed");
            self.emit(SessionEvent::CompletionChime);
            self.emit(SessionEvent::Haptic(Haptic::Completion));
        }
    }
}

/// Live view of one room, kept fresh by a background poll.
///
/// Dropping the session stops polling. Mutation calls already sent are left to
/// finish on their own.
pub struct RoomSession {
    inner: Arc<SessionInner>,
    poller: JoinHandle<()>,
}

impl RoomSession {
    /// Open room `code` as device `device_id` and start polling immediately.
    ///
    /// `participant_id` is the identity this device joined the room with
    /// earlier, if any.
    pub fn start(
        api: Arc<dyn RoomApi>,
        code: impl Into<String>,
        device_id: impl Into<String>,
        participant_id: Option<String>,
        config: SessionConfig,
    ) -> Self {
        let local = LocalState {
            room: None,
            participants: Vec::new(),
            participant_id: participant_id.clone(),
            reconciler: Reconciler::new(),
            status: SessionStatus::Loading,
            vibration_enabled: config.vibration_enabled,
            closed: false,
        };
        let (view, _rx) = watch::channel(SessionView {
            room: None,
            participants: Vec::new(),
            current_participant_id: participant_id,
            is_owner: false,
            status: SessionStatus::Loading,
            vibration_enabled: config.vibration_enabled,
        });
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let inner = Arc::new(SessionInner {
            api,
            code: code.into(),
            device_id: device_id.into(),
            config,
            local: Mutex::new(local),
            view,
            events,
            poll_gate: AsyncMutex::new(()),
        });
        let poller = tokio::spawn(poll_loop(inner.clone()));

        Self { inner, poller }
    }

    /// Code of the room this session follows.
    pub fn code(&self) -> &str {
        &self.inner.code
    }

    /// Current view.
    pub fn view(&self) -> SessionView {
        self.inner.view.borrow().clone()
    }

    /// Receive every view update.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.inner.view.subscribe()
    }

    /// Stream of feedback events emitted from now on.
    pub fn events(&self) -> BroadcastStream<SessionEvent> {
        BroadcastStream::new(self.inner.events.subscribe())
    }

    /// Fetch the snapshot now, waiting for any poll in flight first.
    pub async fn refresh(&self) -> ClientResult<()> {
        self.inner.refresh().await
    }

    /// Count a tap locally and send it without waiting.
    ///
    /// Returns `false` when the tap was dropped: the room is completed or gone,
    /// or this device has not joined. Must be called inside a Tokio runtime.
    pub fn tap(&self) -> bool {
        let (participant_id, vibrate) = {
            let mut local = self.inner.local();
            if local.room.as_ref().is_some_and(|room| room.is_completed)
                || local.status == SessionStatus::Error(SessionFailure::RoomNotFound)
            {
                return false;
            }
            let Some(participant_id) = local.participant_id.clone() else {
                return false;
            };

            local.reconciler.tap();
            if let Some(me) = local
                .participants
                .iter_mut()
                .find(|participant| participant.id == participant_id)
            {
                me.personal_count += 1;
            }
            sort_participants(&mut local.participants);
            (participant_id, local.vibration_enabled)
        };
        self.inner.publish();
        if vibrate {
            self.inner.emit(SessionEvent::Haptic(Haptic::Tap));
        }

        let api = self.inner.api.clone();
        let code = self.inner.code.clone();
        tokio::spawn(async move {
            if let Err(err) = api.tap(&code, &participant_id).await {
                warn!(%code, error = %err, "tap was not delivered");
            }
        });
        true
    }

    /// Zero the room locally and send the reset without waiting.
    pub fn reset(&self) {
        {
            let mut local = self.inner.local();
            local.reconciler.reset();
            if let Some(room) = local.room.as_mut() {
                room.total_count = 0;
                room.is_completed = false;
            }
            for participant in &mut local.participants {
                participant.personal_count = 0;
            }
            local.status = local.settled_status();
        }
        self.inner.publish();

        let api = self.inner.api.clone();
        let code = self.inner.code.clone();
        tokio::spawn(async move {
            if let Err(err) = api.reset(&code).await {
                warn!(%code, error = %err, "reset was not delivered");
            }
        });
    }

    /// Send a new target, then re-read the room shortly after to pick up the
    /// server's completion verdict.
    pub fn update_target(&self, new_target: u64) {
        let api = self.inner.api.clone();
        let code = self.inner.code.clone();
        tokio::spawn(async move {
            if let Err(err) = api.update_target(&code, new_target).await {
                warn!(%code, error = %err, "target update was not delivered");
            }
        });

        let session: Weak<SessionInner> = Arc::downgrade(&self.inner);
        let delay = self.inner.config.target_refresh_delay;
        tokio::spawn(async move {
            sleep(delay).await;
            if let Some(inner) = session.upgrade() {
                // Failures are already logged by the poll.
                let _ = inner.refresh().await;
            }
        });
    }

    /// Join the room under `name`, then refresh at once.
    pub async fn join(&self, name: &str) -> ClientResult<ParticipantDto> {
        let participant = JoinParticipant {
            id: Some(Uuid::new_v4().simple().to_string()),
            name: name.trim().to_string(),
            joined_at: Some(now_millis()),
        };
        let joined = self.inner.api.join(&self.inner.code, participant).await?;
        {
            let mut local = self.inner.local();
            local.participant_id = Some(joined.id.clone());
            local.status = local.settled_status();
        }
        self.inner.publish();

        let _ = self.inner.refresh().await;
        Ok(joined)
    }

    /// Turn tap vibration on or off. Completion feedback is unaffected.
    pub fn set_vibration_enabled(&self, enabled: bool) {
        self.inner.local().vibration_enabled = enabled;
        self.inner.publish();
    }

    /// Current tap vibration preference.
    pub fn vibration_enabled(&self) -> bool {
        self.inner.local().vibration_enabled
    }

    /// Stop polling. Subscribers see [`SessionStatus::Idle`].
    pub fn close(self) {}
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        self.poller.abort();
        {
            let mut local = self.inner.local();
            local.closed = true;
            local.status = SessionStatus::Idle;
        }
        self.inner.publish();
    }
}

async fn poll_loop(inner: Arc<SessionInner>) {
    let mut ticker = interval(inner.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if inner.tick().await == PollOutcome::RoomGone {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use futures::{FutureExt, StreamExt, future::BoxFuture};
    use tokio::sync::oneshot;

    use super::*;
    use crate::dto::{
        action::ActionResponse,
        room::CreateRoomRequest,
    };

    /// In-memory stand-in for the backend; tests edit `snapshot` directly.
    #[derive(Default)]
    struct ScriptedApi {
        snapshot: Mutex<Option<RoomSnapshotResponse>>,
        fail_fetches: AtomicBool,
        /// When set, the next fetch waits for this signal before answering.
        held_fetch: Mutex<Option<oneshot::Receiver<()>>>,
        fetches: AtomicU32,
        taps: AtomicU32,
        resets: AtomicU32,
        targets: Mutex<Vec<u64>>,
    }

    impl ScriptedApi {
        fn with_room(total: u64, is_completed: bool) -> Arc<Self> {
            let api = Self::default();
            *api.snapshot.lock().unwrap() = Some(RoomSnapshotResponse {
                room: room(total, is_completed),
                participants: vec![participant("a", "Amina", 1), participant("b", "Bilal", 2)],
            });
            Arc::new(api)
        }

        /// Hold the next fetch open until the returned sender fires. Its
        /// snapshot is taken when the fetch starts.
        fn hold_next_fetch(&self) -> oneshot::Sender<()> {
            let (release, held) = oneshot::channel();
            *self.held_fetch.lock().unwrap() = Some(held);
            release
        }

        fn set_total(&self, total: u64, is_completed: bool) {
            let mut snapshot = self.snapshot.lock().unwrap();
            let snapshot = snapshot.as_mut().unwrap();
            snapshot.room.total_count = total;
            snapshot.room.is_completed = is_completed;
        }
    }

    impl RoomApi for ScriptedApi {
        fn fetch_snapshot(&self, _code: &str) -> BoxFuture<'static, ClientResult<RoomSnapshotResponse>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let result = if self.fail_fetches.load(Ordering::SeqCst) {
                Err(ClientError::Status {
                    status: 503,
                    message: "degraded".into(),
                })
            } else {
                self.snapshot.lock().unwrap().clone().ok_or(ClientError::NotFound)
            };
            let held = self.held_fetch.lock().unwrap().take();
            async move {
                if let Some(held) = held {
                    let _ = held.await;
                }
                result
            }
            .boxed()
        }

        fn create_room(&self, _request: CreateRoomRequest) -> BoxFuture<'static, ClientResult<RoomDto>> {
            async { Err(ClientError::NotFound) }.boxed()
        }

        fn join(
            &self,
            code: &str,
            participant: JoinParticipant,
        ) -> BoxFuture<'static, ClientResult<ParticipantDto>> {
            let mut snapshot = self.snapshot.lock().unwrap();
            let result = match snapshot.as_mut() {
                None => Err(ClientError::NotFound),
                Some(snapshot) if snapshot.participants.iter().any(|p| p.name == participant.name) => {
                    Err(ClientError::DuplicateName("Name already taken".into()))
                }
                Some(snapshot) => {
                    let joined = ParticipantDto {
                        id: participant.id.unwrap_or_default(),
                        room_code: code.to_string(),
                        name: participant.name,
                        personal_count: 0,
                        joined_at: participant.joined_at.unwrap_or_default(),
                    };
                    snapshot.participants.push(joined.clone());
                    Ok(joined)
                }
            };
            async move { result }.boxed()
        }

        fn tap(&self, _code: &str, _participant_id: &str) -> BoxFuture<'static, ClientResult<ActionResponse>> {
            self.taps.fetch_add(1, Ordering::SeqCst);
            async { Ok(ActionResponse::ok()) }.boxed()
        }

        fn reset(&self, _code: &str) -> BoxFuture<'static, ClientResult<ActionResponse>> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            async { Ok(ActionResponse::ok()) }.boxed()
        }

        fn update_target(
            &self,
            _code: &str,
            new_target: u64,
        ) -> BoxFuture<'static, ClientResult<ActionResponse>> {
            self.targets.lock().unwrap().push(new_target);
            async { Ok(ActionResponse::ok()) }.boxed()
        }
    }

    fn room(total: u64, is_completed: bool) -> RoomDto {
        RoomDto {
            id: "r".into(),
            code: "123456".into(),
            name: "Evening".into(),
            phrase: "سبحان الله".into(),
            phrase_image: None,
            target_count: 33,
            total_count: total,
            is_completed,
            created_at: 0,
            owner_id: "owner-device".into(),
        }
    }

    fn participant(id: &str, name: &str, count: u64) -> ParticipantDto {
        ParticipantDto {
            id: id.into(),
            room_code: "123456".into(),
            name: name.into(),
            personal_count: count,
            joined_at: 0,
        }
    }

    /// Long poll interval so only explicit refreshes hit the api after the first tick.
    fn quiet() -> SessionConfig {
        SessionConfig {
            poll_interval: Duration::from_secs(3_600),
            ..SessionConfig::default()
        }
    }

    async fn started(api: Arc<ScriptedApi>, participant_id: Option<&str>, config: SessionConfig) -> RoomSession {
        let session = RoomSession::start(
            api,
            "123456",
            "owner-device",
            participant_id.map(str::to_string),
            config,
        );
        let mut views = session.subscribe();
        views
            .wait_for(|view| view.status != SessionStatus::Loading)
            .await
            .unwrap();
        session
    }

    #[tokio::test(start_paused = true)]
    async fn first_poll_loads_the_room_sorted() {
        let api = ScriptedApi::with_room(3, false);
        let session = started(api, None, quiet()).await;

        let view = session.view();
        assert_eq!(view.status, SessionStatus::Spectating);
        assert!(view.is_owner);
        assert_eq!(view.room.unwrap().total_count, 3);
        let names = view.participants.iter().map(|p| p.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Bilal", "Amina"]);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_on_a_fixed_interval() {
        let api = ScriptedApi::with_room(0, false);
        let _session = started(api.clone(), None, SessionConfig::default()).await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);

        sleep(Duration::from_millis(3_100)).await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_are_skipped_while_a_fetch_is_in_flight() {
        let api = ScriptedApi::with_room(4, false);
        let session = started(api.clone(), Some("a"), SessionConfig::default()).await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);

        let release = api.hold_next_fetch();
        let (refreshed, ()) = tokio::join!(session.refresh(), async {
            sleep(Duration::from_millis(1)).await;
            assert_eq!(api.fetches.load(Ordering::SeqCst), 2);
            assert!(session.tap());
            api.set_total(9, false);

            // Two interval ticks come due while the fetch is outstanding.
            sleep(Duration::from_millis(3_100)).await;
            assert_eq!(api.fetches.load(Ordering::SeqCst), 2);
            release.send(()).unwrap();
        });
        refreshed.unwrap();
        // The late reply predates the tap and must not hide it.
        assert_eq!(session.view().room.unwrap().total_count, 5);

        sleep(Duration::from_millis(1_500)).await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 3);
        assert_eq!(session.view().room.unwrap().total_count, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn optimistic_tap_survives_stale_polls() {
        let api = ScriptedApi::with_room(5, false);
        let session = started(api.clone(), Some("a"), quiet()).await;
        let mut events = session.events();

        assert!(session.tap());
        let view = session.view();
        assert_eq!(view.room.as_ref().unwrap().total_count, 6);
        assert_eq!(view.participants[0].personal_count, 2);
        assert_eq!(events.next().await.unwrap().unwrap(), SessionEvent::Haptic(Haptic::Tap));

        // Server has not seen the tap yet.
        session.refresh().await.unwrap();
        assert_eq!(session.view().room.unwrap().total_count, 6);

        api.set_total(7, false);
        session.refresh().await.unwrap();
        assert_eq!(session.view().room.unwrap().total_count, 8);

        sleep(Duration::from_millis(1)).await;
        assert_eq!(api.taps.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn tap_is_dropped_when_completed_or_not_joined() {
        let api = ScriptedApi::with_room(33, true);
        let joined = started(api.clone(), Some("a"), quiet()).await;
        assert_eq!(joined.view().status, SessionStatus::Completed);
        assert!(!joined.tap());

        let open = ScriptedApi::with_room(1, false);
        let spectator = started(open.clone(), None, quiet()).await;
        assert!(!spectator.tap());

        sleep(Duration::from_millis(1)).await;
        assert_eq!(api.taps.load(Ordering::SeqCst), 0);
        assert_eq!(open.taps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tap_haptic_follows_the_vibration_preference() {
        let api = ScriptedApi::with_room(0, false);
        let session = started(api, Some("a"), quiet()).await;
        let mut events = session.events();

        session.set_vibration_enabled(false);
        assert!(!session.vibration_enabled());
        assert!(session.tap());
        assert!(events.next().now_or_never().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn completion_feedback_fires_once() {
        let api = ScriptedApi::with_room(32, false);
        let session = started(api.clone(), Some("a"), quiet()).await;
        let mut events = session.events();

        api.set_total(33, true);
        session.refresh().await.unwrap();
        assert_eq!(events.next().await.unwrap().unwrap(), SessionEvent::CompletionChime);
        assert_eq!(
            events.next().await.unwrap().unwrap(),
            SessionEvent::Haptic(Haptic::Completion)
        );
        assert_eq!(Haptic::Completion.pattern(), &[500, 200, 500]);

        session.refresh().await.unwrap();
        session.refresh().await.unwrap();
        assert!(events.next().now_or_never().is_none());
        assert_eq!(session.view().status, SessionStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_zeroes_locally_and_is_sent() {
        let api = ScriptedApi::with_room(10, false);
        let session = started(api.clone(), Some("a"), quiet()).await;
        session.tap();

        session.reset();
        let view = session.view();
        assert_eq!(view.room.as_ref().unwrap().total_count, 0);
        assert!(view.participants.iter().all(|p| p.personal_count == 0));

        api.set_total(0, false);
        session.refresh().await.unwrap();
        assert_eq!(session.view().room.unwrap().total_count, 0);

        sleep(Duration::from_millis(1)).await;
        assert_eq!(api.resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn target_update_refreshes_after_a_delay() {
        let api = ScriptedApi::with_room(7, true);
        let session = started(api.clone(), Some("a"), quiet()).await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);

        session.update_target(10);
        api.set_total(7, false);
        sleep(Duration::from_millis(400)).await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(*api.targets.lock().unwrap(), vec![10]);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 2);
        let view = session.view();
        assert_eq!(view.status, SessionStatus::Joined);
        assert!(!view.room.unwrap().is_completed);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_stops_the_poll() {
        let api = ScriptedApi::with_room(1, false);
        let session = started(api.clone(), None, SessionConfig::default()).await;
        let views = session.subscribe();

        session.close();
        assert_eq!(views.borrow().status, SessionStatus::Idle);
        sleep(Duration::from_secs(10)).await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_room_is_terminal() {
        let api = Arc::new(ScriptedApi::default());
        let session = started(api.clone(), None, SessionConfig::default()).await;

        let view = session.view();
        assert_eq!(view.status, SessionStatus::Error(SessionFailure::RoomNotFound));
        assert!(view.room.is_none());

        sleep(Duration::from_secs(10)).await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn taps_after_the_room_vanished_are_dropped() {
        let api = ScriptedApi::with_room(3, false);
        let session = started(api.clone(), Some("a"), quiet()).await;

        *api.snapshot.lock().unwrap() = None;
        assert!(matches!(session.refresh().await, Err(ClientError::NotFound)));
        assert!(!session.tap());
        assert_eq!(
            session.view().status,
            SessionStatus::Error(SessionFailure::RoomNotFound)
        );

        sleep(Duration::from_millis(1)).await;
        assert_eq!(api.taps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_during_a_refresh_stays_idle() {
        let api = ScriptedApi::with_room(7, false);
        let session = started(api.clone(), Some("a"), quiet()).await;
        let views = session.subscribe();

        // The delayed refresh after a target change is in flight at close.
        let release = api.hold_next_fetch();
        session.update_target(10);
        sleep(Duration::from_millis(600)).await;
        assert_eq!(api.fetches.load(Ordering::SeqCst), 2);

        session.close();
        assert_eq!(views.borrow().status, SessionStatus::Idle);
        release.send(()).unwrap();
        sleep(Duration::from_millis(1)).await;
        assert_eq!(views.borrow().status, SessionStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_on_first_load_is_retried() {
        let api = ScriptedApi::with_room(2, false);
        api.fail_fetches.store(true, Ordering::SeqCst);
        let session = started(api.clone(), None, SessionConfig::default()).await;
        assert!(matches!(
            session.view().status,
            SessionStatus::Error(SessionFailure::Unreachable(_))
        ));

        api.fail_fetches.store(false, Ordering::SeqCst);
        let mut views = session.subscribe();
        views
            .wait_for(|view| view.status == SessionStatus::Spectating)
            .await
            .unwrap();

        // Once loaded, later failures keep the last good view.
        api.fail_fetches.store(true, Ordering::SeqCst);
        assert!(session.refresh().await.is_err());
        assert_eq!(session.view().status, SessionStatus::Spectating);
    }

    #[tokio::test(start_paused = true)]
    async fn join_records_identity_and_refreshes() {
        let api = ScriptedApi::with_room(0, false);
        let session = started(api.clone(), None, quiet()).await;

        let joined = session.join("  Zaid ").await.unwrap();
        assert_eq!(joined.name, "Zaid");
        let view = session.view();
        assert_eq!(view.status, SessionStatus::Joined);
        assert_eq!(view.current_participant_id.as_deref(), Some(joined.id.as_str()));
        assert!(view.participants.iter().any(|p| p.id == joined.id));

        let err = session.join("Amina").await.unwrap_err();
        assert!(matches!(err, ClientError::DuplicateName(_)));
    }
}
