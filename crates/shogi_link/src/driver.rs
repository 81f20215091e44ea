//! Game driver: the single logical thread of control for one client.
//!
//! User input, poll results and engine completions arrive as [`GameEvent`]s
//! on one channel and are handled strictly one after another. The driver is
//! the only place that forwards local commits to the session.
//!
//! Forwarded commits stay queued until the session confirms them. A
//! transport failure is retried on the next poll; a refusal is settled
//! against the log and, if the log does not hold the action, taken back.

use crate::{
    Control, EngineAdapter, GameState, Outbound, PollResult, PollerHandle, Reconciler,
    SessionApi, SessionStatus, SyncError, Transition, TurnMachine, spawn_poller,
};
use shogi_rules::{Action, GameStatus, PieceKind, RulesOracle, Side, Square};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Local input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Click on a board square.
    Click(Square),
    /// Click on a hand entry of the side to move.
    Hand(PieceKind),
    /// Answer to the promotion question.
    Promote(bool),
    /// A fully specified action.
    Play(Action),
    /// An action in USI notation, read for the side to move.
    Usi(String),
    /// Re-send the current position.
    Show,
    /// Start over from the initial position (offline games only).
    Reset,
}

/// Everything the driver reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// Local input.
    Input(Command),
    /// A fresh session snapshot from the poller.
    Poll(GameState),
    /// The poller could not reach the session.
    PollFailed(SyncError),
    /// The engine answered request `request`.
    EngineMove {
        /// Generation the request was issued under.
        request: u64,
        /// Chosen action, `None` for resignation.
        action: Option<Action>,
    },
    /// The engine could not serve request `request`.
    EngineFailed {
        /// Generation the request was issued under.
        request: u64,
        /// What went wrong.
        error: SyncError,
    },
    /// The session answered a forwarded local action.
    Forwarded {
        /// Log sequence the action was sent for.
        sequence: u64,
        /// New log length, or why the submission failed.
        result: Result<u64, SyncError>,
    },
    /// Tear down; later events are discarded.
    Shutdown,
}

impl From<PollResult> for GameEvent {
    fn from(result: PollResult) -> Self {
        match result {
            PollResult::State(state) => GameEvent::Poll(state),
            PollResult::Failed(error) => GameEvent::PollFailed(error),
        }
    }
}

/// What the driver tells the front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverNotice {
    /// The position as SFEN, sent on every change and on request.
    PositionChanged(String),
    /// A selection was made; these actions complete it.
    Targets(Vec<Action>),
    /// The last action waits for a yes/no promotion answer.
    AwaitingPromotion,
    /// Something the player should see.
    Alert(String),
    /// The game is over.
    GameOver(GameStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Ready,
    InFlight,
    /// Transport failed; resend after the next poll unless the log has it.
    Retry,
    /// The session refused it; the next poll decides.
    Disputed,
}

struct Unconfirmed {
    outbound: Outbound,
    delivery: Delivery,
    alerted: bool,
}

/// What the log says about the oldest unconfirmed commit.
#[derive(Debug, PartialEq, Eq)]
enum Settlement {
    Pending,
    RollBack(u64),
}

struct NetSeat {
    api: Arc<dyn SessionApi>,
    token: String,
    reconciler: Reconciler,
    poll_failing: bool,
    unconfirmed: VecDeque<Unconfirmed>,
    end_sent: bool,
}

impl NetSeat {
    /// Drops commits the log confirms, marks retries ready, and reports a
    /// commit the log contradicts.
    fn settle(&mut self, state: &GameState) -> Settlement {
        while let Some(front) = self.unconfirmed.front_mut() {
            if matches!(front.delivery, Delivery::Ready | Delivery::InFlight) {
                break;
            }
            let sequence = front.outbound.sequence;
            let logged = state.moves.iter().find(|entry| entry.sequence == sequence);
            match logged {
                Some(entry)
                    if entry.side == front.outbound.side
                        && entry.action == front.outbound.action =>
                {
                    debug!(sequence, "Log already holds local move");
                    self.unconfirmed.pop_front();
                }
                Some(_) => return Settlement::RollBack(sequence),
                None if front.delivery == Delivery::Retry => {
                    front.delivery = Delivery::Ready;
                    break;
                }
                None => return Settlement::RollBack(sequence),
            }
        }
        Settlement::Pending
    }
}

struct EngineSeat {
    adapter: Arc<EngineAdapter>,
    side: Side,
    generation: u64,
    outstanding: bool,
}

/// Owns the turn machine and serializes every event that touches it.
pub struct GameDriver<R> {
    machine: TurnMachine<R>,
    net: Option<NetSeat>,
    engine: Option<EngineSeat>,
    events_tx: mpsc::UnboundedSender<GameEvent>,
    events_rx: mpsc::UnboundedReceiver<GameEvent>,
    notices: mpsc::UnboundedSender<DriverNotice>,
    last_sfen: String,
    game_over_reported: bool,
}

impl<R: RulesOracle + 'static> GameDriver<R> {
    /// Driver for an offline game; notices go to `notices`.
    pub fn new(machine: TurnMachine<R>, notices: mpsc::UnboundedSender<DriverNotice>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let last_sfen = machine.position().to_sfen();
        Self {
            machine,
            net: None,
            engine: None,
            events_tx,
            events_rx,
            notices,
            last_sfen,
            game_over_reported: false,
        }
    }

    /// Forwards local commits to session `token` and replays the opponent's entries.
    pub fn with_session(mut self, api: Arc<dyn SessionApi>, token: String, own_side: Side) -> Self {
        self.net = Some(NetSeat {
            api,
            token,
            reconciler: Reconciler::new(own_side),
            poll_failing: false,
            unconfirmed: VecDeque::new(),
            end_sent: false,
        });
        self
    }

    /// Lets `adapter` play `side`.
    pub fn with_engine(mut self, adapter: Arc<EngineAdapter>, side: Side) -> Self {
        self.engine = Some(EngineSeat {
            adapter,
            side,
            generation: 0,
            outstanding: false,
        });
        self
    }

    /// Sender for posting events to this driver.
    pub fn sender(&self) -> mpsc::UnboundedSender<GameEvent> {
        self.events_tx.clone()
    }

    /// The machine this driver owns.
    pub fn machine(&self) -> &TurnMachine<R> {
        &self.machine
    }

    /// Starts polling the session, if any. Dropping the handle stops it.
    pub fn start_polling(&self, interval: Duration) -> Option<PollerHandle> {
        let net = self.net.as_ref()?;
        Some(spawn_poller(
            Arc::clone(&net.api),
            net.token.clone(),
            interval,
            self.events_tx.clone(),
            GameEvent::from,
        ))
    }

    /// Handles events until `Shutdown` or until every sender is gone.
    #[instrument(skip(self))]
    pub async fn run(mut self) -> TurnMachine<R> {
        info!("Game driver running");
        // Kick the engine in case it moves first.
        self.after_event();
        while let Some(event) = self.events_rx.recv().await {
            if !self.handle(event).await {
                break;
            }
        }
        info!("Game driver stopped");
        if let Some(engine) = &self.engine {
            engine.adapter.shutdown();
        }
        self.machine
    }

    /// Processes one event to completion. Returns false on `Shutdown`.
    #[instrument(skip(self, event))]
    pub async fn handle(&mut self, event: GameEvent) -> bool {
        match event {
            GameEvent::Shutdown => {
                debug!("Shutdown requested");
                return false;
            }
            GameEvent::Input(command) => self.on_command(command),
            GameEvent::Poll(state) => self.on_poll(&state),
            GameEvent::PollFailed(error) => self.on_poll_failed(error),
            GameEvent::EngineMove { request, action } => self.on_engine_move(request, action),
            GameEvent::EngineFailed { request, error } => self.on_engine_failed(request, error),
            GameEvent::Forwarded { sequence, result } => self.on_forwarded(sequence, result),
        }
        self.after_event();
        true
    }

    fn notify(&self, notice: DriverNotice) {
        if self.notices.send(notice).is_err() {
            debug!("Notice receiver gone");
        }
    }

    fn on_command(&mut self, command: Command) {
        let transition = match &command {
            Command::Click(square) => self.machine.click_square(*square),
            Command::Hand(kind) => {
                let side = self.machine.position().turn();
                self.machine.click_hand(*kind, side)
            }
            Command::Promote(promote) => self.machine.answer_promotion(*promote),
            Command::Play(action) => self.machine.play_local(*action),
            Command::Usi(text) => match Action::from_usi(text, self.machine.position().turn()) {
                Ok(action) => self.machine.play_local(action),
                Err(e) => {
                    self.notify(DriverNotice::Alert(e.to_string()));
                    return;
                }
            },
            Command::Show => {
                self.notify(DriverNotice::PositionChanged(self.machine.position().to_sfen()));
                return;
            }
            Command::Reset => {
                if self.net.is_some() {
                    self.notify(DriverNotice::Alert(
                        "Reset is only available offline".to_string(),
                    ));
                    return;
                }
                self.machine.reset();
                self.game_over_reported = false;
                self.forget_engine_request();
                return;
            }
        };
        match transition {
            Transition::Selected { .. } => {
                self.notify(DriverNotice::Targets(self.machine.targets().to_vec()));
            }
            Transition::AwaitingPromotion(_) => self.notify(DriverNotice::AwaitingPromotion),
            Transition::Rejected(rejection) => debug!(%rejection, "Input dropped"),
            Transition::Ignored => debug!(?command, "Input ignored"),
            Transition::Deselected | Transition::Cleared | Transition::Committed(_) => {}
        }
    }

    fn on_poll(&mut self, state: &GameState) {
        let Some(net) = &mut self.net else {
            return;
        };
        if net.poll_failing {
            info!("Session reachable again");
            net.poll_failing = false;
        }

        let mut rolled_back = false;
        if let Settlement::RollBack(sequence) = net.settle(state) {
            warn!(sequence, "Session does not hold local move, taking it back");
            net.unconfirmed.clear();
            rolled_back = self.machine.rewind(sequence as usize);
        }

        let applied = net.reconciler.reconcile(state, &mut self.machine);
        if applied > 0 {
            debug!(applied, cursor = net.reconciler.cursor(), "Applied remote entries");
        }
        if state.status == SessionStatus::Ended && !self.machine.status().is_over() {
            debug!("Session ended remotely");
        }
        if rolled_back {
            self.forget_engine_request();
            self.notify(DriverNotice::Alert(
                "Move was not accepted by the session and was taken back".to_string(),
            ));
        }
    }

    fn on_forwarded(&mut self, sequence: u64, result: Result<u64, SyncError>) {
        let Some(net) = &mut self.net else {
            return;
        };
        let Some(front) = net.unconfirmed.front_mut() else {
            return;
        };
        if front.outbound.sequence != sequence || front.delivery != Delivery::InFlight {
            debug!(sequence, "Discarding stale submit result");
            return;
        }
        let alert = match result {
            Ok(turn) => {
                debug!(turn, sequence, "Local move forwarded");
                net.unconfirmed.pop_front();
                None
            }
            Err(error) => {
                warn!(sequence, error = %error, "Forwarding local move failed");
                front.delivery = match error {
                    SyncError::Transport(_) => Delivery::Retry,
                    _ => Delivery::Disputed,
                };
                let first = !front.alerted;
                front.alerted = true;
                first.then(|| error.to_string())
            }
        };
        if let Some(message) = alert {
            self.notify(DriverNotice::Alert(message));
        }
    }

    fn on_poll_failed(&mut self, error: SyncError) {
        let Some(net) = &mut self.net else {
            return;
        };
        warn!(error = %error, "Poll failed");
        if !net.poll_failing {
            net.poll_failing = true;
            self.notify(DriverNotice::Alert(error.to_string()));
        }
    }

    fn on_engine_move(&mut self, request: u64, action: Option<Action>) {
        let Some(engine) = &mut self.engine else {
            return;
        };
        if request != engine.generation {
            debug!(request, current = engine.generation, "Discarding stale engine reply");
            return;
        }
        engine.outstanding = false;
        let side = engine.side;
        if self.machine.position().turn() != side {
            debug!("Engine reply arrived off turn");
            return;
        }
        match action {
            Some(action) => {
                let transition = self.machine.apply_engine(action);
                if !matches!(transition, Transition::Committed(_)) {
                    warn!(?transition, "Engine action did not apply");
                }
            }
            None => {
                info!(%side, "Engine resigns");
                self.machine.resign(side);
            }
        }
    }

    fn on_engine_failed(&mut self, request: u64, error: SyncError) {
        let current = self.engine.as_ref().is_some_and(|e| e.generation == request);
        if !current {
            return;
        }
        warn!(error = %error, "Engine failed, continuing without it");
        self.engine = None;
        if self.net.is_none() {
            self.machine.set_control(Control::HotSeat);
        }
        self.notify(DriverNotice::Alert(error.to_string()));
    }

    fn after_event(&mut self) {
        self.queue_outbound();
        self.send_next();

        let sfen = self.machine.position().to_sfen();
        if sfen != self.last_sfen {
            self.last_sfen = sfen.clone();
            self.notify(DriverNotice::PositionChanged(sfen));
        }

        let status = self.machine.status();
        if status.is_over() {
            if !self.game_over_reported {
                self.game_over_reported = true;
                self.notify(DriverNotice::GameOver(status));
            }
            self.end_session();
            return;
        }

        self.request_engine_move();
    }

    fn queue_outbound(&mut self) {
        let outbound = self.machine.take_outbound();
        let Some(net) = &mut self.net else {
            return;
        };
        net.unconfirmed.extend(outbound.into_iter().map(|outbound| Unconfirmed {
            outbound,
            delivery: Delivery::Ready,
            alerted: false,
        }));
    }

    /// Submits the oldest unconfirmed commit in the background.
    fn send_next(&mut self) {
        let events = self.events_tx.clone();
        let Some(net) = &mut self.net else {
            return;
        };
        let Some(front) = net.unconfirmed.front_mut() else {
            return;
        };
        if front.delivery != Delivery::Ready {
            return;
        }
        front.delivery = Delivery::InFlight;
        let out = front.outbound.clone();
        let api = Arc::clone(&net.api);
        let token = net.token.clone();
        debug!(sequence = out.sequence, "Forwarding local move");
        tokio::spawn(async move {
            let result = api
                .submit_move(&token, out.action, out.side, Some(out.snapshot))
                .await;
            let _ = events.send(GameEvent::Forwarded {
                sequence: out.sequence,
                result,
            });
        });
    }

    /// Marks the session over once every local commit is confirmed.
    fn end_session(&mut self) {
        let Some(net) = &mut self.net else {
            return;
        };
        if net.end_sent || !net.unconfirmed.is_empty() {
            return;
        }
        net.end_sent = true;
        let api = Arc::clone(&net.api);
        let token = net.token.clone();
        tokio::spawn(async move {
            if let Err(e) = api.end(&token).await {
                debug!(error = %e, "Could not mark session ended");
            }
        });
    }

    fn forget_engine_request(&mut self) {
        if let Some(engine) = &mut self.engine {
            engine.generation += 1;
            engine.outstanding = false;
        }
    }

    fn request_engine_move(&mut self) {
        let turn = self.machine.position().turn();
        let Some(engine) = &mut self.engine else {
            return;
        };
        if engine.outstanding || turn != engine.side {
            return;
        }
        engine.generation += 1;
        engine.outstanding = true;
        let request = engine.generation;
        let adapter = Arc::clone(&engine.adapter);
        let events = self.events_tx.clone();
        let position = self.machine.position().clone();
        debug!(request, "Requesting engine move");
        tokio::spawn(async move {
            let event = match adapter.request_for(position).await {
                Ok(action) => GameEvent::EngineMove { request, action },
                Err(error) => GameEvent::EngineFailed { request, error },
            };
            let _ = events.send(event);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SessionStore;
    use shogi_rules::StandardRules;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn usi(text: &str, side: Side) -> Command {
        Command::Play(Action::from_usi(text, side).expect("valid usi"))
    }

    /// Session store whose first submit fails with a transport error.
    struct FlakySession {
        store: SessionStore,
        fail_first: AtomicBool,
        /// Records the first submit before failing, as if the reply was lost.
        lose_reply: bool,
    }

    impl FlakySession {
        fn new(store: SessionStore, lose_reply: bool) -> Self {
            Self {
                store,
                fail_first: AtomicBool::new(true),
                lose_reply,
            }
        }
    }

    #[async_trait::async_trait]
    impl SessionApi for FlakySession {
        async fn create(&self) -> Result<String, SyncError> {
            SessionApi::create(&self.store).await
        }

        async fn join(&self, token: &str) -> Result<(), SyncError> {
            SessionApi::join(&self.store, token).await
        }

        async fn status(&self, token: &str) -> Result<SessionStatus, SyncError> {
            SessionApi::status(&self.store, token).await
        }

        async fn cancel(&self, token: &str) -> Result<(), SyncError> {
            SessionApi::cancel(&self.store, token).await
        }

        async fn end(&self, token: &str) -> Result<(), SyncError> {
            SessionApi::end(&self.store, token).await
        }

        async fn game_state(&self, token: &str) -> Result<GameState, SyncError> {
            self.store.get_state(token)
        }

        async fn submit_move(
            &self,
            token: &str,
            action: Action,
            side: Side,
            snapshot: Option<String>,
        ) -> Result<u64, SyncError> {
            if self.fail_first.swap(false, Ordering::SeqCst) {
                if self.lose_reply {
                    SessionApi::submit_move(&self.store, token, action, side, snapshot).await?;
                }
                return Err(SyncError::Transport("connection reset".to_string()));
            }
            SessionApi::submit_move(&self.store, token, action, side, snapshot).await
        }
    }

    fn networked(
        api: Arc<dyn SessionApi>,
        token: &str,
        side: Side,
    ) -> (GameDriver<StandardRules>, mpsc::UnboundedReceiver<DriverNotice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let machine = TurnMachine::new(StandardRules::new(), Control::Side(side));
        let driver = GameDriver::new(machine, tx).with_session(api, token.to_string(), side);
        (driver, rx)
    }

    async fn next_forwarded(driver: &mut GameDriver<StandardRules>) -> GameEvent {
        let event = driver.events_rx.recv().await.expect("submit result");
        assert!(matches!(event, GameEvent::Forwarded { .. }));
        event
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<DriverNotice>) -> Vec<DriverNotice> {
        let mut notices = Vec::new();
        while let Ok(notice) = rx.try_recv() {
            notices.push(notice);
        }
        notices
    }

    #[tokio::test]
    async fn test_offline_move_reports_position() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut driver = GameDriver::new(TurnMachine::new(StandardRules::new(), Control::HotSeat), tx);
        assert!(driver.handle(GameEvent::Input(usi("7g7f", Side::Black))).await);
        let notices = drain(&mut rx);
        assert!(matches!(notices.as_slice(), [DriverNotice::PositionChanged(_)]));
        assert_eq!(driver.machine().position().turn(), Side::White);
    }

    #[tokio::test]
    async fn test_illegal_input_is_silent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut driver = GameDriver::new(TurnMachine::new(StandardRules::new(), Control::HotSeat), tx);
        driver.handle(GameEvent::Input(usi("7g7e", Side::Black))).await;
        assert!(drain(&mut rx).is_empty());
        assert!(driver.machine().history().is_empty());
    }

    #[tokio::test]
    async fn test_local_commit_is_forwarded_once() {
        let store = SessionStore::new();
        let token = store.create();
        store.join(&token).expect("join");
        let (tx, _rx) = mpsc::unbounded_channel();
        let machine = TurnMachine::new(StandardRules::new(), Control::Side(Side::Black));
        let mut driver = GameDriver::new(machine, tx).with_session(
            Arc::new(store.clone()),
            token.clone(),
            Side::Black,
        );
        driver.handle(GameEvent::Input(usi("7g7f", Side::Black))).await;
        let forwarded = driver.events_rx.recv().await.expect("submit result");
        assert_eq!(
            forwarded,
            GameEvent::Forwarded {
                sequence: 0,
                result: Ok(1)
            }
        );
        driver.handle(forwarded).await;
        let state = store.get_state(&token).expect("state");
        assert_eq!(state.turn, 1);

        // Our own entry comes back on the next poll and is not replayed.
        driver.handle(GameEvent::Poll(state)).await;
        assert_eq!(driver.machine().history().len(), 1);
        assert_eq!(store.get_state(&token).expect("state").turn, 1);
    }

    #[tokio::test]
    async fn test_poll_applies_opponent_move() {
        let store = SessionStore::new();
        let token = store.create();
        store.join(&token).expect("join");
        let action = Action::from_usi("7g7f", Side::Black).expect("usi");
        store
            .submit_move(&token, action, Side::Black, None)
            .expect("submit");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let machine = TurnMachine::new(StandardRules::new(), Control::Side(Side::White));
        let mut driver =
            GameDriver::new(machine, tx).with_session(Arc::new(store.clone()), token.clone(), Side::White);
        let state = store.get_state(&token).expect("state");
        driver.handle(GameEvent::Poll(state.clone())).await;
        driver.handle(GameEvent::Poll(state)).await;
        assert_eq!(driver.machine().history(), &[action]);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_poll_failure_alerts_once() {
        let store = SessionStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let machine = TurnMachine::new(StandardRules::new(), Control::Side(Side::White));
        let mut driver =
            GameDriver::new(machine, tx).with_session(Arc::new(store), "GONE00".to_string(), Side::White);
        driver.handle(GameEvent::PollFailed(SyncError::NotFound)).await;
        driver.handle(GameEvent::PollFailed(SyncError::NotFound)).await;
        assert_eq!(
            drain(&mut rx),
            vec![DriverNotice::Alert("invalid code".to_string())]
        );
    }

    #[tokio::test]
    async fn test_reset_refused_in_network_game() {
        let store = SessionStore::new();
        let token = store.create();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let machine = TurnMachine::new(StandardRules::new(), Control::Side(Side::Black));
        let mut driver = GameDriver::new(machine, tx).with_session(Arc::new(store), token, Side::Black);
        driver.handle(GameEvent::Input(Command::Reset)).await;
        assert!(matches!(drain(&mut rx).as_slice(), [DriverNotice::Alert(_)]));
    }

    #[tokio::test]
    async fn test_usi_reads_for_side_to_move() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut driver = GameDriver::new(TurnMachine::new(StandardRules::new(), Control::HotSeat), tx);
        driver.handle(GameEvent::Input(Command::Usi("7g7f".to_string()))).await;
        driver.handle(GameEvent::Input(Command::Usi("3c3d".to_string()))).await;
        assert_eq!(driver.machine().history().len(), 2);
        driver.handle(GameEvent::Input(Command::Usi("zz".to_string()))).await;
        let notices = drain(&mut rx);
        assert!(matches!(notices.last(), Some(DriverNotice::Alert(_))));
    }

    #[tokio::test]
    async fn test_shutdown_stops_handling() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut driver = GameDriver::new(TurnMachine::new(StandardRules::new(), Control::HotSeat), tx);
        assert!(!driver.handle(GameEvent::Shutdown).await);
    }

    #[tokio::test]
    async fn test_engine_replies_after_local_move() {
        let adapter = Arc::new(EngineAdapter::standard());
        adapter.set_difficulty(crate::Difficulty::Easy);
        adapter.initialize().await.expect("engine ready");
        let (tx, _rx) = mpsc::unbounded_channel();
        let machine = TurnMachine::new(StandardRules::new(), Control::Side(Side::Black));
        let mut driver = GameDriver::new(machine, tx).with_engine(adapter, Side::White);

        driver.handle(GameEvent::Input(usi("7g7f", Side::Black))).await;
        let reply = driver.events_rx.recv().await.expect("engine reply");
        assert!(matches!(reply, GameEvent::EngineMove { request: 1, action: Some(_) }));
        driver.handle(reply).await;
        assert_eq!(driver.machine().history().len(), 2);
        assert_eq!(driver.machine().position().turn(), Side::Black);
    }

    #[tokio::test]
    async fn test_stale_engine_reply_is_dropped() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let machine = TurnMachine::new(StandardRules::new(), Control::Side(Side::White));
        let mut driver = GameDriver::new(machine, tx)
            .with_engine(Arc::new(EngineAdapter::standard()), Side::Black);
        let action = Action::from_usi("7g7f", Side::Black).expect("usi");
        driver
            .handle(GameEvent::EngineMove {
                request: 42,
                action: Some(action),
            })
            .await;
        assert!(driver.machine().history().is_empty());
    }

    #[tokio::test]
    async fn test_engine_failure_falls_back_to_hot_seat() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let machine = TurnMachine::new(StandardRules::new(), Control::Side(Side::White));
        // Engine never initialized: the first request fails.
        let mut driver = GameDriver::new(machine, tx)
            .with_engine(Arc::new(EngineAdapter::standard()), Side::Black);
        driver.after_event();
        let failure = driver.events_rx.recv().await.expect("failure event");
        assert!(matches!(failure, GameEvent::EngineFailed { request: 1, .. }));
        driver.handle(failure).await;
        assert_eq!(driver.machine().control(), Control::HotSeat);
        assert!(matches!(drain(&mut rx).as_slice(), [DriverNotice::Alert(_)]));
    }

    #[tokio::test]
    async fn test_engine_resignation_ends_game() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let machine = TurnMachine::new(StandardRules::new(), Control::Side(Side::Black));
        let mut driver = GameDriver::new(machine, tx)
            .with_engine(Arc::new(EngineAdapter::standard()), Side::Black);
        if let Some(seat) = driver.engine.as_mut() {
            seat.generation = 7;
            seat.outstanding = true;
        }
        driver
            .handle(GameEvent::EngineMove {
                request: 7,
                action: None,
            })
            .await;
        assert_eq!(
            driver.machine().status(),
            GameStatus::Resigned { winner: Side::White }
        );
        assert_eq!(
            drain(&mut rx),
            vec![DriverNotice::GameOver(GameStatus::Resigned { winner: Side::White })]
        );
    }

    #[tokio::test]
    async fn test_transport_failure_is_resent_after_poll() {
        let store = SessionStore::new();
        let token = store.create();
        store.join(&token).expect("join");
        let api = Arc::new(FlakySession::new(store.clone(), false));
        let (mut driver, mut rx) = networked(api, &token, Side::Black);

        driver.handle(GameEvent::Input(usi("7g7f", Side::Black))).await;
        let failed = next_forwarded(&mut driver).await;
        driver.handle(failed).await;
        assert_eq!(store.get_state(&token).expect("state").turn, 0);
        assert!(matches!(drain(&mut rx).last(), Some(DriverNotice::Alert(_))));

        // The next poll still shows an empty log, so the move goes out again.
        driver
            .handle(GameEvent::Poll(store.get_state(&token).expect("state")))
            .await;
        let resent = next_forwarded(&mut driver).await;
        assert_eq!(
            resent,
            GameEvent::Forwarded {
                sequence: 0,
                result: Ok(1)
            }
        );
        driver.handle(resent).await;
        let state = store.get_state(&token).expect("state");
        assert_eq!(state.moves[0].action, Action::from_usi("7g7f", Side::Black).expect("usi"));

        // The game carries on once the opponent answers.
        let reply = Action::from_usi("3c3d", Side::White).expect("usi");
        store
            .submit_move(&token, reply, Side::White, None)
            .expect("white moves");
        driver
            .handle(GameEvent::Poll(store.get_state(&token).expect("state")))
            .await;
        assert_eq!(driver.machine().history().len(), 2);
        assert!(driver.machine().is_local_turn());
    }

    #[tokio::test]
    async fn test_lost_reply_is_not_resent_when_logged() {
        let store = SessionStore::new();
        let token = store.create();
        store.join(&token).expect("join");
        let api = Arc::new(FlakySession::new(store.clone(), true));
        let (mut driver, _rx) = networked(api, &token, Side::Black);

        driver.handle(GameEvent::Input(usi("7g7f", Side::Black))).await;
        let failed = next_forwarded(&mut driver).await;
        driver.handle(failed).await;
        driver
            .handle(GameEvent::Poll(store.get_state(&token).expect("state")))
            .await;

        assert!(driver.events_rx.try_recv().is_err());
        assert_eq!(store.get_state(&token).expect("state").turn, 1);
        assert_eq!(driver.machine().history().len(), 1);
        assert!(driver.net.as_ref().is_some_and(|net| net.unconfirmed.is_empty()));
    }

    #[tokio::test]
    async fn test_refused_move_is_taken_back() {
        let store = SessionStore::new();
        // Nobody joined: the session refuses moves.
        let token = store.create();
        let (mut driver, mut rx) = networked(Arc::new(store.clone()), &token, Side::Black);

        driver.handle(GameEvent::Input(usi("7g7f", Side::Black))).await;
        let refused = next_forwarded(&mut driver).await;
        assert_eq!(
            refused,
            GameEvent::Forwarded {
                sequence: 0,
                result: Err(SyncError::NotActive)
            }
        );
        driver.handle(refused).await;
        assert_eq!(driver.machine().history().len(), 1);

        driver
            .handle(GameEvent::Poll(store.get_state(&token).expect("state")))
            .await;
        assert!(driver.machine().history().is_empty());
        assert_eq!(driver.machine().position(), &shogi_rules::Position::initial());
        assert!(driver.machine().is_local_turn());
        let notices = drain(&mut rx);
        assert_eq!(
            notices.last(),
            Some(&DriverNotice::PositionChanged(
                shogi_rules::Position::initial().to_sfen()
            ))
        );
    }
}
