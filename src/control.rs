//! Control plane: drains commands from the UI channel, mutates operator
//! intent, and owns the session lifecycle (connect/reconnect/disconnect,
//! resolve-and-run with a fixed 500 ms backoff between attempts).
//!
//! Per §5's cancellation note, stopping a session is cooperative: a
//! `disconnect` flips the stop watch and the loops notice it at their next
//! deadline or tick, so the control loop never needs to hold a `JoinHandle`
//! across a `select!` — it just waits for the session task to report back
//! on a completion channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::error::BridgeError;
use crate::resolve;
use crate::session::{self, SessionDeps};
use crate::state::{Alliance, JoystickSnapshot, Mode, OperatorIntent, SessionState};
use crate::ui::channel::{ClientId, UiChannel};
use crate::ui::message::{Command, Message};

const SESSION_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Everything the control plane needs, bundled for `main` to construct once.
pub struct ControlPlane {
    pub intent: Arc<OperatorIntent>,
    pub deps: Arc<SessionDeps>,
    ui: Arc<UiChannel>,
    state: Mutex<SessionState>,
    want_connected: AtomicBool,
}

impl ControlPlane {
    pub fn new(ui: Arc<UiChannel>) -> Arc<ControlPlane> {
        let intent = Arc::new(OperatorIntent::default());
        Arc::new(ControlPlane {
            deps: Arc::new(SessionDeps::new(intent.clone(), ui.clone())),
            intent,
            ui,
            state: Mutex::new(SessionState::Idle),
            want_connected: AtomicBool::new(false),
        })
    }

    /// The wire value for `{type: link}`: only ever `connected` or
    /// `disconnected` (§3's four-state machine collapses to two on the wire).
    fn link_state(&self) -> &'static str {
        match *self.state.lock().unwrap() {
            SessionState::Active => "connected",
            SessionState::Idle | SessionState::Resolving | SessionState::Draining => {
                "disconnected"
            }
        }
    }

    fn set_state(&self, value: SessionState) {
        *self.state.lock().unwrap() = value;
    }

    /// Drains `commands` until the channel closes, dispatching each into
    /// operator intent or the session lifecycle. Runs for the life of the
    /// process; `main` spawns this once.
    pub async fn run(self: Arc<Self>, mut commands: mpsc::UnboundedReceiver<(ClientId, Command)>) {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();
        let mut stop: Option<watch::Sender<bool>> = None;

        loop {
            tokio::select! {
                received = commands.recv() => {
                    let Some((id, command)) = received else { break };
                    self.apply(id, command, &mut stop, &done_tx);
                }
                Some(()) = done_rx.recv() => {
                    stop = None;
                    self.set_state(SessionState::Idle);
                    if self.want_connected.load(Ordering::Relaxed) {
                        tokio::time::sleep(SESSION_RETRY_BACKOFF).await;
                        stop = Some(self.spawn_session(done_tx.clone()));
                    }
                }
            }
        }
    }

    fn apply(
        self: &Arc<Self>,
        id: ClientId,
        command: Command,
        stop: &mut Option<watch::Sender<bool>>,
        done_tx: &mpsc::UnboundedSender<()>,
    ) {
        match command {
            Command::Hello => self.ui.send_to(
                id,
                Message::Link {
                    value: self.link_state(),
                },
            ),
            Command::Connect { team } => {
                self.intent.set_team(team);
                self.want_connected.store(true, Ordering::Relaxed);
                if stop.is_none() {
                    self.set_state(SessionState::Resolving);
                    *stop = Some(self.spawn_session(done_tx.clone()));
                }
            }
            Command::Disconnect => {
                self.want_connected.store(false, Ordering::Relaxed);
                if let Some(stop_tx) = stop.take() {
                    let _ = stop_tx.send(true);
                }
                self.set_state(SessionState::Idle);
            }
            Command::Reconnect => {
                if let Some(stop_tx) = stop.as_ref() {
                    let _ = stop_tx.send(true);
                }
                self.want_connected.store(true, Ordering::Relaxed);
            }
            Command::Enable => self.intent.set_enabled(true),
            Command::Disable => {
                self.intent.set_enabled(false);
                self.intent.set_estop(false);
            }
            Command::Estop => self.intent.set_estop(true),
            Command::GameData { value } => self.intent.set_game_data(value),
            Command::Mode { value } => {
                if let Some(mode) = Mode::parse(&value) {
                    self.intent.set_mode(mode);
                }
            }
            Command::Alliance { value } => {
                if let Some(alliance) = Alliance::parse(&value) {
                    self.intent.set_alliance(alliance);
                }
            }
            Command::Joystick {
                frc_index,
                index,
                name,
                axes,
                buttons,
                mapping,
                disabled,
            } => {
                let slot = frc_index.filter(|&i| i < 6).unwrap_or(index).min(5);
                self.deps.joysticks.set(
                    slot,
                    JoystickSnapshot {
                        name,
                        mapping,
                        axes,
                        buttons,
                        disabled,
                    },
                );
            }
            Command::RestartCode => self.intent.request_restart_code(),
            Command::RestartRio => self.intent.request_restart_rio(),
        }
    }

    /// Spawns the task that resolves and runs sessions back to back (with
    /// the 500 ms retry backoff) until its stop watch reports true, then
    /// reports completion on `done_tx`.
    fn spawn_session(self: &Arc<Self>, done_tx: mpsc::UnboundedSender<()>) -> watch::Sender<bool> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let this = self.clone();
        tokio::spawn(async move {
            this.run_until_disconnected(stop_rx).await;
            let _ = done_tx.send(());
        });
        stop_tx
    }

    async fn run_until_disconnected(&self, mut stop_rx: watch::Receiver<bool>) {
        loop {
            if *stop_rx.borrow() {
                return;
            }
            self.set_state(SessionState::Resolving);

            let team = self.intent.team();
            let resolved = tokio::select! {
                r = resolve_with_retry(&team, &stop_rx) => match r {
                    Some(r) => r,
                    None => return,
                },
                _ = stop_rx.changed() => return,
            };

            self.ui.broadcast(Message::Log {
                level: "info",
                message: format!("Connected via {}", resolved.label),
            });
            self.set_state(SessionState::Active);

            let result =
                session::run_session(&resolved.host, self.deps.clone(), stop_rx.clone()).await;
            if let Err(err) = result {
                tracing::warn!("session ended: {err}");
            }
            self.set_state(SessionState::Draining);

            if *stop_rx.borrow() {
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep(SESSION_RETRY_BACKOFF) => {}
                _ = stop_rx.changed() => return,
            }
        }
    }
}

async fn resolve_with_retry(
    team: &str,
    stop_rx: &watch::Receiver<bool>,
) -> Option<resolve::Resolved> {
    loop {
        if let Some(resolved) = resolve::resolve(team).await {
            return Some(resolved);
        }
        let err = BridgeError::ResolveNoCandidate {
            team: team.to_string(),
        };
        tracing::debug!("{err}, retrying in {SESSION_RETRY_BACKOFF:?}");
        if *stop_rx.borrow() {
            return None;
        }
        tokio::time::sleep(SESSION_RETRY_BACKOFF).await;
    }
}
