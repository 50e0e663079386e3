//! In-process driver that plays the server side of every connection.
//!
//! Used for dry runs of the orchestrator without a game server and by the
//! test suites. Every connect is logged with its (tokio) timestamp, each
//! session reports `Login` and `Spawn` right away, holding forward moves the
//! client one block along z, and calls made after the session closed are
//! counted instead of applied.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::{sync::mpsc, time::Instant};

use super::{Connection, ConnectionHandle, Control, DriverError, DriverEvent, GameClientDriver};
use crate::{
    allocation::ServerEndpoint,
    bot::{MAX_VITAL, Position},
};

const EVENT_BUFFER: usize = 64;

/// One connect call seen by the driver
#[derive(Debug, Clone)]
pub struct ConnectAttempt {
    pub username: String,
    pub endpoint: ServerEndpoint,
    pub at: Instant,
    pub accepted: bool,
}

#[derive(Default)]
struct DriverState {
    attempts: Vec<ConnectAttempt>,
    sessions: HashMap<String, SimulatedSession>,
    refused: HashSet<String>,
}

/// Driver whose connections live in this process
#[derive(Clone, Default)]
pub struct SimulatedDriver {
    state: Arc<Mutex<DriverState>>,
}

impl SimulatedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DriverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every later connect for `username` fail
    pub fn refuse(&self, username: &str) {
        self.lock().refused.insert(username.to_string());
    }

    /// Connect calls in arrival order
    pub fn attempts(&self) -> Vec<ConnectAttempt> {
        self.lock().attempts.clone()
    }

    /// Latest session opened for `username`
    pub fn session(&self, username: &str) -> Option<SimulatedSession> {
        self.lock().sessions.get(username).cloned()
    }
}

#[async_trait]
impl GameClientDriver for SimulatedDriver {
    async fn connect(
        &self,
        endpoint: &ServerEndpoint,
        username: &str,
    ) -> Result<Connection, DriverError> {
        let mut state = self.lock();
        let accepted = !state.refused.contains(username);
        state.attempts.push(ConnectAttempt {
            username: username.to_string(),
            endpoint: endpoint.clone(),
            at: Instant::now(),
            accepted,
        });

        if !accepted {
            return Err(DriverError::Refused(format!(
                "{endpoint} rejected {username}"
            )));
        }

        let (sender, events) = mpsc::channel(EVENT_BUFFER);
        let session = SimulatedSession {
            username: username.to_string(),
            events: sender,
            state: Arc::new(Mutex::new(SessionState {
                connected: true,
                ..Default::default()
            })),
        };

        let _ = session.events.try_send(DriverEvent::Login);
        let _ = session.events.try_send(DriverEvent::Spawn {
            position: Position::default(),
            health: MAX_VITAL,
            food: MAX_VITAL,
        });

        state.sessions.insert(username.to_string(), session.clone());

        Ok(Connection {
            handle: Arc::new(session),
            events,
        })
    }
}

#[derive(Debug, Default)]
struct SessionState {
    connected: bool,
    held: HashSet<Control>,
    control_changes: usize,
    looks: usize,
    late_calls: usize,
    position: Position,
}

/// Server-side view of one simulated client
#[derive(Clone)]
pub struct SimulatedSession {
    username: String,
    events: mpsc::Sender<DriverEvent>,
    state: Arc<Mutex<SessionState>>,
}

impl SimulatedSession {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn is_holding(&self, control: Control) -> bool {
        self.lock().held.contains(&control)
    }

    /// Control presses, releases and clears applied while connected
    pub fn control_changes(&self) -> usize {
        self.lock().control_changes
    }

    /// Look calls applied while connected
    pub fn look_count(&self) -> usize {
        self.lock().looks
    }

    /// Handle calls made after the session closed
    pub fn late_calls(&self) -> usize {
        self.lock().late_calls
    }

    /// Deliver an arbitrary event to the bot
    pub async fn emit(&self, event: DriverEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Server-side kick
    pub async fn kick(&self, reason: &str) {
        self.close(DriverEvent::Kicked {
            reason: reason.to_string(),
        })
        .await;
    }

    /// Connection failure
    pub async fn fail(&self, message: &str) {
        self.close(DriverEvent::Error {
            message: message.to_string(),
        })
        .await;
    }

    /// Clean end of connection
    pub async fn end(&self) {
        self.close(DriverEvent::End).await;
    }

    async fn close(&self, event: DriverEvent) {
        {
            let mut state = self.lock();
            state.connected = false;
            state.held.clear();
        }
        let _ = self.events.send(event).await;
    }
}

impl ConnectionHandle for SimulatedSession {
    fn set_control_state(&self, control: Control, pressed: bool) {
        let moved = {
            let mut state = self.lock();
            if !state.connected {
                state.late_calls += 1;
                return;
            }
            if pressed {
                state.held.insert(control);
            } else {
                state.held.remove(&control);
            }
            state.control_changes += 1;

            if control == Control::Forward && pressed {
                state.position.z += 1.0;
                Some(state.position)
            } else {
                None
            }
        };

        if let Some(position) = moved {
            let _ = self.events.try_send(DriverEvent::Move { position });
        }
    }

    fn look(&self, _yaw: f32, _pitch: f32, _relative: bool) {
        let mut state = self.lock();
        if !state.connected {
            state.late_calls += 1;
            return;
        }
        state.looks += 1;
    }

    fn clear_control_states(&self) {
        let mut state = self.lock();
        if !state.connected {
            state.late_calls += 1;
            return;
        }
        state.held.clear();
        state.control_changes += 1;
    }

    fn disconnect(&self) {
        {
            let mut state = self.lock();
            if !state.connected {
                state.late_calls += 1;
                return;
            }
            state.connected = false;
            state.held.clear();
        }
        let _ = self.events.try_send(DriverEvent::End);
    }
}
