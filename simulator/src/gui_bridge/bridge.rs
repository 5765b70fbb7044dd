use crate::gui_bridge::model::SessionSnapshot;
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    net::SocketAddr,
    sync::{Arc, RwLock},
};
use tokio::sync::mpsc::UnboundedSender;
use tourcore::navigation::{PositionFix, PositionSource};
use tourcore::task::ScopedTask;
use warp::{
    http::StatusCode,
    reply::{Json, WithStatus},
    Filter,
};

pub fn gui_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9000))
}

/// Requests from the HTTP side, applied by the session loop.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeCommand {
    Click(PositionFix),
    Question(String),
    TogglePause,
    Stop,
}

#[derive(Debug, Deserialize)]
struct QuestionBody {
    text: String,
}

fn reply(status: StatusCode, body: Value) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(&body), status)
}

fn queue(commands: &UnboundedSender<BridgeCommand>, command: BridgeCommand) -> WithStatus<Json> {
    match commands.send(command) {
        Ok(()) => reply(StatusCode::ACCEPTED, json!({"status": "queued"})),
        Err(_) => reply(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({"error": "session loop is not running"}),
        ),
    }
}

/// HTTP front for a running session: serves the latest snapshot and forwards
/// map clicks and control requests to the session loop.
pub struct GuiBridge {
    state: Arc<RwLock<SessionSnapshot>>,
    commands: UnboundedSender<BridgeCommand>,
}

impl GuiBridge {
    pub fn new(commands: UnboundedSender<BridgeCommand>) -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionSnapshot::default())),
            commands,
        }
    }

    pub fn routes(
        &self,
    ) -> impl Filter<Extract = (WithStatus<Json>,), Error = warp::Rejection> + Clone {
        let state = self.state.clone();
        let state_filter = warp::any().map(move || state.clone());
        let commands = self.commands.clone();
        let command_filter = warp::any().map(move || commands.clone());

        let session_route = warp::path("session")
            .and(warp::path::end())
            .and(warp::get())
            .and(state_filter)
            .map(|state: Arc<RwLock<SessionSnapshot>>| {
                let guard = state.read().unwrap_or_else(|poisoned| poisoned.into_inner());
                warp::reply::with_status(warp::reply::json(&*guard), StatusCode::OK)
            });

        let click_route = warp::path("click")
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::body::json())
            .and(command_filter.clone())
            .map(|body: Value, commands: UnboundedSender<BridgeCommand>| {
                match PositionFix::from_json(&body, PositionSource::SimulatedClick) {
                    Some(fix) => queue(&commands, BridgeCommand::Click(fix)),
                    None => reply(
                        StatusCode::BAD_REQUEST,
                        json!({"error": "expected numeric lat and lng"}),
                    ),
                }
            });

        let question_route = warp::path("question")
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::body::json())
            .and(command_filter.clone())
            .map(|body: QuestionBody, commands: UnboundedSender<BridgeCommand>| {
                queue(&commands, BridgeCommand::Question(body.text))
            });

        let pause_route = warp::path("pause")
            .and(warp::path::end())
            .and(warp::post())
            .and(command_filter.clone())
            .map(|commands: UnboundedSender<BridgeCommand>| {
                queue(&commands, BridgeCommand::TogglePause)
            });

        let stop_route = warp::path("stop")
            .and(warp::path::end())
            .and(warp::post())
            .and(command_filter)
            .map(|commands: UnboundedSender<BridgeCommand>| queue(&commands, BridgeCommand::Stop));

        session_route
            .or(click_route)
            .unify()
            .or(question_route)
            .unify()
            .or(pause_route)
            .unify()
            .or(stop_route)
            .unify()
    }

    /// Serves the routes until the returned task is dropped.
    pub fn serve(&self, addr: SocketAddr) -> ScopedTask {
        let routes = self.routes();
        info!("GUI bridge listening on http://{}", addr);
        ScopedTask::spawn("gui bridge", async move {
            warp::serve(routes).run(addr).await;
        })
    }

    pub fn publish(&self, snapshot: SessionSnapshot) {
        match self.state.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => {
                warn!("snapshot lock poisoned; replacing state");
                *poisoned.into_inner() = snapshot;
            }
        }
    }

    pub fn publish_status(&self, message: &str) {
        info!("[GUI] {}", message);
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
