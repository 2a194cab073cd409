#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use mud::{GameContext, KeywordParser, ScriptedDice, World, WorldSettings};
use player_db::PlayerDb;
use session::{ConnectionId, InputRouter, Transport};

/// Transport that keeps every frame for later inspection.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(ConnectionId, String)>>,
    disconnected: Mutex<Vec<ConnectionId>>,
}

impl RecordingTransport {
    pub fn text_for(&self, conn: ConnectionId) -> String {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == conn)
            .map(|(_, t)| t.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn disconnected(&self) -> Vec<ConnectionId> {
        self.disconnected.lock().unwrap().clone()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, conn: ConnectionId, text: &str) -> bool {
        self.sent.lock().unwrap().push((conn, text.to_string()));
        true
    }

    fn disconnect(&self, conn: ConnectionId) {
        self.disconnected.lock().unwrap().push(conn);
    }

    fn set_echo(&self, _conn: ConnectionId, _enabled: bool) {}
}

pub fn world_with(dice: ScriptedDice, settings: WorldSettings) -> (World, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::default());
    let world = World::new(transport.clone(), Arc::new(dice), settings);
    (world, transport)
}

pub fn context(world: World) -> Arc<GameContext> {
    Arc::new(GameContext {
        world: Arc::new(world),
        router: Arc::new(InputRouter::new()),
        parser: Arc::new(KeywordParser),
        accounts: Arc::new(PlayerDb::open_memory().unwrap()),
    })
}
