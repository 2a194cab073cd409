use session::{ConnectionId, OutputFrame, SessionOutput};
use tokio::sync::mpsc;

/// Messages from the network layer to the game.
#[derive(Debug, PartialEq, Eq)]
pub enum NetEvent {
    /// A new TCP connection was accepted.
    Connected { conn: ConnectionId },
    /// Player typed a line of input.
    Input { conn: ConnectionId, line: String },
    /// The connection closed, from either side.
    Disconnected { conn: ConnectionId },
}

pub type NetEventTx = mpsc::UnboundedSender<NetEvent>;
pub type NetEventRx = mpsc::UnboundedReceiver<NetEvent>;

/// Sender from the game to the output router.
pub type OutputTx = mpsc::UnboundedSender<SessionOutput>;
pub type OutputRx = mpsc::UnboundedReceiver<SessionOutput>;

/// Per-connection write channel (output router -> connection task).
pub type ConnWriteTx = mpsc::UnboundedSender<OutputFrame>;
pub type ConnWriteRx = mpsc::UnboundedReceiver<OutputFrame>;

/// Registration message for the output router.
#[derive(Debug)]
pub struct RegisterConnection {
    pub conn: ConnectionId,
    pub write_tx: ConnWriteTx,
}

pub type RegisterTx = mpsc::UnboundedSender<RegisterConnection>;
pub type RegisterRx = mpsc::UnboundedReceiver<RegisterConnection>;

pub type UnregisterTx = mpsc::UnboundedSender<ConnectionId>;
pub type UnregisterRx = mpsc::UnboundedReceiver<ConnectionId>;

/// Every channel the server and output router need, created together.
pub struct NetChannels {
    pub event_tx: NetEventTx,
    pub event_rx: NetEventRx,
    pub output_tx: OutputTx,
    pub output_rx: OutputRx,
    pub register_tx: RegisterTx,
    pub register_rx: RegisterRx,
    pub unregister_tx: UnregisterTx,
    pub unregister_rx: UnregisterRx,
}

impl NetChannels {
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        Self {
            event_tx,
            event_rx,
            output_tx,
            output_rx,
            register_tx,
            register_rx,
            unregister_tx,
            unregister_rx,
        }
    }
}

impl Default for NetChannels {
    fn default() -> Self {
        Self::new()
    }
}
