pub mod channels;
pub mod output_router;
pub mod server;
pub mod telnet;
pub mod transport;

pub use channels::{NetChannels, NetEvent};
pub use output_router::run_output_router;
pub use server::run_tcp_server;
pub use transport::ChannelTransport;
