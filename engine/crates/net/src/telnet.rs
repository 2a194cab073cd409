pub const IAC: u8 = 255;
pub const WILL: u8 = 251;
pub const WONT: u8 = 252;
pub const DO: u8 = 253;
pub const DONT: u8 = 254;
pub const SB: u8 = 250;
pub const SE: u8 = 240;
pub const OPT_ECHO: u8 = 1;

const MAX_LINE_LEN: usize = 4096;

/// Bytes asking the client to stop echoing locally (server "will echo").
pub fn echo_off() -> [u8; 3] {
    [IAC, WILL, OPT_ECHO]
}

/// Bytes handing echo back to the client.
pub fn echo_on() -> [u8; 3] {
    [IAC, WONT, OPT_ECHO]
}

/// Prepare outbound text for a telnet client: CRLF line endings plus a
/// trailing newline. UTF-8 text never contains a bare 0xFF, so no IAC
/// escaping is needed.
pub fn encode_text(text: &str) -> Vec<u8> {
    let normalized = text.replace("\r\n", "\n").replace('\n', "\r\n");
    format!("{}\r\n", normalized).into_bytes()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Data,
    Iac,
    /// Expecting the option byte of WILL/WONT/DO/DONT.
    Negotiate,
    Sub,
    SubIac,
}

/// Line reader for telnet input. Command sequences are stripped even when
/// they are split across reads.
pub struct LineBuffer {
    buf: Vec<u8>,
    state: State,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            state: State::Data,
        }
    }

    /// Feed raw data into the buffer. Returns any complete lines.
    pub fn feed(&mut self, data: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in data {
            self.state = match (self.state, byte) {
                (State::Data, IAC) => State::Iac,
                (State::Data, b'\n') => {
                    lines.push(self.take_line());
                    State::Data
                }
                (State::Data, b'\r') => State::Data,
                (State::Data, b) => {
                    // Bytes beyond the limit are dropped.
                    if self.buf.len() < MAX_LINE_LEN {
                        self.buf.push(b);
                    }
                    State::Data
                }
                (State::Iac, IAC) => {
                    if self.buf.len() < MAX_LINE_LEN {
                        self.buf.push(IAC);
                    }
                    State::Data
                }
                (State::Iac, WILL | WONT | DO | DONT) => State::Negotiate,
                (State::Iac, SB) => State::Sub,
                (State::Iac, _) | (State::Negotiate, _) => State::Data,
                (State::Sub, IAC) => State::SubIac,
                (State::Sub, _) => State::Sub,
                (State::SubIac, SE) => State::Data,
                (State::SubIac, _) => State::Sub,
            };
        }

        lines
    }

    fn take_line(&mut self) -> String {
        let bytes = std::mem::take(&mut self.buf);
        String::from_utf8_lossy(&bytes).trim_end().to_string()
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}
