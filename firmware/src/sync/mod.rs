//! Host line protocol: framing, request parsing and command execution.

mod line;
mod protocol;

pub use line::{LineBuffer, LineEvent};
pub use protocol::{CommandContext, Inbound, ProtocolDispatcher, handle_request, response_line};
