use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use shared::error::SharedError;

mod commands;
#[cfg(test)]
mod test_support;
mod transport;

const DEFAULT_TIMEOUT_MS: u64 = 2_000;

#[derive(Parser, Debug)]
#[command(author, version, about = "slotkey host command line interface")]
pub(crate) struct Cli {
    /// Optional path to the serial device. Falls back to auto-detection when omitted.
    #[arg(short, long)]
    port: Option<String>,

    /// Skip VID filtering and accept the first USB serial device.
    #[arg(long)]
    any_port: bool,

    /// Serial read timeout in milliseconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Check that the token answers and print its board info.
    Ping,
    /// Print the board identity and the activation request string.
    Id,
    /// Activate the token with a key issued for its board id.
    Activate {
        key: String,
    },
    /// Unlock the vault. The first unlock sets the master passphrase.
    Unlock(PasswordArgs),
    /// Lock the vault immediately.
    Lock,
    /// Show lock state, slot occupancy and the auto-lock timeout.
    Status,
    /// Store a secret in a slot.
    Add {
        slot: i64,
        #[command(flatten)]
        password: PasswordArgs,
    },
    /// Clear a slot.
    Delete {
        slot: i64,
    },
    /// Type the secret stored in a slot on the host the token is plugged into.
    Type {
        slot: i64,
    },
    /// Set the auto-lock timeout in seconds (clamped to 30..=600 by the token).
    SetTimeout {
        seconds: i64,
    },
    /// Erase the license, master passphrase and every slot.
    Reset {
        /// Do not ask for confirmation.
        #[arg(long)]
        yes: bool,
    },
    /// Compute the activation key for a board without talking to a device.
    Keygen(KeygenArgs),
}

#[derive(Args, Debug, Clone)]
pub(crate) struct PasswordArgs {
    /// Secret on the command line. Prompted without echo when omitted.
    #[arg(long)]
    password: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct KeygenArgs {
    /// Board id as printed by `slotkey id` (uppercase hex).
    #[arg(long)]
    board_id: String,
    /// Board type as printed by `slotkey id`.
    #[arg(long)]
    board_type: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli).map_err(|err| {
        let context = failure_label(&err);
        anyhow::Error::from(err).context(context)
    })
}

pub(crate) fn failure_label(err: &SharedError) -> &'static str {
    match err {
        SharedError::Transport(_) => "transport failure",
        SharedError::Device { .. } => "device refused the request",
        SharedError::Usage(_) => "invalid arguments",
        SharedError::Codec(_) | SharedError::Request(_) => "protocol error",
    }
}

fn run(cli: Cli) -> Result<(), SharedError> {
    if let Command::Keygen(args) = &cli.command {
        return commands::keygen::run(args);
    }

    let port_path = match cli.port {
        Some(port) => port,
        None => transport::detect_first_serial_port(cli.any_port)?,
    };

    println!("Connecting to slotkey on {port_path}…");
    let mut port =
        transport::open_serial_port(&port_path, Duration::from_millis(cli.timeout_ms))?;

    commands::run(cli.command, &mut *port, &mut commands::TerminalPrompt)
}
