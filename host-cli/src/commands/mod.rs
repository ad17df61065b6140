use std::io::{self, BufRead, Write};

use shared::error::SharedError;
use shared::license::LicenseStatus;
use shared::schema::DeviceResponse;

use crate::{Command, PasswordArgs};

pub use crate::transport::DeviceTransport;

pub mod activate;
pub mod id;
pub mod keygen;
pub mod ping;
pub mod reset;
pub mod session;
pub mod set_timeout;
pub mod slots;
pub mod status;

/// Source of secrets and confirmations that are not given on the command line.
pub trait Prompt {
    fn secret(&mut self, label: &str) -> Result<String, SharedError>;
    fn confirm(&mut self, question: &str) -> Result<bool, SharedError>;
}

/// Interactive prompt on the controlling terminal.
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn secret(&mut self, label: &str) -> Result<String, SharedError> {
        rpassword::prompt_password(format!("{label}: ")).map_err(|err| {
            SharedError::Transport(format!("failed to read {label} from terminal: {err}"))
        })
    }

    fn confirm(&mut self, question: &str) -> Result<bool, SharedError> {
        print!("{question} [y/N] ");
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "YES"))
    }
}

pub fn run<T, P>(command: Command, transport: &mut T, prompt: &mut P) -> Result<(), SharedError>
where
    T: DeviceTransport + ?Sized,
    P: Prompt + ?Sized,
{
    match command {
        Command::Ping => ping::run(transport),
        Command::Id => id::run(transport),
        Command::Activate { key } => activate::run(transport, &key),
        Command::Unlock(args) => {
            let password = resolve_secret(&args, prompt, "Master passphrase")?;
            session::unlock(transport, password)
        }
        Command::Lock => session::lock(transport),
        Command::Status => status::run(transport),
        Command::Add { slot, password } => {
            let password = resolve_secret(&password, prompt, "Secret to store")?;
            slots::add(transport, slot, password)
        }
        Command::Delete { slot } => slots::delete(transport, slot),
        Command::Type { slot } => slots::type_secret(transport, slot),
        Command::SetTimeout { seconds } => set_timeout::run(transport, seconds),
        Command::Reset { yes } => {
            if !yes && !prompt.confirm("Erase the license, passphrase and every slot?")? {
                println!("Reset cancelled.");
                return Ok(());
            }
            reset::run(transport)
        }
        Command::Keygen(args) => keygen::run(&args),
    }
}

fn resolve_secret<P>(args: &PasswordArgs, prompt: &mut P, label: &str) -> Result<String, SharedError>
where
    P: Prompt + ?Sized,
{
    match &args.password {
        Some(password) => Ok(password.clone()),
        None => prompt.secret(label),
    }
}

pub(crate) fn print_board(response: &DeviceResponse) {
    if let Some(version) = &response.version {
        println!("Firmware version: {version}");
    }
    if let (Some(id), Some(board_type)) = (&response.board_id, &response.board_type) {
        println!("Board: {id} ({board_type})");
    }
    if let Some(license) = response.license {
        println!("License: {}", license_label(license));
    }
    if let Some(unlocked) = response.unlocked {
        println!("Vault: {}", if unlocked { "unlocked" } else { "locked" });
    }
}

pub(crate) fn license_label(status: LicenseStatus) -> &'static str {
    match status {
        LicenseStatus::Activated => "activated",
        LicenseStatus::NotActivated => "not activated",
    }
}

pub(crate) fn print_message(response: &DeviceResponse, fallback: &str) {
    println!("{}", response.message.as_deref().unwrap_or(fallback));
}
