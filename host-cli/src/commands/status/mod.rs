use shared::error::SharedError;
use shared::schema::HostRequest;

use crate::commands::{DeviceTransport, print_board};

pub fn run<P>(port: &mut P) -> Result<(), SharedError>
where
    P: DeviceTransport + ?Sized,
{
    let response = port.exchange(&HostRequest::Status)?;
    print_board(&response);
    if let Some(slots) = &response.slots {
        for (index, occupied) in slots.iter().enumerate() {
            let state = if *occupied { "stored" } else { "empty" };
            println!("Slot {index}: {state}");
        }
    }
    if let Some(timeout) = response.timeout {
        println!("Auto-lock after {timeout} s of inactivity");
    }
    Ok(())
}
