use shared::error::SharedError;
use shared::schema::HostRequest;

use crate::commands::{DeviceTransport, print_message};

pub fn run<P>(port: &mut P) -> Result<(), SharedError>
where
    P: DeviceTransport + ?Sized,
{
    let response = port.exchange(&HostRequest::Reset)?;
    print_message(&response, "Device reset to factory state.");
    Ok(())
}
