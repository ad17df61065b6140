use shared::error::SharedError;
use shared::schema::HostRequest;

use crate::commands::{DeviceTransport, print_message};

pub fn unlock<P>(port: &mut P, password: String) -> Result<(), SharedError>
where
    P: DeviceTransport + ?Sized,
{
    let response = port.exchange(&HostRequest::Unlock { password })?;
    print_message(&response, "Vault unlocked.");
    Ok(())
}

pub fn lock<P>(port: &mut P) -> Result<(), SharedError>
where
    P: DeviceTransport + ?Sized,
{
    let response = port.exchange(&HostRequest::Lock)?;
    print_message(&response, "Vault locked.");
    Ok(())
}
