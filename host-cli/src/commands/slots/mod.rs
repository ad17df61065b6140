use shared::error::SharedError;
use shared::schema::HostRequest;

use crate::commands::{DeviceTransport, print_message};

pub fn add<P>(port: &mut P, slot: i64, password: String) -> Result<(), SharedError>
where
    P: DeviceTransport + ?Sized,
{
    if password.is_empty() {
        return Err(SharedError::Usage("refusing to store an empty secret".into()));
    }

    let response = port.exchange(&HostRequest::AddPassword { slot, password })?;
    print_message(&response, &format!("Secret stored in slot {slot}."));
    Ok(())
}

pub fn delete<P>(port: &mut P, slot: i64) -> Result<(), SharedError>
where
    P: DeviceTransport + ?Sized,
{
    let response = port.exchange(&HostRequest::DeletePassword { slot })?;
    print_message(&response, &format!("Slot {slot} cleared."));
    Ok(())
}

pub fn type_secret<P>(port: &mut P, slot: i64) -> Result<(), SharedError>
where
    P: DeviceTransport + ?Sized,
{
    let response = port.exchange(&HostRequest::TypePassword { slot })?;
    print_message(&response, &format!("Slot {slot} queued for typing."));
    Ok(())
}
