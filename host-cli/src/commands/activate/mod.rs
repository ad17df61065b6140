use shared::error::SharedError;
use shared::schema::HostRequest;

use crate::commands::{DeviceTransport, print_message};

pub fn run<P>(port: &mut P, key: &str) -> Result<(), SharedError>
where
    P: DeviceTransport + ?Sized,
{
    let key = key.trim();
    if key.is_empty() {
        return Err(SharedError::Usage("activation key must not be empty".into()));
    }

    let response = port.exchange(&HostRequest::Activate { key: key.into() })?;
    print_message(&response, "Device activated.");
    Ok(())
}
