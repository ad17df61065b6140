use shared::error::SharedError;
use shared::schema::HostRequest;

use crate::commands::{DeviceTransport, print_board};

pub fn run<P>(port: &mut P) -> Result<(), SharedError>
where
    P: DeviceTransport + ?Sized,
{
    let response = port.exchange(&HostRequest::Ping)?;
    println!("Device answered: {}", response.message.as_deref().unwrap_or("ok"));
    print_board(&response);
    Ok(())
}
