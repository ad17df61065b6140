use shared::error::SharedError;
use shared::schema::HostRequest;

use crate::commands::{DeviceTransport, print_board};

pub fn run<P>(port: &mut P) -> Result<(), SharedError>
where
    P: DeviceTransport + ?Sized,
{
    let response = port.exchange(&HostRequest::GetId)?;
    print_board(&response);
    if let Some(request) = &response.activation_request {
        println!("Activation request: {request}");
    }
    Ok(())
}
