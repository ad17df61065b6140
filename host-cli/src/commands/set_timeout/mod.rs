use shared::error::SharedError;
use shared::schema::HostRequest;
use shared::vault::clamp_timeout;

use crate::commands::DeviceTransport;

pub fn run<P>(port: &mut P, seconds: i64) -> Result<(), SharedError>
where
    P: DeviceTransport + ?Sized,
{
    let expected = clamp_timeout(seconds);
    if i64::from(expected) != seconds {
        println!("Requested {seconds} s is out of range, the device will clamp it to {expected} s");
    }

    let response = port.exchange(&HostRequest::SetTimeout { timeout: seconds })?;
    let applied = response.timeout.unwrap_or(expected);
    println!("Auto-lock timeout set to {applied} s");
    Ok(())
}
