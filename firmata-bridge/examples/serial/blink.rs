use std::time::Duration;

use firmata_bridge::errors::Error;
use firmata_bridge::io::{Firmata, FirmataOptions, PinModeId, Serial};

fn main() -> Result<(), Error> {
    // First serial port found, at 57600 bauds.
    let mut firmata = Firmata::new(Serial::default(), FirmataOptions::default())?;
    if !firmata.is_ready() {
        eprintln!("No Firmata device answered on {}", firmata.transport());
        return Ok(());
    }
    println!("{}", firmata);

    // Blinks the embedded led (pin 13) for 5 seconds.
    firmata.pin_mode(13, PinModeId::OUTPUT)?;
    for state in [true, false].into_iter().cycle().take(10) {
        firmata.digital_write(13, state)?;
        std::thread::sleep(Duration::from_millis(500));
    }
    firmata.close()
}
