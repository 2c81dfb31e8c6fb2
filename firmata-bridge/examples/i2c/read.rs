use std::time::Duration;

use firmata_bridge::errors::Error;
use firmata_bridge::io::{Firmata, FirmataOptions, I2c, Serial};

/// Address of the device to read from.
const ADDRESS: u16 = 0x08;

fn main() -> Result<(), Error> {
    let mut firmata = Firmata::new(Serial::default(), FirmataOptions::default())?;
    let i2c = I2c::new(&mut firmata);
    i2c.config(&mut firmata, 0)?;

    // Once.
    let bytes = i2c.read_once(&mut firmata, ADDRESS, None, 3)?;
    println!("Read once: {:?}", bytes);

    // Continuously, for 2 seconds.
    i2c.report(&mut firmata, ADDRESS, None, 3)?;
    for _ in 0..20 {
        firmata.parse(16)?;
        println!("Latest: {:?}", i2c.read(ADDRESS, None));
        std::thread::sleep(Duration::from_millis(100));
    }
    i2c.report(&mut firmata, ADDRESS, None, 0)?;
    firmata.close()
}
