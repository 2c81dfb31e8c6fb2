use firmata_bridge::io::Serial;

fn main() {
    match Serial::list_ports() {
        Ok(ports) => ports.iter().for_each(|port| println!("{}", port)),
        Err(error) => eprintln!("Cannot list serial ports: {}", error),
    }
}
