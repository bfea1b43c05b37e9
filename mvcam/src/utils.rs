//! # Utility module

use anyhow::{anyhow, Result};
use log::*;
use std::io::Read;
use std::net::{TcpListener, TcpStream};

/// Open a file or an input stream.
///
/// `tcp://host:port` connects to a remote stream, while `tcp://@:port` waits for a single
/// incoming connection on the given port.
pub fn open_file(input: &str) -> Result<Box<dyn Read + Send>> {
    if let Some(input) = input.strip_prefix("tcp://") {
        let (addr, port) = input
            .split_once(':')
            .ok_or_else(|| anyhow!("Invalid format"))?;
        let port: u16 = str::parse(port)?;

        let stream = if addr == "@" {
            let listener = TcpListener::bind(("0.0.0.0", port))?;
            let (sock, addr) = listener.accept()?;
            info!("Accept {}", addr);
            sock
        } else {
            info!("Connecting to {}", input);
            TcpStream::connect((addr, port))?
        };

        Ok(Box::new(stream))
    } else {
        std::fs::File::open(input)
            .map(|i| Box::new(i) as _)
            .map_err(|e| anyhow!("unable to open {}: {}", input, e))
    }
}
