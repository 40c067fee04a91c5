//! TCP front end of the chip model for hardware-in-the-loop sessions.
//!
//! Each request is a one-byte opcode followed by little-endian fields:
//! `CMD_WRITE` carries an address and a data word and is answered with a
//! four-byte acknowledgement, `CMD_READ` carries an address and is answered
//! with the register value. Connections are served one at a time against
//! the same model, so chip state survives a client reconnecting.

use anyhow::{Context, Result, bail};
use log::{info, warn};
use medusa_core::bus::RegisterBus;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};

/// Opcode for a register write.
pub const CMD_WRITE: u8 = 0x02;

/// Opcode for a register read.
pub const CMD_READ: u8 = 0x03;

/// Acknowledgement word returned for every write.
pub const WRITE_ACK: u32 = 0;

fn read_word(stream: &mut TcpStream) -> Result<u32> {
    let mut bytes = [0u8; 4];
    stream.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

/// Serves requests from one client until it disconnects.
///
/// # Returns
///
/// The number of requests handled, or an error for an unknown opcode or a
/// connection dropped mid-request.
pub fn handle_client<B: RegisterBus>(stream: &mut TcpStream, bus: &mut B) -> Result<usize> {
    let mut handled = 0;
    loop {
        let mut opcode = [0u8; 1];
        match stream.read_exact(&mut opcode) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(handled),
            Err(e) => return Err(e.into()),
        }

        match opcode[0] {
            CMD_WRITE => {
                let address = read_word(stream)?;
                let data = read_word(stream)?;
                bus.write_register(address, data);
                stream.write_all(&WRITE_ACK.to_le_bytes())?;
            }
            CMD_READ => {
                let address = read_word(stream)?;
                let value = bus.read_register(address);
                stream.write_all(&value.to_le_bytes())?;
            }
            other => bail!("unknown opcode 0x{:02X}", other),
        }
        handled += 1;
    }
}

/// Accepts clients forever, serving each against `bus` in turn.
pub fn serve<A: ToSocketAddrs, B: RegisterBus>(addr: A, bus: &mut B) -> Result<()> {
    let listener = TcpListener::bind(addr).context("Failed to bind model server")?;
    info!("model listening on {}", listener.local_addr()?);
    serve_listener(&listener, bus, None)
}

/// Serves clients from an already bound listener.
///
/// Stops after `max_clients` connections when given.
pub fn serve_listener<B: RegisterBus>(
    listener: &TcpListener,
    bus: &mut B,
    max_clients: Option<usize>,
) -> Result<()> {
    let mut served = 0;
    for stream in listener.incoming() {
        let mut stream = stream?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        info!("client {} connected", peer);
        match handle_client(&mut stream, bus) {
            Ok(n) => info!("client {} left after {} requests", peer, n),
            Err(e) => warn!("client {} dropped: {:#}", peer, e),
        }
        served += 1;
        if max_clients.is_some_and(|max| served >= max) {
            break;
        }
    }
    Ok(())
}
