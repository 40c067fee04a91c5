//! Hardware-in-the-loop register transport.
//!
//! Speaks the model server's TCP protocol so the controller logic can drive
//! a chip model running in another process, or on another machine, through
//! the same `RegisterBus` contract as the SPI transport.

use anyhow::{Context, Result};
use log::{error, info};
use medusa_core::bus::{ALL_ONES, RegisterBus};
use medusa_hw::server::{CMD_READ, CMD_WRITE};
use std::io::{Read, Write};
use std::net::TcpStream;

/// Register bus over a TCP connection to a model server.
///
/// Maintains a persistent connection with TCP_NODELAY set, since every
/// register access is a full request/response round trip. Like the SPI
/// transport it never reports failure to its caller: once the connection
/// breaks, writes are dropped and reads return the floating-bus sentinel.
pub struct TcpRegisterBus {
    stream: TcpStream,
    broken: bool,
}

impl TcpRegisterBus {
    /// Connects to a model server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Server address in "host:port" format (e.g. "127.0.0.1:8000")
    pub fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .with_context(|| format!("Failed to connect to model at {}", addr))?;
        stream.set_nodelay(true)?;
        info!("connected to model at {}", addr);
        Ok(Self {
            stream,
            broken: false,
        })
    }

    /// True once a transfer has failed.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Writes a register and waits for the acknowledgement.
    pub fn write(&mut self, addr: u32, data: u32) -> Result<()> {
        self.stream.write_all(&[CMD_WRITE])?;
        self.stream.write_all(&addr.to_le_bytes())?;
        self.stream.write_all(&data.to_le_bytes())?;
        let mut ack = [0u8; 4];
        self.stream.read_exact(&mut ack)?;
        Ok(())
    }

    /// Reads a register.
    pub fn read(&mut self, addr: u32) -> Result<u32> {
        self.stream.write_all(&[CMD_READ])?;
        self.stream.write_all(&addr.to_le_bytes())?;
        let mut data = [0u8; 4];
        self.stream.read_exact(&mut data)?;
        Ok(u32::from_le_bytes(data))
    }
}

impl RegisterBus for TcpRegisterBus {
    fn write_register(&mut self, address: u32, data: u32) {
        if self.broken {
            return;
        }
        if let Err(e) = self.write(address, data) {
            error!("model connection lost on write to 0x{:08X}: {:#}", address, e);
            self.broken = true;
        }
    }

    fn read_register(&mut self, address: u32) -> u32 {
        if self.broken {
            return ALL_ONES;
        }
        match self.read(address) {
            Ok(value) => value,
            Err(e) => {
                error!("model connection lost on read of 0x{:08X}: {:#}", address, e);
                self.broken = true;
                ALL_ONES
            }
        }
    }
}
