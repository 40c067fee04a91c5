#![no_std]
#![no_main]

extern crate alloc;

mod console;
mod drivers;
mod logging;
mod memory;
mod trap;

use core::arch::global_asm;
use drivers::delay::MtimeDelay;
use drivers::gpio::{Input, Output};
use drivers::spi::Spi;
use medusa_common::mmio::pins;
use medusa_core::bench::TestBench;
use medusa_core::bitbang::{BitBangSpi, BusTiming};
use medusa_core::bridge::{BridgeConfig, CoreBridge};
use medusa_core::bus::{SpiRegisterBus, check_presence};
use medusa_core::solver::{Solver, SolverConfig};
use medusa_core::tile::TileController;

global_asm!(include_str!("entry.S"));

/// SPI clock divider for the ASIC register front end.
const CHIP_SPI_DIVIDER: u32 = 4;

#[unsafe(no_mangle)]
pub extern "C" fn kmain() -> ! {
    console::init();
    unsafe { memory::init() };
    logging::init(log::LevelFilter::Info);
    log::info!(
        "heap 0x{:x}..0x{:x}",
        memory::HEAP_START,
        memory::HEAP_START + memory::HEAP_LEN
    );

    let mut bus = SpiRegisterBus::new(Spi::new(CHIP_SPI_DIVIDER, 0), Output::new(pins::CHIP_CS), MtimeDelay);
    bus.configure();
    match check_presence(&mut bus) {
        Ok(value) => log::info!("chip online, GLBL_CTRL=0x{:08X}", value),
        Err(e) => log::warn!("chip presence check failed: {}", e),
    }

    let link = BitBangSpi::new(
        Output::new(pins::CORE_CS),
        Output::new(pins::CORE_SCK),
        Output::new(pins::CORE_MOSI),
        Input::new(pins::CORE_MISO),
        MtimeDelay,
        BusTiming::default(),
    );
    let bridge = CoreBridge::new(
        link,
        Output::new(pins::RSTN),
        Output::new(pins::FETCH_EN),
        Input::new(pins::FETCH_DONE),
        MtimeDelay,
        BridgeConfig::default(),
    );

    let solver = Solver::new(TileController::new(bus), MtimeDelay, SolverConfig::default());
    let mut bench = TestBench::new(solver, bridge);
    let mut host = console::HostLink;
    let mut line = [0u8; console::LINE_MAX];

    console::println!("STATUS:{}", bench.status());
    loop {
        if bench.awaiting_upload() {
            let word = console::read_word();
            bench.receive_word(word, &mut host);
        } else {
            let text = console::read_line(&mut line);
            bench.handle_line(text, &mut host);
        }
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    console::println!("STATUS:ERROR:PANIC {}", info);
    loop {
        core::hint::spin_loop();
    }
}
