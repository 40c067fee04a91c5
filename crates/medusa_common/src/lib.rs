//! Common definitions shared across the MEDUSA test-bench system.
//!
//! This crate provides the register address map of the MEDUSA SAT-solver
//! ASIC, the physical geometry of its clause-memory tiles, the serial
//! opcodes spoken by its SPI front end, the address map of the companion
//! embedded core, and the memory-mapped peripherals of the controller
//! board. Firmware, host tools, and the behavioral chip model all build on
//! these constants so that every layer agrees on the same bit-exact layout.

#![no_std]

/// One physical clause-memory/oscillator array of the dual-tile ASIC.
///
/// Each tile owns its own word-line and bit-line address window, its own
/// sampling status registers, and one 16-bit half of the shared global
/// control and sampling control registers. The right tile occupies the
/// lower half of those shared registers, the left tile the upper half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tile {
    /// Tile wired to the lower 16 bits of the shared control registers.
    Right,
    /// Tile wired to the upper 16 bits of the shared control registers.
    Left,
}

impl Tile {
    /// Both tiles, right first, in the order coupled operations touch them.
    pub const ALL: [Tile; 2] = [Tile::Right, Tile::Left];

    /// Bit offset of this tile's half inside a shared 32-bit register.
    pub const fn half_shift(self) -> u32 {
        match self {
            Tile::Right => 0,
            Tile::Left => 16,
        }
    }

    /// Address of word-line word `word` of this tile.
    pub const fn wl_addr(self, word: usize) -> u32 {
        let base = match self {
            Tile::Right => regs::WL_RIGHT,
            Tile::Left => regs::WL_LEFT,
        };
        base + (word as u32) * regs::WORD_STRIDE
    }

    /// Address of bit-line word `word` of this tile.
    pub const fn bl_addr(self, word: usize) -> u32 {
        let base = match self {
            Tile::Right => regs::BL_RIGHT,
            Tile::Left => regs::BL_LEFT,
        };
        base + (word as u32) * regs::WORD_STRIDE
    }

    /// Base of this tile's sampling status block.
    const fn sample_base(self) -> u32 {
        match self {
            Tile::Right => regs::SAMPLE_RIGHT,
            Tile::Left => regs::SAMPLE_LEFT,
        }
    }

    /// Address of the sample-done flag register.
    pub const fn done_addr(self) -> u32 {
        self.sample_base() + regs::SMPL_DONE_OFFSET
    }

    /// Address of the elapsed sampling-time register.
    pub const fn time_addr(self) -> u32 {
        self.sample_base() + regs::SMPL_TIME_OFFSET
    }

    /// Address of output-sample word `word`.
    pub const fn dout_addr(self, word: usize) -> u32 {
        self.sample_base() + regs::SMPL_DOUT_OFFSET + (word as u32) * regs::WORD_STRIDE
    }

    /// Address of the sampling hold-time register.
    pub const fn hold_time_addr(self) -> u32 {
        match self {
            Tile::Right => regs::HOLD_TIME_RIGHT,
            Tile::Left => regs::HOLD_TIME_LEFT,
        }
    }

    /// Short lowercase name used in logs and on the command line.
    pub const fn name(self) -> &'static str {
        match self {
            Tile::Right => "right",
            Tile::Left => "left",
        }
    }
}

/// Register address space of the MEDUSA ASIC.
///
/// The chip exposes four regions of 256 32-bit registers, selected by the
/// top address nibble. Registers are byte addressed with a stride of four.
pub mod regs {
    /// Byte distance between consecutive 32-bit registers.
    pub const WORD_STRIDE: u32 = 4;

    /// Number of 32-bit registers in each region.
    pub const REGION_WORDS: u32 = 256;

    /// Instruction memory of the on-chip embedded core.
    pub const INSTRUCTION_BASE: u32 = 0x0000_0000;

    /// Sampling subsystem status and output registers.
    pub const SAMPLE_BASE: u32 = 0x1000_0000;

    /// Soft-info region, which on MEDUSA carries the clause-memory word and
    /// bit lines of both tiles.
    pub const SOFT_INFO_BASE: u32 = 0x2000_0000;

    /// Global control, sampling control and hold-time registers.
    pub const CONTROL_BASE: u32 = 0x3000_0000;

    /// Shared global control register (run, oscillator and clause switches).
    pub const GLBL_CTRL: u32 = CONTROL_BASE;

    /// Shared sampling control register.
    pub const SMPL_CTRL: u32 = CONTROL_BASE + 0x04;

    /// Hold time of the right tile's sampler.
    pub const HOLD_TIME_RIGHT: u32 = CONTROL_BASE + 0x08;

    /// Hold time of the left tile's sampler.
    pub const HOLD_TIME_LEFT: u32 = CONTROL_BASE + 0x0C;

    /// Sampling block of the right tile.
    pub const SAMPLE_RIGHT: u32 = SAMPLE_BASE;

    /// Sampling block of the left tile.
    pub const SAMPLE_LEFT: u32 = SAMPLE_BASE + 0x80;

    /// Offset of the sample-done flag inside a sampling block.
    pub const SMPL_DONE_OFFSET: u32 = 0x00;

    /// Offset of the elapsed-time counter inside a sampling block.
    pub const SMPL_TIME_OFFSET: u32 = 0x04;

    /// Offset of the first output-sample word inside a sampling block.
    pub const SMPL_DOUT_OFFSET: u32 = 0x10;

    /// First word-line word of the right tile.
    pub const WL_RIGHT: u32 = SOFT_INFO_BASE;

    /// First bit-line word of the right tile.
    pub const BL_RIGHT: u32 = SOFT_INFO_BASE + 0x080;

    /// First word-line word of the left tile.
    pub const WL_LEFT: u32 = SOFT_INFO_BASE + 0x200;

    /// First bit-line word of the left tile.
    pub const BL_LEFT: u32 = SOFT_INFO_BASE + 0x280;

    /// Hold time written to every tile's sampler when sampling is armed.
    pub const HOLD_TIME: u32 = 100;
}

/// Physical layout of one tile's clause memory.
///
/// Word lines run along clause rows and are addressed as packed 32-bit
/// words. Bit 0 of the first word and bit 31 of the last word are the top
/// and bottom reset indicators, the lines next to them drive the clause
/// bias network, and word `RXO_WL_WORD` selects the relaxation oscillators.
/// Clause rows grow downward from `TOP_CLS_START_WL` and upward from
/// `BOT_CLS_START_WL`.
pub mod geometry {
    /// Packed word-line words per tile.
    pub const WL_WORDS: usize = 17;

    /// Total word lines per tile.
    pub const WL_COUNT: usize = WL_WORDS * 32;

    /// Word-line word that drives the relaxation-oscillator rows.
    pub const RXO_WL_WORD: usize = 8;

    /// Packed bit-line words per tile, including the control word.
    pub const BL_WORDS: usize = 5;

    /// Bit-line words that carry variable literals.
    pub const VAR_WORDS: usize = BL_WORDS - 1;

    /// Variables packed into one bit-line word (two bits per variable).
    pub const VARS_PER_WORD: usize = 16;

    /// Largest variable count a tile can hold.
    pub const MAX_VAR: usize = VAR_WORDS * VARS_PER_WORD;

    /// Clause rows on each side of the tile.
    pub const HALF_CLS: usize = 254;

    /// Clause rows in one switchable memory section.
    pub const SECT_CLS: usize = 127;

    /// Largest clause count a tile can hold.
    pub const MAX_CLS: usize = 2 * HALF_CLS;

    /// Longest clause the bit lines can express.
    pub const MAX_CLS_LEN: usize = MAX_VAR;

    /// Word line of the first top-half clause row.
    pub const TOP_CLS_START_WL: usize = 2;

    /// Word line of the first bottom-half clause row.
    pub const BOT_CLS_START_WL: usize = WL_COUNT - 3;

    /// Bit in the last bit-line word that disconnects a clause row.
    ///
    /// Every row is written with this bit set before a formula is loaded;
    /// programming a clause clears it again for that row only.
    pub const CLS_DISABLE_BIT: u32 = 16;

    /// Output-sample words captured per run.
    pub const DOUT_WORDS: usize = 2;

    /// Sampling counter clock in Hz (895 kHz reference times 1024 / 8).
    pub const SAMPLE_CLOCK_HZ: u64 = 895_000 * 1024 / 8;
}

/// Serial opcodes understood by the ASIC's SPI front end.
pub mod opcodes {
    /// Write SPI configuration register 0 (I/O width).
    pub const W_REG0: u8 = 0x01;

    /// Write one 32-bit register.
    pub const WRITE: u8 = 0x02;

    /// Read SPI configuration register 0.
    pub const R_REG0: u8 = 0x05;

    /// Read SPI configuration register 1.
    pub const R_REG1: u8 = 0x07;

    /// Read one 32-bit register after the configured dummy cycles.
    pub const READ: u8 = 0x0B;

    /// Write SPI configuration register 1 (dummy cycles).
    pub const W_REG1: u8 = 0x11;

    /// Dummy cycles between the read address and valid data.
    pub const DUMMY_CYCLES: u8 = 31;

    /// Configuration register 0 value selecting single-wire SPI.
    pub const SINGLE_SPI: u8 = 0x00;

    /// Dummy bytes clocked between the read address and valid data.
    pub const READ_DUMMY_BYTES: usize = 4;
}

/// Address map and mailbox protocol of the companion embedded core.
///
/// The core is reached through its own bit-banged SPI slave. Commands are
/// exchanged through a four-word mailbox in its data memory: status,
/// command, operand, result.
pub mod core_map {
    /// Word write opcode of the core's SPI slave.
    pub const OP_WRITE_WORD: u8 = 0x01;

    /// Burst write opcode used to stream program images.
    pub const OP_WRITE_BURST: u8 = 0x02;

    /// Read opcode; followed by one dummy byte before data.
    pub const OP_READ: u8 = 0x0B;

    /// Base of the instruction memory targeted by image flashing.
    pub const INSTR_MEM_BASE: u32 = 0x0000_0000;

    /// Scratch location used by the mode sweep.
    pub const SCRATCH_ADDR: u32 = 0x0008_0000;

    /// Mailbox base in data memory.
    pub const COMM_BUFFER: u32 = 0x0008_0100;

    /// Mailbox status word.
    pub const COMM_STATUS: u32 = COMM_BUFFER;

    /// Mailbox command word; writing it starts processing.
    pub const COMM_COMMAND: u32 = COMM_BUFFER + 4;

    /// Mailbox operand word.
    pub const COMM_DATA: u32 = COMM_BUFFER + 8;

    /// Mailbox result word.
    pub const COMM_RESULT: u32 = COMM_BUFFER + 12;

    /// Core is idle and accepts a command.
    pub const STATUS_READY: u32 = 0xAA;

    /// Core finished the last command; the result word is valid.
    pub const STATUS_ACK: u32 = 0x55;

    /// Core is processing a command.
    pub const STATUS_BUSY: u32 = 0xBB;

    /// Core rejected the last command.
    pub const STATUS_ERROR: u32 = 0xEE;

    /// Echo the operand.
    pub const CMD_ECHO: u32 = 1;

    /// Return the operand plus one.
    pub const CMD_ADD_ONE: u32 = 2;

    /// Return the operand squared.
    pub const CMD_SQUARE: u32 = 3;

    /// Result reported for an unknown command.
    pub const RESULT_INVALID: u32 = 0xFFFF_FFFF;

    /// Peripheral location read by the bring-up check.
    pub const INIT_TEST_ADDR: u32 = 0x1A00_0000;

    /// Pattern written by the bring-up check.
    pub const INIT_TEST_PATTERN: u32 = 0xA5A5_A5A5;

    /// Pattern written by the mode sweep.
    pub const SWEEP_PATTERN: u32 = 0x1234_5678;
}

/// Memory-mapped peripherals of the RISC-V controller board.
///
/// The controller runs on the QEMU `virt` layout extended with a GPIO bank
/// and an SPI master at fixed addresses.
pub mod mmio {
    /// Base address of the CLINT (Core Local Interruptor) in QEMU 'virt' machine.
    pub const CLINT_BASE: usize = 0x200_0000;

    /// Memory-mapped address for the machine timer compare register.
    pub const MTIMECMP_ADDR: usize = CLINT_BASE + 0x4000;

    /// Memory-mapped address for the machine timer counter register.
    ///
    /// Increments at `MTIME_HZ`; the firmware derives every busy-wait delay
    /// from it.
    pub const MTIME_ADDR: usize = CLINT_BASE + 0xBFF8;

    /// Tick rate of the machine timer.
    pub const MTIME_HZ: u64 = 10_000_000;

    /// 16550 UART used for the host command link and logging.
    pub const UART0_BASE: usize = 0x1000_0000;

    /// GPIO bank driving the chip's control pins and the bit-banged bus.
    pub const GPIO_BASE: usize = 0x1001_2000;

    /// Pin input value register offset.
    pub const GPIO_INPUT_VAL: usize = 0x00;

    /// Pin output enable register offset.
    pub const GPIO_OUTPUT_EN: usize = 0x08;

    /// Pin output value register offset.
    pub const GPIO_OUTPUT_VAL: usize = 0x0C;

    /// SPI master wired to the ASIC's register front end.
    pub const SPI_BASE: usize = 0x1001_4000;

    /// SPI transmit data register offset; bit 31 reads as FIFO full.
    pub const SPI_TXDATA: usize = 0x48;

    /// SPI receive data register offset; bit 31 reads as FIFO empty.
    pub const SPI_RXDATA: usize = 0x4C;

    /// SPI clock divider register offset.
    pub const SPI_SCKDIV: usize = 0x00;

    /// SPI clock mode register offset (phase bit 0, polarity bit 1).
    pub const SPI_SCKMODE: usize = 0x04;

    /// Board pin assignments on the GPIO bank.
    pub mod pins {
        /// Chip select of the ASIC register bus.
        pub const CHIP_CS: u32 = 0;
        /// Active-low reset of the ASIC and its embedded core.
        pub const RSTN: u32 = 1;
        /// Fetch enable of the embedded core.
        pub const FETCH_EN: u32 = 2;
        /// Fetch done acknowledgement from the embedded core.
        pub const FETCH_DONE: u32 = 3;
        /// Bit-banged chip select of the embedded core.
        pub const CORE_CS: u32 = 4;
        /// Bit-banged clock of the embedded core.
        pub const CORE_SCK: u32 = 5;
        /// Bit-banged data out to the embedded core.
        pub const CORE_MOSI: u32 = 6;
        /// Bit-banged data in from the embedded core.
        pub const CORE_MISO: u32 = 7;
    }
}

#[cfg(test)]
mod tests {
    use super::geometry::*;
    use super::*;

    #[test]
    fn tile_windows_do_not_overlap() {
        let right_end = Tile::Right.wl_addr(WL_WORDS - 1);
        assert!(right_end < Tile::Right.bl_addr(0));
        assert!(Tile::Right.bl_addr(BL_WORDS - 1) < Tile::Left.wl_addr(0));
        assert!(Tile::Left.wl_addr(WL_WORDS - 1) < Tile::Left.bl_addr(0));
        let last = Tile::Left.bl_addr(BL_WORDS - 1);
        assert!(last < regs::SOFT_INFO_BASE + regs::REGION_WORDS * regs::WORD_STRIDE);
    }

    #[test]
    fn clause_rows_fit_between_bias_lines() {
        assert_eq!(TOP_CLS_START_WL + HALF_CLS - 1, 255);
        assert_eq!(BOT_CLS_START_WL - (HALF_CLS - 1), 288);
        // The oscillator word sits in the gap between the two halves.
        assert!(RXO_WL_WORD * 32 > TOP_CLS_START_WL + HALF_CLS - 1);
        assert!((RXO_WL_WORD + 1) * 32 <= BOT_CLS_START_WL - (HALF_CLS - 1));
    }

    #[test]
    fn sample_blocks_are_per_tile() {
        assert_ne!(Tile::Right.done_addr(), Tile::Left.done_addr());
        assert_eq!(Tile::Right.dout_addr(1), 0x1000_0014);
        assert_eq!(Tile::Left.time_addr(), 0x1000_0084);
    }
}
