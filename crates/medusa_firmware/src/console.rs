//! UART console: the host command link and the log output.
//!
//! Drives the 16550 UART at `UART0_BASE`. Output is serialised by a spin
//! lock so a log record emitted from inside a command never splits a
//! protocol line. Input is polled: the command loop blocks on the receive
//! FIFO for text lines and, during an upload, for raw frame words.

use core::cell::UnsafeCell;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use medusa_common::mmio::UART0_BASE;
use medusa_core::command::{Response, ResponseSink};

/// Spin lock owning the console transmitter.
///
/// The command loop and the `log` backend both write to the UART, and a
/// log record can be emitted in the middle of a protocol response. Holding
/// the transmitter behind this lock keeps every formatted line contiguous
/// on the wire. There is no scheduler, so waiters busy-wait.
pub struct SpinLock<T> {
    /// Set while a writer holds the transmitter.
    ///
    /// Taken with an acquire compare-and-swap and cleared with a release
    /// store, so a line written under the lock is complete before the next
    /// writer starts.
    held: AtomicBool,

    /// The guarded value, here the UART transmitter.
    value: UnsafeCell<T>,
}

/// The lock hands out at most one guard at a time, so sharing it between
/// the command loop and the trap handler is sound for `Send` contents.
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Wraps `value` in an unlocked lock.
    ///
    /// `const` so the console can live in a `static`.
    ///
    /// # Arguments
    ///
    /// * `value` - The transmitter to guard
    pub const fn new(value: T) -> Self {
        Self {
            held: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Spins until the lock is free, then takes it.
    ///
    /// # Returns
    ///
    /// A guard giving exclusive access to the transmitter until it is
    /// dropped.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        while self
            .held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        SpinLockGuard {
            held: &self.held,
            value: &self.value,
        }
    }
}

/// Exclusive access to a locked value.
///
/// Dereferences to the guarded value; dropping the guard releases the lock.
pub struct SpinLockGuard<'a, T> {
    /// Flag cleared on drop.
    held: &'a AtomicBool,

    /// The guarded value.
    value: &'a UnsafeCell<T>,
}

impl<'a, T> core::ops::Deref for SpinLockGuard<'a, T> {
    type Target = T;

    /// Borrows the guarded value for as long as the guard lives.
    fn deref(&self) -> &T {
        unsafe { &*self.value.get() }
    }
}

impl<'a, T> core::ops::DerefMut for SpinLockGuard<'a, T> {
    /// Mutably borrows the guarded value; the lock is still held.
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.value.get() }
    }
}

impl<'a, T> Drop for SpinLockGuard<'a, T> {
    /// Releases the lock so the next writer can take it.
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}

/// Receive buffer / transmit holding register.
const UART_DATA: *mut u8 = UART0_BASE as *mut u8;

/// Line status register.
const UART_LSR: *const u8 = (UART0_BASE + 5) as *const u8;

/// LSR: a received byte is waiting.
const LSR_DATA_READY: u8 = 1 << 0;

/// LSR: the transmit holding register is empty.
const LSR_TX_EMPTY: u8 = 1 << 5;

/// Longest accepted command line; longer input is cut.
pub const LINE_MAX: usize = 128;

/// UART transmitter implementing `fmt::Write`.
///
/// Converts '\n' to "\r\n" for serial terminals.
pub struct Uart;

/// The console transmitter shared by protocol output and logging.
static CONSOLE: SpinLock<Uart> = SpinLock::new(Uart);

impl Uart {
    /// Waits for room in the transmit holding register, then sends `byte`.
    fn put(byte: u8) {
        unsafe {
            while UART_LSR.read_volatile() & LSR_TX_EMPTY == 0 {
                core::hint::spin_loop();
            }
            UART_DATA.write_volatile(byte);
        }
    }
}

impl fmt::Write for Uart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.bytes() {
            if c == b'\n' {
                Uart::put(b'\r');
            }
            Uart::put(c);
        }
        Ok(())
    }
}

/// Enables the FIFOs and selects 8N1 framing.
pub fn init() {
    unsafe {
        // FCR: enable and clear both FIFOs.
        ((UART0_BASE + 2) as *mut u8).write_volatile(0x07);
        // LCR: 8 data bits, no parity, one stop bit.
        ((UART0_BASE + 3) as *mut u8).write_volatile(0x03);
    }
}

/// Blocks until a byte arrives.
pub fn read_byte() -> u8 {
    unsafe {
        while UART_LSR.read_volatile() & LSR_DATA_READY == 0 {
            core::hint::spin_loop();
        }
        UART_DATA.read_volatile()
    }
}

/// Reads one little-endian 32-bit word of an upload frame.
pub fn read_word() -> u32 {
    let mut bytes = [0u8; 4];
    for b in bytes.iter_mut() {
        *b = read_byte();
    }
    u32::from_le_bytes(bytes)
}

/// Reads one text line into `buf`, dropping the terminator.
///
/// Accepts "\n", "\r" or "\r\n" endings; an empty line between the two
/// halves of a CRLF is skipped by the caller as an empty command. Bytes that
/// are not ASCII are discarded.
pub fn read_line(buf: &mut [u8; LINE_MAX]) -> &str {
    let mut len = 0;
    loop {
        let b = read_byte();
        match b {
            b'\n' | b'\r' => break,
            _ if b.is_ascii() && len < LINE_MAX => {
                buf[len] = b;
                len += 1;
            }
            _ => {}
        }
    }
    core::str::from_utf8(&buf[..len]).unwrap_or("")
}

/// Writes formatted text to the UART under the console lock.
///
/// Backs `println!` and the UART logger; not meant to be called directly.
#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use fmt::Write;
    let _ = CONSOLE.lock().write_fmt(args);
}

/// Prints a line to the console under the console lock.
#[macro_export]
macro_rules! println {
    ($($arg:tt)*) => ({
        $crate::console::_print(format_args!("{}\n", format_args!($($arg)*)));
    });
}
pub use println;

/// Writes protocol responses to the host, one line each.
pub struct HostLink;

impl ResponseSink for HostLink {
    fn emit(&mut self, response: Response) {
        println!("{}", response);
    }
}
