//! Kernel heap for the command loop.
//!
//! Upload payloads, parsed formulas and result batches are allocated and
//! dropped for every command, so the heap must reclaim memory. A linked
//! list allocator over a fixed RAM window does that with no setup beyond
//! handing it the region once at boot.

use linked_list_allocator::LockedHeap;

/// Start of the heap region, above the image, data and stack.
pub const HEAP_START: usize = 0x8050_0000;

/// Heap length; the region ends at 0x8800_0000.
pub const HEAP_LEN: usize = 0x8800_0000 - HEAP_START;

#[global_allocator]
static HEAP: LockedHeap = LockedHeap::empty();

/// Hands the heap region to the allocator.
///
/// # Safety
///
/// Must be called exactly once, before the first allocation, and the
/// region must not be used by anything else.
pub unsafe fn init() {
    unsafe {
        HEAP.lock().init(HEAP_START as *mut u8, HEAP_LEN);
    }
}
