//! Memory dump into telemetry. The command names an address range; the
//! range is bound-checked against the dump buffer before anything is read,
//! and memory is only reached through [`MemorySpace`].

use alloc::rc::Rc;
use core::cell::RefCell;

use serde::Serialize;

use super::DriverFault;
use crate::app::App;
use crate::error::AppResult;
use crate::protocol::{CommandPacket, CommandResult, ExecStatus};

/// Capacity of the dump buffer in bytes.
pub const MEM_DUMP_CAPACITY: usize = 64;

pub trait MemorySpace {
    /// Fill `buf` from `start`. Fails without a partial read when any byte
    /// of the range is unmapped.
    fn read(&self, start: u32, buf: &mut [u8]) -> Result<(), DriverFault>;
}

/// One mapped region of simulated memory.
#[derive(Debug)]
pub struct SimMemory {
    base: u32,
    bytes: RefCell<alloc::vec::Vec<u8>>,
}

pub const SIM_MEMORY_BASE: u32 = 0x2000_0000;
pub const SIM_MEMORY_SIZE: usize = 1024;

impl SimMemory {
    pub fn new(base: u32, bytes: alloc::vec::Vec<u8>) -> Self {
        Self {
            base,
            bytes: RefCell::new(bytes),
        }
    }

    pub fn write(&self, addr: u32, data: &[u8]) -> Result<(), DriverFault> {
        let mut bytes = self.bytes.borrow_mut();
        let range = region(self.base, bytes.len(), addr, data.len()).ok_or(DriverFault::OutOfBounds)?;
        bytes[range].copy_from_slice(data);
        Ok(())
    }
}

impl Default for SimMemory {
    fn default() -> Self {
        let bytes = (0..SIM_MEMORY_SIZE).map(|i| i as u8).collect();
        Self::new(SIM_MEMORY_BASE, bytes)
    }
}

fn region(base: u32, mapped: usize, addr: u32, len: usize) -> Option<core::ops::Range<usize>> {
    let start = addr.checked_sub(base)? as usize;
    let end = start.checked_add(len)?;
    (end <= mapped).then_some(start..end)
}

impl MemorySpace for SimMemory {
    fn read(&self, start: u32, buf: &mut [u8]) -> Result<(), DriverFault> {
        let bytes = self.bytes.borrow();
        let range = region(self.base, bytes.len(), start, buf.len()).ok_or(DriverFault::OutOfBounds)?;
        buf.copy_from_slice(&bytes[range]);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemDumpBuffer {
    pub start_addr: u32,
    pub size: u32,
    pub data: heapless::Vec<u8, MEM_DUMP_CAPACITY>,
}

/// App `tlm_mem_dump`: owns the dump buffer, cleared at init. The dump
/// command writes into the same buffer through [`MemDumpService::buffer`].
#[derive(Default)]
pub struct MemDumpService {
    buffer: Rc<RefCell<MemDumpBuffer>>,
}

impl MemDumpService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle the dump command shares with this App.
    pub fn buffer(&self) -> Rc<RefCell<MemDumpBuffer>> {
        Rc::clone(&self.buffer)
    }
}

impl App for MemDumpService {
    fn name(&self) -> &str {
        "tlm_mem_dump"
    }

    fn init(&mut self) -> AppResult {
        *self.buffer.borrow_mut() = MemDumpBuffer::default();
        Ok(())
    }

    fn update(&mut self) -> AppResult {
        Ok(())
    }

    fn report(&self) -> Option<serde_json::Value> {
        serde_json::to_value(&*self.buffer.borrow()).ok()
    }
}

/// `APP_TMD_MEM_DUMP(start: u32, size: u32)`. Oversized or unmapped ranges
/// are rejected whole; the buffer keeps its previous contents.
pub fn cmd_mem_dump(
    memory: &dyn MemorySpace,
    buffer: &RefCell<MemDumpBuffer>,
    packet: &CommandPacket,
) -> Result<CommandResult, ExecStatus> {
    let params = packet.params_exact::<8>()?;
    let start = u32::from_be_bytes([params[0], params[1], params[2], params[3]]);
    let size = u32::from_be_bytes([params[4], params[5], params[6], params[7]]);

    if size as usize > MEM_DUMP_CAPACITY {
        return Err(ExecStatus::IllegalParameter);
    }

    let mut scratch = [0u8; MEM_DUMP_CAPACITY];
    let window = &mut scratch[..size as usize];
    memory.read(start, window).map_err(|_| ExecStatus::IllegalParameter)?;

    let mut dump = buffer.borrow_mut();
    dump.start_addr = start;
    dump.size = size;
    dump.data.clear();
    // Fits: size was checked against the capacity above.
    let _ = dump.data.extend_from_slice(window);

    Ok(CommandResult::success())
}
