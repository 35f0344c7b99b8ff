//! Global and array opcode handlers. These are the only handlers that
//! touch the memory manager; local variables live on the engine's own
//! frame stack (see `engine::dispatch_local`) and never reach here.

use super::stack::Stack;
use crate::error::VmError;
use crate::isa::VMOpcode;
use crate::memory::MemoryManager;

pub fn dispatch(
    op: VMOpcode,
    immediate: u16,
    stack: &mut Stack,
    memory: &mut MemoryManager,
) -> Result<(), VmError> {
    match op {
        VMOpcode::LoadGlobal => {
            let value = memory.load_global(immediate)?;
            stack.push(value)
        }
        VMOpcode::StoreGlobal => {
            let value = stack.pop()?;
            memory.store_global(immediate, value)
        }
        VMOpcode::CreateArray => {
            let size = stack.pop()?;
            let size = u16::try_from(size).map_err(|_| VmError::MemoryBounds)?;
            memory.create_array(immediate, size)
        }
        VMOpcode::LoadArray => {
            let index = stack.pop()?;
            let index = u16::try_from(index).map_err(|_| VmError::MemoryBounds)?;
            let value = memory.load_array(immediate, index)?;
            stack.push(value)
        }
        VMOpcode::StoreArray => {
            // Emission order is `index` then `value`, so `value` is on top.
            let (index, value) = stack.pop2()?;
            let index = u16::try_from(index).map_err(|_| VmError::MemoryBounds)?;
            memory.store_array(immediate, index, value)
        }
        _ => unreachable!("memory_ops::dispatch called with non-memory opcode {op:?}"),
    }
}
