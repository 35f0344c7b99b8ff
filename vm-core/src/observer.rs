//! Synchronous telemetry callbacks the facade drives on the VM's own
//! thread. Observers must not re-enter the VM or block.

/// Callback surface notified around every instruction and at reset.
///
/// `on_instruction_executed` receives the PC the instruction was
/// fetched from (before execution moved it) and the opcode/operand
/// actually fetched; implementations must tolerate `operand = 0` from
/// embedders that don't decode the payload.
pub trait TelemetryObserver {
    fn on_instruction_executed(&mut self, pc: u16, opcode: u8, operand: u16);
    fn on_execution_complete(&mut self, total_instructions: u64, elapsed_ms: u64);
    fn on_vm_reset(&mut self);
}

/// Capacity of [`BlackboxObserver`]'s ring buffer.
pub const BLACKBOX_CAPACITY: usize = 64;

/// Bounded recorder of recent instruction events plus reset/error
/// counters, for postmortem inspection after a crash or a failing test.
///
/// A fixed ring of the last [`BLACKBOX_CAPACITY`] `(pc, opcode, operand)`
/// triples survives after execution halts, without the unbounded growth
/// a `Vec` would need.
#[derive(Debug, Clone)]
pub struct BlackboxObserver {
    ring: [Option<(u16, u8, u16)>; BLACKBOX_CAPACITY],
    next: usize,
    filled: bool,
    pub reset_count: u32,
    pub error_count: u32,
    last_summary: Option<(u64, u64)>,
}

impl Default for BlackboxObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl BlackboxObserver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ring: [None; BLACKBOX_CAPACITY],
            next: 0,
            filled: false,
            reset_count: 0,
            error_count: 0,
            last_summary: None,
        }
    }

    /// The recorded events, oldest first, limited to however many have
    /// actually been recorded since the last reset.
    #[must_use]
    pub fn recent_events(&self) -> Vec<(u16, u8, u16)> {
        let mut out = Vec::with_capacity(BLACKBOX_CAPACITY);
        if self.filled {
            out.extend(self.ring[self.next..].iter().flatten().copied());
        }
        out.extend(self.ring[..self.next].iter().flatten().copied());
        out
    }

    /// `(total_instructions, elapsed_ms)` from the most recent completed
    /// run, if any.
    #[must_use]
    pub fn last_summary(&self) -> Option<(u64, u64)> {
        self.last_summary
    }

    /// Note that a trapping `VmError` occurred; the facade calls this
    /// separately from the `TelemetryObserver` callbacks since a trap is
    /// not itself an instruction event.
    pub fn note_error(&mut self) {
        self.error_count += 1;
    }
}

impl TelemetryObserver for BlackboxObserver {
    fn on_instruction_executed(&mut self, pc: u16, opcode: u8, operand: u16) {
        self.ring[self.next] = Some((pc, opcode, operand));
        self.next = (self.next + 1) % BLACKBOX_CAPACITY;
        if self.next == 0 {
            self.filled = true;
        }
    }

    fn on_execution_complete(&mut self, total_instructions: u64, elapsed_ms: u64) {
        self.last_summary = Some((total_instructions, elapsed_ms));
    }

    fn on_vm_reset(&mut self) {
        self.reset_count += 1;
    }
}
