//! Arduino-style primitives with validation, routed to a swappable
//! [`IoBackend`].

mod backend;
mod string_table;

pub use backend::{IoBackend, MockIoBackend, PinMode};
pub use string_table::{StringTable, MAX_STRINGS, MAX_STRING_LEN};

use crate::error::VmError;

/// Maximum number of arguments a single `PRINTF` call may carry.
pub const MAX_PRINTF_ARGS: usize = 8;

/// Mediates between the engine's opcode semantics and a concrete
/// [`IoBackend`]: owns the string table, validates pin/mode combinations,
/// and formats `printf` output.
pub struct IoController {
    backend: Box<dyn IoBackend>,
    strings: StringTable,
}

impl IoController {
    /// Wrap `backend` with string-table and formatting support.
    #[must_use]
    pub fn new(backend: Box<dyn IoBackend>) -> Self {
        Self {
            backend,
            strings: StringTable::new(),
        }
    }

    /// The interned string table, for inspection by the facade / host.
    #[must_use]
    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    /// The backend itself, for host-side test harnesses that need to
    /// downcast back to a concrete type (e.g. `MockIoBackend`).
    pub fn backend_mut(&mut self) -> &mut dyn IoBackend {
        self.backend.as_mut()
    }

    /// Replace the string table wholesale, e.g. on program load.
    pub fn load_strings(&mut self, strings: Vec<String>) {
        self.strings.load(strings);
    }

    /// Intern a new string, e.g. from the compiler's emitted table if it
    /// is supplied incrementally rather than all at once.
    pub fn add_string(&mut self, s: &str) -> Result<u16, VmError> {
        self.strings.add(s)
    }

    /// Clear the string table and return the backend to its power-on state.
    pub fn reset(&mut self) {
        self.strings.clear();
        self.backend.reset();
    }

    pub fn pin_mode(&mut self, pin: u16, raw_mode: i32) -> Result<(), VmError> {
        let mode = PinMode::decode(raw_mode)?;
        self.backend.pin_mode(pin, mode)
    }

    pub fn digital_write(&mut self, pin: u16, value: i32) -> Result<(), VmError> {
        self.backend.digital_write(pin, value)
    }

    pub fn digital_read(&mut self, pin: u16) -> Result<i32, VmError> {
        self.backend.digital_read(pin)
    }

    pub fn analog_write(&mut self, pin: u16, value: i32) -> Result<(), VmError> {
        if !(0..=i32::from(u16::MAX)).contains(&value) {
            return Err(VmError::HardwareFault);
        }
        self.backend.analog_write(pin, value)
    }

    pub fn analog_read(&mut self, pin: u16) -> Result<i32, VmError> {
        self.backend.analog_read(pin).map(i32::from)
    }

    #[must_use]
    pub fn millis(&self) -> u32 {
        self.backend.millis()
    }

    #[must_use]
    pub fn micros(&self) -> u32 {
        self.backend.micros()
    }

    pub fn delay(&mut self, ns: u32) {
        self.backend.delay_ns(ns);
    }

    /// Format and emit one `printf` call.
    ///
    /// `args` is in left-to-right source order (the engine is responsible
    /// for popping them off the stack in reverse and handing them back in
    /// forward order here). `%d`, `%x`, `%c`, `%s` are the only
    /// recognized conversions; anything else is emitted literally.
    /// Missing arguments are padded per conversion (`0`, `'?'`, or
    /// `"(null)"`) rather than treated as an error — this is documented
    /// guest-visible behavior, not error recovery.
    pub fn printf(&mut self, string_id: u16, args: &[i32]) -> Result<(), VmError> {
        let fmt = self
            .strings
            .get(string_id)
            .ok_or(VmError::PrintfError)?
            .to_string();
        let line = self.format(&fmt, args)?;
        self.backend.write_line(&line);
        Ok(())
    }

    fn format(&self, fmt: &str, args: &[i32]) -> Result<String, VmError> {
        let mut out = String::with_capacity(fmt.len());
        let mut arg_idx = 0usize;
        let mut chars = fmt.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('d') => {
                    let v = args.get(arg_idx).copied().unwrap_or(0);
                    arg_idx += 1;
                    out.push_str(&v.to_string());
                }
                Some('x') => {
                    let v = args.get(arg_idx).copied().unwrap_or(0);
                    arg_idx += 1;
                    out.push_str(&format!("{:x}", v as u32));
                }
                Some('c') => {
                    let v = args.get(arg_idx).copied();
                    arg_idx += 1;
                    match v.and_then(|v| u8::try_from(v).ok()).map(char::from) {
                        Some(ch) => out.push(ch),
                        None => out.push('?'),
                    }
                }
                Some('s') => {
                    let v = args.get(arg_idx).copied();
                    arg_idx += 1;
                    match v.and_then(|id| u16::try_from(id).ok()).and_then(|id| self.strings.get(id)) {
                        Some(s) => out.push_str(s),
                        None => out.push_str("(null)"),
                    }
                }
                Some(other) => {
                    // Unknown conversion: emit literally.
                    out.push('%');
                    out.push(other);
                }
                None => out.push('%'),
            }
        }
        Ok(out)
    }
}

impl std::fmt::Debug for IoController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoController")
            .field("strings", &self.strings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> IoController {
        IoController::new(Box::new(MockIoBackend::new()))
    }

    #[test]
    fn printf_substitutes_in_order() {
        let mut io = controller();
        let id = io.add_string("n=%d x=%x c=%c").unwrap();
        io.printf(id, &[42, 255, 65]).unwrap();
        // backend console inspection requires downcasting in real tests;
        // here we just confirm the call succeeds without error.
        let _ = id;
    }

    #[test]
    fn printf_pads_missing_arguments() {
        let mut io = controller();
        let id = io.add_string("n=%d c=%c s=%s").unwrap();
        io.printf(id, &[]).unwrap();
    }

    #[test]
    fn printf_unknown_string_id_errors() {
        let mut io = controller();
        assert_eq!(io.printf(99, &[]), Err(VmError::PrintfError));
    }

    #[test]
    fn analog_write_range_checked() {
        let mut io = controller();
        assert_eq!(io.analog_write(0, -1), Err(VmError::HardwareFault));
        assert_eq!(io.analog_write(0, 70_000), Err(VmError::HardwareFault));
        assert!(io.analog_write(0, 512).is_ok());
    }
}
