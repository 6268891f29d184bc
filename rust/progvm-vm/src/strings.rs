//! String storage: image constants, zoned strings, temporary strings.
//!
//! A handle is a signed 32-bit number. Non-negative handles below the
//! constant blob's length are byte offsets into the blob (offsets into
//! the middle of a stored string are valid and yield its tail); handles
//! at or above the blob length index the zoned table; negative handles
//! index the temporary table as `-handle - 1`.

use std::borrow::Cow;

/// Owns every string a program can reference.
///
/// Zoned strings live until explicitly freed and their slots are reused
/// first-fit. Temporary strings only ever append and are released in
/// bulk between runs; they exist for builtins to hand short-lived values
/// back to scripts.
#[derive(Debug)]
pub struct StringManager {
    constants: Vec<u8>,
    zoned: Vec<Option<String>>,
    temp: Vec<String>,
}

impl StringManager {
    pub fn new(constants: Vec<u8>) -> StringManager {
        StringManager {
            constants,
            zoned: Vec::new(),
            temp: Vec::new(),
        }
    }

    /// Resolve a handle to its bytes. `None` for handles that address no
    /// live string. Handle 0 is the conventional null string and
    /// resolves to the empty prefix of the constant blob.
    pub fn get(&self, handle: i32) -> Option<&[u8]> {
        if handle >= 0 {
            let at = handle as usize;
            if at < self.constants.len() {
                let tail = &self.constants[at..];
                let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
                return Some(&tail[..end]);
            }
            let at = at - self.constants.len();
            return self.zoned.get(at)?.as_ref().map(|s| s.as_bytes());
        }
        let at = (-(handle as i64) - 1) as usize;
        self.temp.get(at).map(|s| s.as_bytes())
    }

    /// Display form of [`get`](Self::get); invalid UTF-8 is replaced.
    pub fn get_str(&self, handle: i32) -> Option<Cow<'_, str>> {
        self.get(handle).map(String::from_utf8_lossy)
    }

    /// Allocate a permanent string, reusing the first freed slot.
    pub fn zone(&mut self, s: &str) -> i32 {
        let base = self.constants.len() as i32;
        for (i, slot) in self.zoned.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(s.to_string());
                return base + i as i32;
            }
        }
        self.zoned.push(Some(s.to_string()));
        base + (self.zoned.len() - 1) as i32
    }

    /// Free a zoned string. Fails on constant, temporary, out-of-range,
    /// or already-freed handles.
    pub fn unzone(&mut self, handle: i32) -> bool {
        if handle < self.constants.len() as i32 {
            return false;
        }
        let at = (handle as i64 - self.constants.len() as i64) as usize;
        match self.zoned.get_mut(at) {
            Some(slot @ Some(_)) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Allocate a temporary string; always appends.
    pub fn temp_string(&mut self, s: &str) -> i32 {
        self.temp.push(s.to_string());
        -(self.temp.len() as i32)
    }

    /// Release every temporary string at once.
    pub fn clear_temp_strings(&mut self) {
        self.temp.clear();
    }
}
