//! Bounded accumulation of newline-terminated request lines.
use alloc::vec::Vec;

use heapless::Vec as HeaplessVec;
use zeroize::Zeroizing;

use crate::config::LINE_LIMIT;

#[derive(Debug, PartialEq, Eq)]
pub enum LineEvent {
    /// A complete, non-blank line without its terminator.
    Line(Zeroizing<Vec<u8>>),
    /// The current line exceeded the limit and was dropped.
    Overflow,
}

/// Collects bytes into lines of at most `N` bytes.
///
/// After an overflow the remainder of the offending line is skipped up to the next `\n`, so a
/// single oversized request produces exactly one [`LineEvent::Overflow`].
#[derive(Debug, Default)]
pub struct LineBuffer<const N: usize = LINE_LIMIT> {
    bytes: HeaplessVec<u8, N>,
    discarding: bool,
}

impl<const N: usize> LineBuffer<N> {
    pub fn new() -> Self {
        Self {
            bytes: HeaplessVec::new(),
            discarding: false,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn push(&mut self, byte: u8) -> Option<LineEvent> {
        if self.discarding {
            if byte == b'\n' {
                self.discarding = false;
            }
            return None;
        }

        match byte {
            b'\r' => None,
            b'\n' => {
                let blank = self.bytes.iter().all(u8::is_ascii_whitespace);
                let line = Zeroizing::new(self.bytes.to_vec());
                self.wipe();
                if blank { None } else { Some(LineEvent::Line(line)) }
            }
            _ => {
                if self.bytes.push(byte).is_err() {
                    log::warn!("request line exceeds {N} bytes, dropping it");
                    self.wipe();
                    self.discarding = true;
                    return Some(LineEvent::Overflow);
                }
                None
            }
        }
    }

    fn wipe(&mut self) {
        self.bytes.iter_mut().for_each(|byte| *byte = 0);
        self.bytes.clear();
    }
}
