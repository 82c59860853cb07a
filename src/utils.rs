//! Terminal helpers for the CLI

use std::io::{self, Read};

use nix::sys::termios::{self, LocalFlags, SetArg, SpecialCharacterIndices, Termios};
use tracing::debug;

/// Stdin switched to unbuffered, unechoed single-byte reads.
/// The previous mode is restored on drop.
pub struct RawTerminal {
    saved: Termios,
}

impl RawTerminal {
    /// Fails with `ENOTTY` when stdin is not a terminal.
    pub fn enable() -> io::Result<Self> {
        let stdin = io::stdin();
        let saved = termios::tcgetattr(&stdin)?;

        let mut raw = saved.clone();
        raw.local_flags.remove(LocalFlags::ICANON | LocalFlags::ECHO);
        raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
        termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw)?;

        Ok(Self { saved })
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        if let Err(e) = termios::tcsetattr(io::stdin(), SetArg::TCSADRAIN, &self.saved) {
            debug!("Failed to restore terminal mode: {}", e);
        }
    }
}

/// Block until one byte arrives on stdin. `None` at end of input.
///
/// Keys arrive without waiting for enter while a [`RawTerminal`] is held.
pub fn read_key() -> io::Result<Option<u8>> {
    let mut buf = [0u8; 1];
    loop {
        match io::stdin().lock().read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Block until `key` is read. Returns false if stdin ended first.
pub fn wait_for_key(key: u8) -> io::Result<bool> {
    while let Some(byte) = read_key()? {
        if byte == key {
            return Ok(true);
        }
    }
    Ok(false)
}
