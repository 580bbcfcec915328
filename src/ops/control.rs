//! Operator control channel.
//!
//! Single keystrokes on the controlling terminal steer a development run:
//! `q` or Ctrl-C quits, `m` restarts the host process. When stdin is not a
//! terminal only interrupt signals are honored.

use std::io::{self, IsTerminal, Write};
use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use tokio::sync::mpsc;

/// How often the key reader checks whether the run is still listening.
const KEY_POLL: Duration = Duration::from_millis(100);

/// A request from the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Quit,
    RestartHost,
}

/// Map a keystroke to a control request.
pub fn key_control(code: KeyCode, modifiers: KeyModifiers) -> Option<Control> {
    match code {
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Some(Control::Quit),
        KeyCode::Char('q') | KeyCode::Char('Q') => Some(Control::Quit),
        KeyCode::Char('m') | KeyCode::Char('M') => Some(Control::RestartHost),
        _ => None,
    }
}

/// Restores cooked terminal mode when dropped.
#[derive(Debug)]
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    pub fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(RawModeGuard { _private: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        // nothing left to do if the terminal is gone
        let _ = terminal::disable_raw_mode();
    }
}

/// Live control channel of a run.
#[derive(Debug)]
pub struct ControlChannel {
    pub receiver: mpsc::UnboundedReceiver<Control>,
    _raw_mode: Option<RawModeGuard>,
}

impl ControlChannel {
    /// Start listening for keystrokes and interrupt signals.
    ///
    /// Must be called from within a tokio runtime.
    pub fn listen() -> Self {
        let (tx, receiver) = mpsc::unbounded_channel();

        let raw_mode = if io::stdin().is_terminal() {
            match RawModeGuard::enable() {
                Ok(guard) => {
                    spawn_key_reader(tx.clone());
                    Some(guard)
                }
                Err(err) => {
                    tracing::debug!("keyboard controls unavailable: {}", err);
                    None
                }
            }
        } else {
            None
        };

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(Control::Quit);
            }
        });

        ControlChannel {
            receiver,
            _raw_mode: raw_mode,
        }
    }

    /// A channel fed only by `sender`, for driving runs programmatically.
    pub fn detached() -> (mpsc::UnboundedSender<Control>, Self) {
        let (tx, receiver) = mpsc::unbounded_channel();
        (
            tx,
            ControlChannel {
                receiver,
                _raw_mode: None,
            },
        )
    }

    pub async fn recv(&mut self) -> Option<Control> {
        self.receiver.recv().await
    }
}

fn spawn_key_reader(tx: mpsc::UnboundedSender<Control>) {
    thread::spawn(move || {
        while !tx.is_closed() {
            match event::poll(KEY_POLL) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(_) => break,
            }

            let key = match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => key,
                Ok(_) => continue,
                Err(_) => break,
            };

            if let Some(control) = key_control(key.code, key.modifiers) {
                if tx.send(control).is_err() {
                    break;
                }
            }
        }
    });
}

/// Log writer that keeps lines aligned while the terminal is in raw mode.
///
/// Raw mode disables the newline translation of the tty, so `\n` is
/// written as `\r\n` while it is active.
#[derive(Debug)]
pub struct TerminalWriter<W> {
    inner: W,
}

impl TerminalWriter<io::Stderr> {
    pub fn stderr() -> Self {
        TerminalWriter { inner: io::stderr() }
    }
}

impl<W: Write> TerminalWriter<W> {
    pub fn new(inner: W) -> Self {
        TerminalWriter { inner }
    }

    fn write_translated(&mut self, buf: &[u8], raw: bool) -> io::Result<usize> {
        if !raw {
            return self.inner.write(buf);
        }

        let mut start = 0;
        for (i, byte) in buf.iter().enumerate() {
            if *byte == b'\n' && (i == 0 || buf[i - 1] != b'\r') {
                self.inner.write_all(&buf[start..i])?;
                self.inner.write_all(b"\r\n")?;
                start = i + 1;
            }
        }
        self.inner.write_all(&buf[start..])?;
        Ok(buf.len())
    }
}

impl<W: Write> Write for TerminalWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let raw = terminal::is_raw_mode_enabled().unwrap_or(false);
        self.write_translated(buf, raw)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
