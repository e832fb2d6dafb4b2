// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command helper (C4): high-level keyboard actions encoded as paced byte
//! writes to a session, in the spirit of the nudge encoder's
//! `{bytes, delay_after}` steps.

use std::time::Duration;

use bytes::Bytes;

use crate::error::CoreResult;
use crate::session::PtySession;

/// Delay after sending a message, before the caller should expect the
/// agent to have started processing it.
pub const MESSAGE_DELAY: Duration = Duration::from_millis(1000);
/// Legacy fallback delay, kept for runtimes that proved reliable with a
/// shorter pause.
pub const MESSAGE_DELAY_LEGACY: Duration = Duration::from_millis(100);
/// Delay after sending any single key.
pub const KEY_DELAY: Duration = Duration::from_millis(200);
/// Delay after clearing the current command line.
pub const CLEAR_COMMAND_DELAY: Duration = Duration::from_millis(200);
/// Delay after setting an environment variable.
pub const ENV_VAR_DELAY: Duration = Duration::from_millis(200);

/// Named keys understood by [`send_key`]. Anything else is sent as its
/// literal UTF-8 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    CtrlC,
    CtrlU,
    CtrlL,
    CtrlD,
    Escape,
    Tab,
    Backspace,
    ArrowUp,
    ArrowDown,
    ArrowRight,
    ArrowLeft,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
}

impl Key {
    fn bytes(self) -> &'static [u8] {
        match self {
            Key::Enter => b"\r",
            Key::CtrlC => b"\x03",
            Key::CtrlU => b"\x15",
            Key::CtrlL => b"\x0c",
            Key::CtrlD => b"\x04",
            Key::Escape => b"\x1b",
            Key::Tab => b"\t",
            Key::Backspace => b"\x7f",
            Key::ArrowUp => b"\x1b[A",
            Key::ArrowDown => b"\x1b[B",
            Key::ArrowRight => b"\x1b[C",
            Key::ArrowLeft => b"\x1b[D",
            Key::Delete => b"\x1b[3~",
            Key::Home => b"\x1b[H",
            Key::End => b"\x1b[F",
            Key::PageUp => b"\x1b[5~",
            Key::PageDown => b"\x1b[6~",
        }
    }
}

/// A key the caller wants to send, either a named [`Key`] or literal bytes
/// for anything the table doesn't cover.
pub enum KeyInput {
    Named(Key),
    Literal(Vec<u8>),
}

impl From<Key> for KeyInput {
    fn from(k: Key) -> Self {
        KeyInput::Named(k)
    }
}

/// Type the message, press Enter, then pause for [`MESSAGE_DELAY`] so the
/// downstream interactive CLI has time to process the bracketed paste.
pub async fn send_message(session: &PtySession, text: &str) -> CoreResult<()> {
    let mut payload = text.as_bytes().to_vec();
    payload.push(b'\r');
    session.write(Bytes::from(payload)).await?;
    tokio::time::sleep(MESSAGE_DELAY).await;
    Ok(())
}

/// Send a single key (named or literal), then pause for [`KEY_DELAY`].
pub async fn send_key(session: &PtySession, key: impl Into<KeyInput>) -> CoreResult<()> {
    let bytes = match key.into() {
        KeyInput::Named(k) => k.bytes().to_vec(),
        KeyInput::Literal(b) => b,
    };
    session.write(Bytes::from(bytes)).await?;
    tokio::time::sleep(KEY_DELAY).await;
    Ok(())
}

/// Cancel whatever is on the current input line: Ctrl-C, pause, Ctrl-U,
/// pause. Two distinct control codes because some runtimes only honor one.
pub async fn clear_current_command_line(session: &PtySession) -> CoreResult<()> {
    session.write(Bytes::from_static(Key::CtrlC.bytes())).await?;
    tokio::time::sleep(CLEAR_COMMAND_DELAY).await;
    session.write(Bytes::from_static(Key::CtrlU.bytes())).await?;
    tokio::time::sleep(KEY_DELAY).await;
    Ok(())
}

/// Write a shell `export` statement for `key=value`, then pause.
pub async fn set_environment_variable(session: &PtySession, key: &str, value: &str) -> CoreResult<()> {
    let line = format!("export {key}=\"{value}\"\r");
    session.write(Bytes::from(line.into_bytes())).await?;
    tokio::time::sleep(ENV_VAR_DELAY).await;
    Ok(())
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
