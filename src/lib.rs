//! Modal event-dispatch runtime for terminal UIs.
//!
//! Invariant: single output gate — rendered bytes reach the terminal only
//! through [`OutputBuffer::render_to`](core::output::OutputBuffer::render_to).
//!
//! # Public API Overview
//! - Register modes and subscribers through [`EventManager`] and
//!   [`ModeHandle`]; drive them with set/advance/stack/dispatch operations.
//! - Encode ANSI control bytes with the allocation-free `core::escape`
//!   codec, including the cursor-position report parser.
//! - Batch terminal writes in [`OutputBuffer`] and flush once per tick.
//! - Restore the terminal on crash/signal paths via `platform`.

pub mod config;
pub mod logging;

pub mod core;
pub mod platform;
pub mod runtime;

/// Escape codec: fixed controls, parameterized encoders, report parsing.
pub use crate::core::escape::{
    hex_color, move_to, parse_cursor_report, rgb_color, Control, CursorPos, EscapeSeq, Layer,
    COORD_MAX,
};

/// Batched terminal output.
pub use crate::core::output::{OutputBuffer, DEFAULT_CAPACITY};

/// Modal dispatch engine.
pub use crate::runtime::events::{Activation, EventKind, EventManager, LoopSignal, ModeHandle};

/// Environment configuration and the write-log sink.
pub use crate::config::EnvConfig;
pub use crate::logging::WriteLog;

/// Raw-fd helpers and crash restore (Unix).
#[cfg(unix)]
pub use crate::platform::fd::{query_cursor_position, write_all_fd};
#[cfg(unix)]
pub use crate::platform::restore::{
    install_signal_handlers, restore_terminal, SignalHookGuard, TtyWriter,
};
