//! Modal dispatch runtime.

pub mod events;

pub use events::{Activation, EventKind, EventManager, LoopSignal, ModeHandle};
