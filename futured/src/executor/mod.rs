//! Execution substrate adapters.
//!
//! Each adapter binds a unit of work to one scheduling model and hands back
//! the same [`Handle`](crate::handle::Handle) contract:
//!
//! - [`Threaded`] — parallel OS threads sharing memory; work is a closure.
//! - [`Processed`] — parallel OS processes with isolated memory; work is a
//!   [`CmdSpec`](crate::command::CmdSpec), since everything crossing the
//!   boundary must be spelled out explicitly.
//! - [`Local`] — single-threaded cooperative scheduling; work is a future,
//!   suspension happens only at its own await points.
//!
//! Other substrates (a remote cluster, say) plug in at the same seam: spawn
//! however you like, fulfill a one-shot channel, wrap the receiver in a
//! `Handle`. Selection is by construction, never by inheritance.
//!
//! All adapters share the release contract: `submit` never blocks, `close`
//! releases the adapter exactly once, and submitting after close fails with
//! [`Error::ClosedExecutor`](crate::error::Error::ClosedExecutor).

mod local;
mod processed;
mod threaded;

pub use local::{BlockingIter, Local};
pub use processed::Processed;
pub use threaded::Threaded;

use std::any::Any;

/// Renders a panic payload for [`Error::Execution`](crate::error::Error::Execution).
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "opaque panic payload".to_string())
}
