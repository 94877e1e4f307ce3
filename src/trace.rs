//! Tracing hooks for debugging the ring.
//!
//! Enable with `--features tracing`. Without the feature every macro below
//! expands to nothing, so `push`/`pop` carry no logging cost.

/// Install a `tracing-subscriber` fmt layer filtered by `RUST_LOG`
/// (default `mpmc_ring=trace`).
///
/// Call this at the start of a test or benchmark. A second call is ignored.
/// Does nothing if the `tracing` feature is not enabled.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
   use tracing_subscriber::{fmt, prelude::*, EnvFilter};

   let filter =
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mpmc_ring=trace"));

   let _ = tracing_subscriber::registry()
      .with(
         fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_timer(fmt::time::uptime()),
      )
      .with(filter)
      .try_init();
}

#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, trace, warn};

#[cfg(not(feature = "tracing"))]
macro_rules! trace_noop {
   ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug_noop {
   ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! warn_noop {
   ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use debug_noop as debug;
#[cfg(not(feature = "tracing"))]
pub(crate) use trace_noop as trace;
#[cfg(not(feature = "tracing"))]
pub(crate) use warn_noop as warn;
