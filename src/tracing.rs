//! Provide tracing, tailored to this program.
//!
//! At startup the program calls [`init`] once to install a subscriber.
//! The rest of the crate can include `use crate::tracing::prelude::*` for
//! convenient access to the `trace!()`, `debug!()`, `info!()`, `warn!()`,
//! and `error!()` macros.

use tracing_subscriber::filter::{EnvFilter, LevelFilter};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

/// Install the stdout subscriber.
///
/// The default level is INFO; the `debug` config flag lowers the floor to
/// DEBUG. `RUST_LOG` overrides both.
pub fn init(debug: bool) {
    let default = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}
