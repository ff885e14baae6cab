//! Internal logging bootstrap for Sjoin.
//!
//! This module initializes the tracing configuration at startup when the
//! `setup_tracing` feature is enabled. The behavior is controlled by the
//! `DEBUG_SJOIN` environment variable. If `DEBUG_SJOIN` is not set or is set
//! to a falsy value ("0", "false", or empty), logging remains disabled.
//! Otherwise a subscriber with a maximum level of DEBUG is installed.

use ctor::ctor;
use tracing::Level;

#[ctor]
fn set_debug_level() {
    // If DEBUG_SJOIN is not set or set to a falsy value, leave logging off.
    if std::env::var("DEBUG_SJOIN").map_or(true, |v| v == "0" || v == "false" || v.is_empty()) {
        // Logging macros stay silent without a subscriber.
    } else {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .init();
    }
}
