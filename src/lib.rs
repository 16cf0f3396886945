#![doc(test(attr(deny(warnings))))]

//! Ledger Core keeps per-account entry ledgers with running balances that stay
//! correct under inserts, updates, and deletes anywhere in history, and
//! reconciles imported statement rows against them.

pub mod config;
pub mod core;
pub mod errors;
pub mod import;
pub mod ledger;
pub mod storage;
pub mod utils;

pub use crate::core::LedgerManager;
pub use errors::{LedgerError, Result};

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing and logs the build that is running.
///
/// `log_filter` is used when `RUST_LOG` is not set, typically
/// [`config::Config::log_filter`].
pub fn init(log_filter: Option<&str>) {
    INIT_TRACING.call_once(|| {
        utils::init_tracing(log_filter);
        let build = utils::build_info::current();
        tracing::info!(
            version = build.version,
            git = build.git_hash,
            status = build.git_status,
            built = build.timestamp,
            profile = build.profile,
            "Ledger Core tracing initialized."
        );
    });
}
