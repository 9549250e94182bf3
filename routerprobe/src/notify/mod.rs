//! Best-effort delivery of session logs.
//!
//! A notifier failure is logged by the caller and never escalates; the
//! diagnostic verdict does not depend on delivery.

mod email;

pub use email::EmailNotifier;

use std::future::Future;

use crate::error::NotifyError;

/// Trait for log delivery at the end of a router's run.
pub trait Notifier: Send + Sync {
    /// Deliver the named session log.
    fn notify(
        &self,
        file_name: &str,
        content: &[u8],
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}
