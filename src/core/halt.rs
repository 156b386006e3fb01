/*!
 * Kernel Halt
 * The single unrecoverable path, reserved for contract violations
 */

use std::fmt::Display;
use tracing::error;

/// Stop the kernel because a caller broke a contract.
///
/// Logs through `tracing` and panics with `"<subsystem>: <reason>"`. Expected
/// runtime states (an empty allocator, a bad config) never come through here.
#[cold]
#[track_caller]
pub fn halt(subsystem: &str, reason: impl Display) -> ! {
    let location = std::panic::Location::caller();
    error!(
        subsystem,
        %reason,
        file = location.file(),
        line = location.line(),
        "kernel panic"
    );
    panic!("{subsystem}: {reason}");
}
