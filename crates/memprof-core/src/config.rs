//! Build-time configuration.
//!
//! memprof reads no environment variables and no files: it is loaded into
//! arbitrary processes and must behave identically everywhere. The only knobs
//! are the constants below.

/// Maximum number of live allocations the registry tracks at once (`CAP`).
///
/// Raising it costs `16 * CAP` bytes of static memory and lengthens the linear
/// scan done under the registry lock on every free. Once more than this many
/// allocations are live, "Total freed" and "Currently allocated" stop being
/// trustworthy; "Total allocated" stays exact.
pub const MAX_TRACKED_ALLOCATIONS: usize = 1000;

/// Size of the stack buffer a single diagnostic line is formatted into.
/// Longer lines are truncated.
pub const DIAGNOSTIC_LINE_CAPACITY: usize = 256;
