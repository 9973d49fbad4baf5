//! Exit codes for the `sigverdict` binary.
//! These codes are part of the public contract.

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_NOT_FULLY_VALID: i32 = 1; // Verdict not fully valid, operation failed, or nothing found
pub const EXIT_ERROR: i32 = 2; // Unreadable input, bad config
pub const EXIT_PARTIAL_FAILURE: i32 = 3; // Batch finished with some keys failed or cancelled
pub const EXIT_NETWORK_ERROR: i32 = 5; // Timeout, unknown server, connection failure
// 6: keyserver refused the request, passed through from KeyServerError::exit_code
