//! Exit code constants for the leasehold CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid config)
//! - 2: Store failure (store unreachable, lock target unresolvable)
//! - 3: Lock failure (engine already started, client mismatch)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments or invalid configuration.
pub const USER_ERROR: i32 = 1;

/// Store failure: the store could not be read or written, or the lock key could not be resolved.
pub const STORE_FAILURE: i32 = 2;

/// Lock failure: the engine was started twice or stopped by an unregistered client.
pub const LOCK_FAILURE: i32 = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [SUCCESS, USER_ERROR, STORE_FAILURE, LOCK_FAILURE];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }
}
