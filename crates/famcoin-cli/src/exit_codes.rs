//! Exit codes for the famcoin CLI.

pub const SUCCESS: i32 = 0;
pub const REQUEST_FAILED: i32 = 1; // API, network or timeout error
pub const CONFIG_ERROR: i32 = 2;
pub const AUTH_FAILED: i32 = 3; // Signed out or renewal failed
pub const INSUFFICIENT_BALANCE: i32 = 4; // Blocked locally before sending
