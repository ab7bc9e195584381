pub const SUCCESS: i32 = 0;
/// Socket or stream failure while running
pub const TRANSPORT_ERROR: i32 = 1;
/// Invalid arguments or configuration file
pub const CONFIG_ERROR: i32 = 2;
