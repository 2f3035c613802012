//! Stable light IDs
//!
//! Hue clients cache light IDs and address lights by them afterwards, so the
//! ID must be a pure function of the device ID: same input, same output, in
//! every process. 32-bit FNV-1a rendered in decimal fits the integer-like IDs
//! real bridges hand out.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a over the raw bytes
pub fn fnv1a_32(data: &[u8]) -> u32 {
    data.iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        (hash ^ u32::from(b)).wrapping_mul(FNV_PRIME)
    })
}

/// Hue light ID for a device ID
pub fn stable_id(device_id: &str) -> String {
    fnv1a_32(device_id.as_bytes()).to_string()
}
