//! Board identifier lookup.
//!
//! Maps the numeric board identifier the bootloader reports to the hardware
//! name printed on the box. Purely informational; the upload path only ever
//! compares the numbers.

/// Known board identifiers.
const BOARDS: &[(u32, &str)] = &[
    (5, "FMUv1"),
    (9, "FMUv2 (Pixhawk)"),
    (11, "FMUv3 (Pixhawk 2)"),
    (20, "FMUv4 (Pixracer)"),
    (50, "FMUv5"),
];

/// Look up the hardware name for a board identifier.
pub fn board_name(board_id: u32) -> Option<&'static str> {
    BOARDS
        .iter()
        .find(|(id, _)| *id == board_id)
        .map(|(_, name)| *name)
}
