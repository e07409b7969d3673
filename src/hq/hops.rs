// src/hq/hops.rs
// =============================================================================
// Hop depth travels to crawl HQ as a unary string in the `path` field:
// one 'L' per hop, so hop 3 is "LLL" and a seed is "".
// =============================================================================

pub const HOP_MARKER: char = 'L';

pub fn encode_hops(hop: u8) -> String {
    String::from(HOP_MARKER).repeat(hop as usize)
}

/// Counts markers; anything past u8::MAX is clamped.
pub fn decode_hops(path: &str) -> u8 {
    let count = path.chars().filter(|c| *c == HOP_MARKER).count();
    u8::try_from(count).unwrap_or(u8::MAX)
}
