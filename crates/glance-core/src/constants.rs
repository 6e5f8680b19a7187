/// Maximum accepted text payload, in bytes. The target display fits a few
/// short lines; anything longer is a malformed event, not content.
pub const MAX_TEXT_BYTES: usize = 512;

/// Maximum accepted bitmap edge, in pixels. Covers small monochrome panels
/// (SSD1306/e-paper class) with headroom.
pub const MAX_BITMAP_DIM: u16 = 512;

/// Tie-break rank for sources the policy does not mention. Highest possible
/// value, so an explicitly ranked source always wins the tie.
pub const SOURCE_RANK_DEFAULT: u32 = u32::MAX;
