/// Category color utilities
///
/// This module handles the header band colors of the catalog:
/// - A fixed palette of dark, print-friendly colors
/// - Deterministic mapping of a category name onto the palette
/// - Hex parsing for colors that come from settings

/// An 8-bit sRGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Swatch {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Swatch {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` (the leading `#` is optional)
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Channels scaled to 0.0..=1.0, the form PDF color operators take
    pub fn to_unit(self) -> (f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        )
    }
}

/// Header band palette
pub const CATEGORY_PALETTE: [Swatch; 10] = [
    Swatch::rgb(0x2E, 0x40, 0x53),
    Swatch::rgb(0x1A, 0x52, 0x76),
    Swatch::rgb(0x7D, 0x3C, 0x98),
    Swatch::rgb(0x19, 0x6F, 0x3D),
    Swatch::rgb(0x94, 0x31, 0x26),
    Swatch::rgb(0x9A, 0x7D, 0x0A),
    Swatch::rgb(0x6C, 0x34, 0x83),
    Swatch::rgb(0x1B, 0x4F, 0x72),
    Swatch::rgb(0x78, 0x28, 0x1F),
    Swatch::rgb(0x4A, 0x23, 0x5A),
];

/// Color used for author group headers
pub const AUTHOR_COLOR: Swatch = CATEGORY_PALETTE[0];

/// Rolling 31-multiplier hash over the code points of `name`, truncated to 32 bits
pub fn category_hash(name: &str) -> u32 {
    name.chars()
        .fold(0u32, |hash, c| hash.wrapping_mul(31).wrapping_add(c as u32))
}

/// Map a category name onto the palette
///
/// Same name, same color, in every run. Different names may share a color.
pub fn color_for_category(name: &str) -> Swatch {
    CATEGORY_PALETTE[category_hash(name) as usize % CATEGORY_PALETTE.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_matches_reference_values() {
        assert_eq!(category_hash(""), 0);
        assert_eq!(category_hash("A"), 65);
        // 65 * 31 + 66
        assert_eq!(category_hash("AB"), 2081);
    }

    #[test]
    fn test_hash_wraps_at_32_bits() {
        let long = "Non-Fiction > History of the Mediterranean World".repeat(4);
        let expected = long
            .chars()
            .fold(0u64, |h, c| (h * 31 + c as u64) & 0xFFFF_FFFF);
        assert_eq!(category_hash(&long) as u64, expected);
    }

    #[test]
    fn test_color_is_stable() {
        let first = color_for_category("Fiction");
        for _ in 0..10 {
            assert_eq!(color_for_category("Fiction"), first);
        }
        assert_eq!(color_for_category("A"), CATEGORY_PALETTE[5]);
    }

    #[test]
    fn test_hex_round_trip_and_rejects_garbage() {
        let swatch = Swatch::from_hex("#7D3C98").unwrap();
        assert_eq!(swatch, CATEGORY_PALETTE[2]);
        assert_eq!(swatch.to_hex(), "#7D3C98");
        assert_eq!(Swatch::from_hex("f0f0f0"), Some(Swatch::rgb(0xF0, 0xF0, 0xF0)));
        assert!(Swatch::from_hex("#12345").is_none());
        assert!(Swatch::from_hex("#GG0000").is_none());
    }

    #[test]
    fn test_unit_channels() {
        let (r, g, b) = Swatch::rgb(255, 0, 51).to_unit();
        assert_eq!(r, 1.0);
        assert_eq!(g, 0.0);
        assert!((b - 0.2).abs() < 1e-6);
    }
}
