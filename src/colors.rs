/// Accent palette as presented by renderers. Index 0 is the reserved neutral
/// bucket for achromatic or unspecified colors.
pub const PALETTE: [&str; 13] = [
    "gray",
    "red",
    "orange",
    "yellow",
    "lime",
    "green",
    "mint",
    "teal",
    "blue",
    "purple",
    "lavender",
    "pink",
    "blush",
];

/// Hue of an identifying string in degrees [0, 360), or -1.0 for achromatic.
///
/// A strict 7-character `#RRGGBB` value maps through the standard RGB->HSL hue
/// branches; anything else hashes deterministically off the sum of its
/// character codes so arbitrary names get a stable pseudo-hue.
pub fn hue(input: &str) -> f64 {
    let Some([r, g, b]) = parse_hex_color(input) else {
        // u64 keeps arbitrarily long high-codepoint input from overflowing.
        let sum: u64 = input.chars().map(|ch| u64::from(ch as u32)).sum();
        return (sum % 360) as f64;
    };

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    if max == min {
        return -1.0;
    }

    let raw = if max == r {
        (g - b) / (max - min)
    } else if max == g {
        2.0 + (b - r) / (max - min)
    } else {
        4.0 + (r - g) / (max - min)
    };
    ((raw + 6.0) % 6.0) * 60.0
}

/// Discretizes a hue into a palette index. -1.0 lands in the neutral bucket;
/// everything else divides the circle into `palette_size - 1` steps, with
/// exact half-step values rounding up into the next bucket.
pub fn bucket(hue: f64, palette_size: usize) -> usize {
    if hue < 0.0 {
        return 0;
    }
    let steps = palette_size.saturating_sub(1).max(1);
    let step = 360.0 / steps as f64;
    ((hue + step / 2.0) / step).floor() as usize % steps + 1
}

fn parse_hex_color(input: &str) -> Option<[f64; 3]> {
    let hex = input.strip_prefix('#')?;
    if hex.len() != 6 || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16)
            .map(|value| f64::from(value) / 255.0)
            .ok()
    };
    Some([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

#[cfg(test)]
mod tests {
    use super::{bucket, hue, PALETTE};

    #[test]
    fn primary_hex_colors_hit_expected_hues() {
        assert_eq!(hue("#FF0000"), 0.0);
        assert_eq!(hue("#00FF00"), 120.0);
        assert_eq!(hue("#0000FF"), 240.0);
    }

    #[test]
    fn achromatic_hex_is_negative_one() {
        assert_eq!(hue("#000000"), -1.0);
        assert_eq!(hue("#AAAAAA"), -1.0);
        assert_eq!(hue("#FFFFFF"), -1.0);
    }

    #[test]
    fn hex_hues_stay_in_range() {
        for value in ["#1E90FF", "#551BDF", "#FE0120", "#7FFF00", "#123456"] {
            let h = hue(value);
            assert!((0.0..360.0).contains(&h), "{value} gave hue {h}");
        }
    }

    #[test]
    fn plain_names_hash_deterministically() {
        // 'A' + 'B' = 131.
        assert_eq!(hue("AB"), 131.0);
        assert_eq!(hue("drayux"), hue("drayux"));
        let h = hue("drayux");
        assert!((0.0..360.0).contains(&h));
    }

    #[test]
    fn long_high_codepoint_names_hash_without_overflow() {
        let name = "\u{10FFFF}".repeat(10_000);
        let h = hue(&name);
        assert!((0.0..360.0).contains(&h));
    }

    #[test]
    fn invalid_hex_falls_back_to_name_hash() {
        // Not a valid color, so it hashes like any other string.
        assert!(hue("#GGGGGG") >= 0.0);
        assert!(hue("#12345") >= 0.0);
    }

    #[test]
    fn neutral_bucket_is_reserved() {
        assert_eq!(bucket(-1.0, PALETTE.len()), 0);
    }

    #[test]
    fn buckets_are_stable_and_wrap() {
        assert_eq!(bucket(0.0, PALETTE.len()), 1);
        assert_eq!(bucket(0.0, PALETTE.len()), 1);
        // The last half-step before 360 wraps back onto the first chromatic bucket.
        assert_eq!(bucket(350.0, PALETTE.len()), 1);
    }

    #[test]
    fn exact_half_step_rounds_up() {
        // With 12 steps of 30 degrees, hue 15 sits exactly between buckets 1 and 2.
        assert_eq!(bucket(15.0, PALETTE.len()), 2);
        assert_eq!(bucket(14.9, PALETTE.len()), 1);
    }
}
