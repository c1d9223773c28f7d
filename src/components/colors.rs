use image::RgbaImage;

// ============================================================================
// Hex parsing / formatting
// ============================================================================

/// Parse `#rgb`, `#rrggbb` or the same without `#`.
pub fn parse_hex(hex: &str) -> Option<[u8; 3]> {
    let hex = hex.trim().trim_start_matches('#');
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => return None,
    };
    let channel = |i: usize| u8::from_str_radix(expanded.get(i..i + 2)?, 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

/// Lowercase `#rrggbb`.
pub fn to_hex(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

// -- Colour-space conversion -------------------------------------

/// `(hue°, saturation %, lightness %)`, each rounded to an integer.
pub fn rgb_to_hsl(rgb: [u8; 3]) -> (i32, i32, i32) {
    let r = rgb[0] as f32 / 255.0;
    let g = rgb[1] as f32 / 255.0;
    let b = rgb[2] as f32 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let d = max - min;
    let l = (max + min) / 2.0;

    let (h, s) = if d == 0.0 {
        (0.0, 0.0)
    } else {
        let s = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };
        let h = if max == r {
            ((g - b) / d + if g < b { 6.0 } else { 0.0 }) / 6.0
        } else if max == g {
            ((b - r) / d + 2.0) / 6.0
        } else {
            ((r - g) / d + 4.0) / 6.0
        };
        (h, s)
    };
    ((h * 360.0).round() as i32, (s * 100.0).round() as i32, (l * 100.0).round() as i32)
}

// ============================================================================
// Colour naming: sent to the backend as `hair_color`
// ============================================================================

pub fn color_name(rgb: [u8; 3]) -> String {
    let (hue, sat, light) = rgb_to_hsl(rgb);

    if rgb == [0, 0, 0] {
        return "Black".into();
    }
    if rgb == [255, 255, 255] {
        return "White".into();
    }
    if sat < 5 {
        let gray = match light {
            l if l < 10 => "Nearly Black",
            l if l > 95 => "Nearly White",
            l if l < 30 => "Charcoal",
            l if l < 50 => "Dark Gray",
            l if l < 70 => "Gray",
            l if l < 85 => "Light Gray",
            _ => "Silver",
        };
        return gray.into();
    }

    if (20..=50).contains(&hue) && (20..=60).contains(&sat) && (20..=45).contains(&light) {
        let brown = if light < 30 {
            "Dark Brown"
        } else if light < 40 {
            "Brown"
        } else {
            "Light Brown"
        };
        return brown.into();
    }

    if (20..=60).contains(&hue) {
        if (15..=40).contains(&sat) && (75..=90).contains(&light) {
            return "Blonde".into();
        }
        if (40..=70).contains(&sat) && (60..=80).contains(&light) {
            return "Golden".into();
        }
        if (20..=50).contains(&sat) && (30..=50).contains(&light) {
            return "Auburn".into();
        }
    }

    let shade = |dark: &str, light_name: &str, mid: &str, light_at: i32| -> String {
        if light < 30 {
            dark.into()
        } else if light >= light_at {
            light_name.into()
        } else {
            mid.into()
        }
    };
    if (hue >= 345 || hue <= 15) && sat >= 60 {
        return shade("Dark Red", "Pink", "Red", 60);
    }
    if (90..=150).contains(&hue) && sat >= 50 {
        return shade("Dark Green", "Mint", "Green", 70);
    }
    if (200..=240).contains(&hue) && sat >= 50 {
        return shade("Navy", "Sky Blue", "Blue", 70);
    }
    if (270..=300).contains(&hue) && sat >= 40 {
        return shade("Deep Purple", "Lavender", "Purple", 70);
    }

    descriptive_name(hue, sat, light)
}

fn descriptive_name(hue: i32, sat: i32, light: i32) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(3);

    match light {
        l if l < 10 => parts.push("Very Dark"),
        l if l < 25 => parts.push("Dark"),
        l if (75..90).contains(&l) => parts.push("Light"),
        l if l >= 90 => parts.push("Very Light"),
        _ => {}
    }

    if (15..=85).contains(&light) {
        if sat < 10 {
            parts.push("Grayish");
        } else if sat < 30 {
            parts.push("Muted");
        } else if sat >= 70 {
            parts.push("Bright");
        }
    }

    parts.push(if sat < 10 {
        "Gray"
    } else {
        match hue {
            0..15 => "Red",
            15..45 => "Orange",
            45..75 => "Yellow",
            75..135 => "Green",
            135..195 => "Cyan",
            195..255 => "Blue",
            255..315 => "Purple",
            315..345 => "Magenta",
            _ => "Red",
        }
    });

    parts.join(" ")
}

/// [`color_name`] for a hex string; unparsable input names itself unknown.
pub fn color_name_hex(hex: &str) -> String {
    parse_hex(hex).map_or_else(|| "Unknown Color".to_string(), color_name)
}

// ============================================================================
// Sampling from the photo
// ============================================================================

pub const PALETTE_GRID: u32 = 10;
pub const MAX_PALETTE_COLORS: usize = 12;

/// Unique colors sampled on a coarse grid, first-seen order.
///
/// The grid step is the larger of `width/10` and `height/10` (at least 1);
/// sampling starts one step in from the top-left, column by column.
pub fn extract_palette(img: &RgbaImage) -> Vec<String> {
    let (w, h) = img.dimensions();
    let step = (w / PALETTE_GRID).max(h / PALETTE_GRID).max(1);
    let mut colors: Vec<String> = Vec::new();

    let mut x = step;
    while x < w {
        let mut y = step;
        while y < h {
            let p = img.get_pixel(x, y).0;
            let hex = to_hex([p[0], p[1], p[2]]);
            if !colors.contains(&hex) {
                colors.push(hex);
                if colors.len() == MAX_PALETTE_COLORS {
                    return colors;
                }
            }
            y += step;
        }
        x += step;
    }
    colors
}

/// Hex color of the pixel under `(x, y)`; `None` outside the image.
pub fn color_at(img: &RgbaImage, x: u32, y: u32) -> Option<String> {
    if x >= img.width() || y >= img.height() {
        return None;
    }
    let p = img.get_pixel(x, y).0;
    Some(to_hex([p[0], p[1], p[2]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_parse_hex_forms() {
        assert_eq!(parse_hex("#6F4E37"), Some([0x6f, 0x4e, 0x37]));
        assert_eq!(parse_hex("abc"), Some([0xaa, 0xbb, 0xcc]));
        assert_eq!(parse_hex("#12345"), None);
        assert_eq!(parse_hex("#zzzzzz"), None);
        assert_eq!(to_hex([0x6f, 0x4e, 0x37]), "#6f4e37");
    }

    #[test]
    fn test_special_names() {
        assert_eq!(color_name([0, 0, 0]), "Black");
        assert_eq!(color_name([255, 255, 255]), "White");
        assert_eq!(color_name([128, 128, 128]), "Gray");
        assert_eq!(color_name([20, 20, 20]), "Nearly Black");
        assert_eq!(color_name([60, 60, 60]), "Charcoal");
    }

    #[test]
    fn test_hair_names() {
        // #654321: hue 30, sat 51, light 26
        assert_eq!(color_name([0x65, 0x43, 0x21]), "Dark Brown");
        // #6F4E37: hue 25, sat 34, light 33
        assert_eq!(color_name([0x6f, 0x4e, 0x37]), "Brown");
        // #F0E2B6: hue 46, sat 66, light 83 -> not blonde, descriptive
        assert_eq!(color_name([0xf0, 0xe2, 0xb6]), "Light Yellow");
    }

    #[test]
    fn test_bright_colors() {
        assert_eq!(color_name([255, 0, 0]), "Red");
        assert_eq!(color_name([0, 0, 255]), "Blue");
        assert_eq!(color_name([0, 0, 100]), "Navy");
    }

    #[test]
    fn test_unknown_hex() {
        assert_eq!(color_name_hex("not a color"), "Unknown Color");
        assert_eq!(color_name_hex("#000"), "Black");
    }

    #[test]
    fn test_palette_limits_and_order() {
        let img = RgbaImage::from_fn(100, 100, |x, y| Rgba([x as u8, y as u8, 0, 255]));
        let palette = extract_palette(&img);
        assert_eq!(palette.len(), MAX_PALETTE_COLORS);
        assert_eq!(palette[0], "#0a0a00");
        assert_eq!(palette[1], "#0a1400");
    }

    #[test]
    fn test_palette_dedups() {
        let img = RgbaImage::from_pixel(50, 50, Rgba([1, 2, 3, 255]));
        assert_eq!(extract_palette(&img), vec!["#010203".to_string()]);
    }

    #[test]
    fn test_tiny_image_does_not_spin() {
        let img = RgbaImage::from_pixel(3, 3, Rgba([9, 9, 9, 255]));
        assert_eq!(extract_palette(&img).len(), 1);
    }

    #[test]
    fn test_color_at_bounds() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 16, 255]));
        assert_eq!(color_at(&img, 3, 3).as_deref(), Some("#ff0010"));
        assert_eq!(color_at(&img, 4, 0), None);
    }
}
