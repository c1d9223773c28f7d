// ============================================================================
// IMAGE FILTERS: separable Gaussian blur
// ============================================================================

use image::RgbaImage;
use rayon::prelude::*;

/// Normalised 1-D kernel truncated at ceil(3σ).
fn build_gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as usize;
    if radius == 0 {
        return vec![1.0];
    }
    let s2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..=radius * 2)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / s2).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Padding a buffer needs so a blur of `sigma` does not clip at its edges.
pub fn blur_padding(sigma: f32) -> u32 {
    if sigma <= 0.0 { 0 } else { (sigma * 3.0).ceil() as u32 }
}

/// Blur a tightly packed `w × h` RGBA buffer in place. Edges replicate.
pub fn gaussian_blur_rgba(data: &mut [u8], w: usize, h: usize, sigma: f32) {
    if sigma <= 0.0 || w == 0 || h == 0 {
        return;
    }
    debug_assert_eq!(data.len(), w * h * 4);
    let kernel = build_gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as isize;
    let src: Vec<f32> = data.iter().map(|&b| b as f32).collect();

    // Horizontal pass
    let mut horiz = vec![0.0f32; w * h * 4];
    horiz.par_chunks_mut(w * 4).enumerate().for_each(|(y, row_out)| {
        let row_in = &src[y * w * 4..(y + 1) * w * 4];
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = (x as isize + ki as isize - radius).clamp(0, w as isize - 1) as usize;
                for c in 0..4 {
                    acc[c] += row_in[sx * 4 + c] * kv;
                }
            }
            row_out[x * 4..x * 4 + 4].copy_from_slice(&acc);
        }
    });

    // Vertical pass, written straight back as bytes
    data.par_chunks_mut(w * 4).enumerate().for_each(|(y, row_out)| {
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = (y as isize + ki as isize - radius).clamp(0, h as isize - 1) as usize;
                let idx = (sy * w + x) * 4;
                for c in 0..4 {
                    acc[c] += horiz[idx + c] * kv;
                }
            }
            for c in 0..4 {
                row_out[x * 4 + c] = acc[c].round().clamp(0.0, 255.0) as u8;
            }
        }
    });
}

pub fn gaussian_blur(src: &RgbaImage, sigma: f32) -> RgbaImage {
    let mut out = src.clone();
    let (w, h) = (out.width() as usize, out.height() as usize);
    gaussian_blur_rgba(&mut out, w, h, sigma);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_kernel_sums_to_one() {
        let k = build_gaussian_kernel(2.4);
        assert_eq!(k.len(), 2 * 8 + 1);
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_zero_sigma_is_identity() {
        let mut img = RgbaImage::new(3, 3);
        img.put_pixel(1, 1, Rgba([200, 10, 10, 255]));
        assert_eq!(gaussian_blur(&img, 0.0), img);
    }

    #[test]
    fn test_blur_spreads_alpha() {
        let mut img = RgbaImage::new(21, 21);
        img.put_pixel(10, 10, Rgba([255, 255, 255, 255]));
        let out = gaussian_blur(&img, 1.5);
        assert!(out.get_pixel(10, 10)[3] < 255);
        assert!(out.get_pixel(11, 10)[3] > 0);
        assert_eq!(out.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_uniform_buffer_unchanged() {
        let img = RgbaImage::from_pixel(9, 7, Rgba([40, 80, 120, 200]));
        assert_eq!(gaussian_blur(&img, 2.0), img);
    }
}
