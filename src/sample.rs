//! Input images: the built-in coins sample and grayscale files.

use crate::arrays::Image;
use crate::error::Result;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use static_init::dynamic;
use std::path::Path;

/// Width of the coins sample.
pub const COINS_WIDTH: usize = 384;
/// Height of the coins sample.
pub const COINS_HEIGHT: usize = 303;

const COIN_ROWS: usize = 4;
const COIN_COLUMNS: usize = 6;
const SEED: u64 = 0x636f_696e_73;

#[dynamic(lazy)]
static COINS: Image = generate_coins();

/// Grayscale sample of 24 coins on a textured background, 303 rows by 384 columns.
///
/// The picture is generated deterministically, so every benchmark process sees identical pixels.
/// Intensities are quantized to 8 bits like a loaded photo.
pub fn coins() -> Image {
    (*COINS).clone()
}

fn generate_coins() -> Image {
    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let cell_w = COINS_WIDTH as f64 / COIN_COLUMNS as f64;
    let cell_h = COINS_HEIGHT as f64 / COIN_ROWS as f64;
    // (center x, center y, radius, brightness, ring radius)
    let coins: Vec<(f64, f64, f64, f64, f64)> = (0..COIN_ROWS)
        .flat_map(|r| (0..COIN_COLUMNS).map(move |c| (r, c)))
        .map(|(r, c)| {
            let radius = rng.gen_range(0.30..0.40) * cell_w.min(cell_h);
            let cx = (c as f64 + 0.5) * cell_w + rng.gen_range(-3.0..3.0);
            let cy = (r as f64 + 0.5) * cell_h + rng.gen_range(-3.0..3.0);
            let brightness = rng.gen_range(0.55..0.85);
            let ring = radius * rng.gen_range(0.55..0.75);
            (cx, cy, radius, brightness, ring)
        })
        .collect();
    let noise: Vec<f64> = (0..COINS_WIDTH * COINS_HEIGHT)
        .map(|_| rng.gen_range(-0.03..0.03))
        .collect();
    Image::from_fn(COINS_WIDTH, COINS_HEIGHT, |x, y| {
        let (xf, yf) = (x as f64, y as f64);
        let mut value = 0.25 + 0.1 * (xf / COINS_WIDTH as f64) - 0.05 * (yf / COINS_HEIGHT as f64);
        for (cx, cy, radius, brightness, ring) in &coins {
            let d = (xf - cx).hypot(yf - cy);
            if d <= *radius {
                // darker rim and an embossed ring inside the coin
                let rim = ((radius - d) / 2.0).min(1.0);
                let emboss = if (d - ring).abs() < 1.5 { -0.15 } else { 0.0 };
                value = value * (1.0 - rim) + (brightness + emboss) * rim;
                break;
            }
        }
        let v = (value + noise[y * COINS_WIDTH + x]).clamp(0.0, 1.0);
        (v * 255.0).round() / 255.0
    })
}

/// Loads any image the `image` crate can decode and converts it to grayscale.
pub fn load_grayscale(path: &Path) -> Result<Image> {
    let dimg = image::open(path)?;
    Ok(Image::from_luma8(&dimg.to_luma8()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::ImageShape;

    #[test]
    fn coins_has_reference_shape() {
        assert_eq!(coins().shape(), ImageShape::new(303, 384));
    }

    #[test]
    fn coins_is_deterministic_and_quantized() {
        let a = generate_coins();
        let b = coins();
        assert!(a.data.iter().zip(b.data.iter()).all(|(x, y)| x == y));
        assert!(a
            .data
            .iter()
            .all(|v| (0.0..=1.0).contains(v) && ((v * 255.0).round() - v * 255.0).abs() < 1e-9));
    }

    #[test]
    fn coins_are_brighter_than_background() {
        let image = coins();
        let corner = image[(2, 2)];
        let center_of_first_coin = image[(32, 38)];
        assert!(center_of_first_coin > corner + 0.2);
    }

    #[test]
    fn load_grayscale_reads_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        let gray = image::GrayImage::from_fn(8, 5, |x, y| image::Luma([(x * 30 + y) as u8]));
        gray.save(&path).unwrap();
        let image = load_grayscale(&path).unwrap();
        assert_eq!(image.shape(), ImageShape::new(5, 8));
        assert_eq!(image.to_luma8().as_raw(), gray.as_raw());
    }
}
