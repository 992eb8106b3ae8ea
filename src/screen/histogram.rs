use image::RgbaImage;

pub const HISTOGRAM_BINS: usize = 64;

/// Normalized luminance histogram of a frame. Bins sum to 1.0 for any
/// non-empty image.
pub fn luminance_histogram(frame: &RgbaImage) -> [f64; HISTOGRAM_BINS] {
    let mut bins = [0.0f64; HISTOGRAM_BINS];
    let pixel_count = (frame.width() as u64 * frame.height() as u64) as f64;
    if pixel_count == 0.0 {
        return bins;
    }

    for pixel in frame.pixels() {
        let [r, g, b, _] = pixel.0;
        // Rec. 601 luma.
        let luma = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
        let bin = ((luma as usize) * HISTOGRAM_BINS / 256).min(HISTOGRAM_BINS - 1);
        bins[bin] += 1.0;
    }

    for bin in bins.iter_mut() {
        *bin /= pixel_count;
    }
    bins
}

/// Pearson correlation between two histograms, in [-1, 1]. Two flat
/// histograms (zero variance on both sides) correlate perfectly.
pub fn correlation(a: &[f64; HISTOGRAM_BINS], b: &[f64; HISTOGRAM_BINS]) -> f64 {
    let n = HISTOGRAM_BINS as f64;
    let mean_a: f64 = a.iter().sum::<f64>() / n;
    let mean_b: f64 = b.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..HISTOGRAM_BINS {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if denom < f64::EPSILON {
        if var_a < f64::EPSILON && var_b < f64::EPSILON {
            return 1.0;
        }
        return 0.0;
    }
    cov / denom
}
