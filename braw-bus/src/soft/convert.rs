use crate::format::{ResolutionScale, ResourceFormat};

const ALPHA_U8: u8 = u8::MAX;
const ALPHA_F32: f32 = 1.0;

fn to_u8(sample: u16) -> u8 {
    (sample >> 8) as u8
}

fn to_f32(sample: u16) -> f32 {
    sample as f32 / u16::MAX as f32
}

/// Subsamples `samples` (interleaved 16-bit RGB, `width` x `height`) by the
/// scale factor and lays the result out in `format`.
///
/// Returns the output width, height and pixel bytes.
pub fn process_frame(
    samples: &[u16],
    width: u32,
    height: u32,
    scale: ResolutionScale,
    format: ResourceFormat,
) -> (u32, u32, Vec<u8>) {
    let factor = scale.factor() as usize;
    let (out_width, out_height) = scale.apply(width, height);
    let (ow, oh) = (out_width as usize, out_height as usize);
    let pixels = ow * oh;

    let rgb_at = |x: usize, y: usize| {
        let at = ((y * factor) * width as usize + x * factor) * 3;
        [samples[at], samples[at + 1], samples[at + 2]]
    };

    let mut out = Vec::with_capacity(pixels * format.bytes_per_pixel());
    match format {
        ResourceFormat::RgbaU8 | ResourceFormat::BgraU8 => {
            for y in 0..oh {
                for x in 0..ow {
                    let [r, g, b] = rgb_at(x, y).map(to_u8);
                    if format == ResourceFormat::RgbaU8 {
                        out.extend_from_slice(&[r, g, b, ALPHA_U8]);
                    } else {
                        out.extend_from_slice(&[b, g, r, ALPHA_U8]);
                    }
                }
            }
        }
        ResourceFormat::RgbU16 => {
            for y in 0..oh {
                for x in 0..ow {
                    for sample in rgb_at(x, y) {
                        out.extend_from_slice(&sample.to_le_bytes());
                    }
                }
            }
        }
        ResourceFormat::RgbF32 | ResourceFormat::BgraF32 => {
            for y in 0..oh {
                for x in 0..ow {
                    let [r, g, b] = rgb_at(x, y).map(to_f32);
                    let bgra = [b, g, r, ALPHA_F32];
                    let rgb = [r, g, b];
                    let pixel: &[f32] = if format == ResourceFormat::RgbF32 {
                        &rgb
                    } else {
                        &bgra
                    };
                    for value in pixel {
                        out.extend_from_slice(&value.to_le_bytes());
                    }
                }
            }
        }
        ResourceFormat::RgbU16Planar | ResourceFormat::RgbF32Planar => {
            for channel in 0..3 {
                for y in 0..oh {
                    for x in 0..ow {
                        let sample = rgb_at(x, y)[channel];
                        if format == ResourceFormat::RgbU16Planar {
                            out.extend_from_slice(&sample.to_le_bytes());
                        } else {
                            out.extend_from_slice(&to_f32(sample).to_le_bytes());
                        }
                    }
                }
            }
        }
    }

    (out_width, out_height, out)
}
