use jpeg_encoder::{ColorType, Encoder};

use crate::error::{Error, Result};

/// Quality used for previews
pub const PREVIEW_QUALITY: u8 = 85;

fn interleave(bands: &[Vec<u8>]) -> Vec<u8> {
    let len = bands.first().map(Vec::len).unwrap_or(0);
    let mut out = Vec::with_capacity(len * bands.len());
    for i in 0..len {
        for band in bands {
            out.push(band[i]);
        }
    }
    out
}

/// Encode one (gray) or three (RGB) 8-bit bands as a JPEG in memory
pub fn encode_jpeg(cols: usize, rows: usize, bands: &[Vec<u8>]) -> Result<Vec<u8>> {
    let (data, color) = match bands.len() {
        1 => (bands[0].clone(), ColorType::Luma),
        3 => (interleave(bands), ColorType::Rgb),
        n => {
            return Err(Error::Processing(format!(
                "JPEG previews need 1 or 3 bands, got {n}"
            )));
        }
    };
    if cols > u16::MAX as usize || rows > u16::MAX as usize {
        return Err(Error::InvalidArgument {
            arg: "jpeg size",
            value: format!("{cols}x{rows}"),
        });
    }
    let mut out = Vec::new();
    let encoder = Encoder::new(&mut out, PREVIEW_QUALITY);
    encoder
        .encode(&data, cols as u16, rows as u16, color)
        .map_err(Error::external)?;
    Ok(out)
}
