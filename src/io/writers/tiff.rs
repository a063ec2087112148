use std::io::Cursor;

use tiff::encoder::{TiffEncoder, colortype};

use crate::error::{Error, Result};

/// Encode one (gray) or three (RGB) 8-bit bands as an uncompressed TIFF in memory
pub fn encode_tiff(cols: usize, rows: usize, bands: &[Vec<u8>]) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut cursor).map_err(Error::external)?;
        match bands.len() {
            1 => encoder
                .write_image::<colortype::Gray8>(cols as u32, rows as u32, &bands[0])
                .map_err(Error::external)?,
            3 => {
                let mut rgb = Vec::with_capacity(cols * rows * 3);
                for i in 0..cols * rows {
                    rgb.extend([bands[0][i], bands[1][i], bands[2][i]]);
                }
                encoder
                    .write_image::<colortype::RGB8>(cols as u32, rows as u32, &rgb)
                    .map_err(Error::external)?
            }
            n => {
                return Err(Error::Processing(format!(
                    "TIFF previews need 1 or 3 bands, got {n}"
                )));
            }
        }
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_gray_and_rgb_tiff() {
        let gray = encode_tiff(3, 2, &[vec![0, 1, 2, 3, 4, 5]]).unwrap();
        assert!(gray.starts_with(b"II") || gray.starts_with(b"MM"));
        let rgb = encode_tiff(1, 1, &[vec![1], vec![2], vec![3]]).unwrap();
        assert!(rgb.starts_with(&gray[..4]));
        assert!(encode_tiff(1, 1, &[]).is_err());
    }
}
