/// BGRA8 pixel buffer with an explicit row stride.
///
/// All pixel data is stored as interleaved B,G,R,A bytes. The stride is
/// the number of bytes per row and may exceed `width * 4` when the
/// decoder pads rows; row `y` occupies `bytes[y*stride .. y*stride + width*4]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
}

/// Preview passes subsample by this divisor...
pub const PREVIEW_DIVISOR: u32 = 4;
/// ...but never drop below this edge length (clamped to the source size).
pub const PREVIEW_MIN_DIM: u32 = 100;

impl PixelBuffer {
    /// Zeroed buffer with a tight stride (`width * 4`).
    pub fn new(width: u32, height: u32) -> Self {
        let stride = width * 4;
        Self {
            bytes: vec![0; (height * stride) as usize],
            width,
            height,
            stride,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>, width: u32, height: u32, stride: u32) -> anyhow::Result<Self> {
        anyhow::ensure!(
            stride >= width * 4,
            "stride {stride} too small for width {width}"
        );
        let expected = (height * stride) as usize;
        anyhow::ensure!(
            bytes.len() == expected,
            "expected {expected} bytes for {width}x{height} stride {stride}, got {}",
            bytes.len()
        );
        Ok(Self {
            bytes,
            width,
            height,
            stride,
        })
    }

    /// Build from tightly packed RGBA8 (the `image` crate's layout),
    /// swizzling into BGRA byte order.
    pub fn from_rgba8(rgba: &[u8], width: u32, height: u32) -> anyhow::Result<Self> {
        let expected = (width * height * 4) as usize;
        anyhow::ensure!(
            rgba.len() == expected,
            "expected {expected} RGBA bytes for {width}x{height}, got {}",
            rgba.len()
        );
        let mut bytes = Vec::with_capacity(expected);
        for px in rgba.chunks_exact(4) {
            bytes.push(px[2]);
            bytes.push(px[1]);
            bytes.push(px[0]);
            bytes.push(px[3]);
        }
        Ok(Self {
            bytes,
            width,
            height,
            stride: width * 4,
        })
    }

    /// Tightly packed RGBA8 copy (drops any row padding).
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity((self.width * self.height * 4) as usize);
        for y in 0..self.height {
            let row = &self.bytes[(y * self.stride) as usize..];
            for px in row[..(self.width * 4) as usize].chunks_exact(4) {
                out.push(px[2]);
                out.push(px[1]);
                out.push(px[0]);
                out.push(px[3]);
            }
        }
        out
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = (y * self.stride + x * 4) as usize;
        [
            self.bytes[idx],
            self.bytes[idx + 1],
            self.bytes[idx + 2],
            self.bytes[idx + 3],
        ]
    }

    /// Nearest-neighbor subsample for the interactive preview path.
    ///
    /// Dimensions are `source / PREVIEW_DIVISOR`, floored at
    /// `PREVIEW_MIN_DIM` (or the source size when smaller than that).
    pub fn downsample_preview(&self) -> Self {
        let pw = (self.width / PREVIEW_DIVISOR)
            .max(PREVIEW_MIN_DIM)
            .min(self.width);
        let ph = (self.height / PREVIEW_DIVISOR)
            .max(PREVIEW_MIN_DIM)
            .min(self.height);

        let mut out = PixelBuffer::new(pw, ph);
        for y in 0..ph {
            let src_y = (y * PREVIEW_DIVISOR).min(self.height - 1);
            let src_row = (src_y * self.stride) as usize;
            let dst_row = (y * out.stride) as usize;
            for x in 0..pw {
                let src_x = (x * PREVIEW_DIVISOR).min(self.width - 1);
                let s = src_row + (src_x * 4) as usize;
                let d = dst_row + (x * 4) as usize;
                out.bytes[d..d + 4].copy_from_slice(&self.bytes[s..s + 4]);
            }
        }
        out
    }
}
