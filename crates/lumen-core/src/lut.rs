use std::path::Path;

use anyhow::{Context, Result, bail, ensure};
use tracing::debug;

/// A 3D color lookup table of `size^3` RGB float triples.
///
/// Indexing is `(b_idx * N*N + g_idx * N + r_idx) * 3`, matching the
/// `.cube` file ordering (red varies fastest). Immutable once loaded and
/// shared by reference across processing passes.
#[derive(Clone, Debug, PartialEq)]
pub struct CubeLut {
    pub size: u32,
    pub data: Vec<f32>,
    pub domain_min: [f32; 3],
    pub domain_max: [f32; 3],
    pub title: Option<String>,
}

impl CubeLut {
    /// Number of floats a table of this size must hold.
    pub fn expected_len(size: u32) -> usize {
        (size as usize).pow(3) * 3
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.size > 0, "LUT size must be positive");
        ensure!(
            self.data.len() == Self::expected_len(self.size),
            "LUT data length {} does not match size {} (expected {})",
            self.data.len(),
            self.size,
            Self::expected_len(self.size)
        );
        Ok(())
    }

    /// Nearest-neighbor sample for normalized channel values in [0, 1].
    ///
    /// Round-down indexing `(c * (N-1))` clamped to the table — no
    /// trilinear interpolation; nearest-neighbor is the defined behavior.
    #[inline]
    pub fn sample_nearest(&self, r: f32, g: f32, b: f32) -> [f32; 3] {
        let n = self.size as f32;
        let max_idx = self.size - 1;
        let r_idx = ((r.clamp(0.0, 1.0) * (n - 1.0)) as u32).min(max_idx);
        let g_idx = ((g.clamp(0.0, 1.0) * (n - 1.0)) as u32).min(max_idx);
        let b_idx = ((b.clamp(0.0, 1.0) * (n - 1.0)) as u32).min(max_idx);

        let idx = ((b_idx * self.size * self.size + g_idx * self.size + r_idx) * 3) as usize;
        [
            self.data[idx].clamp(0.0, 1.0),
            self.data[idx + 1].clamp(0.0, 1.0),
            self.data[idx + 2].clamp(0.0, 1.0),
        ]
    }

    /// Parse the `.cube` text format: TITLE / LUT_3D_SIZE / DOMAIN_MIN /
    /// DOMAIN_MAX headers, `#` comments, then whitespace-separated float
    /// triples.
    pub fn parse(text: &str) -> Result<Self> {
        let mut size: Option<u32> = None;
        let mut title = None;
        let mut domain_min = [0.0_f32; 3];
        let mut domain_max = [1.0_f32; 3];
        let mut data = Vec::new();

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let upper = line.to_ascii_uppercase();
            if upper.starts_with("TITLE") {
                if let (Some(start), Some(end)) = (line.find('"'), line.rfind('"'))
                    && end > start
                {
                    title = Some(line[start + 1..end].to_string());
                }
            } else if upper.starts_with("LUT_3D_SIZE") {
                let value = line
                    .split_whitespace()
                    .nth(1)
                    .context("LUT_3D_SIZE missing a value")?;
                size = Some(
                    value
                        .parse()
                        .with_context(|| format!("invalid LUT_3D_SIZE `{value}`"))?,
                );
            } else if upper.starts_with("DOMAIN_MIN") {
                domain_min = parse_triple(line, lineno)?;
            } else if upper.starts_with("DOMAIN_MAX") {
                domain_max = parse_triple(line, lineno)?;
            } else {
                let mut parts = line.split_whitespace();
                for _ in 0..3 {
                    let part = parts
                        .next()
                        .with_context(|| format!("line {}: expected an RGB triple", lineno + 1))?;
                    let v: f32 = part
                        .parse()
                        .with_context(|| format!("line {}: invalid float `{part}`", lineno + 1))?;
                    data.push(v);
                }
            }
        }

        let Some(size) = size else {
            bail!("missing LUT_3D_SIZE header");
        };

        let lut = Self {
            size,
            data,
            domain_min,
            domain_max,
            title,
        };
        lut.validate()?;
        debug!(size, title = ?lut.title, "parsed cube LUT");
        Ok(lut)
    }
}

/// Load and parse a `.cube` file from disk.
pub fn load_cube(path: &Path) -> Result<CubeLut> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read LUT file {}", path.display()))?;
    CubeLut::parse(&text).with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
impl CubeLut {
    /// Identity table: every lattice point maps to its own coordinate.
    pub(crate) fn identity(size: u32) -> Self {
        let n = size as usize;
        let mut data = Vec::with_capacity(n * n * n * 3);
        for b in 0..n {
            for g in 0..n {
                for r in 0..n {
                    data.push(r as f32 / (n - 1) as f32);
                    data.push(g as f32 / (n - 1) as f32);
                    data.push(b as f32 / (n - 1) as f32);
                }
            }
        }
        Self {
            size,
            data,
            domain_min: [0.0; 3],
            domain_max: [1.0; 3],
            title: None,
        }
    }
}

fn parse_triple(line: &str, lineno: usize) -> Result<[f32; 3]> {
    let mut parts = line.split_whitespace().skip(1);
    let mut out = [0.0_f32; 3];
    for v in &mut out {
        let part = parts
            .next()
            .with_context(|| format!("line {}: expected three values", lineno + 1))?;
        *v = part
            .parse()
            .with_context(|| format!("line {}: invalid float `{part}`", lineno + 1))?;
    }
    Ok(out)
}
