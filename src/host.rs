//! Host-side arrays paired with device buffers.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::fmt::Write as _;
use std::str::FromStr;

/// Element type moved between host and device.
pub type Element = i32;

/// Arrays longer than this are previewed as head and tail only.
const PREVIEW_LIMIT: usize = 15;
const PREVIEW_EDGE: usize = 5;
const PREVIEW_SEPARATOR: &str = "----------------------------";

/// How much of an array is printed in progress output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreviewMode {
    Off,
    #[default]
    Abbreviated,
    Full,
}

impl FromStr for PreviewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "0" => Ok(PreviewMode::Off),
            "abbreviated" | "short" | "1" => Ok(PreviewMode::Abbreviated),
            "full" | "all" => Ok(PreviewMode::Full),
            other => Err(format!(
                "unknown preview mode `{other}` (expected off, abbreviated or full)"
            )),
        }
    }
}

/// Owned, length-tracked host array.
///
/// The length is the element count every transfer against a paired
/// [`DeviceBuffer`](crate::gpu::DeviceBuffer) is checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostArray {
    data: Vec<Element>,
}

impl HostArray {
    /// Array of `len` zeros.
    pub fn zeroed(len: usize) -> Self {
        Self { data: vec![0; len] }
    }

    /// Wraps an existing vector.
    pub fn from_vec(data: Vec<Element>) -> Self {
        Self { data }
    }

    /// Fills `len` elements with values in `0..100`.
    ///
    /// A seed makes the contents reproducible across runs.
    pub fn random(len: usize, seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::random_with(len, &mut Pcg64::seed_from_u64(seed)),
            None => Self::random_with(len, &mut rand::thread_rng()),
        }
    }

    /// Like [`HostArray::random`], drawing from a caller-supplied generator.
    pub fn random_with<R: Rng>(len: usize, rng: &mut R) -> Self {
        let data = (0..len).map(|_| rng.gen_range(0..100)).collect();
        Self { data }
    }

    /// Element count.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the contents in bytes.
    pub fn byte_len(&self) -> usize {
        std::mem::size_of_val(self.data.as_slice())
    }

    pub fn as_slice(&self) -> &[Element] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [Element] {
        &mut self.data
    }

    /// Raw byte view, as uploaded to the device.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Unwraps the elements.
    pub fn into_vec(self) -> Vec<Element> {
        self.data
    }

    /// Renders the array for progress output, or `None` when previews are off.
    pub fn preview(&self, mode: PreviewMode) -> Option<String> {
        let mut out = String::new();

        match mode {
            PreviewMode::Off => return None,
            PreviewMode::Abbreviated if self.data.len() > PREVIEW_LIMIT => {
                for value in &self.data[..PREVIEW_EDGE] {
                    let _ = write!(out, "{value} ");
                }
                out.push_str(" ..... ");
                for value in &self.data[self.data.len() - PREVIEW_EDGE..] {
                    let _ = write!(out, "{value} ");
                }
            }
            _ => {
                for value in &self.data {
                    let _ = write!(out, "{value} ");
                }
            }
        }

        out.push('\n');
        out.push_str(PREVIEW_SEPARATOR);
        Some(out)
    }

    /// Index of the first element where `self != a + b`, with the expected value.
    ///
    /// Only the common prefix of the three arrays is compared.
    pub fn first_sum_mismatch(&self, a: &HostArray, b: &HostArray) -> Option<(usize, Element)> {
        self.data
            .iter()
            .zip(a.data.iter().zip(b.data.iter()))
            .enumerate()
            .find_map(|(i, (&out, (&x, &y)))| {
                let expected = x.wrapping_add(y);
                (out != expected).then_some((i, expected))
            })
    }
}

impl From<Vec<Element>> for HostArray {
    fn from(data: Vec<Element>) -> Self {
        Self::from_vec(data)
    }
}
