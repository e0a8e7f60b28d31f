use crate::pixel_buf::PixelBuffer;

/// Full-resolution intermediate outputs, one slot per pipeline step.
///
/// Entry `k` is the buffer after steps `0..=k` have run. An entry is
/// written only once its producing step has fully completed, so a
/// cancelled pass never leaves a half-processed buffer behind.
#[derive(Default)]
pub struct StepOutputCache {
    entries: Vec<Option<PixelBuffer>>,
}

impl StepOutputCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, step: usize) -> Option<&PixelBuffer> {
        self.entries.get(step).and_then(Option::as_ref)
    }

    pub fn put(&mut self, step: usize, output: PixelBuffer) {
        if self.entries.len() <= step {
            self.entries.resize_with(step + 1, || None);
        }
        self.entries[step] = Some(output);
    }

    /// Drop entry `step` and everything downstream of it. Upstream
    /// entries stay valid; a resume starts from `step - 1`.
    pub fn invalidate_from(&mut self, step: usize) {
        for entry in self.entries.iter_mut().skip(step) {
            *entry = None;
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
