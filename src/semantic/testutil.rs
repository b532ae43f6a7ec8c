//! Deterministic encoders for tests. No model download involved.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Mutex;

use crate::semantic::encoder::{EncoderError, TextEncoder};

/// Bag-of-words encoder over a fixed weighted vocabulary.
///
/// One dimension per vocabulary word; each component is the word's
/// weight times its occurrence count. Unknown words are ignored.
/// Down-weighting filler words ("i", "like") makes content words
/// dominate the cosine score, mimicking a real sentence encoder well
/// enough for ranking tests.
#[derive(Clone)]
pub struct StubEncoder {
    vocab: Vec<(String, f32)>,
}

impl StubEncoder {
    pub fn new(vocab: &[(&str, f32)]) -> Self {
        Self {
            vocab: vocab
                .iter()
                .map(|(word, weight)| (word.to_string(), *weight))
                .collect(),
        }
    }

    /// Single-dimension encoder, for tests where the vectors don't
    /// matter.
    pub fn unit() -> Self {
        Self::new(&[("x", 1.0)])
    }
}

impl TextEncoder for StubEncoder {
    fn dimensions(&self) -> usize {
        self.vocab.len()
    }

    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        Ok(texts
            .iter()
            .map(|text| {
                let words: Vec<String> = text
                    .to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                    .map(str::to_string)
                    .collect();

                self.vocab
                    .iter()
                    .map(|(word, weight)| {
                        let count = words.iter().filter(|w| w.as_str() == word.as_str()).count();
                        weight * count as f32
                    })
                    .collect()
            })
            .collect())
    }
}

/// Encoder whose calls block until a matching gate is released.
///
/// Calls take gates in arrival order and report their call index on
/// `entered`, letting a test control which in-flight batch finishes
/// first.
pub struct GatedEncoder {
    inner: StubEncoder,
    gates: Mutex<Vec<Receiver<()>>>,
    entered: Mutex<Sender<usize>>,
    calls: AtomicUsize,
}

impl GatedEncoder {
    pub fn new(inner: StubEncoder, gates: Vec<Receiver<()>>, entered: Sender<usize>) -> Self {
        Self {
            inner,
            gates: Mutex::new(gates),
            entered: Mutex::new(entered),
            calls: AtomicUsize::new(0),
        }
    }
}

impl TextEncoder for GatedEncoder {
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().unwrap().remove(0);

        let _ = self.entered.lock().unwrap().send(call);

        gate.recv()
            .map_err(|err| EncoderError::EmbeddingFailed(err.to_string()))?;
        self.inner.encode_batch(texts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_counts_weighted_words() {
        let encoder = StubEncoder::new(&[("pizza", 1.0), ("like", 0.5)]);

        let vectors = encoder
            .encode_batch(&["pizza pizza like".to_string()])
            .unwrap();

        assert_eq!(vectors[0], vec![2.0, 0.5]);
    }

    #[test]
    fn test_stub_ignores_unknown_words() {
        let encoder = StubEncoder::new(&[("pizza", 1.0)]);

        let vectors = encoder.encode_batch(&["sushi ramen".to_string()]).unwrap();
        assert_eq!(vectors[0], vec![0.0]);
    }
}
