//! Pull-based chunk sources
//!
//! A full prompt takes too long to generate for a responsive stream, so the
//! windowed source generates a small snippet at a time and re-feeds the tail
//! of its own output as the next prompt. A fixed source stands in for the
//! model during debugging.

use std::time::{Duration, Instant};

use crate::inference::{EngineError, GenParams, InferenceEngine};

/// Anything that can run one completion. Seam between the windowed source
/// and the real engine so the windowing logic is testable without a model.
pub trait Completion {
    fn complete(&self, prompt: &str, params: &GenParams) -> Result<String, EngineError>;
}

impl Completion for InferenceEngine {
    fn complete(&self, prompt: &str, params: &GenParams) -> Result<String, EngineError> {
        InferenceEngine::complete(self, prompt, params)
    }
}

impl<C: Completion + ?Sized> Completion for &C {
    fn complete(&self, prompt: &str, params: &GenParams) -> Result<String, EngineError> {
        (**self).complete(prompt, params)
    }
}

/// A source of response chunks, pulled one at a time by the server.
pub trait ChunkSource {
    /// Produces the next chunk, or `None` when the source is exhausted.
    fn next_chunk(&mut self) -> Option<Result<String, EngineError>>;
}

/// Generates text in small windows, re-prompting with the tail of output.
///
/// Each pull runs one short completion, yields the last `window_chars` chars
/// of prompt-plus-continuation, and replaces the prompt with its own tail.
/// The prompt length in chars stays constant across iterations. The source
/// never ends on its own; the consumer caps iterations.
pub struct WindowedGenerator<C: Completion> {
    model: C,
    prompt: String,
    /// Initial prompt length in chars, held constant
    prompt_len: usize,
    window_chars: usize,
    params: GenParams,
}

impl<C: Completion> WindowedGenerator<C> {
    pub fn new(model: C, prompt: impl Into<String>, window_chars: usize, params: GenParams) -> Self {
        let prompt = prompt.into();
        let prompt_len = prompt.chars().count();
        Self {
            model,
            prompt,
            prompt_len,
            window_chars,
            params,
        }
    }

    /// Current prompt, exposed for inspection
    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

impl<C: Completion> ChunkSource for WindowedGenerator<C> {
    fn next_chunk(&mut self) -> Option<Result<String, EngineError>> {
        let start = Instant::now();
        let completion = match self.model.complete(&self.prompt, &self.params) {
            Ok(text) => text,
            Err(e) => return Some(Err(e)),
        };

        let full = format!("{}{}", self.prompt, completion);
        let chunk = tail_chars(&full, self.window_chars).to_string();
        self.prompt = tail_chars(&full, self.prompt_len).to_string();

        tracing::debug!(
            chunk_chars = chunk.chars().count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "windowed chunk generated"
        );
        Some(Ok(chunk))
    }
}

/// Debugging source that yields a fixed string after a delay, forever.
pub struct FixedGenerator {
    text: String,
    delay: Duration,
}

impl FixedGenerator {
    pub fn new(text: impl Into<String>, delay: Duration) -> Self {
        Self {
            text: text.into(),
            delay,
        }
    }
}

impl ChunkSource for FixedGenerator {
    fn next_chunk(&mut self) -> Option<Result<String, EngineError>> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Some(Ok(self.text.clone()))
    }
}

/// Returns the last `n` chars of `s` without splitting a UTF-8 scalar.
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Completion stub that appends a canned continuation.
    struct Echo(&'static str);

    impl Completion for Echo {
        fn complete(&self, _prompt: &str, _params: &GenParams) -> Result<String, EngineError> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;

    impl Completion for Failing {
        fn complete(&self, _prompt: &str, _params: &GenParams) -> Result<String, EngineError> {
            Err(EngineError::Inference("boom".to_string()))
        }
    }

    #[test]
    fn test_tail_chars_ascii() {
        assert_eq!(tail_chars("hello world", 5), "world");
        assert_eq!(tail_chars("hi", 10), "hi");
        assert_eq!(tail_chars("hi", 0), "");
    }

    #[test]
    fn test_tail_chars_multibyte() {
        assert_eq!(tail_chars("caf\u{e9}", 2), "f\u{e9}");
        assert_eq!(tail_chars("\u{1F600}\u{1F601}\u{1F602}", 2), "\u{1F601}\u{1F602}");
    }

    #[test]
    fn test_windowed_prompt_length_constant() {
        let mut gen = WindowedGenerator::new(Echo(" and then some more"), "once upon", 5, GenParams::default());
        let initial_len = gen.prompt().chars().count();

        for _ in 0..4 {
            let chunk = gen.next_chunk().expect("infinite source").expect("no error");
            assert_eq!(chunk.chars().count(), 5);
            assert_eq!(gen.prompt().chars().count(), initial_len);
        }
    }

    #[test]
    fn test_windowed_chunk_is_tail_of_output() {
        let mut gen = WindowedGenerator::new(Echo("XYZ"), "abc", 3, GenParams::default());
        // full = "abcXYZ"; chunk = last 3 = "XYZ"; next prompt = "XYZ"
        let chunk = gen.next_chunk().unwrap().unwrap();
        assert_eq!(chunk, "XYZ");
        assert_eq!(gen.prompt(), "XYZ");
    }

    #[test]
    fn test_windowed_empty_completion_recycles_prompt() {
        let mut gen = WindowedGenerator::new(Echo(""), "stuck", 3, GenParams::default());
        let chunk = gen.next_chunk().unwrap().unwrap();
        assert_eq!(chunk, "uck");
        assert_eq!(gen.prompt(), "stuck");
    }

    #[test]
    fn test_windowed_propagates_engine_error() {
        let mut gen = WindowedGenerator::new(Failing, "prompt", 5, GenParams::default());
        assert!(matches!(
            gen.next_chunk(),
            Some(Err(EngineError::Inference(_)))
        ));
    }

    #[test]
    fn test_fixed_generator_repeats() {
        let mut gen = FixedGenerator::new("Some prompt", Duration::ZERO);
        for _ in 0..3 {
            assert_eq!(gen.next_chunk().unwrap().unwrap(), "Some prompt");
        }
    }
}
