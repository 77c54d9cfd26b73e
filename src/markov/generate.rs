//! Lazy text generation over a built model

use std::collections::VecDeque;

use rand::Rng;

use super::MarkovModel;
use crate::error::Result;

/// Finite iterator of sampled characters.
///
/// Each step samples the next character after the current k-length window,
/// then slides the window by one. Cloning an unconsumed generator restarts it:
/// the clone carries the same RNG state and yields the same characters.
#[derive(Clone)]
pub struct Generate<'a, R> {
    model: &'a MarkovModel,
    window: VecDeque<char>,
    remaining: usize,
    rng: R,
    failed: bool,
}

impl<'a, R: Rng> Generate<'a, R> {
    pub(super) fn new(model: &'a MarkovModel, gram: &str, len: usize, rng: R) -> Self {
        Self {
            model,
            window: gram.chars().collect(),
            remaining: len,
            rng,
            failed: false,
        }
    }
}

impl<R: Rng> Iterator for Generate<'_, R> {
    type Item = Result<char>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.failed {
            return None;
        }

        let gram: String = self.window.iter().collect();
        match self.model.sample_next(&gram, &mut self.rng) {
            Ok(next) => {
                self.window.pop_front();
                self.window.push_back(next);
                self.remaining -= 1;
                Some(Ok(next))
            }
            Err(e) => {
                // Stop after surfacing the first failure
                self.failed = true;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            (0, Some(0))
        } else {
            (0, Some(self.remaining))
        }
    }
}
