//! Caller-supplied input for intermediate prompts.
//!
//! The exchange driver never touches a terminal. Whatever the device asks
//! for is obtained through a `PromptProvider`, so front ends choose how to
//! ask and tests can script the answers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::protocol::messages::{ButtonRequest, PinMatrixRequestType};

#[derive(Error, Debug)]
pub enum PromptError {
    /// The user chose to abort the operation.
    #[error("Cancelled by user")]
    Cancelled,

    /// No answer can be produced for this prompt.
    #[error("No {0} available")]
    Unavailable(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of PINs, passphrases and recovery words.
pub trait PromptProvider: Send + Sync {
    /// Matrix-encoded PIN: the positions of the digits in the scrambled
    /// 3x3 grid shown on the device screen.
    fn pin(&self, request: PinMatrixRequestType) -> Result<String, PromptError>;

    fn passphrase(&self) -> Result<String, PromptError>;

    /// One recovery word.
    fn word(&self) -> Result<String, PromptError>;

    /// The device waits for a physical button press. Called before the
    /// acknowledgement is sent.
    fn button(&self, _request: &ButtonRequest) -> Result<(), PromptError> {
        Ok(())
    }
}

/// Prompt provider answering from pre-loaded queues.
#[derive(Default)]
pub struct ScriptedPrompts {
    pins: Mutex<VecDeque<String>>,
    passphrases: Mutex<VecDeque<String>>,
    words: Mutex<VecDeque<String>>,
    cancel: bool,
    pin_prompts: AtomicUsize,
    passphrase_prompts: AtomicUsize,
    word_prompts: AtomicUsize,
    button_prompts: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedPrompts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that cancels at the first prompt of any kind.
    pub fn cancelling() -> Self {
        Self {
            cancel: true,
            ..Self::default()
        }
    }

    pub fn with_pin(self, pin: impl Into<String>) -> Self {
        lock(&self.pins).push_back(pin.into());
        self
    }

    pub fn with_passphrase(self, passphrase: impl Into<String>) -> Self {
        lock(&self.passphrases).push_back(passphrase.into());
        self
    }

    pub fn with_words<I, S>(self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.words).extend(words.into_iter().map(Into::into));
        self
    }

    pub fn pin_prompts(&self) -> usize {
        self.pin_prompts.load(Ordering::SeqCst)
    }

    pub fn passphrase_prompts(&self) -> usize {
        self.passphrase_prompts.load(Ordering::SeqCst)
    }

    pub fn word_prompts(&self) -> usize {
        self.word_prompts.load(Ordering::SeqCst)
    }

    pub fn button_prompts(&self) -> usize {
        self.button_prompts.load(Ordering::SeqCst)
    }

    /// Total prompts of any kind.
    pub fn total_prompts(&self) -> usize {
        self.pin_prompts() + self.passphrase_prompts() + self.word_prompts() + self.button_prompts()
    }

    fn answer(
        &self,
        counter: &AtomicUsize,
        queue: &Mutex<VecDeque<String>>,
        what: &'static str,
    ) -> Result<String, PromptError> {
        counter.fetch_add(1, Ordering::SeqCst);
        if self.cancel {
            return Err(PromptError::Cancelled);
        }
        lock(queue).pop_front().ok_or(PromptError::Unavailable(what))
    }
}

impl PromptProvider for ScriptedPrompts {
    fn pin(&self, _request: PinMatrixRequestType) -> Result<String, PromptError> {
        self.answer(&self.pin_prompts, &self.pins, "PIN")
    }

    fn passphrase(&self) -> Result<String, PromptError> {
        self.answer(&self.passphrase_prompts, &self.passphrases, "passphrase")
    }

    fn word(&self) -> Result<String, PromptError> {
        self.answer(&self.word_prompts, &self.words, "recovery word")
    }

    fn button(&self, _request: &ButtonRequest) -> Result<(), PromptError> {
        self.button_prompts.fetch_add(1, Ordering::SeqCst);
        if self.cancel {
            return Err(PromptError::Cancelled);
        }
        Ok(())
    }
}
