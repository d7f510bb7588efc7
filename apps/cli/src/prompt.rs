//! Terminal prompts for PIN, passphrase and recovery words.

use std::io::{self, BufRead, Write};

use skywallet_core::PromptError;
use skywallet_core::exchange::PromptProvider;
use skywallet_core::protocol::messages::{ButtonRequest, PinMatrixRequestType};

const PIN_MATRIX_HELP: &str = "\
The device shows a scrambled 3x3 grid of digits. Type the POSITION of each
PIN digit using this layout (same as a numeric keypad):

    7 8 9
    4 5 6
    1 2 3

Leave empty to cancel.";

/// Reads answers from the controlling terminal. PIN and passphrase input is
/// not echoed.
pub struct TerminalPrompts;

impl TerminalPrompts {
    fn read_hidden(label: &str) -> Result<String, PromptError> {
        eprint!("{label}: ");
        io::stderr().flush()?;
        Ok(rpassword::read_password()?)
    }

    fn read_line(label: &str) -> Result<String, PromptError> {
        eprint!("{label}: ");
        io::stderr().flush()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(PromptError::Cancelled);
        }
        Ok(line.trim().to_string())
    }
}

impl PromptProvider for TerminalPrompts {
    fn pin(&self, request: PinMatrixRequestType) -> Result<String, PromptError> {
        eprintln!("{PIN_MATRIX_HELP}");
        let pin = Self::read_hidden(&format!("Enter {request}"))?;
        if pin.is_empty() {
            return Err(PromptError::Cancelled);
        }
        if !is_matrix_pin(&pin) {
            eprintln!("PIN positions must be digits 1-9");
            return Err(PromptError::Cancelled);
        }
        Ok(pin)
    }

    fn passphrase(&self) -> Result<String, PromptError> {
        Self::read_hidden("Passphrase")
    }

    fn word(&self) -> Result<String, PromptError> {
        let word = Self::read_line("Word")?;
        if word.is_empty() {
            return Err(PromptError::Cancelled);
        }
        Ok(word)
    }

    fn button(&self, _request: &ButtonRequest) -> Result<(), PromptError> {
        eprintln!("Confirm the operation on the device");
        Ok(())
    }
}

fn is_matrix_pin(pin: &str) -> bool {
    pin.chars().all(|c| ('1'..='9').contains(&c))
}
