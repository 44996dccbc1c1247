//! Yes/no confirmation before a run that will modify files.

use std::io::{self, BufRead, Write};
use tracing::warn;

pub trait Confirm {
    /// Returns `true` to go ahead.
    fn confirm(&mut self, title: &str, message: &str) -> bool;
}

/// Asks on a terminal; anything but "y"/"yes" declines.
pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
}

impl TerminalPrompt<io::StdinLock<'static>, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, title: &str, message: &str) -> io::Result<bool> {
        write!(self.output, "{}: {}\nProceed? [y/N] ", title, message)?;
        self.output.flush()?;

        let mut answer = String::new();
        self.input.read_line(&mut answer)?;
        let answer = answer.trim().to_lowercase();
        Ok(answer == "y" || answer == "yes")
    }
}

impl<R: BufRead, W: Write> Confirm for TerminalPrompt<R, W> {
    fn confirm(&mut self, title: &str, message: &str) -> bool {
        match self.ask(title, message) {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Confirmation prompt failed: {}", e);
                false
            }
        }
    }
}

/// For `--yes` and non-interactive use.
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, _title: &str, _message: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn answer(input: &str) -> (bool, String) {
        let mut output = Vec::new();
        let mut prompt = TerminalPrompt::new(Cursor::new(input.as_bytes()), &mut output);
        let accepted = prompt.confirm("WARNING", "Files will be updated.");
        (accepted, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_yes_answers() {
        assert!(answer("y\n").0);
        assert!(answer(" YES \n").0);
    }

    #[test]
    fn test_anything_else_declines() {
        assert!(!answer("n\n").0);
        assert!(!answer("\n").0);
        assert!(!answer("").0);
        assert!(!answer("yep\n").0);
    }

    #[test]
    fn test_prompt_text() {
        let (_, shown) = answer("n\n");
        assert_eq!(shown, "WARNING: Files will be updated.\nProceed? [y/N] ");
    }

    #[test]
    fn test_assume_yes() {
        assert!(AssumeYes.confirm("WARNING", "anything"));
    }
}
