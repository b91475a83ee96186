//! Yes/no questions on the terminal.

use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};

use super::RealRuntime;

/// Whether a typed answer means yes. Anything else, including EOF, is no.
fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Ask `question` as `<question> (yes/no): ` and read one line of answer.
pub(crate) fn ask_yes_no(
    question: &str,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<bool> {
    write!(output, "{} (yes/no): ", question).context("Failed to write prompt")?;
    output.flush().context("Failed to flush prompt")?;

    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .context("Failed to read answer from stdin")?;
    Ok(is_affirmative(&answer))
}

impl RealRuntime {
    pub(crate) fn confirm_impl(&self, prompt: &str) -> Result<bool> {
        ask_yes_no(prompt, &mut io::stdin().lock(), &mut io::stdout())
    }
}
