//! Yes/no confirmation before destructive steps.

use std::io::{self, BufRead, Write};

/// Asks the user a yes/no question.
pub trait Confirm: Send + Sync {
    fn confirm(&self, question: &str) -> io::Result<bool>;
}

/// Reads answers from stdin. `yes`/`y` confirm; `no`/`n`, an empty line or
/// end of input decline; anything else asks again.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, question: &str) -> io::Result<bool> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        ask(question, &mut stdin.lock(), &mut stdout)
    }
}

pub(crate) fn ask<R: BufRead, W: Write>(
    question: &str,
    input: &mut R,
    output: &mut W,
) -> io::Result<bool> {
    let mut line = String::new();
    loop {
        write!(output, "{question} [yes/N] ")?;
        output.flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(false);
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" => return Ok(true),
            "no" | "n" | "" => return Ok(false),
            _ => continue,
        }
    }
}
