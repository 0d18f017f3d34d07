//! Line-based interactive questions on stdin.

use std::io::{BufRead, Write};
use std::str::FromStr;

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl Prompter<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

#[cfg(test)]
impl<R> Prompter<R, Vec<u8>> {
    /// Everything written so far.
    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// One trimmed answer. End of input is an error.
    pub fn ask(&mut self, question: &str) -> anyhow::Result<String> {
        write!(self.output, "{}", question)?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            anyhow::bail!("No answer to '{}'", question.trim());
        }
        Ok(line.trim().to_string())
    }

    /// Ask until the answer parses.
    pub fn ask_parsed<T>(&mut self, question: &str) -> anyhow::Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        loop {
            let answer = self.ask(question)?;
            match answer.parse() {
                Ok(value) => return Ok(value),
                Err(e) => self.say(&format!("invalid value '{}': {}", answer, e))?,
            }
        }
    }

    /// A line of feedback, e.g. why an answer was refused.
    pub fn say(&mut self, line: &str) -> anyhow::Result<()> {
        writeln!(self.output, "  {}", line)?;
        Ok(())
    }

    /// `y`/`yes` (any case) is true, anything else false.
    pub fn confirm(&mut self, question: &str) -> anyhow::Result<bool> {
        let answer = self.ask(question)?;
        Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
    }
}
