//! Inbound IRC line parsing.
//!
//! A line is `<command> <args...> [ :<trailing>]`; the trailing part
//! starts at the first ` :` and is carried verbatim. Serialization
//! via `Display` reproduces the parsed line byte for byte for
//! single-space-separated input.

use std::fmt;

/// One parsed IRC line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcLine {
    /// Command exactly as received (dispatch is case-insensitive).
    pub command: String,
    /// Middle parameters.
    pub args: Vec<String>,
    /// Trailing parameter, without the leading ` :`.
    pub trailing: Option<String>,
}

impl IrcLine {
    /// Parse a line with the CR/LF already stripped. Returns `None`
    /// for empty (or whitespace-only) input.
    pub fn parse(input: &str) -> Option<IrcLine> {
        let (head, trailing) = match input.find(" :") {
            Some(pos) => (&input[..pos], Some(input[pos + 2..].to_string())),
            None => (input, None),
        };

        let mut tokens = head.split(' ').filter(|t| !t.is_empty());
        let command = tokens.next()?.to_string();
        let args = tokens.map(str::to_string).collect();

        Some(IrcLine {
            command,
            args,
            trailing,
        })
    }

    /// The first middle parameter, falling back to the trailing part.
    ///
    /// Some clients send single-argument commands (NICK, PASS) with a
    /// trailing colon instead of a middle parameter.
    pub fn first_param(&self) -> Option<&str> {
        self.args
            .first()
            .map(String::as_str)
            .or(self.trailing.as_deref())
    }

    /// True when the command matches, ignoring case.
    pub fn is_command(&self, command: &str) -> bool {
        self.command.eq_ignore_ascii_case(command)
    }
}

impl fmt::Display for IrcLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        if let Some(trailing) = &self.trailing {
            write!(f, " :{}", trailing)?;
        }
        Ok(())
    }
}
