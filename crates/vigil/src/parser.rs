//! Job line parser.
//!
//! Lines look like `<target> must run <type> [with <name> <value>]...`.
//! Values containing spaces are quoted with `'` or `"`. Blank lines and
//! `#` comments carry no test.

use std::sync::Arc;

use regex::Regex;

use crate::check::Test;
use crate::error::ParseError;
use crate::probe::ProbeRegistry;

pub struct Parser {
    registry: Arc<ProbeRegistry>,
}

impl Parser {
    pub fn new(registry: Arc<ProbeRegistry>) -> Self {
        Self { registry }
    }

    /// Parse one line; `Ok(None)` for blank lines and comments.
    ///
    /// Arguments are validated against the probe's declared patterns when
    /// the type is registered. Unknown types are returned as-is.
    pub fn parse_line(&self, line: &str) -> Result<Option<Test>, ParseError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let tokens = tokenize(line)?;
        let (target, kind, rest) = match tokens.as_slice() {
            [target, must, run, kind, rest @ ..] if must == "must" && run == "run" => {
                (target, kind, rest)
            }
            _ => return Err(ParseError::Malformed(line.to_string())),
        };

        let mut test = Test::new(kind.as_str(), target.as_str()).with_input(line);

        let mut rest = rest.iter();
        while let Some(token) = rest.next() {
            if token != "with" {
                return Err(ParseError::UnexpectedToken(token.clone()));
            }
            let name = rest.next().ok_or_else(|| ParseError::Malformed(line.to_string()))?;
            let value = rest.next().ok_or_else(|| ParseError::MissingValue(name.clone()))?;
            test.arguments.insert(name.clone(), value.clone());
        }

        self.validate(&test)?;
        Ok(Some(test))
    }

    fn validate(&self, test: &Test) -> Result<(), ParseError> {
        let Ok(probe) = self.registry.get(&test.kind) else {
            return Ok(());
        };
        let accepted = probe.arguments();

        for (name, value) in &test.arguments {
            let Some((_, pattern)) = accepted.iter().find(|(accepted, _)| accepted == name) else {
                return Err(ParseError::UnknownArgument {
                    probe: test.kind.clone(),
                    argument: name.clone(),
                });
            };

            let valid = Regex::new(pattern).map(|re| re.is_match(value)).unwrap_or(false);
            if !valid {
                return Err(ParseError::InvalidValue {
                    argument: name.clone(),
                    value: value.clone(),
                    pattern: pattern.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Split on whitespace, keeping quoted values together.
fn tokenize(line: &str) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '\'' || c == '"' {
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            for next in chars.by_ref() {
                if next == c {
                    closed = true;
                    break;
                }
                value.push(next);
            }
            if !closed {
                return Err(ParseError::UnterminatedQuote(line.to_string()));
            }
            tokens.push(value);
        } else {
            let mut word = String::new();
            while let Some(&next) = chars.peek() {
                if next.is_whitespace() {
                    break;
                }
                word.push(next);
                chars.next();
            }
            tokens.push(word);
        }
    }

    Ok(tokens)
}
