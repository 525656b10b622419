//! Compact action code: a one-line script encoding.
//!
//! ```text
//! H"Xk29pq";W2.5;D6;W3.1;K"UP"
//! ```
//!
//! | Item      | Step                       |
//! |-----------|----------------------------|
//! | `H"text"` | [`ActionStep::TypeText`]   |
//! | `K"name"` | [`ActionStep::PressKey`]   |
//! | `W<secs>` | [`ActionStep::Wait`]       |
//! | `D<n>`    | [`ActionStep::Backspace`]  |
//!
//! Items are separated by `;`. Quoted text may contain `;`; a literal `"` or
//! `\` inside quotes is written `\"` or `\\`. Empty items are ignored.

use super::{ActionStep, ScriptError};

/// Parses an action code into steps.
pub fn parse_action_code(code: &str) -> Result<Vec<ActionStep>, ScriptError> {
    let mut cursor = Cursor { src: code, pos: 0 };
    let mut steps = Vec::new();

    loop {
        cursor.skip_whitespace();
        match cursor.peek() {
            None => break,
            Some(';') => {
                cursor.bump();
                continue;
            }
            Some(_) => {}
        }

        steps.push(cursor.item()?);

        cursor.skip_whitespace();
        match cursor.bump() {
            None | Some(';') => {}
            Some(c) => return Err(cursor.error_before(c, format!("expected ';', found {c:?}"))),
        }
    }

    Ok(steps)
}

/// Encodes steps as an action code.
///
/// Returns `None` if any step has no compact form (LED, beep, row deletion,
/// unknown steps, or a wait without an explicit duration).
pub fn to_action_code(steps: &[ActionStep]) -> Option<String> {
    let items = steps
        .iter()
        .map(|step| match step {
            ActionStep::TypeText(text) => Some(format!("H{}", quote(text))),
            ActionStep::PressKey(name) => Some(format!("K{}", quote(name))),
            ActionStep::Wait { seconds: Some(s) } if s.is_finite() && *s >= 0.0 => {
                Some(format!("W{s}"))
            }
            ActionStep::Backspace(n) => Some(format!("D{n}")),
            ActionStep::DeleteText(text) => Some(format!("D{}", text.chars().count())),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    Some(items.join(";"))
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn error_at(&self, position: usize, reason: impl Into<String>) -> ScriptError {
        ScriptError::ActionCode {
            position,
            reason: reason.into(),
        }
    }

    /// Error pointing at a character that has just been consumed.
    fn error_before(&self, consumed: char, reason: impl Into<String>) -> ScriptError {
        self.error_at(self.pos - consumed.len_utf8(), reason)
    }

    fn item(&mut self) -> Result<ActionStep, ScriptError> {
        let start = self.pos;
        match self.bump() {
            Some('H') => Ok(ActionStep::TypeText(self.quoted()?)),
            Some('K') => Ok(ActionStep::PressKey(self.quoted()?)),
            Some('W') => Ok(ActionStep::Wait {
                seconds: Some(self.number()?),
            }),
            Some('D') => Ok(ActionStep::Backspace(self.count()?)),
            Some(c) => Err(self.error_at(start, format!("unknown action {c:?}"))),
            None => Err(self.error_at(start, "unexpected end of code")),
        }
    }

    fn quoted(&mut self) -> Result<String, ScriptError> {
        let open = self.pos;
        if self.bump() != Some('"') {
            return Err(self.error_at(open, "expected '\"'"));
        }
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error_at(open, "unterminated string")),
                Some('"') => return Ok(text),
                Some('\\') => match self.bump() {
                    Some(c) => text.push(c),
                    None => return Err(self.error_at(open, "unterminated string")),
                },
                Some(c) => text.push(c),
            }
        }
    }

    fn digits(&mut self, allow_point: bool) -> &'a str {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || (allow_point && c == '.'))
        {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn number(&mut self) -> Result<f64, ScriptError> {
        let start = self.pos;
        let text = self.digits(true);
        text.parse::<f64>()
            .map_err(|_| self.error_at(start, format!("invalid number {text:?}")))
    }

    fn count(&mut self) -> Result<usize, ScriptError> {
        let start = self.pos;
        let text = self.digits(false);
        text.parse::<usize>()
            .map_err(|_| self.error_at(start, format!("invalid count {text:?}")))
    }
}
