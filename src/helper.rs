use rustyline::Context;
use rustyline::Helper;
use rustyline::Result;
use rustyline::completion::{Completer, FilenameCompleter, Pair};
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::hint::Hinter;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use std::borrow::Cow;

use crate::builtins::is_builtin;
use crate::parser::{Lexer, Token};

pub struct ShellHelper {
    pub completer: FilenameCompleter,
}

impl Default for ShellHelper {
    fn default() -> Self {
        Self {
            completer: FilenameCompleter::new(),
        }
    }
}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(&self, line: &str, pos: usize, ctx: &Context<'_>) -> Result<(usize, Vec<Pair>)> {
        self.completer.complete(line, pos, ctx)
    }
}

impl Hinter for ShellHelper {
    type Hint = String;
}

impl Validator for ShellHelper {
    fn validate(&self, _ctx: &mut ValidationContext) -> Result<ValidationResult> {
        Ok(ValidationResult::Valid(None))
    }
}

impl Helper for ShellHelper {}

impl Highlighter for ShellHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let mut lexer = Lexer::new_highlight(line);
        let mut highlighted = String::new();
        let mut is_command_position = true;

        loop {
            match lexer.next_token() {
                Ok(Token::EOF) => break,
                Ok(Token::Word(w)) => {
                    if is_command_position {
                        // Bold yellow for built-ins, green for programs
                        let color = if is_builtin(&w) { "\x1b[1;33m" } else { "\x1b[32m" };
                        highlighted.push_str(color);
                        highlighted.push_str(&w);
                        highlighted.push_str("\x1b[0m");
                        is_command_position = false;
                    } else {
                        highlighted.push_str(&w);
                    }
                }
                Ok(Token::Operator(op)) => {
                    highlighted.push_str("\x1b[36m");
                    highlighted.push_str(&op);
                    highlighted.push_str("\x1b[0m");
                }
                Ok(Token::Whitespace(ws)) => highlighted.push_str(&ws),
                Err(_) => return Cow::Borrowed(line),
            }
        }

        Cow::Owned(highlighted)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}
