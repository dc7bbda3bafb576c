use crate::ast::Command;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ShellError {
    #[error("Syntax error: {0}")]
    Syntax(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Word(String),
    Operator(String), // <, >, &, and the unsupported |, ;, >>, ...
    Whitespace(String),
    EOF,
}

pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    skip_whitespace: bool,
    preserve_quotes: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            skip_whitespace: true,
            preserve_quotes: false,
        }
    }

    pub fn new_highlight(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            skip_whitespace: false,
            preserve_quotes: true,
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn take_whitespace(&mut self) -> String {
        let start = self.pos;
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.advance_char();
        }
        self.input[start..self.pos].to_string()
    }

    pub fn next_token(&mut self) -> Result<Token, ShellError> {
        let ws = self.take_whitespace();
        if !self.skip_whitespace && !ws.is_empty() {
            return Ok(Token::Whitespace(ws));
        }

        let c = match self.peek_char() {
            Some(c) => c,
            None => return Ok(Token::EOF),
        };

        match c {
            ';' | '|' | '&' | '<' | '>' => {
                self.advance_char();

                // Double operators are lexed whole so they can be rejected whole.
                let combined = match (c, self.peek_char()) {
                    ('|', Some('|')) => Some("||"),
                    ('&', Some('&')) => Some("&&"),
                    ('>', Some('>')) => Some(">>"),
                    ('<', Some('<')) => Some("<<"),
                    _ => None,
                };
                if let Some(op) = combined {
                    self.advance_char();
                    return Ok(Token::Operator(op.to_string()));
                }
                Ok(Token::Operator(c.to_string()))
            }
            '#' => {
                // Comment runs to end of line.
                let start = self.pos;
                self.pos = self.input.len();
                if self.skip_whitespace {
                    Ok(Token::EOF)
                } else {
                    Ok(Token::Whitespace(self.input[start..].to_string()))
                }
            }
            _ => self.read_word().map(Token::Word),
        }
    }

    fn read_word(&mut self) -> Result<String, ShellError> {
        let mut word = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() || ";|&<>".contains(c) {
                break;
            }
            self.advance_char();

            if c == '\'' || c == '"' {
                if self.preserve_quotes {
                    word.push(c);
                }
                loop {
                    match self.advance_char() {
                        Some(qc) if qc == c => {
                            if self.preserve_quotes {
                                word.push(qc);
                            }
                            break;
                        }
                        Some(qc) => word.push(qc),
                        None => return Err(ShellError::Syntax("Unclosed quote".to_string())),
                    }
                }
            } else {
                word.push(c);
            }
        }
        Ok(word)
    }
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current_token: Token,
}

impl<'a> Parser<'a> {
    pub fn new(mut lexer: Lexer<'a>) -> Result<Self, ShellError> {
        let current_token = lexer.next_token()?;
        Ok(Self {
            lexer,
            current_token,
        })
    }

    fn advance(&mut self) -> Result<(), ShellError> {
        self.current_token = self.lexer.next_token()?;
        Ok(())
    }

    /// Parses the whole line. `Ok(None)` means the line was blank.
    pub fn parse(&mut self) -> Result<Option<Command>, ShellError> {
        let mut cmd = Command::default();

        loop {
            match &self.current_token {
                Token::EOF => break,
                Token::Word(_) if cmd.background => {
                    return Err(ShellError::Syntax("'&' must end the command".to_string()));
                }
                Token::Word(w) => {
                    cmd.args.push(w.clone());
                    self.advance()?;
                }
                Token::Whitespace(_) => self.advance()?,
                Token::Operator(op) if op == "&" => {
                    if cmd.background {
                        return Err(ShellError::Syntax("'&' must end the command".to_string()));
                    }
                    cmd.background = true;
                    self.advance()?;
                }
                Token::Operator(op) if op == "<" || op == ">" => {
                    let input = op == "<";
                    self.advance()?;
                    let target = match &self.current_token {
                        Token::Word(target) => target.clone(),
                        _ => {
                            return Err(ShellError::Syntax(
                                "Expected filename after redirection".to_string(),
                            ));
                        }
                    };
                    let slot = if input {
                        &mut cmd.infile
                    } else {
                        &mut cmd.outfile
                    };
                    if slot.is_some() {
                        return Err(ShellError::Syntax("Ambiguous I/O redirection".to_string()));
                    }
                    *slot = Some(target);
                    self.advance()?;
                }
                Token::Operator(op) => {
                    return Err(ShellError::Syntax(format!("Unsupported operator '{}'", op)));
                }
            }
        }

        if cmd.args.is_empty() {
            if cmd.infile.is_some() || cmd.outfile.is_some() || cmd.background {
                return Err(ShellError::Syntax(
                    "Expected command, found nothing".to_string(),
                ));
            }
            return Ok(None);
        }
        Ok(Some(cmd))
    }
}

/// Lexes and parses one input line.
pub fn parse_line(line: &str) -> Result<Option<Command>, ShellError> {
    Parser::new(Lexer::new(line))?.parse()
}
