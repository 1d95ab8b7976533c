//! Schema-definition parser: a hand-rolled tokenizer and recursive-descent
//! parser for a restricted proto3 subset.
//!
//! Accepts `syntax = "proto3";`, an optional dotted `package` declaration,
//! and `message` blocks. Unknown top-level tokens are skipped so files using
//! qualifiers we do not model (`option`, `import`, ...) still load; malformed
//! tokens inside a message body fail with a line-numbered error.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::proto::schema::{FieldDef, Label, MessageDef, ScalarType};

/// Schema parse errors, each carrying the source line it was raised on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: expected syntax version string")]
    ExpectedSyntaxVersion { line: usize },

    #[error("line {line}: expected package name")]
    ExpectedPackageName { line: usize },

    #[error("line {line}: expected field type, found '{found}'")]
    ExpectedFieldType { line: usize, found: String },

    #[error("line {line}: expected field name")]
    ExpectedFieldName { line: usize },

    #[error("line {line}: expected positive field tag")]
    ExpectedFieldTag { line: usize },

    #[error("line {line}: unexpected token '{found}'")]
    UnexpectedToken { line: usize, found: String },

    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: usize },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Identifier or keyword; dotted names lex as one token.
    Ident(String),
    Integer(u64),
    Str(String),
    Equals,
    Semicolon,
    LBrace,
    RBrace,
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(s) => s.clone(),
            Token::Integer(n) => n.to_string(),
            Token::Str(s) => format!("\"{}\"", s),
            Token::Equals => "=".into(),
            Token::Semicolon => ";".into(),
            Token::LBrace => "{".into(),
            Token::RBrace => "}".into(),
            Token::Eof => "<eof>".into(),
        }
    }
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn next_char(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    /// Skip whitespace and `// ...` line comments, counting newlines.
    fn skip_trivia(&mut self) {
        loop {
            while let Some(ch) = self.peek_char() {
                if ch.is_whitespace() {
                    self.next_char();
                } else {
                    break;
                }
            }
            if self.input[self.pos..].starts_with("//") {
                while let Some(ch) = self.next_char() {
                    if ch == '\n' {
                        break;
                    }
                }
                continue;
            }
            break;
        }
    }

    fn read_identifier(&mut self) -> String {
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                self.next_char();
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn read_integer(&mut self) -> u64 {
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_digit() {
                self.next_char();
            } else {
                break;
            }
        }
        self.input[start..self.pos].parse().unwrap_or(0)
    }

    fn read_string(&mut self) -> Result<String, ParseError> {
        self.next_char(); // opening quote
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if ch == '"' {
                let s = self.input[start..self.pos].to_string();
                self.next_char();
                return Ok(s);
            }
            self.next_char();
        }
        Err(ParseError::UnterminatedString { line: self.line })
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_trivia();

        let ch = match self.peek_char() {
            Some(c) => c,
            None => return Ok(Token::Eof),
        };

        match ch {
            '=' => {
                self.next_char();
                Ok(Token::Equals)
            }
            ';' => {
                self.next_char();
                Ok(Token::Semicolon)
            }
            '{' => {
                self.next_char();
                Ok(Token::LBrace)
            }
            '}' => {
                self.next_char();
                Ok(Token::RBrace)
            }
            '"' => Ok(Token::Str(self.read_string()?)),
            c if c.is_ascii_digit() => Ok(Token::Integer(self.read_integer())),
            c if c.is_alphabetic() || c == '_' => Ok(Token::Ident(self.read_identifier())),
            other => {
                self.next_char();
                Err(ParseError::UnexpectedToken {
                    line: self.line,
                    found: other.to_string(),
                })
            }
        }
    }
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    peeked: Option<Token>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lexer: Lexer::new(source),
            peeked: None,
        }
    }

    fn line(&self) -> usize {
        self.lexer.line
    }

    fn next(&mut self) -> Result<Token, ParseError> {
        match self.peeked.take() {
            Some(tok) => Ok(tok),
            None => self.lexer.next_token(),
        }
    }

    fn peek(&mut self) -> Result<&Token, ParseError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lexer.next_token()?);
        }
        Ok(self.peeked.as_ref().unwrap())
    }

    fn expect(&mut self, want: Token) -> Result<(), ParseError> {
        let tok = self.next()?;
        if tok == want {
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                line: self.line(),
                found: tok.describe(),
            })
        }
    }

    /// `syntax = "proto3";` with the version string parsed but not enforced.
    fn parse_syntax(&mut self) -> Result<(), ParseError> {
        self.expect(Token::Equals)
            .map_err(|_| ParseError::ExpectedSyntaxVersion { line: self.line() })?;
        match self.next()? {
            Token::Str(_) => {}
            _ => return Err(ParseError::ExpectedSyntaxVersion { line: self.line() }),
        }
        self.expect(Token::Semicolon)
    }

    /// `package dotted.name;`
    fn parse_package(&mut self) -> Result<(), ParseError> {
        match self.next()? {
            Token::Ident(_) => {}
            _ => return Err(ParseError::ExpectedPackageName { line: self.line() }),
        }
        self.expect(Token::Semicolon)
    }

    fn parse_message(&mut self) -> Result<MessageDef, ParseError> {
        let name = match self.next()? {
            Token::Ident(name) => name,
            tok => {
                return Err(ParseError::UnexpectedToken {
                    line: self.line(),
                    found: tok.describe(),
                })
            }
        };
        self.expect(Token::LBrace)?;

        let mut fields = BTreeMap::new();
        loop {
            if matches!(self.peek()?, Token::RBrace) {
                self.next()?;
                break;
            }
            let field = self.parse_field()?;
            fields.insert(field.tag, field);
        }

        Ok(MessageDef {
            name,
            fields,
            source: String::new(), // filled in by the caller with the file source
        })
    }

    /// `[label] type name = tag;`
    fn parse_field(&mut self) -> Result<FieldDef, ParseError> {
        let mut label = Label::Optional;
        let mut type_token = match self.next()? {
            Token::Ident(ident) => ident,
            tok => {
                return Err(ParseError::ExpectedFieldType {
                    line: self.line(),
                    found: tok.describe(),
                })
            }
        };

        match type_token.as_str() {
            "optional" => {
                label = Label::Optional;
                type_token = self.ident_or(|line, found| ParseError::ExpectedFieldType {
                    line,
                    found,
                })?;
            }
            "required" => {
                label = Label::Required;
                type_token = self.ident_or(|line, found| ParseError::ExpectedFieldType {
                    line,
                    found,
                })?;
            }
            "repeated" => {
                label = Label::Repeated;
                type_token = self.ident_or(|line, found| ParseError::ExpectedFieldType {
                    line,
                    found,
                })?;
            }
            _ => {}
        }

        // A non-keyword type token is a reference to another message type,
        // preserved verbatim for resolution at encode/decode time.
        let (scalar, type_name) = match ScalarType::from_keyword(&type_token) {
            Some(scalar) => (scalar, None),
            None => (ScalarType::Message, Some(type_token)),
        };

        let name = match self.next()? {
            Token::Ident(name) => name,
            _ => return Err(ParseError::ExpectedFieldName { line: self.line() }),
        };

        self.expect(Token::Equals)
            .map_err(|_| ParseError::ExpectedFieldTag { line: self.line() })?;

        let tag = match self.next()? {
            Token::Integer(tag) if tag > 0 && tag <= u32::MAX as u64 => tag as u32,
            _ => return Err(ParseError::ExpectedFieldTag { line: self.line() }),
        };

        self.expect(Token::Semicolon)?;

        Ok(FieldDef {
            name,
            tag,
            scalar,
            label,
            type_name,
        })
    }

    fn ident_or(
        &mut self,
        err: impl FnOnce(usize, String) -> ParseError,
    ) -> Result<String, ParseError> {
        let tok = self.next()?;
        match tok {
            Token::Ident(ident) => Ok(ident),
            other => Err(err(self.line(), other.describe())),
        }
    }
}

/// Parse a schema file into its message definitions. Each returned definition
/// carries a copy of the full file source.
pub fn parse_schema(source: &str) -> Result<Vec<MessageDef>, ParseError> {
    let mut parser = Parser::new(source);
    let mut messages = Vec::new();

    loop {
        match parser.next()? {
            Token::Eof => break,
            Token::Ident(ident) => match ident.as_str() {
                "syntax" => parser.parse_syntax()?,
                "package" => parser.parse_package()?,
                "message" => {
                    let mut def = parser.parse_message()?;
                    def.source = source.to_string();
                    messages.push(def);
                }
                // Forward compatibility: unknown top-level tokens are skipped.
                _ => {}
            },
            _ => {}
        }
    }

    Ok(messages)
}
