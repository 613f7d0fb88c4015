use std::collections::VecDeque;
use std::fmt::Display;
use std::rc::Rc;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::pow::Pow;

use crate::error::{Error, SyntaxError};
use crate::source::{Line, LineSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Else,
    Var,
    Loop,
    While,
    Import,
    Unimport,
    Undefine,
    Export,
    Func,
    Proc,
    Break,
    Next,
    Done,
    Return,
    WithPrefix,
}

impl Keyword {
    fn from_name(name: &str) -> Option<Keyword> {
        Some(match name {
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "var" => Keyword::Var,
            "loop" => Keyword::Loop,
            "while" => Keyword::While,
            "import" => Keyword::Import,
            "unimport" => Keyword::Unimport,
            "undefine" => Keyword::Undefine,
            "export" => Keyword::Export,
            "func" => Keyword::Func,
            "proc" => Keyword::Proc,
            "break" => Keyword::Break,
            "next" => Keyword::Next,
            "done" => Keyword::Done,
            "return" => Keyword::Return,
            "withprefix" => Keyword::WithPrefix,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::Var => "var",
            Keyword::Loop => "loop",
            Keyword::While => "while",
            Keyword::Import => "import",
            Keyword::Unimport => "unimport",
            Keyword::Undefine => "undefine",
            Keyword::Export => "export",
            Keyword::Func => "func",
            Keyword::Proc => "proc",
            Keyword::Break => "break",
            Keyword::Next => "next",
            Keyword::Done => "done",
            Keyword::Return => "return",
            Keyword::WithPrefix => "withprefix",
        }
    }
}

impl Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Single-character tokens
    Comma,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    LeftParen,
    RightParen,
    Semicolon,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    // One or two character tokens
    Equal,
    EqualEqual,
    BangEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    // Word operators
    And,
    Or,
    Not,

    // Literals and names
    Str(String),
    Number(BigRational),
    Bool(bool),
    Variable(String),
    Keyword(Keyword),

    // Synthetic
    Newline,
    Eof,
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Comma => f.write_str(","),
            TokenKind::LeftBrace => f.write_str("{"),
            TokenKind::RightBrace => f.write_str("}"),
            TokenKind::LeftBracket => f.write_str("["),
            TokenKind::RightBracket => f.write_str("]"),
            TokenKind::LeftParen => f.write_str("("),
            TokenKind::RightParen => f.write_str(")"),
            TokenKind::Semicolon => f.write_str(";"),
            TokenKind::Plus => f.write_str("+"),
            TokenKind::Minus => f.write_str("-"),
            TokenKind::Star => f.write_str("*"),
            TokenKind::Slash => f.write_str("/"),
            TokenKind::Percent => f.write_str("%"),
            TokenKind::Equal => f.write_str("="),
            TokenKind::EqualEqual => f.write_str("=="),
            TokenKind::BangEqual => f.write_str("!="),
            TokenKind::Less => f.write_str("<"),
            TokenKind::LessEqual => f.write_str("<="),
            TokenKind::Greater => f.write_str(">"),
            TokenKind::GreaterEqual => f.write_str(">="),
            TokenKind::And => f.write_str("and"),
            TokenKind::Or => f.write_str("or"),
            TokenKind::Not => f.write_str("not"),
            TokenKind::Str(_) => f.write_str("string"),
            TokenKind::Number(_) => f.write_str("number"),
            TokenKind::Bool(b) => write!(f, "{}", b),
            TokenKind::Variable(name) => f.write_str(name),
            TokenKind::Keyword(kw) => f.write_str(kw.as_str()),
            TokenKind::Newline => f.write_str("newline"),
            TokenKind::Eof => f.write_str("end of file"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub line: Rc<Line>,
    pub start: usize,
    pub length: usize,
    pub kind: TokenKind,
}

impl Token {
    pub fn syntax_error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.line.clone(), self.start, message)
    }
}

struct Tokenizer {
    line: Rc<Line>,
    chars: Vec<char>,
    pos: usize,
}

/// Tokenizes one line of source. The result always ends with a synthetic
/// newline token; `#` starts a comment running to the end of the line.
pub fn tokenize(line: &Rc<Line>) -> Result<Vec<Token>, SyntaxError> {
    let mut tokenizer = Tokenizer {
        line: line.clone(),
        chars: line.text.chars().collect(),
        pos: 0,
    };
    let mut tokens = Vec::new();
    while let Some(token) = tokenizer.next()? {
        tokens.push(token);
    }
    tokens.push(Token {
        line: line.clone(),
        start: tokenizer.chars.len(),
        length: 1,
        kind: TokenKind::Newline,
    });
    Ok(tokens)
}

impl Tokenizer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn error(&self, at: usize, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.line.clone(), at, message)
    }

    fn token(&self, start: usize, kind: TokenKind) -> Token {
        Token {
            line: self.line.clone(),
            start,
            length: self.pos - start,
            kind,
        }
    }

    fn next(&mut self) -> Result<Option<Token>, SyntaxError> {
        while self.peek().map_or(false, char::is_whitespace) {
            self.pos += 1;
        }
        let c = match self.peek() {
            None | Some('#') => return Ok(None),
            Some(c) => c,
        };

        let start = self.pos;
        self.pos += 1;
        let punctuation = match c {
            ',' => Some(TokenKind::Comma),
            '{' => Some(TokenKind::LeftBrace),
            '}' => Some(TokenKind::RightBrace),
            '[' => Some(TokenKind::LeftBracket),
            ']' => Some(TokenKind::RightBracket),
            '(' => Some(TokenKind::LeftParen),
            ')' => Some(TokenKind::RightParen),
            ';' => Some(TokenKind::Semicolon),
            '+' => Some(TokenKind::Plus),
            '-' => Some(TokenKind::Minus),
            '*' => Some(TokenKind::Star),
            '/' => Some(TokenKind::Slash),
            '%' => Some(TokenKind::Percent),
            _ => None,
        };
        if let Some(kind) = punctuation {
            return Ok(Some(self.token(start, kind)));
        }

        match c {
            '"' => {
                self.pos = start;
                return self.string().map(Some);
            }
            '=' | '<' | '>' => {
                let eq = self.peek() == Some('=');
                if eq {
                    self.pos += 1;
                }
                let kind = match (c, eq) {
                    ('=', false) => TokenKind::Equal,
                    ('=', true) => TokenKind::EqualEqual,
                    ('<', false) => TokenKind::Less,
                    ('<', true) => TokenKind::LessEqual,
                    ('>', false) => TokenKind::Greater,
                    _ => TokenKind::GreaterEqual,
                };
                return Ok(Some(self.token(start, kind)));
            }
            '!' => {
                if self.peek() != Some('=') {
                    return Err(self.error(
                        start,
                        "Unexpected exclamation point. Did you mean \"!=\"?",
                    ));
                }
                self.pos += 1;
                return Ok(Some(self.token(start, TokenKind::BangEqual)));
            }
            _ => self.pos = start,
        }

        if c.is_numeric() || c == '.' {
            return self.number().map(Some);
        }
        if c.is_alphabetic() || c == '_' {
            return Ok(Some(self.word()));
        }
        Err(self.error(start, format!("Unexpected character: {:?}", c)))
    }

    fn number(&mut self) -> Result<Token, SyntaxError> {
        let start = self.pos;
        let mut decimal_at = None;
        while let Some(c) = self.peek() {
            if c == '.' {
                if decimal_at.is_some() {
                    return Err(self.error(self.pos, "Unexpected second decimal point"));
                }
                decimal_at = Some(self.pos);
            } else if !c.is_numeric() {
                break;
            }
            self.pos += 1;
        }
        if decimal_at.is_some() && self.pos - start == 1 {
            return Err(self.error(
                self.pos - 1,
                "Number expected before or after decimal point",
            ));
        }
        match self.peek() {
            Some(c) if c.is_alphabetic() => {
                return Err(self.error(self.pos, "Unexpected letter after number"));
            }
            Some('_') => {
                return Err(self.error(self.pos, "Unexpected underscore after number"));
            }
            _ => {}
        }

        let digits: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '.')
            .collect();
        let mantissa: BigInt = digits
            .parse()
            .map_err(|_| self.error(start, format!("Invalid number: {:?}", digits)))?;
        let scale = match decimal_at {
            Some(at) => self.pos - at - 1,
            None => 0,
        };
        let denom = BigInt::from(10u32).pow(scale as u32);
        Ok(self.token(start, TokenKind::Number(BigRational::new(mantissa, denom))))
    }

    fn word(&mut self) -> Token {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !c.is_alphanumeric() && c != '.' && c != '_' {
                break;
            }
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        let kind = match name.to_lowercase().as_str() {
            "true" => TokenKind::Bool(true),
            "false" => TokenKind::Bool(false),
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            lowered => match Keyword::from_name(lowered) {
                Some(kw) => TokenKind::Keyword(kw),
                None => TokenKind::Variable(name.clone()),
            },
        };
        self.token(start, kind)
    }

    fn string(&mut self) -> Result<Token, SyntaxError> {
        let start = self.pos;
        self.pos += 1;
        let mut decoded = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                '"' => return Ok(self.token(start, TokenKind::Str(decoded))),
                '\\' => {
                    let escape = match self.peek() {
                        None => break,
                        Some(e) => e,
                    };
                    decoded.push(match escape {
                        '\\' => '\\',
                        '"' => '"',
                        'n' => '\n',
                        't' => '\t',
                        _ => {
                            return Err(self.error(
                                self.pos - 1,
                                format!(
                                    "String escape value unknown: \\{}.\n\
                                     Expected one of \\\\, \\\", \\n, or \\t",
                                    escape
                                ),
                            ));
                        }
                    });
                    self.pos += 1;
                }
                _ => decoded.push(c),
            }
        }
        Err(self.error(start, "String started but not ended."))
    }
}

/// Buffers tokens from the tokenizer across line boundaries. When the
/// current line runs dry the underlying line source is asked for more input;
/// once it is exhausted every call yields a synthetic eof token.
pub struct TokenSource {
    source: Box<dyn LineSource>,
    tokens: VecDeque<Token>,
    pushed: Vec<Token>,
}

impl TokenSource {
    pub fn new(source: Box<dyn LineSource>) -> Self {
        TokenSource {
            source,
            tokens: VecDeque::new(),
            pushed: Vec::new(),
        }
    }

    pub fn next(&mut self) -> Result<Token, Error> {
        if let Some(token) = self.pushed.pop() {
            return Ok(token);
        }
        loop {
            if let Some(token) = self.tokens.pop_front() {
                return Ok(token);
            }
            match self.source.next_line()? {
                Some(line) => self.tokens.extend(tokenize(&line)?),
                None => {
                    let (filename, lineno) = self.source.pos();
                    return Ok(Token {
                        line: Rc::new(Line {
                            filename,
                            lineno,
                            text: String::new(),
                        }),
                        start: 0,
                        length: 1,
                        kind: TokenKind::Eof,
                    });
                }
            }
        }
    }

    pub fn push(&mut self, token: Token) {
        self.pushed.push(token);
    }

    /// Discards everything buffered from the current line, including pushed
    /// tokens. The REPL calls this after an error so the rest of the bad
    /// line cannot be misread as new statements.
    pub fn reset_line(&mut self) {
        self.tokens.clear();
        self.pushed.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn line(text: &str) -> Rc<Line> {
        Rc::new(Line {
            filename: "test".into(),
            lineno: 1,
            text: text.to_string(),
        })
    }

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(&line(text))
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn rat(n: i64, d: i64) -> BigRational {
        BigRational::new(BigInt::from(n), BigInt::from(d))
    }

    #[test]
    fn test_statement_tokens() {
        assert_eq!(
            kinds("var x = 1;"),
            vec![
                TokenKind::Keyword(Keyword::Var),
                TokenKind::Variable("x".to_string()),
                TokenKind::Equal,
                TokenKind::Number(rat(1, 1)),
                TokenKind::Semicolon,
                TokenKind::Newline,
            ]
        );
    }

    #[test]
    fn test_comment_runs_to_end_of_line() {
        assert_eq!(
            kinds("x # var y = 2"),
            vec![TokenKind::Variable("x".to_string()), TokenKind::Newline]
        );
    }

    #[test]
    fn test_two_character_operators() {
        assert_eq!(
            kinds("= == <= < >= > !="),
            vec![
                TokenKind::Equal,
                TokenKind::EqualEqual,
                TokenKind::LessEqual,
                TokenKind::Less,
                TokenKind::GreaterEqual,
                TokenKind::Greater,
                TokenKind::BangEqual,
                TokenKind::Newline,
            ]
        );
    }

    #[test]
    fn test_decimal_literals_are_exact() {
        assert_eq!(
            kinds("1.5 0.25 .5 7."),
            vec![
                TokenKind::Number(rat(3, 2)),
                TokenKind::Number(rat(1, 4)),
                TokenKind::Number(rat(1, 2)),
                TokenKind::Number(rat(7, 1)),
                TokenKind::Newline,
            ]
        );
    }

    #[test]
    fn test_number_errors() {
        assert!(tokenize(&line("1.2.3")).is_err());
        assert!(tokenize(&line(".")).is_err());
        assert!(tokenize(&line("12x")).is_err());
        assert!(tokenize(&line("12_")).is_err());
    }

    #[test]
    fn test_string_escapes_are_decoded() {
        assert_eq!(
            kinds(r#""a\"b\\c\nd\te""#),
            vec![
                TokenKind::Str("a\"b\\c\nd\te".to_string()),
                TokenKind::Newline,
            ]
        );
    }

    #[test]
    fn test_bad_escape_is_a_syntax_error() {
        let err = tokenize(&line(r#""a\qb""#)).unwrap_err();
        assert!(err.to_string().contains("String escape value unknown"));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize(&line("\"abc")).unwrap_err();
        assert!(err.to_string().contains("String started but not ended."));
    }

    #[test]
    fn test_lone_exclamation_point() {
        let err = tokenize(&line("1 ! 2")).unwrap_err();
        assert!(err.to_string().contains("Did you mean \"!=\"?"));
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert_eq!(
            kinds("WHILE While TRUE Not"),
            vec![
                TokenKind::Keyword(Keyword::While),
                TokenKind::Keyword(Keyword::While),
                TokenKind::Bool(true),
                TokenKind::Not,
                TokenKind::Newline,
            ]
        );
    }

    #[test]
    fn test_variable_names_keep_their_case() {
        assert_eq!(
            kinds("Thing x.y _a"),
            vec![
                TokenKind::Variable("Thing".to_string()),
                TokenKind::Variable("x.y".to_string()),
                TokenKind::Variable("_a".to_string()),
                TokenKind::Newline,
            ]
        );
    }

    #[test]
    fn test_error_columns_count_characters() {
        let err = tokenize(&line("héllo !")).unwrap_err();
        // 1-based in the rendered message: h-é-l-l-o-space puts ! at 7
        assert!(err.to_string().contains("character 7"), "{}", err);
    }

    #[test]
    fn test_token_source_crosses_lines() {
        use crate::source::ReaderLineSource;
        let mut tokens = TokenSource::new(Box::new(ReaderLineSource::new(
            "test",
            "var x\nx = 1\n".as_bytes(),
        )));
        let mut kinds = Vec::new();
        loop {
            let token = tokens.next().unwrap();
            let done = token.kind == TokenKind::Eof;
            kinds.push(token.kind);
            if done {
                break;
            }
        }
        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword(Keyword::Var),
                TokenKind::Variable("x".to_string()),
                TokenKind::Newline,
                TokenKind::Variable("x".to_string()),
                TokenKind::Equal,
                TokenKind::Number(rat(1, 1)),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
        // eof repeats forever
        assert_eq!(tokens.next().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn test_token_source_push_back() {
        use crate::source::ReaderLineSource;
        let mut tokens =
            TokenSource::new(Box::new(ReaderLineSource::new("test", "a b\n".as_bytes())));
        let a = tokens.next().unwrap();
        let b = tokens.next().unwrap();
        tokens.push(b.clone());
        tokens.push(a.clone());
        assert_eq!(tokens.next().unwrap(), a);
        assert_eq!(tokens.next().unwrap(), b);
    }

    #[test]
    fn test_reset_line_discards_buffered_tokens() {
        use crate::source::ReaderLineSource;
        let mut tokens = TokenSource::new(Box::new(ReaderLineSource::new(
            "test",
            "a b c\nnext\n".as_bytes(),
        )));
        assert_eq!(
            tokens.next().unwrap().kind,
            TokenKind::Variable("a".to_string())
        );
        tokens.reset_line();
        assert_eq!(
            tokens.next().unwrap().kind,
            TokenKind::Variable("next".to_string())
        );
    }
}
