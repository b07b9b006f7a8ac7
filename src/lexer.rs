use crate::error::{CompileError, Location};
use crate::intern::Interner;
use crate::token::{Keyword, Span, Symb, Token, TokenKind};
use std::path::PathBuf;

/// Indentation-sensitive lexer (§4.2). Maintains a column-width stack and
/// synthesizes INDENT/DEDENT/NEWLINE tokens as it walks the source a line
/// at a time; within a line it tokenizes the source dialect's closed
/// keyword/punctuation vocabulary directly (the natural-language front end
/// this is adapted from needed a second word-classification stage; a fixed
/// keyword set does not).
pub struct Lexer<'a> {
    unit: PathBuf,
    interner: &'a mut Interner,
    chars: Vec<char>,
    pos: usize,
    line: u32,
    /// Absolute offset of the first character of the current line, so
    /// column numbers can be computed relative to it (`self.pos` is an
    /// absolute whole-file index, not a per-line one).
    line_start: usize,
    indent_stack: Vec<usize>,
    tab_width: usize,
    tokens: Vec<Token>,
    at_line_start: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(unit: PathBuf, source: &str, interner: &'a mut Interner, tab_width: usize) -> Self {
        Lexer {
            unit,
            interner,
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            line_start: 0,
            indent_stack: vec![0],
            tab_width,
            tokens: Vec::new(),
            at_line_start: true,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn err(&self, line: u32, column: u32, detail: impl Into<String>) -> CompileError {
        CompileError::Lexical {
            loc: Location::new(self.unit.clone(), Span::new(line, column)),
            detail: detail.into(),
        }
    }

    /// Tokenize the whole unit, returning the final token stream ending in
    /// a trailing `Eof` token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, CompileError> {
        loop {
            if self.at_line_start {
                if !self.start_of_line()? {
                    break;
                }
            }
            match self.peek() {
                None => break,
                Some('\n') => {
                    self.advance();
                    self.push(TokenKind::Newline, "");
                    self.line += 1;
                    self.line_start = self.pos;
                    self.at_line_start = true;
                }
                Some(_) => self.lex_token()?,
            }
        }

        // Final dedents back to column 0, then EOF.
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.push(TokenKind::Dedent, "");
        }
        self.push(TokenKind::Eof, "");
        Ok(self.tokens)
    }

    /// Handles blank-line/comment-line skipping and INDENT/DEDENT
    /// synthesis at the start of a logical line. Returns `false` at EOF.
    fn start_of_line(&mut self) -> Result<bool, CompileError> {
        loop {
            if self.pos >= self.chars.len() {
                return Ok(false);
            }
            if self.is_blank_or_comment_line() {
                self.skip_line();
                continue;
            }
            break;
        }

        let width = self.measure_indent();
        let top = *self.indent_stack.last().unwrap();
        if width > top {
            self.indent_stack.push(width);
            self.push(TokenKind::Indent, "");
        } else if width < top {
            while *self.indent_stack.last().unwrap() > width {
                self.indent_stack.pop();
                self.push(TokenKind::Dedent, "");
            }
            if *self.indent_stack.last().unwrap() != width {
                return Err(self.err(self.line, width as u32 + 1, "inconsistent dedent"));
            }
        }
        self.at_line_start = false;
        Ok(true)
    }

    fn is_blank_or_comment_line(&self) -> bool {
        let mut p = self.pos;
        while let Some(c) = self.chars.get(p) {
            match c {
                ' ' | '\t' => p += 1,
                '\n' => return true,
                '#' => return true,
                _ => return false,
            }
        }
        true
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                self.advance();
                break;
            }
            self.advance();
        }
        self.line += 1;
        self.line_start = self.pos;
    }

    /// Measures indentation width (tabs expand to `tab_width`) and leaves
    /// `self.pos` at the first non-whitespace column.
    fn measure_indent(&mut self) -> usize {
        let mut width = 0;
        loop {
            match self.peek() {
                Some(' ') => {
                    width += 1;
                    self.advance();
                }
                Some('\t') => {
                    width += self.tab_width;
                    self.advance();
                }
                _ => break,
            }
        }
        width
    }

    fn push(&mut self, kind: TokenKind, lexeme: &str) {
        let sym = self.interner.intern(lexeme);
        self.tokens.push(Token::new(kind, sym, Span::new(self.line, 1)));
    }

    fn push_at(&mut self, kind: TokenKind, lexeme: &str, col: u32) {
        let sym = self.interner.intern(lexeme);
        self.tokens.push(Token::new(kind, sym, Span::new(self.line, col)));
    }

    fn lex_token(&mut self) -> Result<(), CompileError> {
        let col = (self.pos - self.line_start) as u32 + 1;
        let c = self.peek().unwrap();

        if c == ' ' || c == '\t' {
            self.advance();
            return Ok(());
        }
        if c == '#' {
            // Inline or full-line comment: discard to end of line.
            while let Some(c) = self.peek() {
                if c == '\n' {
                    break;
                }
                self.advance();
            }
            return Ok(());
        }
        if c == '"' && self.peek_at(1) == Some('"') && self.peek_at(2) == Some('"') {
            return self.lex_doc_string();
        }
        if c == '"' {
            return self.lex_string(col);
        }
        if c.is_ascii_digit() {
            return self.lex_number(col);
        }
        if c.is_alphabetic() || c == '_' {
            return self.lex_ident(col);
        }
        self.lex_symbol(col)
    }

    fn lex_doc_string(&mut self) -> Result<(), CompileError> {
        self.advance();
        self.advance();
        self.advance();
        loop {
            match self.peek() {
                None => {
                    return Err(self.err(self.line, 1, "unterminated \"\"\" string"));
                }
                Some('\n') => {
                    self.advance();
                    self.line += 1;
                    self.line_start = self.pos;
                }
                Some('"') if self.peek_at(1) == Some('"') && self.peek_at(2) == Some('"') => {
                    self.advance();
                    self.advance();
                    self.advance();
                    break;
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
        self.swallow_trailing_blank_of_closing_line();
        Ok(())
    }

    /// A doc string must be fully transparent, like a comment line (§4.2):
    /// if nothing but whitespace follows the closing `"""` on its line,
    /// consume through that line's newline here so the outer `tokenize`
    /// loop never emits a stray `Newline` token at a member/statement
    /// boundary. If real content follows on the same line, leave it for
    /// normal lexing to pick up.
    fn swallow_trailing_blank_of_closing_line(&mut self) {
        let mut p = self.pos;
        loop {
            match self.chars.get(p) {
                Some(' ') | Some('\t') => p += 1,
                Some('\n') => {
                    self.pos = p + 1;
                    self.line += 1;
                    self.line_start = self.pos;
                    self.at_line_start = true;
                    return;
                }
                _ => return,
            }
        }
    }

    fn lex_string(&mut self, col: u32) -> Result<(), CompileError> {
        self.advance();
        let mut text = String::new();
        loop {
            match self.advance() {
                None | Some('\n') => {
                    return Err(self.err(self.line, col, "unterminated string literal"));
                }
                Some('"') => break,
                Some('\\') => match self.advance() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('"') => text.push('"'),
                    Some('\\') => text.push('\\'),
                    Some(other) => text.push(other),
                    None => return Err(self.err(self.line, col, "unterminated string literal")),
                },
                Some(c) => text.push(c),
            }
        }
        let sym = self.interner.intern(&text);
        self.tokens.push(Token::new(TokenKind::StringLit(sym), sym, Span::new(self.line, col)));
        Ok(())
    }

    fn lex_number(&mut self, col: u32) -> Result<(), CompileError> {
        let start = self.pos;
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.advance();
            self.advance();
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                self.advance();
            }
            let text: String = self.chars[start..self.pos].iter().collect();
            let value = i64::from_str_radix(&text[2..], 16)
                .map_err(|e| self.err(self.line, col, format!("invalid hex literal: {e}")))?;
            self.push_at(TokenKind::IntLit(value), &text, col);
            return Ok(());
        }

        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let mut is_real = false;
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            is_real = true;
            self.advance();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if is_real {
            let value: f64 = text
                .parse()
                .map_err(|_| self.err(self.line, col, "invalid real literal"))?;
            let sym = self.interner.intern(&text);
            self.tokens.push(Token::new(TokenKind::RealLit(value), sym, Span::new(self.line, col)));
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| self.err(self.line, col, "invalid integer literal"))?;
            let sym = self.interner.intern(&text);
            self.tokens.push(Token::new(TokenKind::IntLit(value), sym, Span::new(self.line, col)));
        }
        Ok(())
    }

    fn lex_ident(&mut self, col: u32) -> Result<(), CompileError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let sym = self.interner.intern(&text);
        let kind = match Keyword::from_str(&text) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Ident(sym),
        };
        self.tokens.push(Token::new(kind, sym, Span::new(self.line, col)));
        Ok(())
    }

    fn lex_symbol(&mut self, col: u32) -> Result<(), CompileError> {
        let two = |l: &Self| -> Option<char> { l.peek_at(1) };
        let c = self.advance().unwrap();
        let (symb, lexeme): (Symb, &str) = match c {
            '(' => (Symb::LParen, "("),
            ')' => (Symb::RParen, ")"),
            '[' => (Symb::LBracket, "["),
            ']' => (Symb::RBracket, "]"),
            '{' => (Symb::LBrace, "{"),
            '}' => (Symb::RBrace, "}"),
            ',' => (Symb::Comma, ","),
            '.' => (Symb::Dot, "."),
            ':' => (Symb::Colon, ":"),
            ';' => (Symb::Semicolon, ";"),
            '*' => (Symb::Star, "*"),
            '~' => (Symb::Tilde, "~"),
            '%' => (Symb::Percent, "%"),
            '/' => (Symb::Slash, "/"),
            '+' => {
                if two(self) == Some('+') {
                    self.advance();
                    (Symb::PlusPlus, "++")
                } else {
                    (Symb::Plus, "+")
                }
            }
            '-' => {
                if two(self) == Some('-') {
                    self.advance();
                    (Symb::MinusMinus, "--")
                } else if two(self) == Some('>') {
                    self.advance();
                    (Symb::Arrow, "->")
                } else {
                    (Symb::Minus, "-")
                }
            }
            '=' => {
                if two(self) == Some('=') {
                    self.advance();
                    (Symb::EqEq, "==")
                } else if two(self) == Some('>') {
                    self.advance();
                    (Symb::FatArrow, "=>")
                } else {
                    (Symb::Assign, "=")
                }
            }
            '!' => {
                if two(self) == Some('=') {
                    self.advance();
                    (Symb::NotEq, "!=")
                } else {
                    (Symb::Bang, "!")
                }
            }
            '<' => {
                if two(self) == Some('=') {
                    self.advance();
                    (Symb::LtEq, "<=")
                } else {
                    (Symb::Lt, "<")
                }
            }
            '>' => {
                if two(self) == Some('=') {
                    self.advance();
                    (Symb::GtEq, ">=")
                } else {
                    (Symb::Gt, ">")
                }
            }
            other => return Err(self.err(self.line, col, format!("unknown character '{other}'"))),
        };
        self.tokens.push(Token::new(TokenKind::Symbol(symb), self.interner.intern(lexeme), Span::new(self.line, col)));
        Ok(())
    }
}
