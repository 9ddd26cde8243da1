use crate::token::{AttrValue, Attributes, Span, TagInfo, Token, TokenKind};

/// Scanner state. Each state owns the meaning of the next character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Plain markup text.
    Text,
    /// Between `<` and the closing `>` of a tag.
    InTag,
    /// Inside a quoted attribute value; carries the opening quote.
    InQuote(char),
    /// Inside `<!-- ... -->`.
    InComment,
    /// Inside `{@ ... }`; carries the current brace depth.
    InRawBlock(usize),
}

/// Quill source scanner.
///
/// Single left-to-right pass over the source with an explicit state
/// machine. Never backtracks and never fails: unterminated tags, comments
/// and raw blocks are flushed as best-effort tokens at end of input.
pub struct Scanner {
    chars: Vec<char>,
    pos: usize,
    byte: usize,
    line: usize,
    column: usize,
    state: ScanState,
    buffer: String,
    buffer_start: (usize, usize, usize),
    tokens: Vec<Token>,
}

impl Scanner {
    /// Create a new scanner for the given source.
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            byte: 0,
            line: 1,
            column: 1,
            state: ScanState::Text,
            buffer: String::new(),
            buffer_start: (0, 1, 1),
            tokens: Vec::new(),
        }
    }

    /// Tokenize the entire source into a vector of tokens.
    pub fn tokenize(source: &str) -> Vec<Token> {
        let mut scanner = Scanner::new(source);
        scanner.scan_tokens();
        scanner.tokens
    }

    fn scan_tokens(&mut self) {
        while !self.is_at_end() {
            match self.state {
                ScanState::Text => self.scan_text(),
                ScanState::InTag => self.scan_in_tag(),
                ScanState::InQuote(quote) => self.scan_in_quote(quote),
                ScanState::InComment => self.scan_in_comment(),
                ScanState::InRawBlock(depth) => self.scan_in_raw_block(depth),
            }
        }

        match self.state {
            ScanState::Text => self.flush_text(),
            ScanState::InTag | ScanState::InQuote(_) => self.emit_tag(),
            ScanState::InComment => self.emit(TokenKind::Comment),
            ScanState::InRawBlock(_) => self.emit(TokenKind::RawCode),
        }
    }

    // --- States ---

    fn scan_text(&mut self) {
        if self.starts_with("{@") {
            self.flush_text();
            self.take(2);
            self.state = ScanState::InRawBlock(1);
        } else if self.starts_with("<!--") {
            self.flush_text();
            self.take(4);
            self.state = ScanState::InComment;
        } else if self.starts_with("{$") {
            // a closed marker stays text even if a quoted option holds markup
            let len = self.marker_len().unwrap_or(1);
            self.take(len);
        } else if self.peek() == '<' && (self.peek_next().is_ascii_alphabetic() || self.peek_next() == '/') {
            self.flush_text();
            self.take(1);
            self.state = ScanState::InTag;
        } else {
            self.take(1);
        }
    }

    fn scan_in_tag(&mut self) {
        let ch = self.peek();
        self.take(1);
        match ch {
            '"' | '\'' => self.state = ScanState::InQuote(ch),
            '>' => {
                self.emit_tag();
                self.state = ScanState::Text;
            }
            _ => {}
        }
    }

    fn scan_in_quote(&mut self, quote: char) {
        let ch = self.peek();
        if ch == '\\' {
            // escaped character never closes the quote
            self.take(2);
        } else {
            self.take(1);
            if ch == quote {
                self.state = ScanState::InTag;
            }
        }
    }

    fn scan_in_comment(&mut self) {
        if self.starts_with("-->") {
            self.take(3);
            self.emit(TokenKind::Comment);
            self.state = ScanState::Text;
        } else {
            self.take(1);
        }
    }

    fn scan_in_raw_block(&mut self, depth: usize) {
        let ch = self.peek();
        self.take(1);
        match ch {
            '{' => self.state = ScanState::InRawBlock(depth + 1),
            '}' if depth == 1 => {
                self.emit(TokenKind::RawCode);
                self.state = ScanState::Text;
            }
            '}' => self.state = ScanState::InRawBlock(depth - 1),
            _ => {}
        }
    }

    // --- Token emission ---

    fn flush_text(&mut self) {
        if !self.buffer.is_empty() {
            self.emit(TokenKind::Text);
        }
    }

    fn emit(&mut self, kind: TokenKind) {
        let raw = std::mem::take(&mut self.buffer);
        let span = self.buffer_span();
        self.tokens.push(Token::new(kind, raw, span));
    }

    fn emit_tag(&mut self) {
        let raw = std::mem::take(&mut self.buffer);
        let span = self.buffer_span();
        let info = parse_tag(&raw);
        self.tokens.push(Token::tag(raw, info, span));
    }

    fn buffer_span(&self) -> Span {
        let (start, line, column) = self.buffer_start;
        Span::new(start, self.byte, line, column)
    }

    // --- Helpers ---

    /// Move up to `n` characters from the source into the buffer.
    fn take(&mut self, n: usize) {
        for _ in 0..n {
            if self.is_at_end() {
                return;
            }
            if self.buffer.is_empty() {
                self.buffer_start = (self.byte, self.line, self.column);
            }
            let ch = self.chars[self.pos];
            self.buffer.push(ch);
            self.advance();
        }
    }

    /// Length of the `{$…}` marker at the cursor when its braces balance
    /// before any unquoted `<`.
    fn marker_len(&self) -> Option<usize> {
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        let mut i = self.pos;

        while let Some(&ch) = self.chars.get(i) {
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i + 1 - self.pos);
                    }
                }
                '\\' if quote.is_some() => i += 1,
                '"' | '\'' if quote == Some(ch) => quote = None,
                '"' | '\'' if quote.is_none() => quote = Some(ch),
                '<' if quote.is_none() => return None,
                _ => {}
            }
            i += 1;
        }

        None
    }

    fn starts_with(&self, pattern: &str) -> bool {
        let mut i = self.pos;
        for expected in pattern.chars() {
            if self.chars.get(i) != Some(&expected) {
                return false;
            }
            i += 1;
        }
        true
    }

    fn peek(&self) -> char {
        self.chars.get(self.pos).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.chars.get(self.pos + 1).copied().unwrap_or('\0')
    }

    fn advance(&mut self) {
        if let Some(&ch) = self.chars.get(self.pos) {
            self.pos += 1;
            self.byte += ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }
}

// =========================================================================
// Tag sub-parser
// =========================================================================

/// Parse the raw text of a tag (`<div a="1" b>`, `</div>`, `<br/>`).
///
/// Accepts partial tags left over at end of input; whatever can be
/// recognized is returned.
pub fn parse_tag(raw: &str) -> TagInfo {
    let chars: Vec<char> = raw.chars().collect();
    let mut pos = 0;
    let mut end = chars.len();

    if chars.first() == Some(&'<') {
        pos += 1;
    }
    if end > pos && chars[end - 1] == '>' {
        end -= 1;
    }

    let is_closing = chars.get(pos) == Some(&'/');
    if is_closing {
        pos += 1;
    }

    let is_self_closing = !is_closing && end > pos && chars[end - 1] == '/';
    if is_self_closing {
        end -= 1;
    }

    let mut name = String::new();
    if pos < end && chars[pos].is_ascii_alphabetic() {
        while pos < end && is_name_char(chars[pos]) {
            name.push(chars[pos]);
            pos += 1;
        }
    }

    let mut attributes = Attributes::new();
    if !is_closing {
        parse_attributes(&chars[pos..end], &mut attributes);
    }

    TagInfo {
        name,
        is_closing,
        is_self_closing,
        attributes,
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '.' | '-')
}

fn parse_attributes(chars: &[char], attributes: &mut Attributes) {
    let mut pos = 0;

    loop {
        while pos < chars.len() && chars[pos].is_whitespace() {
            pos += 1;
        }
        if pos >= chars.len() {
            break;
        }

        let mut name = String::new();
        while pos < chars.len()
            && !chars[pos].is_whitespace()
            && !matches!(chars[pos], '=' | '"' | '\'' | '/' | '>')
        {
            name.push(chars[pos]);
            pos += 1;
        }
        if name.is_empty() {
            // stray quote or slash between attributes
            pos += 1;
            continue;
        }

        let mut lookahead = pos;
        while lookahead < chars.len() && chars[lookahead].is_whitespace() {
            lookahead += 1;
        }

        if lookahead < chars.len() && chars[lookahead] == '=' {
            pos = lookahead + 1;
            while pos < chars.len() && chars[pos].is_whitespace() {
                pos += 1;
            }
            let value = match chars.get(pos) {
                Some(&quote) if quote == '"' || quote == '\'' => {
                    pos += 1;
                    read_quoted(chars, &mut pos, quote)
                }
                _ => {
                    let mut value = String::new();
                    while pos < chars.len() && !chars[pos].is_whitespace() {
                        value.push(chars[pos]);
                        pos += 1;
                    }
                    value
                }
            };
            attributes.insert(name, AttrValue::Text(value));
        } else {
            attributes.insert(name, AttrValue::Bool);
        }
    }
}

/// Read a quoted value body; `pos` is just past the opening quote and ends
/// just past the closing one. `\<quote>` yields the quote character.
fn read_quoted(chars: &[char], pos: &mut usize, quote: char) -> String {
    let mut value = String::new();
    while *pos < chars.len() {
        let c = chars[*pos];
        if c == '\\' && chars.get(*pos + 1) == Some(&quote) {
            value.push(quote);
            *pos += 2;
        } else if c == quote {
            *pos += 1;
            return value;
        } else {
            value.push(c);
            *pos += 1;
        }
    }
    value
}
