use std::collections::HashMap;
use std::fmt;

/// Represents the position of a token in the source code.
///
/// `offset` is a character index into the source, which lets the parser slice the
/// original text of a declaration back out.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

/// All possible token types in SolvraScript
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,

    Identifier(String),

    // Keywords
    Let,
    Fn,
    If,
    Else,
    While,
    For,
    In,
    Return,
    Yield,
    Break,
    Continue,
    Import,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Equal,
    EqualEqual,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    And,
    Or,
    Not,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Semicolon,
    Colon,
    Dot,
    At,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Integer(n) => write!(f, "{}", n),
            TokenKind::Float(n) => write!(f, "{}", n),
            TokenKind::String(s) => write!(f, "\"{}\"", s),
            TokenKind::Boolean(b) => write!(f, "{}", b),
            TokenKind::Null => write!(f, "null"),
            TokenKind::Identifier(s) => write!(f, "{}", s),
            _ => write!(f, "{:?}", self),
        }
    }
}

/// A token with its kind and position information
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, position: Position) -> Self {
        Self { kind, position }
    }
}

/// Tokenizer for SolvraScript
pub struct Tokenizer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    keywords: HashMap<&'static str, TokenKind>,
    tokens: Vec<Token>,
}

impl Tokenizer {
    pub fn new(input: &str) -> Self {
        let mut keywords = HashMap::new();
        keywords.insert("let", TokenKind::Let);
        keywords.insert("fn", TokenKind::Fn);
        keywords.insert("if", TokenKind::If);
        keywords.insert("else", TokenKind::Else);
        keywords.insert("while", TokenKind::While);
        keywords.insert("for", TokenKind::For);
        keywords.insert("in", TokenKind::In);
        keywords.insert("return", TokenKind::Return);
        keywords.insert("yield", TokenKind::Yield);
        keywords.insert("break", TokenKind::Break);
        keywords.insert("continue", TokenKind::Continue);
        keywords.insert("import", TokenKind::Import);
        keywords.insert("and", TokenKind::And);
        keywords.insert("or", TokenKind::Or);
        keywords.insert("not", TokenKind::Not);
        keywords.insert("null", TokenKind::Null);
        keywords.insert("true", TokenKind::Boolean(true));
        keywords.insert("false", TokenKind::Boolean(false));

        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            keywords,
            tokens: Vec::new(),
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, String> {
        loop {
            self.skip_whitespace_and_comments();
            if self.is_at_end() {
                break;
            }

            let start = self.current_position();
            let ch = self.current_char();
            let kind = if ch == '"' {
                self.handle_string()?
            } else if ch.is_ascii_digit() {
                self.handle_number()?
            } else if ch.is_alphabetic() || ch == '_' {
                self.handle_identifier()
            } else {
                self.handle_operator_or_delimiter()?
            };
            self.tokens.push(Token::new(kind, start));
        }

        let end = self.current_position();
        self.tokens.push(Token::new(TokenKind::Eof, end));
        Ok(std::mem::take(&mut self.tokens))
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn current_char(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.input[self.position]
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) -> char {
        let ch = self.current_char();
        self.position += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        ch
    }

    fn current_position(&self) -> Position {
        Position::new(self.line, self.column, self.position)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while !self.is_at_end() && self.current_char().is_whitespace() {
                self.advance();
            }
            if self.current_char() == '/' && self.peek_char() == Some('/') {
                while !self.is_at_end() && self.current_char() != '\n' {
                    self.advance();
                }
                continue;
            }
            break;
        }
    }

    fn handle_string(&mut self) -> Result<TokenKind, String> {
        self.advance(); // consume opening quote

        let mut string_value = String::new();
        while !self.is_at_end() && self.current_char() != '"' {
            if self.current_char() == '\\' {
                self.advance();
                if self.is_at_end() {
                    return Err("Unterminated string literal".to_string());
                }
                match self.current_char() {
                    'n' => string_value.push('\n'),
                    't' => string_value.push('\t'),
                    'r' => string_value.push('\r'),
                    '\\' => string_value.push('\\'),
                    '"' => string_value.push('"'),
                    other => {
                        string_value.push('\\');
                        string_value.push(other);
                    }
                }
                self.advance();
            } else {
                string_value.push(self.advance());
            }
        }

        if self.is_at_end() {
            return Err(format!(
                "Unterminated string literal starting on line {}",
                self.line
            ));
        }

        self.advance(); // consume closing quote
        Ok(TokenKind::String(string_value))
    }

    fn handle_number(&mut self) -> Result<TokenKind, String> {
        let mut number = String::new();
        let mut is_float = false;

        while !self.is_at_end() {
            let ch = self.current_char();
            if ch.is_ascii_digit() {
                number.push(self.advance());
            } else if ch == '.'
                && !is_float
                && self.peek_char().is_some_and(|next| next.is_ascii_digit())
            {
                is_float = true;
                number.push(self.advance());
            } else {
                break;
            }
        }

        if is_float {
            number
                .parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| format!("Invalid float literal: {}", number))
        } else {
            number
                .parse::<i64>()
                .map(TokenKind::Integer)
                .map_err(|_| format!("Invalid integer literal: {}", number))
        }
    }

    fn handle_identifier(&mut self) -> TokenKind {
        let mut identifier = String::new();
        while !self.is_at_end()
            && (self.current_char().is_alphanumeric() || self.current_char() == '_')
        {
            identifier.push(self.advance());
        }
        self.keywords
            .get(identifier.as_str())
            .cloned()
            .unwrap_or(TokenKind::Identifier(identifier))
    }

    fn handle_operator_or_delimiter(&mut self) -> Result<TokenKind, String> {
        let line = self.line;
        let ch = self.advance();

        let token_kind = match ch {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' => self.select('=', TokenKind::EqualEqual, TokenKind::Equal),
            '!' => self.select('=', TokenKind::NotEqual, TokenKind::Not),
            '<' => self.select('=', TokenKind::LessEqual, TokenKind::Less),
            '>' => self.select('=', TokenKind::GreaterEqual, TokenKind::Greater),
            '&' if self.current_char() == '&' => {
                self.advance();
                TokenKind::And
            }
            '|' if self.current_char() == '|' => {
                self.advance();
                TokenKind::Or
            }
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            '@' => TokenKind::At,
            _ => return Err(format!("Unexpected character '{}' on line {}", ch, line)),
        };

        Ok(token_kind)
    }

    fn select(&mut self, next: char, matched: TokenKind, otherwise: TokenKind) -> TokenKind {
        if self.current_char() == next {
            self.advance();
            matched
        } else {
            otherwise
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Tokenizer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_tokenization() {
        let expected_kinds = vec![
            TokenKind::Let,
            TokenKind::Identifier("x".to_string()),
            TokenKind::Equal,
            TokenKind::Integer(5),
            TokenKind::Plus,
            TokenKind::Integer(3),
            TokenKind::Star,
            TokenKind::LeftParen,
            TokenKind::Integer(2),
            TokenKind::Minus,
            TokenKind::Integer(1),
            TokenKind::RightParen,
            TokenKind::Semicolon,
            TokenKind::Eof,
        ];
        assert_eq!(kinds("let x = 5 + 3 * (2 - 1);"), expected_kinds);
    }

    #[test]
    fn test_keywords_and_decorators() {
        let expected_kinds = vec![
            TokenKind::At,
            TokenKind::Identifier("udf_map".to_string()),
            TokenKind::Fn,
            TokenKind::Yield,
            TokenKind::And,
            TokenKind::Not,
            TokenKind::Null,
            TokenKind::Boolean(false),
            TokenKind::Eof,
        ];
        assert_eq!(kinds("@udf_map fn yield and not null false"), expected_kinds);
    }

    #[test]
    fn test_numbers_and_member_access() {
        let expected_kinds = vec![
            TokenKind::Integer(42),
            TokenKind::Float(123.456),
            TokenKind::Identifier("rec".to_string()),
            TokenKind::Dot,
            TokenKind::Identifier("field".to_string()),
            TokenKind::Eof,
        ];
        assert_eq!(kinds("42 123.456 rec.field"), expected_kinds);
    }

    #[test]
    fn test_comments_are_skipped() {
        let expected_kinds = vec![
            TokenKind::Let,
            TokenKind::Identifier("x".to_string()),
            TokenKind::Equal,
            TokenKind::String("a\"b".to_string()),
            TokenKind::Semicolon,
            TokenKind::Eof,
        ];
        assert_eq!(
            kinds("// leading comment\nlet x = \"a\\\"b\"; // trailing"),
            expected_kinds
        );
    }

    #[test]
    fn test_position_tracking() {
        let tokens = Tokenizer::new("let\n  x = 5").tokenize().unwrap();
        let x_token = tokens
            .iter()
            .find(|t| matches!(t.kind, TokenKind::Identifier(ref name) if name == "x"))
            .unwrap();
        assert_eq!(x_token.position.line, 2);
        assert_eq!(x_token.position.column, 3);
        assert_eq!(x_token.position.offset, 6);
    }

    #[test]
    fn test_unterminated_string_is_an_error() {
        assert!(Tokenizer::new("\"open").tokenize().is_err());
    }
}
