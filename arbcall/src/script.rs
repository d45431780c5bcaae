//! Tokenizer for bridge scripts.
//!
//! Scripts are whitespace separated: integer literals (`42`, `-1`,
//! `0xff`), double quoted strings with `\n \t \\ \" \0` escapes, and
//! words. `#` starts a comment that runs to the end of the line.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Integer(i128),
    String(Vec<u8>),
    Word(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at byte {}", self.message, self.offset)
    }
}

impl std::error::Error for ParseError {}

pub struct Tokenizer<'a> {
    source: &'a [u8],
    offset: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source: source.as_bytes(),
            offset: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.offset).copied()
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c == b'#' {
                while let Some(c) = self.peek() {
                    if c == b'\n' {
                        break;
                    }
                    self.offset += 1;
                }
            } else if c.is_ascii_whitespace() {
                self.offset += 1;
            } else {
                break;
            }
        }
    }

    fn string(&mut self) -> Result<Token, ParseError> {
        let start = self.offset;
        // opening quote
        self.offset += 1;
        let mut bytes = Vec::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(ParseError::new("unterminated string", start));
            };
            self.offset += 1;
            match c {
                b'"' => return Ok(Token::String(bytes)),
                b'\\' => {
                    let escaped = match self.peek() {
                        Some(b'n') => b'\n',
                        Some(b't') => b'\t',
                        Some(b'0') => 0,
                        Some(b'\\') => b'\\',
                        Some(b'"') => b'"',
                        _ => {
                            return Err(ParseError::new(
                                "unknown escape sequence",
                                self.offset - 1,
                            ));
                        }
                    };
                    self.offset += 1;
                    bytes.push(escaped);
                }
                _ => bytes.push(c),
            }
        }
    }

    fn word(&mut self) -> Result<Token, ParseError> {
        let start = self.offset;
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() {
                break;
            }
            self.offset += 1;
        }
        let text = std::str::from_utf8(&self.source[start..self.offset])
            .map_err(|_| ParseError::new("word is not valid utf-8", start))?;
        match parse_integer(text) {
            Some(Ok(value)) => Ok(Token::Integer(value)),
            Some(Err(())) => {
                Err(ParseError::new(format!("invalid integer '{text}'"), start))
            }
            None => Ok(Token::Word(text.to_string())),
        }
    }
}

/// `None` when `text` does not look like a number at all.
fn parse_integer(text: &str) -> Option<Result<i128, ()>> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if !digits.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let parsed = match digits.strip_prefix("0x") {
        Some(hex) => i128::from_str_radix(hex, 16),
        None => digits.parse::<i128>(),
    };
    Some(
        parsed
            .map(|value| if negative { -value } else { value })
            .map_err(|_| ()),
    )
}

impl Iterator for Tokenizer<'_> {
    type Item = Result<Token, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_trivia();
        let c = self.peek()?;
        Some(if c == b'"' { self.string() } else { self.word() })
    }
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    Tokenizer::new(source).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str) -> Token {
        Token::Word(text.to_string())
    }

    #[test]
    fn test_integers() {
        let tokens = tokenize("0 42 -1 0xff -0x10").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Integer(0),
                Token::Integer(42),
                Token::Integer(-1),
                Token::Integer(255),
                Token::Integer(-16),
            ]
        );
    }

    #[test]
    fn test_full_u64_range() {
        let tokens = tokenize("18446744073709551615").unwrap();
        assert_eq!(tokens, vec![Token::Integer(u64::MAX as i128)]);
    }

    #[test]
    fn test_words_and_dashes() {
        let tokens = tokenize("call-new - -rot call-i8!").unwrap();
        assert_eq!(
            tokens,
            vec![word("call-new"), word("-"), word("-rot"), word("call-i8!")]
        );
    }

    #[test]
    fn test_strings_with_escapes() {
        let tokens = tokenize(r#""hello world" "a\n\"b\"\0""#).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::String(b"hello world".to_vec()),
                Token::String(b"a\n\"b\"\0".to_vec()),
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = tokenize("1 # ignored \"x\n2").unwrap();
        assert_eq!(tokens, vec![Token::Integer(1), Token::Integer(2)]);
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("1 \"abc").unwrap_err();
        assert_eq!(err, ParseError::new("unterminated string", 2));
    }

    #[test]
    fn test_bad_integer() {
        let err = tokenize("12abc").unwrap_err();
        assert_eq!(err.offset, 0);
        assert!(err.to_string().contains("12abc"));
    }

    #[test]
    fn test_bad_escape() {
        assert!(tokenize(r#""\q""#).is_err());
    }
}
