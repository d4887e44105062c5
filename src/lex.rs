/// #Notes
/// Tableau formulas mix structural keywords (IF/THEN/CASE/...) with free-form
///  arithmetic that the target grammar accepts token-for-token. The lexer
///  therefore never fails: anything it does not recognize becomes an `Other`
///  token and the parser decides whether that is a problem. Keywords are
///  matched case-insensitively as whole words; the token spans preserve the
///  original casing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TokenType {
    ParenLeft,
    ParenRight,
    Comma,
    Operator, // = <> != < > <= >=
    Number,
    Str,      // quoted string literal, quotes included in the span
    FieldRef, // [Field Name], brackets included in the span
    If,
    Then,
    ElseIf,
    Else,
    End,
    Case,
    When,
    Word,  // identifiers and function names
    Other, // catch-all, deferred to the parser
}

impl TokenType {
    /// Keywords that terminate a simple token run inside an IF/CASE body.
    pub fn ends_simple_run(self) -> bool {
        matches!(
            self,
            Self::Then | Self::ElseIf | Self::Else | Self::End | Self::When
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub ty: TokenType,

    // Byte indexes into the source
    pub start: usize,
    pub end: usize,
}

impl Token {
    /// Returns the slice of the source that this token was lexed from.
    #[inline]
    pub fn text<'input>(&self, source: &'input str) -> &'input str {
        &source[self.start..self.end]
    }
}

/// Case-insensitive whole-word keyword lookup; everything else is a Word.
fn keyword_or_word(text: &[u8]) -> TokenType {
    match text {
        t if t.eq_ignore_ascii_case(b"if") => TokenType::If,
        t if t.eq_ignore_ascii_case(b"then") => TokenType::Then,
        t if t.eq_ignore_ascii_case(b"elseif") => TokenType::ElseIf,
        t if t.eq_ignore_ascii_case(b"else") => TokenType::Else,
        t if t.eq_ignore_ascii_case(b"end") => TokenType::End,
        t if t.eq_ignore_ascii_case(b"case") => TokenType::Case,
        t if t.eq_ignore_ascii_case(b"when") => TokenType::When,
        _ => TokenType::Word,
    }
}

// Word runs also swallow non-ASCII bytes so that token boundaries always
//  fall on UTF-8 character boundaries.
#[inline]
fn is_word_byte(b: u8) -> bool {
    matches!(b, b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_') || b >= 0x80
}

/// This type simply holds a reference to the source bytes and an index, so
///  it's cheap to copy.
#[derive(Clone)]
pub struct Lexer<'input> {
    source: &'input [u8],
    current: usize,
}

impl<'input> Lexer<'input> {
    pub fn new(source: &'input str) -> Self {
        Self {
            source: source.as_bytes(),
            current: 0,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.current >= self.source.len()
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.source.get(self.current).copied()
    }

    #[inline]
    fn pop_unchecked(&mut self) -> u8 {
        let res = self.source[self.current];
        self.current += 1;
        res
    }

    /// If current starts with [prefix], consume it and return true.
    fn consume1(&mut self, prefix: u8) -> bool {
        if let Some(c) = self.peek()
            && c == prefix
        {
            self.current += 1;
            true
        } else {
            false
        }
    }

    #[inline]
    fn consume_while(&mut self, predicate: impl Fn(u8) -> bool) {
        while let Some(c) = self.peek()
            && predicate(c)
        {
            self.current += 1;
        }
    }

    #[inline]
    fn consume_whitespace(&mut self) {
        self.consume_while(|b| b.is_ascii_whitespace());
    }

    fn consume_number(&mut self) {
        self.consume_while(|b| b.is_ascii_digit());

        // Optional dot followed by zero or more digits
        if let Some(b'.') = self.peek() {
            self.current += 1;
            self.consume_while(|b| b.is_ascii_digit());
        }
    }

    pub fn next_token(&mut self) -> Option<Token> {
        self.consume_whitespace();

        if self.is_empty() {
            return None;
        }
        let start = self.current;

        // Convenience macro for returning a token from `start` to `self.current`
        macro_rules! tok {
            ($name:ident) => {{
                Token {
                    ty: TokenType::$name,
                    start,
                    end: self.current,
                }
            }};
        }

        Some(match self.pop_unchecked() {
            b'(' => tok!(ParenLeft),
            b')' => tok!(ParenRight),
            b',' => tok!(Comma),
            b'=' => tok!(Operator),
            b'<' => {
                // <> or <= or <
                let _ = self.consume1(b'>') || self.consume1(b'=');
                tok!(Operator)
            }
            b'>' => {
                let _ = self.consume1(b'=');
                tok!(Operator)
            }
            b'!' => {
                if self.consume1(b'=') {
                    tok!(Operator)
                } else {
                    tok!(Other)
                }
            }

            // Bracketed field reference. An unterminated bracket runs to the
            //  end of input rather than erroring.
            b'[' => {
                self.consume_while(|b| b != b']');
                let _ = self.consume1(b']');
                tok!(FieldRef)
            }

            // String literals; same permissive treatment of an unterminated
            //  quote. Escape sequences are not a thing in this grammar.
            term if term == b'\'' || term == b'"' => {
                self.consume_while(|b| b != term);
                let _ = self.consume1(term);
                tok!(Str)
            }

            b'0'..=b'9' => {
                self.consume_number();
                tok!(Number)
            }

            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                self.consume_while(is_word_byte);
                Token {
                    ty: keyword_or_word(&self.source[start..self.current]),
                    start,
                    end: self.current,
                }
            }

            _ => {
                // Multi-byte characters land here; take their continuation
                //  bytes too so the span stays on a char boundary
                self.consume_while(|b| b & 0xC0 == 0x80);
                tok!(Other)
            }
        })
    }
}

/// Lexes the whole input into an ordered token list.
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::with_capacity(32);
    while let Some(tok) = lexer.next_token() {
        tokens.push(tok);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! assert_tok {
        ($toks:ident, $i:expr, $tok_ty:ident) => {{
            let tok = $toks.get($i);
            assert!(
                matches!(
                    tok,
                    Some(Token {
                        ty: TokenType::$tok_ty,
                        ..
                    })
                ),
                "Expected {} at index {}, got {tok:?}",
                stringify!($tok_ty),
                $i
            );
        }};
    }
    macro_rules! assert_toks {
        ($source:expr, $($tok_ty:ident),+ $(,)?) => {{
            let toks = tokenize($source);
            let mut i = 0;
            $(
                assert_tok!(toks, i, $tok_ty);
                i += 1;
            )+
            assert_eq!(toks.len(), i, "trailing tokens: {:?}", &toks[i..]);
        }};
    }

    #[test]
    fn lex_basic() {
        //NOTE checking that the token boundaries are correct as well.
        //              0         1         2
        //              0123456789012345678901234567
        let source = r#"IF [Total Sales] > 0.5 THEN"#;
        let toks = tokenize(source);
        assert_eq!(
            toks[0],
            Token {
                ty: TokenType::If,
                start: 0,
                end: 2
            }
        );
        assert_eq!(
            toks[1],
            Token {
                ty: TokenType::FieldRef,
                start: 3,
                end: 16
            }
        );
        assert_eq!(toks[1].text(source), "[Total Sales]");
        assert_eq!(
            toks[2],
            Token {
                ty: TokenType::Operator,
                start: 17,
                end: 18
            }
        );
        assert_eq!(
            toks[3],
            Token {
                ty: TokenType::Number,
                start: 19,
                end: 22
            }
        );
        assert_eq!(
            toks[4],
            Token {
                ty: TokenType::Then,
                start: 23,
                end: 27
            }
        );
    }

    #[test]
    fn lex_keywords_case_insensitive() {
        assert_toks!(
            "if Then ELSEIF eLsE end CASE when",
            If, Then, ElseIf, Else, End, Case, When
        );
        // Casing is preserved in the span
        let toks = tokenize("elseIf");
        assert_eq!(toks[0].text("elseIf"), "elseIf");
    }

    #[test]
    fn lex_keywords_whole_word_only() {
        assert_toks!("iffy endgame CASEY", Word, Word, Word);
    }

    #[test]
    fn lex_comparisons() {
        assert_toks!(
            "= <> != < > <= >=",
            Operator, Operator, Operator, Operator, Operator, Operator, Operator
        );
    }

    #[test]
    fn lex_call_shape() {
        assert_toks!(
            "SUM([Sales]) / COUNTD([Order ID])",
            Word, ParenLeft, FieldRef, ParenRight, Other, Word, ParenLeft, FieldRef, ParenRight
        );
    }

    #[test]
    fn lex_strings() {
        let source = r#""East" 'West'"#;
        let toks = tokenize(source);
        assert_eq!(toks[0].ty, TokenType::Str);
        assert_eq!(toks[0].text(source), r#""East""#);
        assert_eq!(toks[1].ty, TokenType::Str);
        assert_eq!(toks[1].text(source), "'West'");
    }

    #[test]
    fn lex_numbers() {
        let source = "12.5 7 0.25";
        let toks = tokenize(source);
        assert_eq!(toks.len(), 3);
        assert_eq!(toks[0].text(source), "12.5");
        assert_eq!(toks[1].text(source), "7");
        assert_eq!(toks[2].text(source), "0.25");
    }

    #[test]
    fn lex_unterminated_is_permissive() {
        // No gap, no error: the run simply extends to the end of input
        let toks = tokenize("[Sales");
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].ty, TokenType::FieldRef);
        assert_eq!(toks[0].text("[Sales"), "[Sales");

        let toks = tokenize("\"East");
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].ty, TokenType::Str);
    }

    #[test]
    fn lex_catch_all() {
        assert_toks!("@ # + - * /", Other, Other, Other, Other, Other, Other);
    }

    #[test]
    fn lex_multibyte_other_spans_whole_char() {
        let source = "é § café";
        let toks = tokenize(source);
        assert_eq!(toks[0].ty, TokenType::Other);
        assert_eq!(toks[0].text(source), "é");
        assert_eq!(toks[1].ty, TokenType::Other);
        assert_eq!(toks[1].text(source), "§");
        // Non-ASCII inside an identifier run stays part of the Word
        assert_eq!(toks[2].ty, TokenType::Word);
        assert_eq!(toks[2].text(source), "café");
    }
}
