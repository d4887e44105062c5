use crate::lex::{Token, TokenType, tokenize};

/// DAX null literal used when a conditional carries no ELSE branch.
const BLANK: &str = "BLANK()";

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A structural keyword was required but something else (or nothing)
    ///  was found.
    Expected {
        keyword: &'static str,
        found: Option<String>,
    },
    /// Input continued past the closing END of the conditional.
    TrailingTokens(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expected {
                keyword,
                found: Some(found),
            } => {
                write!(f, "Expected {keyword}, found '{found}'")
            }
            Self::Expected {
                keyword,
                found: None,
            } => {
                write!(f, "Expected {keyword}, found end of input")
            }
            Self::TrailingTokens(found) => {
                write!(f, "Unexpected input after END: '{found}'")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Rewrites a leading IF/CASE construct into a `SWITCH(TRUE(), ...)` chain,
///  the target grammar's first-match-wins multi-branch conditional.
/// Returns Ok(None) when the input does not start a conditional, so the
///  caller can pass the text through untouched.
pub fn to_switch(source: &str) -> Result<Option<String>, Error> {
    let tokens = tokenize(source);
    if !matches!(
        tokens.first().map(|t| t.ty),
        Some(TokenType::If | TokenType::Case)
    ) {
        return Ok(None);
    }

    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    let rendered = parser.parse_expr()?;

    // Make sure we've completely parsed the input
    if let Some(found) = parser.found() {
        return Err(Error::TrailingTokens(found));
    }
    Ok(Some(rendered))
}

/// Forward-only cursor over the token list. There is no backtracking: a
///  failed expectation immediately fails the whole conversion.
struct Parser<'input> {
    source: &'input str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'input> Parser<'input> {
    #[inline]
    fn peek_ty(&self) -> Option<TokenType> {
        self.tokens.get(self.pos).map(|t| t.ty)
    }

    /// Text of the current token, for error reporting.
    fn found(&self) -> Option<String> {
        self.tokens
            .get(self.pos)
            .map(|t| t.text(self.source).to_string())
    }

    fn consume(&mut self, ty: TokenType, keyword: &'static str) -> Result<(), Error> {
        if self.peek_ty() == Some(ty) {
            self.pos += 1;
            Ok(())
        } else {
            Err(Error::Expected {
                keyword,
                found: self.found(),
            })
        }
    }

    /// expr := ifExpr | caseExpr | simpleRun
    fn parse_expr(&mut self) -> Result<String, Error> {
        match self.peek_ty() {
            Some(TokenType::If) => self.parse_if(),
            Some(TokenType::Case) => self.parse_case(),
            _ => Ok(self.simple_run()),
        }
    }

    /// Consumes tokens up to (not including) the next clause keyword and
    ///  returns the covered source text verbatim. Parenthesized
    ///  sub-expressions are not matched structurally, they are simply part
    ///  of the run. An empty run yields an empty string, not an error.
    fn simple_run(&mut self) -> String {
        let start = self.pos;
        while let Some(ty) = self.peek_ty() {
            if ty.ends_simple_run() {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return String::new();
        }
        let lo = self.tokens[start].start;
        let hi = self.tokens[self.pos - 1].end;
        self.source[lo..hi].to_string()
    }

    /// ifExpr := "IF" expr "THEN" expr ("ELSEIF" expr "THEN" expr)* ["ELSE" expr] "END"
    fn parse_if(&mut self) -> Result<String, Error> {
        self.consume(TokenType::If, "IF")?;

        let mut pairs = Vec::new();
        let cond = self.parse_expr()?;
        self.consume(TokenType::Then, "THEN")?;
        pairs.push((cond, self.parse_expr()?));

        let mut else_value = None;
        loop {
            match self.peek_ty() {
                Some(TokenType::ElseIf) => {
                    self.pos += 1;
                    let cond = self.parse_expr()?;
                    self.consume(TokenType::Then, "THEN")?;
                    pairs.push((cond, self.parse_expr()?));
                }
                Some(TokenType::Else) => {
                    self.pos += 1;
                    else_value = Some(self.parse_expr()?);
                    self.consume(TokenType::End, "END")?;
                    break;
                }
                Some(TokenType::End) => {
                    self.pos += 1;
                    break;
                }
                _ => {
                    return Err(Error::Expected {
                        keyword: "ELSEIF, ELSE, or END",
                        found: self.found(),
                    });
                }
            }
        }

        Ok(render_switch(&pairs, else_value.as_deref().unwrap_or(BLANK)))
    }

    /// caseExpr := "CASE" [simpleRun] ("WHEN" expr "THEN" expr)+ ["ELSE" expr] "END"
    ///
    /// With a scrutinee, each WHEN value becomes an explicit equality test
    ///  against it; without one, each WHEN clause is already a boolean
    ///  condition.
    fn parse_case(&mut self) -> Result<String, Error> {
        self.consume(TokenType::Case, "CASE")?;

        let scrutinee = match self.simple_run() {
            s if s.is_empty() => None,
            s => Some(s),
        };

        let mut pairs = Vec::new();
        let mut else_value = None;
        self.consume(TokenType::When, "WHEN")?;
        loop {
            let when = self.parse_expr()?;
            self.consume(TokenType::Then, "THEN")?;
            let value = self.parse_expr()?;
            let cond = match &scrutinee {
                Some(s) => format!("{s} = {when}"),
                None => when,
            };
            pairs.push((cond, value));

            match self.peek_ty() {
                Some(TokenType::When) => {
                    self.pos += 1;
                }
                Some(TokenType::Else) => {
                    self.pos += 1;
                    else_value = Some(self.parse_expr()?);
                    self.consume(TokenType::End, "END")?;
                    break;
                }
                Some(TokenType::End) => {
                    self.pos += 1;
                    break;
                }
                _ => {
                    return Err(Error::Expected {
                        keyword: "WHEN, ELSE, or END",
                        found: self.found(),
                    });
                }
            }
        }

        Ok(render_switch(&pairs, else_value.as_deref().unwrap_or(BLANK)))
    }
}

/// SWITCH(TRUE(), c1, v1, c2, v2, ..., else) evaluates first-match-wins,
///  which preserves the source ordering of the branches.
fn render_switch(pairs: &[(String, String)], else_value: &str) -> String {
    let mut out = String::from("SWITCH(TRUE()");
    for (cond, value) in pairs {
        out.push_str(", ");
        out.push_str(cond);
        out.push_str(", ");
        out.push_str(value);
    }
    out.push_str(", ");
    out.push_str(else_value);
    out.push(')');
    out
}
