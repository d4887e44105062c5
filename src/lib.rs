//! Transpiles Tableau calculated-field expressions into DAX.
//!
//! The pipeline is four stateless passes over the input string: level-of-
//! detail preprocessing ([lod]), tokenization ([lex]), recursive-descent
//! conditional parsing ([parser]), and identifier/function normalization
//! ([dax]). [convert] is the only entry point; each call owns all of its
//! state, so concurrent calls are trivially safe.

pub mod dax;
pub mod lex;
pub mod lod;
pub mod parser;

#[derive(Debug, Clone, PartialEq)]
pub enum ConversionError {
    /// Malformed IF/CASE structure: missing keyword, mismatched END.
    Structural(parser::Error),
    /// A construct outside the supported grammar, e.g. a level-of-detail
    ///  block whose body is not a recognized aggregation.
    UnsupportedConstruct(lod::Error),
}

impl From<parser::Error> for ConversionError {
    fn from(value: parser::Error) -> Self {
        Self::Structural(value)
    }
}

impl From<lod::Error> for ConversionError {
    fn from(value: lod::Error) -> Self {
        Self::UnsupportedConstruct(value)
    }
}

impl std::fmt::Display for ConversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Structural(e) => write!(f, "{e}"),
            Self::UnsupportedConstruct(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ConversionError {}

/// Converts a Tableau calculated-field expression into the equivalent DAX
///  expression. `default_table` qualifies bare field references, so with
///  the table `Sales`, `[Profit]` becomes `Sales[Profit]`.
///
/// Input that uses none of the translated constructs comes back unchanged
///  apart from qualification, the function rename table, and whitespace
///  collapse; genuinely unsupported syntax is passed through, not flagged.
pub fn convert(expression: &str, default_table: &str) -> Result<String, ConversionError> {
    // Tableau accepts single-quoted string literals, DAX does not
    let expr = expression.replace('\'', "\"");
    let expr = expr.trim();

    let expr = match lod::rewrite(expr, default_table)? {
        // The INCLUDE iterator forms are already final DAX
        Some(lod::Rewrite::Terminal(out)) => return Ok(out),
        Some(lod::Rewrite::Continue(out)) => out,
        None => expr.to_string(),
    };

    let expr = match parser::to_switch(&expr)? {
        Some(switch) => switch,
        None => expr,
    };

    Ok(dax::normalize(&expr, default_table))
}

/// [convert] with the conventional default table name.
pub fn convert_default(expression: &str) -> Result<String, ConversionError> {
    convert(expression, "Table")
}
