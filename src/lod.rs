//! Level-of-detail preprocessing: a `{FIXED|INCLUDE|EXCLUDE dims : agg}`
//! block spanning the whole input is rewritten into DAX's filter-context
//! idiom before the rest of the pipeline runs. Blocks embedded inside a
//! larger expression are not supported and fall through unrewritten.

use std::sync::LazyLock;

use regex::Regex;

use crate::dax;

static SCOPE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*\{\s*(FIXED|INCLUDE|EXCLUDE)\b\s*(.*?)\s*:\s*(.*?)\s*\}\s*$").unwrap()
});

static AGG_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^(SUM|COUNT|AVG|MIN|MAX|COUNTD)\s*\((.*)\)\s*$").unwrap());

// The one conditional-aggregation shape we extract: AGG(IF cond THEN val END)
static CONDITIONAL_BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^IF\s+(.*?)\s+THEN\s+(.*?)\s+END$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Fixed,
    Include,
    Exclude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunction {
    Sum,
    Count,
    Avg,
    Min,
    Max,
    CountD,
}

impl AggFunction {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SUM" => Some(Self::Sum),
            "COUNT" => Some(Self::Count),
            "AVG" => Some(Self::Avg),
            "MIN" => Some(Self::Min),
            "MAX" => Some(Self::Max),
            "COUNTD" => Some(Self::CountD),
            _ => None,
        }
    }

    /// DAX name of the plain aggregation.
    pub fn dax_name(self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::Count => "COUNT",
            Self::Avg => "AVERAGE",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::CountD => "DISTINCTCOUNT",
        }
    }

    /// Row-iterator counterpart used for the INCLUDE re-aggregation step.
    /// A distinct count has no iterator form: INCLUDE handles it directly.
    pub fn iterator_name(self) -> Option<&'static str> {
        match self {
            Self::Sum => Some("SUMX"),
            Self::Count => Some("COUNTX"),
            Self::Avg => Some("AVERAGEX"),
            Self::Min => Some("MINX"),
            Self::Max => Some("MAXX"),
            Self::CountD => None,
        }
    }
}

/// The aggregation found inside an LOD block. `filter` holds the condition
///  extracted from the AGG(IF cond THEN val END) form, if there was one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    pub function: AggFunction,
    pub expr: String,
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeBlock {
    pub kind: ScopeKind,
    pub dimensions: Vec<String>,
    pub aggregation: Aggregation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The LOD body was not a recognized aggregation call.
    UnsupportedAggregation(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedAggregation(body) => {
                write!(
                    f,
                    "Level-of-detail block without a recognized aggregation: '{body}'"
                )
            }
        }
    }
}

impl std::error::Error for Error {}

/// The rewritten forms of an LOD block. FIXED and EXCLUDE output still
///  carries unqualified field references and re-enters the pipeline; the
///  INCLUDE forms are final DAX and are returned to the caller as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    Terminal(String),
    Continue(String),
}

/// Detects an LOD block spanning the whole (trimmed) input and parses it.
/// Returns None when the input is not an LOD block.
pub fn parse_scope_block(input: &str) -> Option<Result<ScopeBlock, Error>> {
    let caps = SCOPE_BLOCK.captures(input)?;
    let kind = match caps[1].to_ascii_uppercase().as_str() {
        "FIXED" => ScopeKind::Fixed,
        "INCLUDE" => ScopeKind::Include,
        _ => ScopeKind::Exclude,
    };
    // Dimensions keep their source order, duplicates included
    let dimensions = caps[2]
        .split(',')
        .map(|d| d.trim().trim_matches(['[', ']']).to_string())
        .filter(|d| !d.is_empty())
        .collect();

    Some(extract_aggregation(&caps[3]).map(|aggregation| ScopeBlock {
        kind,
        dimensions,
        aggregation,
    }))
}

fn extract_aggregation(inner: &str) -> Result<Aggregation, Error> {
    let inner = inner.trim();
    let Some(caps) = AGG_CALL.captures(inner) else {
        return Err(Error::UnsupportedAggregation(inner.to_string()));
    };
    let function = AggFunction::from_name(&caps[1])
        .ok_or_else(|| Error::UnsupportedAggregation(inner.to_string()))?;

    let body = caps[2].trim();
    // The greedy body capture would otherwise accept e.g.
    //  `SUM([a]) + SUM([b])` as one call whose body spans both
    if !parens_balanced(body) {
        return Err(Error::UnsupportedAggregation(inner.to_string()));
    }
    match CONDITIONAL_BODY.captures(body) {
        Some(c) => Ok(Aggregation {
            function,
            expr: c[2].to_string(),
            filter: Some(c[1].to_string()),
        }),
        None => Ok(Aggregation {
            function,
            expr: body.to_string(),
            filter: None,
        }),
    }
}

// Parentheses inside string literals don't count; quotes are already
//  normalized to double quotes by the time the preprocessor runs.
fn parens_balanced(body: &str) -> bool {
    let mut depth = 0i32;
    let mut in_str = false;
    for b in body.bytes() {
        match b {
            b'"' => in_str = !in_str,
            b'(' if !in_str => depth += 1,
            b')' if !in_str => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && !in_str
}

/// Rewrites a whole-input LOD block into DAX scope-control form, or returns
///  Ok(None) so the caller continues with the input untouched.
pub fn rewrite(input: &str, table: &str) -> Result<Option<Rewrite>, Error> {
    match parse_scope_block(input) {
        None => Ok(None),
        Some(block) => Ok(Some(emit(&block?, table))),
    }
}

fn emit(block: &ScopeBlock, table: &str) -> Rewrite {
    let agg = &block.aggregation;
    match block.kind {
        // FIXED restricts the filter context to exactly the named
        //  dimensions; EXCLUDE drops the named dimensions from it. Both are
        //  single-level CALCULATEs and both leave their field references
        //  unqualified for the downstream normalizer.
        ScopeKind::Fixed => {
            // A dimension-less FIXED is table-scoped: every active filter
            //  is ignored
            let scope = if block.dimensions.is_empty() {
                format!("REMOVEFILTERS({table})")
            } else {
                format!("ALLEXCEPT({table}, {})", raw_dims(&block.dimensions))
            };
            Rewrite::Continue(with_filter(
                format!(
                    "CALCULATE({}({}), {scope}",
                    agg.function.dax_name(),
                    agg.expr
                ),
                agg.filter.as_deref(),
            ))
        }
        ScopeKind::Exclude => {
            // Excluding no dimensions changes nothing about the filter
            //  context
            let call = if block.dimensions.is_empty() {
                format!("CALCULATE({}({})", agg.function.dax_name(), agg.expr)
            } else {
                format!(
                    "CALCULATE({}({}), REMOVEFILTERS({})",
                    agg.function.dax_name(),
                    agg.expr,
                    raw_dims(&block.dimensions)
                )
            };
            Rewrite::Continue(with_filter(call, agg.filter.as_deref()))
        }
        // INCLUDE computes the measure at a finer grain and summarizes
        //  across it, so its output is two-level and completely final:
        //  field references are qualified here.
        ScopeKind::Include => {
            let expr = dax::qualify_fields(&agg.expr, table);
            let filter = agg
                .filter
                .as_deref()
                .map(|f| dax::qualify_fields(f, table));

            match agg.function.iterator_name() {
                // Distinct count restricts directly to the dimensions'
                //  value sets, no re-aggregation needed
                None => {
                    let mut out = format!("CALCULATE(DISTINCTCOUNT({expr})");
                    for d in &block.dimensions {
                        out.push_str(&format!(", VALUES({table}[{d}])"));
                    }
                    Rewrite::Terminal(with_filter(out, filter.as_deref()))
                }
                Some(iterator) => {
                    let values: Vec<String> = block
                        .dimensions
                        .iter()
                        .map(|d| format!("VALUES({table}[{d}])"))
                        .collect();
                    let calc = with_filter(
                        format!("CALCULATE({}({expr})", agg.function.dax_name()),
                        filter.as_deref(),
                    );
                    let over = match values.as_slice() {
                        // No extra dimensions to include: the grain is
                        //  unchanged, no re-aggregation needed
                        [] => return Rewrite::Terminal(calc),
                        [single] => single.clone(),
                        _ => format!("CROSSJOIN({})", values.join(", ")),
                    };
                    Rewrite::Terminal(format!("{iterator}({over}, {calc})"))
                }
            }
        }
    }
}

fn raw_dims(dimensions: &[String]) -> String {
    dimensions
        .iter()
        .map(|d| format!("[{d}]"))
        .collect::<Vec<_>>()
        .join(", ")
}

// Appends the extracted condition as an extra CALCULATE filter argument
//  and closes the call.
fn with_filter(mut open_call: String, filter: Option<&str>) -> String {
    if let Some(filter) = filter {
        open_call.push_str(", ");
        open_call.push_str(filter);
    }
    open_call.push(')');
    open_call
}
