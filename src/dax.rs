//! Final formatting pass over the pipeline's output: table-qualifies field
//! references, applies the fixed function/operator rename table, rewrites
//! the one supported WINDOW_SUM pattern, and collapses whitespace.

use std::sync::LazyLock;

use regex::{Captures, Regex};

// A field reference is qualified only when not already preceded by an
//  identifier character, a closing bracket, or a quote (the 'Date'[Date]
//  form). The regex crate has no lookbehind, so an optional leading capture
//  decides instead. This also makes qualification idempotent.
static FIELD_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z0-9_\]'])?\[([^\[\]]+)\]").unwrap());

static IFNULL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bIFNULL\s*\(\s*(.*?)\s*,\s*(.*?)\s*\)").unwrap());
static ISNULL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bISNULL\s*\(\s*(.*?)\s*\)").unwrap());
static ZN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bZN\s*\(\s*(.*?)\s*\)").unwrap());
static COUNTD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bCOUNTD\s*\(\s*(.*?)\s*\)").unwrap());
static AVG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bAVG\s*\(").unwrap());

// AND/OR become DAX infix operators, but not inside bracketed field names
//  or string literals: the first two alternatives swallow those unchanged.
static LOGICAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\[[^\[\]]*\]|"[^"]*"|\b(AND)\b|\b(OR)\b"#).unwrap()
});

static WINDOW_SUM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bWINDOW_SUM\s*\(\s*(SUM\s*\(.*?\))\s*,\s*(-?\d+)\s*,\s*(-?\d+)\s*\)").unwrap()
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Prefixes every unqualified `[Field]` with the table name. References
///  that already carry a qualifier are left alone, so running this twice
///  never double-prefixes.
pub fn qualify_fields(expr: &str, table: &str) -> String {
    FIELD_REF
        .replace_all(expr, |caps: &Captures| match caps.get(1) {
            Some(_) => caps[0].to_string(),
            None => format!("{table}[{}]", &caps[2]),
        })
        .into_owned()
}

fn rename_functions(expr: &str) -> String {
    let expr = IFNULL.replace_all(expr, "COALESCE(${1}, ${2})");
    let expr = ISNULL.replace_all(&expr, "ISBLANK(${1})");
    let expr = ZN.replace_all(&expr, "COALESCE(${1}, 0)");
    let expr = COUNTD.replace_all(&expr, "DISTINCTCOUNT(${1})");
    AVG.replace_all(&expr, "AVERAGE(").into_owned()
}

fn rename_logical_ops(expr: &str) -> String {
    LOGICAL
        .replace_all(expr, |caps: &Captures| {
            if caps.get(1).is_some() {
                "&&".to_string()
            } else if caps.get(2).is_some() {
                "||".to_string()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// WINDOW_SUM(SUM(x), -n, 0) is a trailing n+1 month rolling sum; DAX
///  expresses it as a DATESINPERIOD filter over the date table. The match
///  is spliced in place, the surrounding expression is untouched.
fn rewrite_window_sum(expr: &str) -> String {
    let Some(caps) = WINDOW_SUM.captures(expr) else {
        return expr.to_string();
    };
    let Some(whole) = caps.get(0) else {
        return expr.to_string();
    };

    let inner_sum = &caps[1];
    let start_offset: i64 = caps[2].parse().unwrap_or(0);
    let months = start_offset.abs() + 1;
    let replacement = format!(
        "CALCULATE({inner_sum}, \
         DATESINPERIOD('Date'[Date], LASTDATE('Date'[Date]), -{months}, MONTH))"
    );

    let mut out = String::with_capacity(expr.len() + replacement.len());
    out.push_str(&expr[..whole.start()]);
    out.push_str(&replacement);
    out.push_str(&expr[whole.end()..]);
    out
}

pub fn collapse_whitespace(expr: &str) -> String {
    WHITESPACE.replace_all(expr.trim(), " ").into_owned()
}

/// Runs the whole normalization pass. Qualification goes first so that the
///  WINDOW_SUM rewrite's 'Date'[Date] references are never touched by it.
pub fn normalize(expr: &str, table: &str) -> String {
    let expr = qualify_fields(expr, table);
    let expr = rename_functions(&expr);
    let expr = rename_logical_ops(&expr);
    let expr = rewrite_window_sum(&expr);
    collapse_whitespace(&expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualify_basic() {
        assert_eq!(
            qualify_fields("[Sales] + [Profit]", "Fact"),
            "Fact[Sales] + Fact[Profit]"
        );
    }

    #[test]
    fn qualify_skips_qualified_refs() {
        assert_eq!(qualify_fields("Fact[Sales]", "Fact"), "Fact[Sales]");
        assert_eq!(qualify_fields("'Date'[Date]", "Fact"), "'Date'[Date]");
    }

    #[test]
    fn qualify_is_idempotent() {
        let once = qualify_fields("SUM([Sales]) + [Profit]", "Fact");
        assert_eq!(qualify_fields(&once, "Fact"), once);
    }

    #[test]
    fn rename_table() {
        assert_eq!(
            rename_functions("IFNULL([Discount], 0)"),
            "COALESCE([Discount], 0)"
        );
        assert_eq!(rename_functions("ISNULL([x])"), "ISBLANK([x])");
        assert_eq!(rename_functions("zn([Sales])"), "COALESCE([Sales], 0)");
        assert_eq!(rename_functions("COUNTD([Cust])"), "DISTINCTCOUNT([Cust])");
        assert_eq!(rename_functions("AVG([Sales])"), "AVERAGE([Sales])");
    }

    #[test]
    fn logical_ops() {
        assert_eq!(rename_logical_ops("[a] AND [b] or [c]"), "[a] && [b] || [c]");
    }

    #[test]
    fn logical_ops_skip_names_and_strings() {
        assert_eq!(
            rename_logical_ops("[Profit and Loss] = \"Black and White\""),
            "[Profit and Loss] = \"Black and White\""
        );
    }

    #[test]
    fn window_sum() {
        assert_eq!(
            rewrite_window_sum("WINDOW_SUM(SUM(Fact[Sales]), -11, 0)"),
            "CALCULATE(SUM(Fact[Sales]), \
             DATESINPERIOD('Date'[Date], LASTDATE('Date'[Date]), -12, MONTH))"
        );
    }

    #[test]
    fn window_sum_splices_in_place() {
        assert_eq!(
            rewrite_window_sum("1 + WINDOW_SUM(SUM(Fact[Sales]), -2, 0) / 3"),
            "1 + CALCULATE(SUM(Fact[Sales]), \
             DATESINPERIOD('Date'[Date], LASTDATE('Date'[Date]), -3, MONTH)) / 3"
        );
    }

    #[test]
    fn whitespace_collapse() {
        assert_eq!(collapse_whitespace("  a   b\n\tc  "), "a b c");
    }

    #[test]
    fn normalize_end_to_end() {
        assert_eq!(
            normalize("ZN([Sales])  *  IFNULL([Discount], 1)", "Fact"),
            "COALESCE(Fact[Sales], 0) * COALESCE(Fact[Discount], 1)"
        );
    }
}
