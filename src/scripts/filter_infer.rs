//! Infer `report.json` to csdiff text, dropping known false alarms

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use std::io::Write;

const INFERBO_BUFFER_OVERRUN_TYPES: &[&str] = &[
    "BUFFER_OVERRUN_L2",
    "BUFFER_OVERRUN_L3",
    "BUFFER_OVERRUN_L4",
    "BUFFER_OVERRUN_L5",
    "BUFFER_OVERRUN_S2",
    "INFERBO_ALLOC_MAY_BE_NEGATIVE",
    "INFERBO_ALLOC_MAY_BE_BIG",
];

const INFERBO_INTEGER_OVERFLOW_TYPES: &[&str] =
    &["INTEGER_OVERFLOW_L2", "INTEGER_OVERFLOW_L5", "INTEGER_OVERFLOW_U5"];

const INFERBO_UNKNOWN_TYPES: &[&str] = &["BUFFER_OVERRUN_U5", "INTEGER_OVERFLOW_U5"];

/// Which false-alarm filters run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterOptions {
    pub biabduction: bool,
    pub inferbo: bool,
    pub uninit: bool,
    pub dead_store: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            biabduction: true,
            inferbo: true,
            uninit: true,
            dead_store: true,
        }
    }
}

impl FilterOptions {
    /// Converts the report without touching any bug.
    pub fn transform_only() -> Self {
        Self {
            biabduction: false,
            inferbo: false,
            uninit: false,
            dead_store: false,
        }
    }
}

pub struct InferFilter {
    options: FilterOptions,
    uninit_qualifier: Regex,
    skipped_calls: [Regex; 2],
}

fn str_field<'a>(bug: &'a Value, key: &str) -> Option<&'a str> {
    bug.get(key)?.as_str()
}

/// Renders a scalar the way it appears in the report, strings unquoted.
fn display_field(bug: &Value, key: &str) -> String {
    match bug.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

impl InferFilter {
    pub fn new(options: FilterOptions) -> Result<Self> {
        Ok(Self {
            options,
            uninit_qualifier: Regex::new(r"^The value read from .*\[_\] was never initialized.")?,
            skipped_calls: [
                Regex::new(r"^Skipping .*\(\):")?,
                Regex::new(r"^Switch condition is false. Skipping switch case")?,
            ],
        })
    }

    /// Array subscripts read through `[_]` are almost always initialized.
    fn uninit_false_alarm(&self, bug: &Value) -> Option<bool> {
        if str_field(bug, "bug_type")? != "UNINITIALIZED_VALUE" {
            return Some(false);
        }
        Some(self.uninit_qualifier.is_match(str_field(bug, "qualifier")?))
    }

    /// Biabduction reports built on skipped (unknown) functions.
    fn biabduction_false_alarm(&self, bug: &Value) -> Option<bool> {
        let bug_type = str_field(bug, "bug_type")?;
        if bug_type != "NULL_DEREFERENCE" && bug_type != "RESOURCE_LEAK" {
            return Some(false);
        }
        for step in bug.get("bug_trace")?.as_array()? {
            let description = str_field(step, "description")?;
            if self.skipped_calls.iter().any(|re| re.is_match(description)) {
                return Some(true);
            }
        }
        Some(false)
    }

    /// Inferbo reports with unknown or unbounded ranges.
    fn inferbo_false_alarm(&self, bug: &Value) -> Option<bool> {
        let bug_type = str_field(bug, "bug_type")?;
        if INFERBO_UNKNOWN_TYPES.contains(&bug_type) {
            return Some(true);
        }
        if INFERBO_BUFFER_OVERRUN_TYPES.contains(&bug_type)
            || INFERBO_INTEGER_OVERFLOW_TYPES.contains(&bug_type)
        {
            let qualifier = str_field(bug, "qualifier")?;
            return Some(qualifier.contains("+oo") || qualifier.contains("-oo"));
        }
        Some(false)
    }

    /// Dead stores are kept but downgraded.
    fn lower_dead_store(&self, bug: &mut Value) {
        if str_field(bug, "bug_type") == Some("DEAD_STORE") {
            if let Some(obj) = bug.as_object_mut() {
                obj.insert("severity".into(), Value::String("WARNING".into()));
            }
        }
    }

    /// A filter that cannot read the fields it needs keeps the bug.
    pub fn is_false_alarm(&self, bug: &mut Value) -> bool {
        let checks: [(bool, fn(&Self, &Value) -> Option<bool>); 3] = [
            (self.options.uninit, Self::uninit_false_alarm),
            (self.options.biabduction, Self::biabduction_false_alarm),
            (self.options.inferbo, Self::inferbo_false_alarm),
        ];
        for (enabled, check) in checks {
            if enabled && check(self, bug) == Some(true) {
                return true;
            }
        }
        if self.options.dead_store {
            self.lower_dead_store(bug);
        }
        false
    }

    fn render(bug: &Value) -> String {
        let mut out = String::from("Error: INFER_WARNING:\n");
        if let Some(trace) = bug.get("bug_trace").and_then(Value::as_array) {
            for step in trace {
                out.push_str(&format!(
                    "{}:{}:{}: note: {}\n",
                    display_field(step, "filename"),
                    display_field(step, "line_number"),
                    display_field(step, "column_number"),
                    display_field(step, "description"),
                ));
            }
        }
        out.push_str(&format!(
            "{}:{}:{}: {}[{}]: {}\n",
            display_field(bug, "file"),
            display_field(bug, "line"),
            display_field(bug, "column"),
            display_field(bug, "severity").to_lowercase(),
            display_field(bug, "bug_type"),
            display_field(bug, "qualifier"),
        ));
        out
    }

    /// Filters a parsed report and writes the kept bugs; returns their count.
    pub fn filter_report<W: Write>(&self, report: Value, mut output: W) -> Result<usize> {
        let bugs = match report {
            Value::Array(bugs) => bugs,
            _ => anyhow::bail!("infer report is not a JSON array"),
        };

        let mut kept = 0;
        for mut bug in bugs {
            if self.is_false_alarm(&mut bug) {
                continue;
            }
            if kept > 0 {
                output.write_all(b"\n")?;
            }
            output.write_all(Self::render(&bug).as_bytes())?;
            kept += 1;
        }
        output.flush()?;
        Ok(kept)
    }
}

/// Reads a report from `input` and writes csdiff text to `output`.
pub fn filter<R: std::io::Read, W: Write>(
    input: R,
    output: W,
    options: FilterOptions,
) -> Result<usize> {
    let report: Value =
        serde_json::from_reader(input).context("Failed to parse infer report")?;
    InferFilter::new(options)?.filter_report(report, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use yare::parameterized;

    fn bug(bug_type: &str, qualifier: &str) -> Value {
        json!({
            "bug_type": bug_type,
            "qualifier": qualifier,
            "severity": "ERROR",
            "file": "src/main.c",
            "line": 10,
            "column": 4,
            "bug_trace": []
        })
    }

    fn filter_all(options: FilterOptions, mut bug: Value) -> bool {
        InferFilter::new(options).unwrap().is_false_alarm(&mut bug)
    }

    #[parameterized(
        unknown_overrun = { "BUFFER_OVERRUN_U5", "Offset: [0, 10]", true },
        unbounded_overrun = { "BUFFER_OVERRUN_L3", "Offset: [0, +oo] Size: 10", true },
        bounded_overrun = { "BUFFER_OVERRUN_L3", "Offset: 11 Size: 10", false },
        negative_overflow = { "INTEGER_OVERFLOW_L2", "([-oo, 0] - 1)", true },
        other_type = { "MEMORY_LEAK", "+oo", false },
    )]
    fn test_inferbo(bug_type: &str, qualifier: &str, dropped: bool) {
        assert_eq!(filter_all(FilterOptions::default(), bug(bug_type, qualifier)), dropped);
    }

    #[test]
    fn test_uninit() {
        let b = bug(
            "UNINITIALIZED_VALUE",
            "The value read from buf[_] was never initialized.",
        );
        assert!(filter_all(FilterOptions::default(), b.clone()));
        let off = FilterOptions { uninit: false, ..Default::default() };
        assert!(!filter_all(off, b));
        assert!(!filter_all(
            FilterOptions::default(),
            bug("UNINITIALIZED_VALUE", "The value read from x was never initialized.")
        ));
    }

    #[test]
    fn test_biabduction_skipped_call() {
        let mut b = bug("NULL_DEREFERENCE", "pointer `p` could be null");
        b["bug_trace"] = json!([
            {"description": "start of procedure main()"},
            {"description": "Skipping strdup(): method has no implementation"}
        ]);
        assert!(filter_all(FilterOptions::default(), b.clone()));
        let off = FilterOptions { biabduction: false, ..Default::default() };
        assert!(!filter_all(off, b));
    }

    #[test]
    fn test_malformed_bug_is_kept() {
        let b = json!({"bug_type": "NULL_DEREFERENCE"});
        assert!(!filter_all(FilterOptions::default(), b));
    }

    #[test]
    fn test_dead_store_downgraded_and_rendered() {
        let mut report = json!([
            bug("DEAD_STORE", "The value written to &x is never used."),
            bug("BUFFER_OVERRUN_U5", ""),
            bug("NULL_DEREFERENCE", "pointer `p` last assigned on line 9 could be null"),
        ]);
        report[2]["bug_trace"] = json!([
            {"filename": "src/main.c", "line_number": 9, "column_number": -1, "description": "assigned"}
        ]);

        let mut out = Vec::new();
        let kept = InferFilter::new(FilterOptions::default())
            .unwrap()
            .filter_report(report, &mut out)
            .unwrap();
        assert_eq!(kept, 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Error: INFER_WARNING:\n\
             src/main.c:10:4: warning[DEAD_STORE]: The value written to &x is never used.\n\
             \n\
             Error: INFER_WARNING:\n\
             src/main.c:9:-1: note: assigned\n\
             src/main.c:10:4: error[NULL_DEREFERENCE]: pointer `p` last assigned on line 9 could be null\n"
        );
    }

    #[test]
    fn test_report_must_be_array() {
        let mut out = Vec::new();
        assert!(filter("{}".as_bytes(), &mut out, FilterOptions::default()).is_err());
        assert_eq!(filter("[]".as_bytes(), &mut out, FilterOptions::default()).unwrap(), 0);
    }
}
