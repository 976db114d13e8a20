use kbc_core::outcome::Outcome;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_row.join("  "));

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", cells.join("  ").trim_end());
    }
}

/// Remote payloads have no fixed shape; both modes print them as JSON.
pub fn print_value(value: &Value) -> anyhow::Result<()> {
    print_json(value)
}

/// One line per target, or the whole map under `--json`.
pub fn print_outcomes(outcomes: &BTreeMap<String, Outcome>, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(outcomes);
    }
    let rows = outcomes
        .iter()
        .map(|(target, outcome)| {
            vec![
                target.clone(),
                status_label(outcome),
                summarize(&outcome.response),
            ]
        })
        .collect();
    print_table(&["TARGET", "STATUS", "RESPONSE"], rows);
    Ok(())
}

/// Exit non-zero when any target failed, after everything was printed.
pub fn fail_on_errors(outcomes: &BTreeMap<String, Outcome>) -> anyhow::Result<()> {
    let failed: Vec<&str> = outcomes
        .iter()
        .filter(|(_, o)| !o.is_success())
        .map(|(t, _)| t.as_str())
        .collect();
    if failed.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("failed for: {}", failed.join(", "))
    }
}

fn status_label(outcome: &Outcome) -> String {
    match (outcome.is_success(), outcome.http_status) {
        (true, _) => "success".to_string(),
        (false, Some(code)) => format!("error ({code})"),
        (false, None) => "error".to_string(),
    }
}

fn summarize(value: &Value) -> String {
    const MAX: usize = 80;
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() > MAX {
        let cut: String = text.chars().take(MAX - 3).collect();
        format!("{cut}...")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn long_responses_are_shortened() {
        let long = Value::String("x".repeat(200));
        let short = summarize(&long);
        assert_eq!(short.chars().count(), 80);
        assert!(short.ends_with("..."));
        assert_eq!(summarize(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[test]
    fn failures_are_listed() {
        let outcomes = BTreeMap::from([
            ("eu".to_string(), Outcome::success(json!([]))),
            (
                "us".to_string(),
                Outcome::failure(&kbc_core::KbcError::missing("token")),
            ),
        ]);
        let err = fail_on_errors(&outcomes).unwrap_err();
        assert_eq!(err.to_string(), "failed for: us");
        assert_eq!(status_label(&outcomes["us"]), "error");
    }
}
