use serde::Serialize;
use universe_core::ResultEnvelope;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
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
    println!("{}", header_row.join("  ").trim_end());

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

/// One-line summary of an execution result, e.g.
/// `ok (212ms)` or `error [rate_limit] Rate limit exceeded (retry after 42s)`.
pub fn envelope_line(env: &ResultEnvelope) -> String {
    match (&env.error, env.latency_ms) {
        (Some(err), _) => {
            let retry = err
                .retry_after
                .map(|s| format!(" (retry after {s}s)"))
                .unwrap_or_default();
            format!("error [{}] {}{retry}", err.kind, err.message)
        }
        (None, Some(ms)) => format!("ok ({ms}ms)"),
        (None, None) => "ok".to_string(),
    }
}
