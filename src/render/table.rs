//! Markdown table detection and normalisation
//!
//! A single pass over the reply's lines segments it into prose and table
//! regions. The scanner is deliberately hand-written: it must tolerate
//! tables without separator lines, ragged rows, blank lines inside a table,
//! and interleaved prose, and every input line must land in exactly one
//! segment. Cell text is left untouched, so `**bold**` markers survive for
//! the host renderer.

use serde::{Deserialize, Serialize};

/// One region of a rendered reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Segment {
    Prose {
        text: String,
    },
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
}

/// Ordered segments produced from a single assistant reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RenderPlan {
    pub segments: Vec<Segment>,
}

impl RenderPlan {
    /// Plan consisting of a single prose segment.
    pub fn prose(text: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::Prose { text: text.into() }],
        }
    }

    /// Canonical markdown form of the plan: prose verbatim, tables as pipe
    /// rows with a separator line.
    pub fn to_markdown(&self) -> String {
        let mut parts = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                Segment::Prose { text } => parts.push(text.clone()),
                Segment::Table { headers, rows } => {
                    let mut lines = Vec::with_capacity(rows.len() + 2);
                    lines.push(format!("| {} |", headers.join(" | ")));
                    lines.push(format!(
                        "|{}|",
                        headers.iter().map(|_| " --- ").collect::<Vec<_>>().join("|")
                    ));
                    for row in rows {
                        lines.push(format!("| {} |", row.join(" | ")));
                    }
                    parts.push(lines.join("\n"));
                }
            }
        }
        parts.join("\n\n")
    }
}

/// A line that may belong to a table body.
fn is_candidate(line: &str) -> bool {
    line.matches('|').count() >= 2
}

/// A header/body separator row such as `|---|---|`.
fn is_separator(line: &str) -> bool {
    line.contains('|')
        && (line.contains("---")
            || line.contains("--|")
            || line.contains("-|-")
            || line.contains("|-|"))
}

/// Split a table line into cells, discarding only the empty pair produced
/// by a leading and trailing `|`; interior empty cells are preserved.
fn split_cells(line: &str) -> Vec<String> {
    let mut cells: Vec<&str> = line.split('|').collect();
    if cells.first().is_some_and(|c| c.trim().is_empty()) {
        cells.remove(0);
    }
    if cells.last().is_some_and(|c| c.trim().is_empty()) {
        cells.pop();
    }
    cells.iter().map(|c| c.trim().to_string()).collect()
}

/// Segment a reply into prose and normalised tables.
pub fn render_reply(reply: &str) -> RenderPlan {
    let mut segments = Vec::new();
    let mut prose: Vec<&str> = Vec::new();
    let mut run: Vec<&str> = Vec::new();
    let mut pending_blanks: Vec<&str> = Vec::new();
    let mut in_table = false;

    for line in reply.lines() {
        if in_table {
            if is_candidate(line) || is_separator(line) {
                pending_blanks.clear();
                run.push(line);
            } else if line.trim().is_empty() {
                pending_blanks.push(line);
            } else {
                flush_table(&mut segments, &mut run);
                in_table = false;
                prose.append(&mut pending_blanks);
                prose.push(line);
            }
        } else if is_candidate(line) {
            flush_prose(&mut segments, &mut prose);
            in_table = true;
            run.push(line);
        } else {
            prose.push(line);
        }
    }

    if in_table {
        flush_table(&mut segments, &mut run);
        prose.append(&mut pending_blanks);
    }
    flush_prose(&mut segments, &mut prose);

    RenderPlan { segments }
}

fn flush_prose(segments: &mut Vec<Segment>, prose: &mut Vec<&str>) {
    let first = prose.iter().position(|l| !l.trim().is_empty());
    let Some(first) = first else {
        prose.clear();
        return;
    };
    let last = prose
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .unwrap_or(first);
    let text = prose[first..=last].join("\n");
    segments.push(Segment::Prose { text });
    prose.clear();
}

fn flush_table(segments: &mut Vec<Segment>, run: &mut Vec<&str>) {
    let Some(header_idx) = run.iter().position(|l| !is_separator(l)) else {
        // All-separator run, nothing to tabulate
        segments.push(Segment::Prose {
            text: run.join("\n"),
        });
        run.clear();
        return;
    };

    let headers = split_cells(run[header_idx]);
    if headers.is_empty() {
        segments.push(Segment::Prose {
            text: run.join("\n"),
        });
        run.clear();
        return;
    }

    let rows: Vec<Vec<String>> = run[header_idx + 1..]
        .iter()
        .filter(|l| !is_separator(l))
        .map(|l| {
            let mut row = split_cells(l);
            row.resize(headers.len(), String::new());
            row
        })
        .collect();

    segments.push(Segment::Table { headers, rows });
    run.clear();
}
