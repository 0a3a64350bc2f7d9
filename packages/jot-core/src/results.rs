//! Results-region splicing: find, replace, or append the fixed HTML-comment
//! sentinel pair an eval block's output lives between, in one of a few
//! rendering formats.

/// How a block's captured output is rendered into its results region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultFormat {
    /// A fenced code block tagged with the given language (or no language, if empty).
    Code(String),
    /// A naive Markdown table, splitting each line on tabs or commas, first line as header.
    Table,
    /// Output inserted verbatim, with no wrapping.
    Raw,
}

/// Which of a block's two captured streams a results region is built from
/// (the `output`/`value` half of the `results` parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStream {
    /// The full combined stdout+stderr capture. Default.
    Output,
    /// `stdout` alone, trimmed — for evaluators that print a single computed value.
    Value,
}

/// Where a rendered region lands relative to any existing one of the same
/// name (the `replace`/`append`/`silent` half of the `results` parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultsMode {
    /// Replace the existing region in place, or insert a new one if absent. Default.
    Replace,
    /// Always insert a fresh region below any existing one(s).
    Append,
    /// Never emit a results region at all.
    Silent,
}

/// Parses the `results` eval parameter into its `(stream, format, mode)`
/// triple. Tokens are dot-separated and order-independent; any axis a block
/// doesn't name keeps its default (`output`, `code`, `replace`). An empty or
/// absent parameter yields every default.
pub fn parse_results_spec(raw: Option<&str>, lang: &str) -> (ResultStream, ResultFormat, ResultsMode) {
    let mut stream = ResultStream::Output;
    let mut format = ResultFormat::Code(lang.to_string());
    let mut mode = ResultsMode::Replace;

    for token in raw.unwrap_or_default().split('.').map(str::trim) {
        match token {
            "output" => stream = ResultStream::Output,
            "value" => stream = ResultStream::Value,
            "code" => format = ResultFormat::Code(lang.to_string()),
            "table" => format = ResultFormat::Table,
            "raw" => format = ResultFormat::Raw,
            "replace" => mode = ResultsMode::Replace,
            "append" => mode = ResultsMode::Append,
            "silent" => mode = ResultsMode::Silent,
            _ => {}
        }
    }

    (stream, format, mode)
}

/// The opening sentinel for a named results region.
pub fn sentinel_start(name: &str) -> String {
    format!("<!-- jot:results name=\"{name}\" -->")
}

/// The closing sentinel for a named results region.
pub fn sentinel_end(name: &str) -> String {
    format!("<!-- jot:end name=\"{name}\" -->")
}

/// Locates the byte range (in `text`, not `doc` bytes) spanning from the start
/// of the opening sentinel to the end of the closing sentinel for `name`.
pub fn find_region(text: &str, name: &str) -> Option<(usize, usize)> {
    let start_marker = sentinel_start(name);
    let end_marker = sentinel_end(name);

    let start = text.find(&start_marker)?;
    let after_start = start + start_marker.len();
    let end_rel = text[after_start..].find(&end_marker)?;
    let end = after_start + end_rel + end_marker.len();
    Some((start, end))
}

/// Renders `content` according to `format`.
pub fn render_body(format: &ResultFormat, content: &str) -> String {
    match format {
        ResultFormat::Raw => content.trim_end().to_string(),
        ResultFormat::Code(lang) => format!("```{lang}\n{}\n```", content.trim_end()),
        ResultFormat::Table => render_table(content),
    }
}

fn render_table(content: &str) -> String {
    let mut lines = content.lines();
    let Some(header) = lines.next() else {
        return String::new();
    };
    let split = |line: &str| -> Vec<String> {
        line.split(|c| c == '\t' || c == ',')
            .map(|cell| cell.trim().to_string())
            .collect()
    };

    let header_cells = split(header);
    let mut out = format!("| {} |\n|{}\n", header_cells.join(" | "), " --- |".repeat(header_cells.len()));
    for line in lines {
        let row = split(line);
        out.push_str(&format!("| {} |\n", row.join(" | ")));
    }
    out.trim_end().to_string()
}

/// Places a rendered results region into `doc` according to `mode`: `Replace`
/// overwrites an existing region of the same name in place, or inserts one
/// right after `anchor` (normally a block's `block_end` offset) if none
/// exists yet; `Append` always inserts a fresh region, anchored below the
/// last existing one of the same name (or `anchor`, if there isn't one);
/// `Silent` leaves `doc` untouched.
pub fn upsert_region(
    doc: &str,
    name: &str,
    format: &ResultFormat,
    content: &str,
    anchor: usize,
    mode: ResultsMode,
) -> String {
    if mode == ResultsMode::Silent {
        return doc.to_string();
    }

    let rendered = format!(
        "{}\n{}\n{}",
        sentinel_start(name),
        render_body(format, content),
        sentinel_end(name)
    );

    let existing = find_region(doc, name);

    if mode == ResultsMode::Replace {
        if let Some((start, end)) = existing {
            let mut out = String::with_capacity(doc.len() + rendered.len());
            out.push_str(&doc[..start]);
            out.push_str(&rendered);
            out.push_str(&doc[end..]);
            return out;
        }
    }

    let insert_at = existing.map(|(_, end)| end).unwrap_or(anchor).min(doc.len());
    let mut out = doc[..insert_at].to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(&rendered);
    out.push('\n');
    let rest = &doc[insert_at..];
    if !rest.is_empty() {
        if !rest.starts_with('\n') {
            out.push('\n');
        }
        out.push_str(rest);
    }
    out
}
