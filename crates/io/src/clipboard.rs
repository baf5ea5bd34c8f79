// Clipboard text: tab-separated blocks as spreadsheet apps exchange them.
//
// Parsing feeds GridSession::paste_block; rendering is the copy side.

use tablegrid_engine::row::Row;

/// Split clipboard text into rows of cells.
///
/// Tab-delimited, `\n` or `\r\n` line ends, double-quoted cells may hold
/// tabs and newlines. A single trailing line break does not add an empty row.
pub fn parse_clipboard_text(text: &str) -> Result<Vec<Vec<String>>, String> {
    let text = text
        .strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text);
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut block = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| e.to_string())?;
        block.push(record.iter().map(str::to_string).collect());
    }
    Ok(block)
}

/// Render `columns` of `rows` as a tab-separated block, optionally with a
/// header line.
pub fn to_clipboard_text(rows: &[Row], columns: &[String], include_headers: bool) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    if include_headers {
        lines.push(columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join("\t"));
    }
    for row in rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| quote(&row.get(c).display_string()))
            .collect();
        lines.push(cells.join("\t"));
    }
    lines.join("\n")
}

fn quote(cell: &str) -> String {
    if cell.contains(['\t', '\n', '\r', '"']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}
