// CSV/TSV import/export
//
// The first record is the header row; its cells become column names. Values
// are typed on the way in with `CellValue::from_input` and written out with
// `display_string`.

use std::io::Read;
use std::path::Path;

use tablegrid_engine::row::Row;
use tablegrid_engine::value::CellValue;

use crate::{column_order, normalize_headers};

pub fn import_rows(path: &Path) -> Result<Vec<Row>, String> {
    let content = read_file_as_utf8(path)?;
    let delimiter = sniff_delimiter(&content);
    import_from_str(&content, delimiter)
}

pub fn import_tsv(path: &Path) -> Result<Vec<Row>, String> {
    let content = read_file_as_utf8(path)?;
    import_from_str(&content, b'\t')
}

pub fn import_with_delimiter(path: &Path, delimiter: u8) -> Result<Vec<Row>, String> {
    let content = read_file_as_utf8(path)?;
    import_from_str(&content, delimiter)
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
pub fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        if counts.first().copied().unwrap_or(0) <= 1 {
            continue;
        }

        // Lines agreeing with the header's field count, weighted by that count
        let target = counts[0];
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// Read file and convert to UTF-8 if needed (handles Windows-1252, Latin-1, etc.)
pub fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let mut file = std::fs::File::open(path).map_err(|e| e.to_string())?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| e.to_string())?;

    let text = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let bytes = e.into_bytes();
            // Excel-exported CSVs are usually Windows-1252
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            decoded.into_owned()
        }
    };
    Ok(text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text))
}

/// Parse CSV text into rows. Fully blank records are skipped; short records
/// leave their trailing columns unset, extra fields are dropped.
pub fn import_from_str(content: &str, delimiter: u8) -> Result<Vec<Row>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let headers = match records.next() {
        Some(record) => {
            let record = record.map_err(|e| e.to_string())?;
            normalize_headers(&record.iter().collect::<Vec<_>>())
        }
        None => return Ok(Vec::new()),
    };

    let mut rows = Vec::new();
    for (line, result) in records.enumerate() {
        let record = result.map_err(|e| format!("record {}: {}", line + 2, e))?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(name, field)| (name.as_str(), CellValue::from_input(field)))
            .collect();
        rows.push(row);
    }

    log::debug!("csv import: {} rows, {} columns", rows.len(), headers.len());
    Ok(rows)
}

pub fn export_rows(rows: &[Row], path: &Path) -> Result<(), String> {
    export_with_delimiter(rows, path, b',')
}

pub fn export_tsv(rows: &[Row], path: &Path) -> Result<(), String> {
    export_with_delimiter(rows, path, b'\t')
}

fn export_with_delimiter(rows: &[Row], path: &Path, delimiter: u8) -> Result<(), String> {
    let writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .map_err(|e| e.to_string())?;
    write_rows(writer, rows, &column_order(rows, false))
}

/// Render rows as CSV text with an explicit column list.
pub fn export_to_string(rows: &[Row], columns: &[String], delimiter: u8) -> Result<String, String> {
    let mut buffer = Vec::new();
    let writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(&mut buffer);
    write_rows(writer, rows, columns)?;
    String::from_utf8(buffer).map_err(|e| e.to_string())
}

fn write_rows<W: std::io::Write>(
    mut writer: csv::Writer<W>,
    rows: &[Row],
    columns: &[String],
) -> Result<(), String> {
    writer.write_record(columns).map_err(|e| e.to_string())?;
    for row in rows {
        let record = columns.iter().map(|c| row.get(c).display_string());
        writer.write_record(record).map_err(|e| e.to_string())?;
    }
    writer.flush().map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_sniff_semicolon_delimiter() {
        let content = "Name;Age;City\nAlice;30;Paris\nBob;25;London\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_sniff_tab_delimiter() {
        let content = "Name\tAge\tCity\nAlice\t30\tParis\nBob\t25\tLondon\n";
        assert_eq!(sniff_delimiter(content), b'\t');
    }

    #[test]
    fn test_sniff_semicolon_with_commas_in_values() {
        let content = "Name;Address;City\n\"Doe, Jane\";\"123 Main St, Apt 4\";Paris\nBob;\"456 Elm\";London\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_import_types_values() {
        let rows = import_from_str("id,name,active,joined\n1,Alice,true,2024-03-01\n2,,false,\n", b',').unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id"), &CellValue::Int(1));
        assert_eq!(rows[0].get("name"), &CellValue::from("Alice"));
        assert_eq!(rows[0].get("active"), &CellValue::Bool(true));
        assert!(matches!(rows[0].get("joined"), CellValue::DateTime(_)));
        assert!(rows[1].get("name").is_null());
    }

    #[test]
    fn test_import_skips_blank_records_and_ragged_tails() {
        let rows = import_from_str("a,b,c\n1,2\n,,\n4,5,6,7\n", b',').unwrap();
        assert_eq!(rows.len(), 2);
        assert!(!rows[0].contains("c"));
        assert_eq!(rows[1].len(), 3);
    }

    #[test]
    fn test_import_empty_file() {
        assert!(import_from_str("", b',').unwrap().is_empty());
    }

    #[test]
    fn test_windows_1252_fallback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latin.csv");
        // "Café" with 0xE9 for é
        fs::write(&path, b"name\nCaf\xe9\n").unwrap();

        let rows = import_rows(&path).unwrap();
        assert_eq!(rows[0].get("name"), &CellValue::from("Café"));
    }

    #[test]
    fn test_bom_is_stripped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bom.csv");
        fs::write(&path, "\u{feff}id;name\n1;a\n").unwrap();

        let rows = import_rows(&path).unwrap();
        assert_eq!(rows[0].get("id"), &CellValue::Int(1));
    }

    #[test]
    fn test_tsv_export_then_import() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.tsv");
        let mut first = Row::new().with("name", "Alice").with("score", 42i64);
        first.set_row_number(1);
        let rows = vec![first, Row::new().with("name", "Bob").with("score", 17i64)];

        export_tsv(&rows, &path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("name\tscore\n"));
        assert!(!content.contains("__rowNumber"));

        let imported = import_tsv(&path).unwrap();
        assert_eq!(imported[1].get("name"), &CellValue::from("Bob"));
        assert_eq!(imported[1].get("score"), &CellValue::Int(17));
    }

    #[test]
    fn test_export_to_string_quotes_delimiters() {
        let rows = vec![Row::new().with("name", "Doe, Jane")];
        let text = export_to_string(&rows, &["name".to_string()], b',').unwrap();
        assert_eq!(text, "name\n\"Doe, Jane\"\n");
    }
}
