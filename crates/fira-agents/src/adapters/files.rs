use fira_store::OutputStore;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::AgentError;

#[derive(Debug, Deserialize, Default)]
pub struct ListFilesArgs {
    #[serde(default)]
    pub extension: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReadFileArgs {
    pub filename: String,
    #[serde(default = "default_rows")]
    pub n_rows: usize,
}

fn default_rows() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct WriteMarkdownArgs {
    pub filename: String,
    pub content: String,
}

pub fn list_output_files(store: &OutputStore, args: ListFilesArgs) -> Result<Value, AgentError> {
    let files = store.list(args.extension.as_deref())?;
    Ok(json!({ "files": files }))
}

pub fn read_file(store: &OutputStore, args: ReadFileArgs) -> Result<Value, AgentError> {
    let path = store.locate(&args.filename)?;
    if !path.is_file() {
        return Ok(json!({"error": "file not found", "file": args.filename}));
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "csv" => {
            let text = std::fs::read_to_string(&path)?;
            Ok(json!({
                "file": args.filename,
                "preview_markdown": csv_tail_markdown(&text, args.n_rows),
            }))
        }
        "md" | "txt" => {
            let content = std::fs::read_to_string(&path)?;
            Ok(json!({"file": args.filename, "content": content}))
        }
        other => Ok(json!({
            "error": format!("Unsupported file type: .{other}"),
            "file": args.filename,
        })),
    }
}

pub fn write_markdown(store: &OutputStore, args: WriteMarkdownArgs) -> Result<Value, AgentError> {
    let filename = with_md_extension(&args.filename);
    let path = store.resolve(&filename)?;
    std::fs::write(&path, args.content)?;
    debug!(path = %path.display(), "Wrote markdown");
    Ok(json!({ "file": filename }))
}

pub(crate) fn with_md_extension(name: &str) -> String {
    if name.to_ascii_lowercase().ends_with(".md") {
        name.to_string()
    } else {
        format!("{name}.md")
    }
}

/// Header plus the last `n_rows` data rows as a Markdown table.
fn csv_tail_markdown(text: &str, n_rows: usize) -> String {
    let mut rows = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(split_csv_line);

    let Some(header) = rows.next() else {
        return String::new();
    };
    let body: Vec<Vec<String>> = rows.collect();
    let tail = &body[body.len().saturating_sub(n_rows)..];

    let mut out = String::new();
    push_row(&mut out, &header);
    let separator = vec!["---".to_string(); header.len()];
    push_row(&mut out, &separator);
    for row in tail {
        push_row(&mut out, row);
    }
    out
}

fn push_row(out: &mut String, cells: &[String]) {
    out.push('|');
    for cell in cells {
        out.push(' ');
        out.push_str(&cell.replace('|', "\\|"));
        out.push_str(" |");
    }
    out.push('\n');
}

/// Split one CSV record. Handles double-quoted fields with `""` escapes;
/// quoted newlines are not supported.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if quoted => {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    quoted = false;
                }
            }
            '"' if field.is_empty() => quoted = true,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(ch),
        }
    }
    fields.push(field);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, OutputStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path().join("outputs"));
        store.ensure_dir().unwrap();
        (dir, store)
    }

    #[test]
    fn csv_preview_keeps_last_rows() {
        let (_dir, store) = store();
        std::fs::write(
            store.root().join("prices.csv"),
            "Date,Close\n2024-01-01,10\n2024-01-02,11\n2024-01-03,12\n",
        )
        .unwrap();

        let value = read_file(
            &store,
            ReadFileArgs {
                filename: "outputs/prices.csv".to_string(),
                n_rows: 2,
            },
        )
        .unwrap();

        let preview = value["preview_markdown"].as_str().unwrap();
        assert_eq!(
            preview,
            "| Date | Close |\n| --- | --- |\n| 2024-01-02 | 11 |\n| 2024-01-03 | 12 |\n"
        );
    }

    #[test]
    fn quoted_fields_are_unwrapped() {
        assert_eq!(
            split_csv_line(r#"a,"b, c","say ""hi""",|"#),
            vec!["a", "b, c", "say \"hi\"", "|"]
        );
    }

    #[test]
    fn markdown_and_text_return_content() {
        let (_dir, store) = store();
        std::fs::write(store.root().join("notes.txt"), "hello").unwrap();
        let value = read_file(
            &store,
            ReadFileArgs {
                filename: "notes.txt".to_string(),
                n_rows: 10,
            },
        )
        .unwrap();
        assert_eq!(value["content"], "hello");
    }

    #[test]
    fn missing_and_unsupported_files() {
        let (_dir, store) = store();
        let missing = read_file(
            &store,
            ReadFileArgs {
                filename: "nope.csv".to_string(),
                n_rows: 10,
            },
        )
        .unwrap();
        assert_eq!(missing["error"], "file not found");
        assert_eq!(missing["file"], "nope.csv");

        std::fs::write(store.root().join("chart.png"), b"png").unwrap();
        let unsupported = read_file(
            &store,
            ReadFileArgs {
                filename: "chart.png".to_string(),
                n_rows: 10,
            },
        )
        .unwrap();
        assert_eq!(unsupported["error"], "Unsupported file type: .png");
    }

    #[test]
    fn write_markdown_appends_extension() {
        let (_dir, store) = store();
        let value = write_markdown(
            &store,
            WriteMarkdownArgs {
                filename: "report".to_string(),
                content: "# Report".to_string(),
            },
        )
        .unwrap();
        assert_eq!(value["file"], "report.md");
        assert_eq!(
            std::fs::read_to_string(store.root().join("report.md")).unwrap(),
            "# Report"
        );

        let listed = list_output_files(
            &store,
            ListFilesArgs {
                extension: Some("md".to_string()),
            },
        )
        .unwrap();
        assert_eq!(listed["files"], json!(["report.md"]));
    }
}
