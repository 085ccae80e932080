// src/extract/mod.rs

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use crate::bigquery::rows::{CellValue, ResultRow};

// Title keeps a narrower scrub list than Body; downstream consumers split
// on `,` only, so Body's semicolons are allowed to survive.
const TITLE_SCRUB: &[char] = &[';', ','];
const BODY_SCRUB: &[char] = &[',', '#', '&', '\t', '\n', '='];

/// One post record, normalized and ready to serialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDetail {
    pub id: i64,
    pub title: String,
    pub create_date: String,
    pub body: String,
    pub score: i64,
    pub view_count: i64,
    pub answer_count: i64,
    pub comment_count: i64,
    pub favorite_count: i64,
    pub parent_id: i64,
}

impl PostDetail {
    /// Build a normalized record from one result row. Count columns that
    /// can be absent default to 0; Id, Title, Body, Score and CreateDate
    /// must be present.
    pub fn from_row(row: &ResultRow) -> Result<Self> {
        Ok(PostDetail {
            id: required_int(row, "Id")?,
            title: scrub(&required_text(row, "Title")?, TITLE_SCRUB),
            create_date: required_text(row, "CreateDate")?,
            body: scrub(&required_text(row, "Body")?, BODY_SCRUB),
            score: required_int(row, "Score")?,
            view_count: count_or_zero(row, "ViewCount")?,
            answer_count: count_or_zero(row, "AnswerCount")?,
            comment_count: count_or_zero(row, "CommentCount")?,
            favorite_count: count_or_zero(row, "FavoriteCount")?,
            parent_id: count_or_zero(row, "ParentId")?,
        })
    }

    /// Render the record as one output line, trailing newline included.
    pub fn line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{}\n",
            self.id,
            self.title,
            self.create_date,
            self.body,
            self.score,
            self.view_count,
            self.answer_count,
            self.comment_count,
            self.favorite_count,
            self.parent_id,
        )
    }
}

/// Replace each occurrence of any listed character with a single space.
fn scrub(text: &str, chars: &[char]) -> String {
    text.chars()
        .map(|c| if chars.contains(&c) { ' ' } else { c })
        .collect()
}

fn field<'a>(row: &'a ResultRow, name: &str) -> &'a CellValue {
    row.get(name).unwrap_or(&CellValue::Null)
}

fn required_int(row: &ResultRow, name: &str) -> Result<i64> {
    match field(row, name) {
        CellValue::Integer(v) => Ok(*v),
        CellValue::Text(s) => s
            .parse()
            .with_context(|| format!("column `{}`: `{}` is not an integer", name, s)),
        CellValue::Null => bail!("row is missing required column `{}`", name),
    }
}

fn required_text(row: &ResultRow, name: &str) -> Result<String> {
    match field(row, name) {
        CellValue::Text(s) => Ok(s.clone()),
        CellValue::Integer(v) => Ok(v.to_string()),
        CellValue::Null => bail!("row is missing required column `{}`", name),
    }
}

/// Nullable count columns: null means zero.
fn count_or_zero(row: &ResultRow, name: &str) -> Result<i64> {
    match field(row, name) {
        CellValue::Null => Ok(0),
        CellValue::Integer(v) => Ok(*v),
        CellValue::Text(s) => s
            .parse()
            .with_context(|| format!("column `{}`: `{}` is not an integer", name, s)),
    }
}

/// Serialize every row, keeping the order the server returned them in.
/// Lines collect into a Vec and join once at write time.
pub fn render_lines(rows: &[ResultRow]) -> Result<Vec<String>> {
    let mut lines = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        let record = PostDetail::from_row(row)
            .with_context(|| format!("normalizing result row {}", idx))?;
        lines.push(record.line());
    }
    Ok(lines)
}

/// Write all lines to `path`, replacing any previous contents. Zero rows
/// still produce the (empty) file.
pub fn write_output(path: impl AsRef<Path>, lines: &[String]) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, lines.concat())
        .with_context(|| format!("writing output file {:?}", path))
}
