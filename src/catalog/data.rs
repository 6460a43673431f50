/// Shared data structures for catalog generation
///
/// These structs represent the data model that flows from the
/// source table through grouping and into the page layout.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CatalogError, CatalogResult};

/// Number of columns a source row must carry
pub const ROW_WIDTH: usize = 6;

/// Represents a single catalog line item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Product code (rendered as the "ISBN" line by default)
    pub code: String,
    /// Display name / description
    pub name: String,
    /// Price text, currency agnostic
    pub price: String,
    /// Raw image cell, possibly several comma-separated URLs
    pub image_url: String,
    /// Author, trimmed; may be empty
    pub author: String,
    /// Raw comma-separated category cell
    pub category_cell: String,
    /// 1-based index of the source data row
    pub row: usize,
}

impl Record {
    /// Build a record from one source row.
    ///
    /// Returns `None` for rows shorter than [`ROW_WIDTH`].
    pub fn from_row(row: usize, cells: &[String]) -> Option<Self> {
        if cells.len() < ROW_WIDTH {
            return None;
        }
        let cell = |i: usize| cells[i].trim().to_string();
        Some(Self {
            code: cell(0),
            name: cell(1),
            price: cell(2),
            image_url: cell(3),
            author: cell(4),
            category_cell: cell(5),
            row,
        })
    }

    /// Individual category paths of this record, in cell order
    ///
    /// Blank paths and paths without a main level (`"> Mystery"`) are dropped.
    pub fn category_paths(&self) -> impl Iterator<Item = &str> {
        self.category_cell
            .split(',')
            .map(str::trim)
            .filter(|c| !c.split('>').next().unwrap_or_default().trim().is_empty())
    }

    /// The URL to fetch for this record, if the image cell holds a usable one
    pub fn image_source(&self) -> Option<String> {
        normalize_image_url(&self.image_url)
    }
}

/// Take the first entry of an image cell and keep it only if it is an http(s) URL.
pub fn normalize_image_url(cell: &str) -> Option<String> {
    let first = cell.split(',').next()?.trim();
    if !(first.starts_with("http://") || first.starts_with("https://")) {
        return None;
    }
    reqwest::Url::parse(first).ok()?;
    Some(first.to_string())
}

/// Parse the data rows of a table (the first row is the header).
///
/// Malformed rows are skipped.
pub fn records_from_table(table: &[Vec<String>]) -> Vec<Record> {
    table
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(|(i, cells)| {
            let record = Record::from_row(i, cells);
            if record.is_none() {
                tracing::debug!(row = i, cells = cells.len(), "skipping malformed row");
            }
            record
        })
        .collect()
}

/// Read a table from a JSON array of rows.
///
/// Cells may be strings, numbers, booleans or null (an empty cell). A row
/// that is not an array becomes an empty, and therefore malformed, row.
pub fn table_from_json(json: &str) -> CatalogResult<Vec<Vec<String>>> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| CatalogError::InvalidInput(e.to_string()))?;
    let Value::Array(rows) = value else {
        return Err(CatalogError::InvalidInput("expected an array of rows".to_string()));
    };
    Ok(rows
        .into_iter()
        .map(|row| match row {
            Value::Array(cells) => cells.into_iter().map(cell_text).collect(),
            _ => Vec::new(),
        })
        .collect())
}

fn cell_text(cell: Value) -> String {
    match cell {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A category path: at most two levels are recognized
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Category {
    pub main: String,
    /// Empty for flat categories
    pub sub: String,
}

impl Category {
    /// Split `"Main > Sub"`; levels past the second are ignored.
    pub fn parse(path: &str) -> Self {
        let mut levels = path.split('>').map(str::trim);
        let main = levels.next().unwrap_or_default().to_string();
        let sub = levels.next().unwrap_or_default().to_string();
        Self { main, sub }
    }

    /// Group key in `main|sub` form
    pub fn key(&self) -> String {
        format!("{}|{}", self.main, self.sub)
    }

    /// Header label: `"MAIN > SUB"` or `"MAIN"`
    pub fn label(&self) -> String {
        if self.sub.is_empty() {
            self.main.clone()
        } else {
            format!("{} > {}", self.main, self.sub)
        }
    }
}

/// How records are grouped into the catalog
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CatalogMode {
    /// Category hierarchy, filtered by a selection of category paths
    #[default]
    Category,
    /// One group per author, filtered by a selection of author names
    Author,
    /// Everything, grouped by category hierarchy, selection ignored
    Full,
}

impl CatalogMode {
    /// Whether this mode requires a non-empty selection
    pub fn requires_selection(self) -> bool {
        !matches!(self, CatalogMode::Full)
    }

    /// What the selection refers to, for messages
    pub fn selection_noun(self) -> &'static str {
        match self {
            CatalogMode::Author => "authors",
            _ => "categories",
        }
    }

    /// Word used in default output file names
    pub fn file_stem(self) -> &'static str {
        match self {
            CatalogMode::Category => "categories",
            CatalogMode::Author => "authors",
            CatalogMode::Full => "full",
        }
    }
}

impl std::str::FromStr for CatalogMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "category" | "categories" => Ok(CatalogMode::Category),
            "author" | "authors" => Ok(CatalogMode::Author),
            "full" => Ok(CatalogMode::Full),
            other => Err(format!("unknown catalog mode: {}", other)),
        }
    }
}

/// The original eight-row sample sheet (header included)
pub fn sample_table() -> Vec<Vec<String>> {
    let rows: [[&str; 6]; 9] = [
        ["Code", "Description", "Price", "Image", "Author", "Category"],
        ["P001", "Sample Mystery Book", "19.99", "https://via.placeholder.com/150", "Agatha Christie", "Fiction > Mystery"],
        ["P002", "Python Programming", "29.99", "https://via.placeholder.com/150", "Guido van Rossum", "Computers > Programming"],
        ["P003", "Space Adventure", "15.99", "https://via.placeholder.com/150", "Isaac Asimov", "Fiction > Sci-Fi"],
        ["P004", "History of Rome", "24.99", "https://via.placeholder.com/150", "Mary Beard", "Non-Fiction > History"],
        ["P005", "Delicious Recipes", "35.00", "https://via.placeholder.com/150", "Gordon Ramsay", "Cooking"],
        ["P006", "The Great Gatsby", "12.99", "https://via.placeholder.com/150", "F. Scott Fitzgerald", "Fiction > Classic"],
        ["P007", "Quantum Physics", "45.00", "https://via.placeholder.com/150", "Stephen Hawking", "Science > Physics"],
        ["P008", "Modern Art", "55.00", "https://via.placeholder.com/150", "Banksy", "Arts > Modern"],
    ];
    rows.iter()
        .map(|row| row.iter().map(|c| c.to_string()).collect())
        .collect()
}
