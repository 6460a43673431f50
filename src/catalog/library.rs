use std::collections::BTreeMap;

use serde::Serialize;

use super::data::{CatalogMode, Category, Record};
use super::settings::LabelSettings;
use crate::error::{CatalogError, CatalogResult};

/// What a group is keyed by
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKey {
    Category(Category),
    Author(String),
}

impl GroupKey {
    /// Unique key: `main|sub` for categories, the name for authors
    pub fn key(&self) -> String {
        match self {
            GroupKey::Category(category) => category.key(),
            GroupKey::Author(name) => name.clone(),
        }
    }
}

/// A named bucket of records, in source row order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub key: GroupKey,
    pub records: Vec<Record>,
}

/// Records partitioned and sorted for layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedCatalog {
    pub mode: CatalogMode,
    /// Sorted by main category then sub category, or by author
    pub groups: Vec<Group>,
    /// Distinct main categories, sorted (empty in author mode)
    pub main_categories: Vec<String>,
}

impl GroupedCatalog {
    /// Number of cells the layout will place (a record in two groups counts twice)
    pub fn placements(&self) -> usize {
        self.groups.iter().map(|g| g.records.len()).sum()
    }

    pub fn keys(&self) -> Vec<String> {
        self.groups.iter().map(|g| g.key.key()).collect()
    }

    /// Unique image URLs of placed records, in first-seen order
    pub fn image_sources(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.groups
            .iter()
            .flat_map(|g| g.records.iter())
            .filter_map(Record::image_source)
            .filter(|url| seen.insert(url.clone()))
            .collect()
    }
}

/// Partition records into groups.
///
/// `selection` of `None` means "no filter". A present but empty selection
/// in a filtered mode is an error rather than an empty catalog. `Full`
/// mode groups by category and ignores the selection.
pub fn group_records(
    records: &[Record],
    mode: CatalogMode,
    selection: Option<&[String]>,
    labels: &LabelSettings,
) -> CatalogResult<GroupedCatalog> {
    let selection: Option<Vec<&str>> = match (mode, selection) {
        (CatalogMode::Full, _) | (_, None) => None,
        (_, Some(items)) => {
            let items: Vec<&str> = items
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect();
            if items.is_empty() {
                return Err(CatalogError::NoSelection(mode.selection_noun()));
            }
            Some(items)
        }
    };
    let selection = selection.as_deref();

    let grouped = match mode {
        CatalogMode::Author => group_by_author(records, selection, labels),
        CatalogMode::Category | CatalogMode::Full => {
            group_by_category(mode, records, selection, labels)
        }
    };
    tracing::debug!(
        mode = ?mode,
        groups = grouped.groups.len(),
        placements = grouped.placements(),
        "grouped records"
    );
    Ok(grouped)
}

fn group_by_category(
    mode: CatalogMode,
    records: &[Record],
    selection: Option<&[&str]>,
    labels: &LabelSettings,
) -> GroupedCatalog {
    let mut buckets: BTreeMap<Category, Vec<Record>> = BTreeMap::new();

    for record in records {
        let mut paths: Vec<&str> = record.category_paths().collect();
        // Covers blank cells and cells whose only paths lack a main level
        if paths.is_empty() {
            paths.push(labels.uncategorized.as_str());
        }

        let mut placed: Vec<Category> = Vec::new();
        for path in paths {
            // A record may still land under its other, selected categories
            if selection.is_some_and(|items| !items.contains(&path)) {
                continue;
            }
            let category = Category::parse(path);
            if category.main.is_empty() || placed.contains(&category) {
                continue;
            }
            buckets
                .entry(category.clone())
                .or_default()
                .push(record.clone());
            placed.push(category);
        }
    }

    let mut main_categories: Vec<String> = buckets.keys().map(|c| c.main.clone()).collect();
    main_categories.dedup();

    GroupedCatalog {
        mode,
        groups: buckets
            .into_iter()
            .map(|(category, records)| Group {
                key: GroupKey::Category(category),
                records,
            })
            .collect(),
        main_categories,
    }
}

fn group_by_author(
    records: &[Record],
    selection: Option<&[&str]>,
    labels: &LabelSettings,
) -> GroupedCatalog {
    let mut buckets: BTreeMap<String, Vec<Record>> = BTreeMap::new();

    for record in records {
        let author = if record.author.is_empty() {
            labels.unknown_author.as_str()
        } else {
            record.author.as_str()
        };
        if selection.is_some_and(|items| !items.contains(&author)) {
            continue;
        }
        buckets
            .entry(author.to_string())
            .or_default()
            .push(record.clone());
    }

    GroupedCatalog {
        mode: CatalogMode::Author,
        groups: buckets
            .into_iter()
            .map(|(author, records)| Group {
                key: GroupKey::Author(author),
                records,
            })
            .collect(),
        main_categories: Vec::new(),
    }
}

/// A selectable name and how many records carry it
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SummaryEntry {
    pub name: String,
    pub count: usize,
}

fn summarize<'a>(names: impl Iterator<Item = &'a str>) -> Vec<SummaryEntry> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for name in names {
        *counts.entry(name).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(name, count)| SummaryEntry {
            name: name.to_string(),
            count,
        })
        .collect()
}

/// Every category path in the data with its record count, sorted
pub fn category_summary(records: &[Record]) -> Vec<SummaryEntry> {
    summarize(records.iter().flat_map(Record::category_paths))
}

/// Every non-empty author with their record count, sorted
pub fn author_summary(records: &[Record]) -> Vec<SummaryEntry> {
    summarize(
        records
            .iter()
            .map(|r| r.author.as_str())
            .filter(|a| !a.is_empty()),
    )
}
