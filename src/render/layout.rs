/// Page layout for the catalog document
///
/// Turns a grouped catalog into an ordered list of abstract blocks:
/// - Front matter with the table of contents, closed by a page break
/// - One grid per group, split into pages of `columns × rows` cells
/// - A colored header band per grid, repeated on every page it spans
/// - A page break between groups, and main-category titles in category mode
///
/// Nothing here knows about PDF; the renderer owns geometry and fonts.

use std::path::PathBuf;

use crate::catalog::data::{CatalogMode, Record};
use crate::catalog::library::{GroupKey, GroupedCatalog};
use crate::catalog::settings::{CatalogSettings, LabelSettings, LayoutSettings};
use crate::color::{color_for_category, Swatch, AUTHOR_COLOR};
use crate::error::CatalogResult;
use crate::images::cache::ImageCache;
use crate::progress::{band_percent, Coordinator, BUILD_START, FINALIZE_START};

const ELLIPSIS: &str = "...";

/// Colored band atop a group's grid
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderBand {
    pub label: String,
    pub color: Swatch,
}

/// One grid slot: illustration plus up to four text lines
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub image: PathBuf,
    pub name: String,
    pub code_line: String,
    /// Only in category grouped catalogs, and only for a known author
    pub author_line: Option<String>,
    pub price_line: String,
}

/// Rows of one page; `None` pads the last row
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GridPage {
    pub rows: Vec<Vec<Option<Cell>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridBlock {
    pub header: HeaderBand,
    pub pages: Vec<GridPage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub label: String,
    pub count: usize,
}

/// Abstract content handed to the renderer, in document order
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Document title on the front page
    Title(String),
    /// Vertical gap in points
    Spacer(f32),
    Heading(String),
    TocEntry(TocEntry),
    /// Uppercased main category before its first group
    SectionTitle(String),
    Grid(GridBlock),
    PageBreak,
}

/// A group as the layout sees it
struct Section<'a> {
    header: HeaderBand,
    lead_title: Option<String>,
    records: &'a [Record],
}

fn sections(grouped: &GroupedCatalog) -> Vec<Section<'_>> {
    let mut current_main: Option<&str> = None;
    grouped
        .groups
        .iter()
        .map(|group| match &group.key {
            GroupKey::Category(category) => {
                let lead_title = if current_main != Some(category.main.as_str()) {
                    current_main = Some(category.main.as_str());
                    Some(category.main.to_uppercase())
                } else {
                    None
                };
                Section {
                    header: HeaderBand {
                        label: category.label().to_uppercase(),
                        color: color_for_category(&category.main),
                    },
                    lead_title,
                    records: &group.records,
                }
            }
            GroupKey::Author(name) => Section {
                header: HeaderBand {
                    label: name.to_uppercase(),
                    color: AUTHOR_COLOR,
                },
                lead_title: None,
                records: &group.records,
            },
        })
        .collect()
}

/// Front matter: title, group listing with counts, then a page break
pub fn table_of_contents(grouped: &GroupedCatalog, labels: &LabelSettings) -> Vec<Block> {
    let heading = match grouped.mode {
        CatalogMode::Author => format!("Authors ({})", grouped.groups.len()),
        CatalogMode::Category | CatalogMode::Full => {
            format!("Categories ({} groups)", grouped.groups.len())
        }
    };

    let mut blocks = vec![
        Block::Title(labels.title.clone()),
        Block::Spacer(20.0),
        Block::Heading(heading),
    ];
    blocks.extend(grouped.groups.iter().map(|group| {
        let label = match &group.key {
            GroupKey::Category(category) => category.label(),
            GroupKey::Author(name) => name.clone(),
        };
        Block::TocEntry(TocEntry {
            label,
            count: group.records.len(),
        })
    }));
    blocks.push(Block::PageBreak);
    blocks
}

/// Lay out every group, resolving images through the cache.
///
/// Yields and polls for cancellation once per placed record. Progress moves
/// through the build band in proportion to the records placed.
pub async fn build_blocks(
    grouped: &GroupedCatalog,
    cache: &mut ImageCache,
    settings: &CatalogSettings,
    coordinator: &Coordinator,
) -> CatalogResult<Vec<Block>> {
    let layout = &settings.layout;
    let total = grouped.placements();
    let mut blocks = table_of_contents(grouped, &settings.labels);
    let mut placed = 0;

    for (index, section) in sections(grouped).into_iter().enumerate() {
        if index > 0 {
            blocks.push(Block::PageBreak);
        }
        if let Some(title) = section.lead_title {
            blocks.push(Block::SectionTitle(title));
        }

        let mut cells = Vec::with_capacity(section.records.len());
        for record in section.records {
            tokio::task::yield_now().await;
            coordinator.checkpoint()?;

            let image = cache.resolve(&record.image_url)?;
            cells.push(make_cell(record, image, grouped.mode, settings));
            placed += 1;
            coordinator.report(
                band_percent(BUILD_START, FINALIZE_START, placed, total),
                format!("Building pages ({}/{})", placed, total),
            );
        }

        blocks.push(Block::Grid(GridBlock {
            header: section.header,
            pages: paginate(cells, layout),
        }));
    }

    tracing::info!(blocks = blocks.len(), placed, "layout built");
    Ok(blocks)
}

fn make_cell(record: &Record, image: PathBuf, mode: CatalogMode, settings: &CatalogSettings) -> Cell {
    let labels = &settings.labels;
    let author_line = match mode {
        CatalogMode::Author => None,
        CatalogMode::Category | CatalogMode::Full if record.author.is_empty() => None,
        CatalogMode::Category | CatalogMode::Full => {
            Some(truncate_words(&record.author, settings.layout.author_budget))
        }
    };
    Cell {
        image,
        name: truncate_words(&record.name, settings.layout.name_budget),
        code_line: labels.code_line(&record.code),
        author_line,
        price_line: labels.price_line(&record.price),
    }
}

/// Fill cells row-major into pages of `cells_per_page`; only the final row is padded
pub fn paginate(cells: Vec<Cell>, layout: &LayoutSettings) -> Vec<GridPage> {
    let columns = layout.columns.max(1);
    let per_page = layout.cells_per_page().max(columns);

    let mut pages = Vec::new();
    let mut cells = cells.into_iter().peekable();
    while cells.peek().is_some() {
        let mut page = cells.by_ref().take(per_page).peekable();
        let mut rows: Vec<Vec<Option<Cell>>> = Vec::new();
        while page.peek().is_some() {
            let mut row: Vec<Option<Cell>> = page.by_ref().take(columns).map(Some).collect();
            row.resize(columns, None);
            rows.push(row);
        }
        pages.push(GridPage { rows });
    }
    pages
}

/// Shorten `text` to at most `budget` characters at a word boundary.
///
/// Whole words are kept while they fit next to the ellipsis; a first word
/// that is already too long is cut mid-word.
pub fn truncate_words(text: &str, budget: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= budget {
        return text.to_string();
    }

    let room = budget.saturating_sub(ELLIPSIS.len());
    let mut kept = String::new();
    let mut kept_len = 0;
    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let next_len = if kept.is_empty() { word_len } else { kept_len + 1 + word_len };
        if next_len > room {
            break;
        }
        if !kept.is_empty() {
            kept.push(' ');
        }
        kept.push_str(word);
        kept_len = next_len;
    }
    if kept.is_empty() {
        kept = text.chars().take(room).collect::<String>().trim_end().to_string();
    }

    kept.push_str(ELLIPSIS);
    kept.chars().take(budget).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::data::{records_from_table, sample_table};
    use crate::catalog::library::group_records;
    use crate::error::CatalogError;
    use crate::progress::Phase;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn cell(name: &str) -> Cell {
        Cell {
            image: PathBuf::from("placeholder.jpg"),
            name: name.to_string(),
            code_line: "ISBN: -".to_string(),
            author_line: None,
            price_line: "Rs. 0 /=".to_string(),
        }
    }

    fn grouped(mode: CatalogMode) -> GroupedCatalog {
        let records = records_from_table(&sample_table());
        group_records(&records, mode, None, &LabelSettings::default()).unwrap()
    }

    #[test]
    fn test_truncate_keeps_short_text() {
        assert_eq!(truncate_words("Modern Art", 30), "Modern Art");
        assert_eq!(truncate_words("  Modern Art ", 10), "Modern Art");
    }

    #[test]
    fn test_truncate_at_word_boundary() {
        let out = truncate_words("The Great Gatsby and Other Stories", 10);
        assert_eq!(out, "The...");
        assert!(out.chars().count() <= 10);

        let out = truncate_words("The Great Gatsby and Other Stories", 30);
        assert_eq!(out, "The Great Gatsby and Other...");
    }

    #[test]
    fn test_truncate_long_first_word_and_tiny_budgets() {
        assert_eq!(truncate_words("Supercalifragilistic", 8), "Super...");
        for budget in 0..4 {
            let out = truncate_words("Encyclopedia", budget);
            assert!(out.chars().count() <= budget, "budget {budget}: {out}");
        }
        assert_eq!(truncate_words("Encyclopedia", 2), "..");
    }

    #[test]
    fn test_truncate_counts_characters() {
        let out = truncate_words("Ünïcödé Ünïcödé Ünïcödé", 12);
        assert_eq!(out, "Ünïcödé...");
    }

    #[test]
    fn test_paginate_pads_last_row() {
        let cells: Vec<Cell> = (0..7).map(|i| cell(&i.to_string())).collect();
        let pages = paginate(cells, &LayoutSettings::default());
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].rows.len(), 2);
        assert!(pages[0].rows.iter().all(|row| row.len() == 6));
        assert_eq!(pages[0].rows[1].iter().flatten().count(), 1);
        assert_eq!(pages[0].rows[1][0].as_ref().unwrap().name, "6");
    }

    #[test]
    fn test_paginate_spills_onto_new_pages() {
        let cells: Vec<Cell> = (0..31).map(|i| cell(&i.to_string())).collect();
        let pages = paginate(cells, &LayoutSettings::default());
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].rows.len(), 5);
        assert_eq!(pages[1].rows.len(), 1);
        assert_eq!(pages[1].rows[0][0].as_ref().unwrap().name, "30");
        assert!(paginate(Vec::new(), &LayoutSettings::default()).is_empty());
    }

    #[test]
    fn test_paginate_follows_cells_per_page() {
        let layout = LayoutSettings {
            columns: 4,
            rows: 2,
            ..LayoutSettings::default()
        };
        let cells: Vec<Cell> = (0..17).map(|i| cell(&i.to_string())).collect();
        let pages = paginate(cells, &layout);
        assert_eq!(pages.len(), 17usize.div_ceil(layout.cells_per_page()));
        assert!(pages[..2]
            .iter()
            .all(|page| page.rows.iter().flatten().flatten().count() == layout.cells_per_page()));
        assert_eq!(pages[2].rows.len(), 1);
        assert_eq!(pages[2].rows[0][0].as_ref().unwrap().name, "16");
    }

    #[test]
    fn test_table_of_contents_lists_groups() {
        let catalog = grouped(CatalogMode::Category);
        let blocks = table_of_contents(&catalog, &LabelSettings::default());

        assert_eq!(blocks[0], Block::Title("PRODUCT CATALOG".into()));
        assert_eq!(blocks[2], Block::Heading("Categories (8 groups)".into()));
        assert_eq!(blocks.last(), Some(&Block::PageBreak));
        let entries: Vec<&TocEntry> = blocks
            .iter()
            .filter_map(|b| match b {
                Block::TocEntry(entry) => Some(entry),
                _ => None,
            })
            .collect();
        assert_eq!(entries.len(), 8);
        assert_eq!(entries[0].label, "Arts > Modern");
        assert_eq!(entries[0].count, 1);
    }

    #[tokio::test]
    async fn test_category_layout_structure() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CatalogSettings::default();
        let mut cache = ImageCache::new(dir.path(), &settings);
        let catalog = grouped(CatalogMode::Category);

        let blocks = build_blocks(&catalog, &mut cache, &settings, &Coordinator::new())
            .await
            .unwrap();

        let breaks = blocks.iter().filter(|b| **b == Block::PageBreak).count();
        let titles: Vec<&String> = blocks
            .iter()
            .filter_map(|b| match b {
                Block::SectionTitle(title) => Some(title),
                _ => None,
            })
            .collect();
        let grids: Vec<&GridBlock> = blocks
            .iter()
            .filter_map(|b| match b {
                Block::Grid(grid) => Some(grid),
                _ => None,
            })
            .collect();

        // One after the contents, then one between each pair of groups
        assert_eq!(breaks, 1 + 7);
        assert_eq!(titles.len(), 6);
        assert_eq!(titles[0], "ARTS");
        assert_eq!(grids.len(), 8);
        assert_eq!(grids[0].header.label, "ARTS > MODERN");
        assert_eq!(grids[0].header.color, color_for_category("Arts"));

        let first = grids[0].pages[0].rows[0][0].as_ref().unwrap();
        assert_eq!(first.name, "Modern Art");
        assert_eq!(first.code_line, "ISBN: P008");
        assert_eq!(first.author_line.as_deref(), Some("Banksy"));
        assert_eq!(first.price_line, "Rs. 55.00 /=");
        // Nothing was fetched, so every cell shows the placeholder
        assert_eq!(first.image, dir.path().join("placeholder.jpg"));
        assert!(first.image.exists());
    }

    #[tokio::test]
    async fn test_break_directly_precedes_each_later_group() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CatalogSettings::default();
        let mut cache = ImageCache::new(dir.path(), &settings);
        let catalog = grouped(CatalogMode::Author);

        let blocks = build_blocks(&catalog, &mut cache, &settings, &Coordinator::new())
            .await
            .unwrap();

        let first_grid = blocks.iter().position(|b| matches!(b, Block::Grid(_))).unwrap();
        assert_eq!(blocks[first_grid - 1], Block::PageBreak);
        assert!(!blocks.iter().any(|b| matches!(b, Block::SectionTitle(_))));
        for (i, block) in blocks.iter().enumerate().skip(first_grid + 1) {
            if let Block::Grid(grid) = block {
                assert_eq!(blocks[i - 1], Block::PageBreak);
                assert_eq!(grid.header.color, AUTHOR_COLOR);
                let cell = grid.pages[0].rows[0][0].as_ref().unwrap();
                assert!(cell.author_line.is_none());
            }
        }
    }

    #[tokio::test]
    async fn test_build_progress_reaches_band_end() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CatalogSettings::default();
        let mut cache = ImageCache::new(dir.path(), &settings);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let coordinator = Coordinator::new().with_sink(move |p: u8, m: &str| {
            sink_seen.lock().unwrap().push((p, m.to_string()));
        });

        build_blocks(&grouped(CatalogMode::Category), &mut cache, &settings, &coordinator)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 8);
        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(seen.last().unwrap(), &(FINALIZE_START, "Building pages (8/8)".to_string()));
    }

    #[tokio::test]
    async fn test_build_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CatalogSettings::default();
        let mut cache = ImageCache::new(dir.path(), &settings);
        let polls = Arc::new(AtomicUsize::new(0));
        let probe_polls = polls.clone();
        let coordinator = Coordinator::new()
            .with_cancel(move || probe_polls.fetch_add(1, Ordering::SeqCst) >= 3);

        let result = build_blocks(&grouped(CatalogMode::Full), &mut cache, &settings, &coordinator).await;

        assert!(matches!(result, Err(CatalogError::Cancelled)));
        assert_eq!(polls.load(Ordering::SeqCst), 4);
        coordinator.finish_with(&CatalogError::Cancelled);
        assert_eq!(coordinator.snapshot().phase, Phase::Cancelled);
    }
}
