/// Catalog generation settings
///
/// Every tunable of a run lives here: grid geometry, fetch policy and
/// the text labels printed in the document. Settings are plain data,
/// serialized to JSON so a run can be configured from a file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};

/// Points per inch
const INCH: f32 = 72.0;

/// All settings for a generation run
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct CatalogSettings {
    pub layout: LayoutSettings,
    pub fetch: FetchSettings,
    pub labels: LabelSettings,
    /// Parent directory for per-run scratch directories (OS temp dir when unset)
    pub scratch_root: Option<PathBuf>,
}

/// Page geometry and grid, all lengths in PDF points
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LayoutSettings {
    /// Cells per grid row
    pub columns: usize,
    /// Grid rows per page
    pub rows: usize,
    pub page_width: f32,
    pub page_height: f32,
    pub margin_left: f32,
    pub margin_right: f32,
    pub margin_top: f32,
    pub margin_bottom: f32,
    pub image_width: f32,
    pub image_height: f32,
    pub cell_width: f32,
    pub cell_height: f32,
    /// Height of the colored group header row
    pub header_height: f32,
    /// Character budget of the name line
    pub name_budget: usize,
    /// Character budget of the author line
    pub author_budget: usize,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            columns: 6,
            rows: 5,
            // US Letter
            page_width: 8.5 * INCH,
            page_height: 11.0 * INCH,
            margin_left: 0.2 * INCH,
            margin_right: 0.2 * INCH,
            margin_top: 0.1 * INCH,
            margin_bottom: 0.1 * INCH,
            image_width: 70.0,
            image_height: 85.0,
            cell_width: 85.0,
            cell_height: 135.0,
            header_height: 20.0,
            name_budget: 30,
            author_budget: 25,
        }
    }
}

impl LayoutSettings {
    pub fn cells_per_page(&self) -> usize {
        self.columns * self.rows
    }
}

/// Image acquisition policy
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FetchSettings {
    /// Size of the fetch worker pool
    pub concurrency: usize,
    /// Extra attempts after the first one for transient failures
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry
    pub backoff_base_ms: u64,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Cached images are stored at this multiple of the display size
    pub upscale: u32,
    pub jpeg_quality: u8,
    pub placeholder_quality: u8,
    /// `#RRGGBB`
    pub placeholder_color: String,
    /// Progress is reported every this many completed fetches
    pub report_every: usize,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            concurrency: 10,
            max_retries: 5,
            backoff_base_ms: 1000,
            connect_timeout_secs: 5,
            read_timeout_secs: 15,
            upscale: 8,
            jpeg_quality: 95,
            placeholder_quality: 90,
            placeholder_color: "#f0f0f0".to_string(),
            report_every: 5,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36".to_string(),
        }
    }
}

impl FetchSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

/// Text printed in the document
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LabelSettings {
    pub title: String,
    /// Prefix of the code line, e.g. "ISBN"
    pub code_label: String,
    pub price_prefix: String,
    pub price_suffix: String,
    /// Group name for records without an author
    pub unknown_author: String,
    /// Group name for records without a category
    pub uncategorized: String,
}

impl Default for LabelSettings {
    fn default() -> Self {
        Self {
            title: "PRODUCT CATALOG".to_string(),
            code_label: "ISBN".to_string(),
            price_prefix: "Rs. ".to_string(),
            price_suffix: " /=".to_string(),
            unknown_author: "Unknown Author".to_string(),
            uncategorized: "Uncategorized".to_string(),
        }
    }
}

impl LabelSettings {
    pub fn code_line(&self, code: &str) -> String {
        let code = if code.is_empty() { "-" } else { code };
        format!("{}: {}", self.code_label, code)
    }

    pub fn price_line(&self, price: &str) -> String {
        let price = if price.is_empty() { "0" } else { price };
        format!("{}{}{}", self.price_prefix, price, self.price_suffix)
    }
}

impl CatalogSettings {
    /// Convert to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from JSON string; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load and validate settings from a JSON file
    pub fn load(path: &Path) -> CatalogResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let settings = Self::from_json(&json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check this represents stock settings
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> CatalogResult<()> {
        let layout = &self.layout;
        if layout.columns == 0 || layout.rows == 0 {
            return Err(CatalogError::InvalidSettings(
                "grid needs at least one column and one row".into(),
            ));
        }
        if layout.columns as f32 * layout.cell_width
            > layout.page_width - layout.margin_left - layout.margin_right
        {
            return Err(CatalogError::InvalidSettings(
                "grid is wider than the printable page".into(),
            ));
        }
        if self.fetch.concurrency == 0 {
            return Err(CatalogError::InvalidSettings(
                "fetch pool needs at least one worker".into(),
            ));
        }
        for quality in [self.fetch.jpeg_quality, self.fetch.placeholder_quality] {
            if !(1..=100).contains(&quality) {
                return Err(CatalogError::InvalidSettings(format!(
                    "jpeg quality {} is outside 1-100",
                    quality
                )));
            }
        }
        if crate::color::Swatch::from_hex(&self.fetch.placeholder_color).is_none() {
            return Err(CatalogError::InvalidSettings(format!(
                "placeholder color {:?} is not #RRGGBB",
                self.fetch.placeholder_color
            )));
        }
        if self.fetch.upscale == 0 {
            return Err(CatalogError::InvalidSettings("upscale must be at least 1".into()));
        }
        Ok(())
    }
}
