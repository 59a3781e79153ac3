use std::{
    collections::HashSet,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use jiff::civil::{date, Date};
use serde::Deserialize;
use thiserror::Error;

/// The address OMIE serves its public files from.
pub const OMIE_URL_TEMPLATE: &str =
    "https://www.omie.es/es/file-download?parents={category}&filename={filename}";

/// Suffix of the monthly and annual archives.
pub const ARCHIVE_SUFFIX: &str = ".zip";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("category table is empty")]
    NoCategories,
    #[error("category {0} is declared more than once")]
    DuplicateCategory(String),
    #[error("category name {0:?} is not a valid folder name")]
    InvalidCategoryName(String),
    #[error("daily category {0} has no suffixes")]
    NoSuffixes(String),
    #[error("daily category {category} has an empty, repeated or path-like suffix {suffix:?}")]
    InvalidSuffix { category: String, suffix: String },
    #[error("start year {start} is after end year {end}")]
    InvertedRange { start: i16, end: i16 },
    #[error("year {0} is out of range")]
    InvalidYear(i16),
    #[error("address template {0} must contain {{category}} and {{filename}}")]
    InvalidTemplate(String),
    #[error("failed to read category file {}: {source}", path.display())]
    CategoryFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse category file {}: {source}", path.display())]
    CategoryJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// How often a category publishes a file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "freq", rename_all = "lowercase")]
pub enum Frequency {
    /// One file per suffix every day, plus an annual archive on January 1st.
    Daily { suffixes: Vec<String> },
    /// One archive on the first day of every month.
    Monthly,
}

/// A family of files, e.g. the daily marginal prices.  The name is both the
/// `parents` query parameter and the name of the local folder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(flatten)]
    pub frequency: Frequency,
}

impl Category {
    pub fn daily(name: &str, suffixes: &[&str]) -> Category {
        Category {
            name: name.to_string(),
            frequency: Frequency::Daily {
                suffixes: suffixes.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    pub fn monthly(name: &str) -> Category {
        Category {
            name: name.to_string(),
            frequency: Frequency::Monthly,
        }
    }

    /// The files tracked from the OMIE portal, in the order they are requested.
    pub fn omie_defaults() -> Vec<Category> {
        vec![
            Category::daily("marginalpdbc", &[".1", ".2", ".3"]),
            Category::monthly("pdbc"),
            Category::monthly("pdvd"),
            Category::monthly("pibci"),
            Category::monthly("trades"),
        ]
    }

    /// Read an ordered category table from a json file, e.g.
    /// `[{"name": "marginalpdbc", "freq": "daily", "suffixes": [".1"]},
    ///   {"name": "pdbc", "freq": "monthly"}]`
    pub fn from_json_file(path: &Path) -> Result<Vec<Category>, ConfigError> {
        let file = File::open(path).map_err(|source| ConfigError::CategoryFile {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| ConfigError::CategoryJson {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Everything a harvest run needs.  Built once and shared read-only by the
/// task enumerator, the fetch worker and the driver.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub root_dir: PathBuf,
    pub log_file: PathBuf,
    /// Contains the `{category}` and `{filename}` placeholders.
    pub url_template: String,
    pub start_year: i16,
    pub end_year: i16,
    pub categories: Vec<Category>,
    /// Pause after a successful download, doubled after a failure.
    pub delay: Duration,
    /// Wait for the response headers.
    pub request_timeout: Duration,
    /// Wait for each chunk of the response body.
    pub chunk_timeout: Duration,
    pub chunk_size: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        HarvestConfig {
            root_dir: PathBuf::from("omie_data"),
            log_file: PathBuf::from("download_errors.log"),
            url_template: OMIE_URL_TEMPLATE.to_string(),
            start_year: 2019,
            end_year: 2025,
            categories: Category::omie_defaults(),
            delay: Duration::from_millis(150),
            request_timeout: Duration::from_secs(15),
            chunk_timeout: Duration::from_secs(15),
            chunk_size: 32 * 1024,
        }
    }
}

impl HarvestConfig {
    /// First day of the start year.
    pub fn start(&self) -> Date {
        date(self.start_year, 1, 1)
    }

    /// Last day of the end year, inclusive.
    pub fn end(&self) -> Date {
        date(self.end_year, 12, 31)
    }

    /// Check the configuration before anything touches the disk or the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for year in [self.start_year, self.end_year] {
            if !(1..=9999).contains(&year) {
                return Err(ConfigError::InvalidYear(year));
            }
        }
        if self.start_year > self.end_year {
            return Err(ConfigError::InvertedRange {
                start: self.start_year,
                end: self.end_year,
            });
        }
        if !self.url_template.contains("{category}") || !self.url_template.contains("{filename}")
        {
            return Err(ConfigError::InvalidTemplate(self.url_template.clone()));
        }
        validate_categories(&self.categories)
    }
}

/// Filenames stay unique as long as category names and the suffixes within a
/// category are unique, so that is what gets checked.
pub fn validate_categories(categories: &[Category]) -> Result<(), ConfigError> {
    if categories.is_empty() {
        return Err(ConfigError::NoCategories);
    }
    let mut names = HashSet::new();
    for category in categories {
        let name = category.name.as_str();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(ConfigError::InvalidCategoryName(category.name.clone()));
        }
        if !names.insert(name) {
            return Err(ConfigError::DuplicateCategory(category.name.clone()));
        }
        if let Frequency::Daily { suffixes } = &category.frequency {
            if suffixes.is_empty() {
                return Err(ConfigError::NoSuffixes(category.name.clone()));
            }
            let mut seen = HashSet::new();
            for suffix in suffixes {
                // a separator would move the file out of root/category
                if suffix.is_empty()
                    || suffix.contains(['/', '\\'])
                    || !seen.insert(suffix.as_str())
                {
                    return Err(ConfigError::InvalidSuffix {
                        category: category.name.clone(),
                        suffix: suffix.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{error::Error, io::Write};

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = HarvestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.start(), date(2019, 1, 1));
        assert_eq!(config.end(), date(2025, 12, 31));
        assert_eq!(config.categories.len(), 5);
        assert_eq!(config.chunk_size, 32768);
    }

    #[test]
    fn reject_bad_tables() {
        let dup = vec![Category::monthly("pdbc"), Category::monthly("pdbc")];
        assert!(matches!(
            validate_categories(&dup),
            Err(ConfigError::DuplicateCategory(_))
        ));

        let no_suffix = vec![Category::daily("marginalpdbc", &[])];
        assert!(matches!(
            validate_categories(&no_suffix),
            Err(ConfigError::NoSuffixes(_))
        ));

        let repeated = vec![Category::daily("marginalpdbc", &[".1", ".1"])];
        assert!(matches!(
            validate_categories(&repeated),
            Err(ConfigError::InvalidSuffix { .. })
        ));

        for suffix in ["/../../escape", "\\..\\escape", ".1/x"] {
            let escaping = vec![Category::daily("marginalpdbc", &[".1", suffix])];
            assert!(matches!(
                validate_categories(&escaping),
                Err(ConfigError::InvalidSuffix { .. })
            ));
        }

        let bad_name = vec![Category::monthly("../etc")];
        assert!(matches!(
            validate_categories(&bad_name),
            Err(ConfigError::InvalidCategoryName(_))
        ));

        assert!(matches!(
            validate_categories(&[]),
            Err(ConfigError::NoCategories)
        ));
    }

    #[test]
    fn reject_bad_range_and_template() {
        let config = HarvestConfig {
            start_year: 2025,
            end_year: 2019,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedRange { .. })
        ));

        let config = HarvestConfig {
            url_template: "https://www.omie.es/es/file-download?filename={filename}".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn read_category_file() -> Result<(), Box<dyn Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"[
                {{"name": "marginalpdbc", "freq": "daily", "suffixes": [".1", ".2"]}},
                {{"name": "trades", "freq": "monthly"}}
            ]"#
        )?;
        let categories = Category::from_json_file(file.path())?;
        assert_eq!(
            categories,
            vec![
                Category::daily("marginalpdbc", &[".1", ".2"]),
                Category::monthly("trades"),
            ]
        );
        Ok(())
    }

    #[test]
    fn unreadable_category_file() {
        let res = Category::from_json_file(Path::new("/nonexistent/categories.json"));
        assert!(matches!(res, Err(ConfigError::CategoryFile { .. })));
    }
}
