use crate::core::catalog::{
    DirectoryOptions, DEFAULT_CATALOG_ENDPOINT, DEFAULT_NAME_COLUMN, DEFAULT_PAGE_SIZE,
    DEFAULT_RESOURCE_ID, DEFAULT_URL_COLUMN,
};
use crate::core::export::ExportFormat;
use crate::core::extractor::{
    FieldTable, MissingCodePolicy, RollExtractor, UnitField, UnitMatcher, DEFAULT_BUILDING_VALUE_TAG,
    DEFAULT_CODE_TAG, DEFAULT_DWELLING_TAG, DEFAULT_LAND_VALUE_TAG, DEFAULT_ROLL_YEAR_TAG,
    DEFAULT_UNKNOWN_CODE,
};
use crate::core::fetch::DEFAULT_DOCUMENT_TIMEOUT;
use crate::utils::error::{ExplorerError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Optional settings file. Every section and key may be omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub catalog: CatalogConfig,
    pub document: DocumentConfig,
    pub extract: ExtractConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub endpoint: String,
    pub resource_id: String,
    pub page_size: usize,
    pub name_column: String,
    pub url_column: String,
    pub cache_ttl_seconds: u64,
    pub timeout_seconds: Option<u64>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CATALOG_ENDPOINT.to_string(),
            resource_id: DEFAULT_RESOURCE_ID.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            name_column: DEFAULT_NAME_COLUMN.to_string(),
            url_column: DEFAULT_URL_COLUMN.to_string(),
            cache_ttl_seconds: 3600,
            timeout_seconds: Some(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    pub timeout_seconds: u64,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_DOCUMENT_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Fixed unit element name. When unset, any element with a code child is a unit.
    pub unit_element: Option<String>,
    pub code_tag: String,
    pub dwelling_tag: String,
    pub land_value_tag: String,
    pub building_value_tag: String,
    pub roll_year_tag: String,
    /// `"label"` or `"skip"`.
    pub on_missing_code: String,
    pub unknown_label: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            unit_element: None,
            code_tag: DEFAULT_CODE_TAG.to_string(),
            dwelling_tag: DEFAULT_DWELLING_TAG.to_string(),
            land_value_tag: DEFAULT_LAND_VALUE_TAG.to_string(),
            building_value_tag: DEFAULT_BUILDING_VALUE_TAG.to_string(),
            roll_year_tag: DEFAULT_ROLL_YEAR_TAG.to_string(),
            on_missing_code: "label".to_string(),
            unknown_label: DEFAULT_UNKNOWN_CODE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub format: ExportFormat,
    pub bundle: bool,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ExplorerError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${ROLL_RESOURCE_ID})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ExplorerError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn directory_options(&self) -> DirectoryOptions {
        DirectoryOptions {
            page_size: self.catalog.page_size,
            name_column: self.catalog.name_column.trim().to_lowercase(),
            url_column: self.catalog.url_column.trim().to_lowercase(),
            cache_ttl: Duration::from_secs(self.catalog.cache_ttl_seconds),
        }
    }

    pub fn catalog_timeout(&self) -> Option<Duration> {
        self.catalog.timeout_seconds.map(Duration::from_secs)
    }

    pub fn document_timeout(&self) -> Duration {
        Duration::from_secs(self.document.timeout_seconds)
    }

    pub fn missing_code_policy(&self) -> Result<MissingCodePolicy> {
        match self.extract.on_missing_code.trim().to_lowercase().as_str() {
            "label" => Ok(MissingCodePolicy::Label(self.extract.unknown_label.clone())),
            "skip" => Ok(MissingCodePolicy::Skip),
            other => Err(ExplorerError::InvalidConfigValueError {
                field: "extract.on_missing_code".to_string(),
                value: other.to_string(),
                reason: "Valid values: label, skip".to_string(),
            }),
        }
    }

    /// Builds the roll extractor from the `[extract]` section.
    pub fn extractor(&self) -> Result<RollExtractor> {
        let extract = &self.extract;
        let fields = FieldTable::default()
            .with_tag(UnitField::ClassificationCode, extract.code_tag.trim())
            .with_tag(UnitField::DwellingCount, extract.dwelling_tag.trim())
            .with_tag(UnitField::LandValue, extract.land_value_tag.trim())
            .with_tag(UnitField::BuildingValue, extract.building_value_tag.trim())
            .with_tag(UnitField::RollYear, extract.roll_year_tag.trim());

        let matcher = match &extract.unit_element {
            Some(element) => UnitMatcher::Element(element.trim().to_string()),
            None => UnitMatcher::HasChild(extract.code_tag.trim().to_string()),
        };

        Ok(RollExtractor::new(matcher, fields, self.missing_code_policy()?))
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_url("catalog.endpoint", &self.catalog.endpoint)?;
        validation::validate_non_empty_string("catalog.resource_id", &self.catalog.resource_id)?;
        validation::validate_range("catalog.page_size", self.catalog.page_size, 1, 32_000)?;
        validation::validate_non_empty_string("catalog.name_column", &self.catalog.name_column)?;
        validation::validate_non_empty_string("catalog.url_column", &self.catalog.url_column)?;
        if let Some(timeout) = self.catalog.timeout_seconds {
            validation::validate_range("catalog.timeout_seconds", timeout, 1, 3600)?;
        }
        validation::validate_range("document.timeout_seconds", self.document.timeout_seconds, 1, 3600)?;

        for (field, tag) in [
            ("extract.code_tag", &self.extract.code_tag),
            ("extract.dwelling_tag", &self.extract.dwelling_tag),
            ("extract.land_value_tag", &self.extract.land_value_tag),
            ("extract.building_value_tag", &self.extract.building_value_tag),
            ("extract.roll_year_tag", &self.extract.roll_year_tag),
        ] {
            validation::validate_non_empty_string(field, tag)?;
        }
        if let Some(element) = &self.extract.unit_element {
            validation::validate_non_empty_string("extract.unit_element", element)?;
        }
        self.missing_code_policy()?;

        Ok(())
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();

        assert_eq!(config.catalog.endpoint, DEFAULT_CATALOG_ENDPOINT);
        assert_eq!(config.catalog.page_size, 100);
        assert_eq!(config.export.format, ExportFormat::Csv);
        assert!(config.validate().is_ok());
        assert_eq!(
            config.extractor().unwrap().matcher(),
            &UnitMatcher::HasChild("RL0105A".to_string())
        );
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[catalog]
endpoint = "https://catalog.example/api/3/action/datastore_search"
resource_id = "abc-123"
page_size = 250
name_column = " Nom du Territoire "
cache_ttl_seconds = 60

[document]
timeout_seconds = 30

[extract]
unit_element = "ligne"
code_tag = "CUBF"
on_missing_code = "skip"

[export]
format = "tsv"
bundle = true
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();

        assert!(config.validate().is_ok());
        let options = config.directory_options();
        assert_eq!(options.page_size, 250);
        assert_eq!(options.name_column, "nom du territoire");
        assert_eq!(options.url_column, "lien");
        assert_eq!(options.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.document_timeout(), Duration::from_secs(30));
        assert_eq!(config.export.format, ExportFormat::Tsv);
        assert!(config.export.bundle);

        let extractor = config.extractor().unwrap();
        assert_eq!(extractor.matcher(), &UnitMatcher::Element("ligne".to_string()));
        assert_eq!(
            extractor.fields().tag_for(UnitField::ClassificationCode),
            Some("CUBF")
        );
        assert_eq!(config.missing_code_policy().unwrap(), MissingCodePolicy::Skip);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("ROLL_EXPLORER_TEST_RESOURCE", "from-env");

        let config = TomlConfig::from_toml_str(
            r#"
[catalog]
resource_id = "${ROLL_EXPLORER_TEST_RESOURCE}"
"#,
        )
        .unwrap();
        assert_eq!(config.catalog.resource_id, "from-env");

        std::env::remove_var("ROLL_EXPLORER_TEST_RESOURCE");
    }

    #[test]
    fn test_config_validation() {
        let bad_endpoint = TomlConfig::from_toml_str("[catalog]\nendpoint = \"invalid-url\"").unwrap();
        assert!(bad_endpoint.validate().is_err());

        let bad_page = TomlConfig::from_toml_str("[catalog]\npage_size = 0").unwrap();
        assert!(bad_page.validate().is_err());

        let bad_policy = TomlConfig::from_toml_str("[extract]\non_missing_code = \"guess\"").unwrap();
        assert!(bad_policy.validate().is_err());

        assert!(TomlConfig::from_toml_str("[export]\nformat = \"xlsx\"").is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[extract]\nunknown_label = \"Inconnu\"\n")
            .unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(
            config.missing_code_policy().unwrap(),
            MissingCodePolicy::Label("Inconnu".to_string())
        );
    }
}
