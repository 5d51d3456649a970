use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use toml_edit::{DocumentMut, value};
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub oracle: OracleSection,
    #[serde(default)]
    pub batch: BatchSection,
}

/// Which extraction strategy the oracle uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OracleBackend {
    /// Gemini vision model reading the PDF itself.
    #[default]
    Gemini,
    /// Regex patterns over the PDF's text layer.
    Heuristics,
}

impl OracleBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            OracleBackend::Gemini => "gemini",
            OracleBackend::Heuristics => "heuristics",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct OracleSection {
    #[serde(default)]
    pub backend: OracleBackend,
    #[serde(default)]
    pub gemini: GeminiSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiSection {
    pub base_url: String,
    /// Tried in order until one answers.
    pub models: Vec<String>,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for GeminiSection {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            models: vec![
                "gemini-2.0-flash".to_string(),
                "gemini-2.0-flash-lite-preview-02-05".to_string(),
            ],
            api_key_env: "GOOGLE_API_KEY".to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchSection {
    pub input_dir: PathBuf,
    pub output: PathBuf,
    pub limit: usize,
    pub item_workers: usize,
    pub doc_workers: usize,
    /// Pause after every oracle call, keeps a batch under the API rate limit.
    pub api_delay_ms: u64,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("batch_input"),
            output: PathBuf::from("batch_results.json"),
            limit: 10,
            item_workers: 3,
            doc_workers: 3,
            api_delay_ms: 0,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Like `load`, but a missing file means built-in defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(toml::from_str(content)?)
    }

    /// Rewrite `oracle.backend` in place, leaving the rest of the file untouched.
    pub fn update_backend(
        path: impl AsRef<Path>,
        backend: OracleBackend,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let content = if path.exists() {
            fs::read_to_string(path)?
        } else {
            String::new()
        };
        let mut doc = content.parse::<DocumentMut>()?;

        if !doc.contains_key("oracle") {
            doc["oracle"] = toml_edit::table();
        }
        doc["oracle"]["backend"] = value(backend.as_str());

        fs::write(path, doc.to_string())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let cfg = Config::from_toml_str("").unwrap();
        assert_eq!(cfg.oracle.backend, OracleBackend::Gemini);
        assert_eq!(cfg.oracle.gemini.api_key_env, "GOOGLE_API_KEY");
        assert_eq!(cfg.oracle.gemini.models.len(), 2);
        assert_eq!(cfg.batch.limit, 10);
        assert_eq!(cfg.batch.doc_workers, 3);
    }

    #[test]
    fn test_partial_sections() {
        let cfg = Config::from_toml_str(
            r#"
            [oracle]
            backend = "heuristics"

            [oracle.gemini]
            models = ["gemini-2.5-flash"]

            [batch]
            api_delay_ms = 5000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.oracle.backend, OracleBackend::Heuristics);
        assert_eq!(cfg.oracle.gemini.models, vec!["gemini-2.5-flash"]);
        assert_eq!(cfg.oracle.gemini.timeout_secs, 120);
        assert_eq!(cfg.batch.api_delay_ms, 5000);
        assert_eq!(cfg.batch.item_workers, 3);
    }

    #[test]
    fn test_sample_config_parses() {
        let cfg = Config::from_toml_str(include_str!("../shipcheck.toml")).unwrap();
        assert_eq!(cfg.oracle.gemini.timeout_secs, 120);
        assert_eq!(cfg.batch.output, PathBuf::from("batch_results.json"));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(Config::from_toml_str("[oracle]\nbackend = \"ocr\"").is_err());
    }

    #[test]
    fn test_update_backend_keeps_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipcheck.toml");
        fs::write(
            &path,
            "# shipment checks\n[oracle]\nbackend = \"gemini\"\n\n[batch]\nlimit = 4 # small\n",
        )
        .unwrap();

        Config::update_backend(&path, OracleBackend::Heuristics).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("# shipment checks"));
        assert!(written.contains("limit = 4 # small"));
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.oracle.backend, OracleBackend::Heuristics);
        assert_eq!(cfg.batch.limit, 4);
    }

    #[test]
    fn test_update_backend_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.toml");

        Config::update_backend(&path, OracleBackend::Heuristics).unwrap();

        let cfg = Config::load_or_default(&path).unwrap();
        assert_eq!(cfg.oracle.backend, OracleBackend::Heuristics);
    }
}
