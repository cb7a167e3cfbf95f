use std::{
    fs::File,
    io::{BufReader, Write as _},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_yaml::from_reader;
use tracing::{debug, info, instrument};

use crate::{data::prepare::DegeneratePolicy, error::EmicastError};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct EmicastConfig {
    pub data_dir: String,
    pub csv_file: String,
    pub model_path: String,
    pub categorical_columns: Vec<String>,
    pub candidate_features: Vec<String>,
    pub target_column: String,
    pub sample_cap: usize,
    pub forecast_horizon: usize,
    pub hidden_layers: Vec<usize>,
    pub learning_rate: f64,
    pub validation_split: f64,
    pub degenerate_policy: DegeneratePolicy,
    pub port: u16,
    pub seed: Option<u64>,
}

const DEFAULT_DATA: &str = r#"
data-dir: "data"
csv-file: "emissions.csv"
model-path: "models/emissions-model.bin"
categorical-columns:
  - "tipo_emissao"
  - "gas"
  - "atividade_economica"
  - "produto"
  - "nivel_1"
  - "nivel_2"
  - "nivel_3"
  - "nivel_4"
  - "nivel_5"
  - "nivel_6"
candidate-features:
  - "ano"
  - "tipo_emissao_num"
  - "gas_num"
  - "atividade_economica_num"
target-column: "emissao"
sample-cap: 1000
forecast-horizon: 10
hidden-layers:
  - 64
  - 32
learning-rate: 0.001
validation-split: 0.2
degenerate-policy: "substitute-unit"
port: 3000
"#;

impl Default for EmicastConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            csv_file: "emissions.csv".to_string(),
            model_path: "models/emissions-model.bin".to_string(),
            categorical_columns: vec![
                "tipo_emissao".to_string(),
                "gas".to_string(),
                "atividade_economica".to_string(),
                "produto".to_string(),
                "nivel_1".to_string(),
                "nivel_2".to_string(),
                "nivel_3".to_string(),
                "nivel_4".to_string(),
                "nivel_5".to_string(),
                "nivel_6".to_string(),
            ],
            candidate_features: vec![
                "ano".to_string(),
                "tipo_emissao_num".to_string(),
                "gas_num".to_string(),
                "atividade_economica_num".to_string(),
            ],
            target_column: "emissao".to_string(),
            sample_cap: 1000,
            forecast_horizon: 10,
            hidden_layers: vec![64, 32],
            learning_rate: 0.001,
            validation_split: 0.2,
            degenerate_policy: DegeneratePolicy::SubstituteUnit,
            port: 3000,
            seed: None,
        }
    }
}

impl EmicastConfig {
    /// Reads the configuration from a YAML file.
    ///
    /// If the file does not exist, it creates a default configuration file.
    #[instrument(level = "info", skip(filename))]
    pub fn read_config<P: AsRef<Path>>(filename: Option<P>) -> Result<Self, EmicastError> {
        let path = filename
            .map(|p| p.as_ref().to_path_buf())
            .unwrap_or_else(|| Path::new("config.yml").to_path_buf());

        info!(path = %path.display(), "Reading configuration");

        if !path.exists() {
            info!(
                "Config file does not exist. Creating default config at {}",
                path.display()
            );
            let mut file = File::create(&path)?;
            file.write_all(DEFAULT_DATA.as_bytes())?;
            debug!("Default configuration file created");
            return Ok(EmicastConfig::default());
        }

        let file = File::open(&path)?;
        let reader = BufReader::new(file);
        let config: Self = from_reader(reader)?;
        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EmicastError> {
        if self.hidden_layers.is_empty() {
            return Err(EmicastError::Config(
                "At least one hidden layer is required".to_string(),
            ));
        }
        if self.learning_rate <= 0.0 {
            return Err(EmicastError::Config(
                "Learning rate must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(EmicastError::Config(
                "Validation split must be in [0, 1)".to_string(),
            ));
        }
        if self.candidate_features.is_empty() {
            return Err(EmicastError::Config(
                "At least one candidate feature is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Full path to the source CSV file.
    pub fn csv_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.csv_file)
    }

    pub fn model_path(&self) -> PathBuf {
        PathBuf::from(&self.model_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_config_file_does_not_exist() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();
        drop(temp_file);

        assert!(!path.exists());

        let config = EmicastConfig::read_config(Some(&path)).unwrap();

        assert_eq!(config, EmicastConfig::default());
        assert!(path.exists());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_read_config_file_exists_valid_yaml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let yaml_content = r#"
data-dir: "other-data"
target-column: "co2"
sample-cap: 500
hidden-layers:
  - 16
"#;
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = EmicastConfig::read_config(Some(temp_file.path())).unwrap();

        assert_eq!(config.data_dir, "other-data");
        assert_eq!(config.target_column, "co2");
        assert_eq!(config.sample_cap, 500);
        assert_eq!(config.hidden_layers, vec![16]);
        // Unspecified fields fall back to defaults
        assert_eq!(config.csv_file, "emissions.csv");
        assert_eq!(config.forecast_horizon, 10);
    }

    #[test]
    fn compare_default_config() {
        let default_config = EmicastConfig::default();
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(DEFAULT_DATA.as_bytes()).unwrap();
        let config = EmicastConfig::read_config(Some(temp_file.path())).unwrap();
        assert_eq!(default_config, config);
    }

    #[test]
    fn test_csv_path() {
        let config = EmicastConfig::default();
        assert_eq!(config.csv_path(), Path::new("data").join("emissions.csv"));
    }

    #[test]
    fn test_validate_rejects_bad_split() {
        let config = EmicastConfig {
            validation_split: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EmicastError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_hidden_layers() {
        let config = EmicastConfig {
            hidden_layers: vec![],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EmicastError::Config(_))));
    }
}
