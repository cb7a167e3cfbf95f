use std::{
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::Path,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{error::EmicastError, model::network::DenseNetwork};

/// The durable form of a trained model: network weights plus enough context
/// to serve `/api/model-info` after a process restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedModel {
    pub network: DenseNetwork,
    pub feature_names: Vec<String>,
    pub target_name: String,
    pub created_at: DateTime<Utc>,
}

/// Writes the model to the fixed on-disk location, creating parent
/// directories as needed.
pub fn save_model<P: AsRef<Path>>(path: P, model: &SavedModel) -> Result<(), EmicastError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    bincode::serde::encode_into_std_write(model, &mut writer, bincode::config::standard())?;
    info!("Model saved to {}", path.display());
    Ok(())
}

/// Loads a previously saved model. A missing or unreadable file surfaces as
/// `ModelUnavailable` so callers can tell the user to train first.
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<SavedModel, EmicastError> {
    let path = path.as_ref();
    if !path.exists() {
        debug!("No saved model at {}", path.display());
        return Err(EmicastError::ModelUnavailable);
    }

    let file = File::open(path).map_err(|e| {
        warn!("Failed to open saved model {}: {}", path.display(), e);
        EmicastError::ModelUnavailable
    })?;
    let mut reader = BufReader::new(file);
    match bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard()) {
        Ok(model) => {
            info!("Loaded saved model from {}", path.display());
            Ok(model)
        }
        Err(e) => {
            warn!(
                "Failed to deserialize saved model {}: {}",
                path.display(),
                e
            );
            Err(EmicastError::ModelUnavailable)
        }
    }
}
