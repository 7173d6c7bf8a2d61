//! Load model definitions from a JSON file: either an array of models or `{ "models": [...] }`.

use crate::error::ConfigError;
use crate::model::types::ModelDef;
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
#[serde(untagged)]
enum ModelFile {
    List(Vec<ModelDef>),
    Wrapped { models: Vec<ModelDef> },
}

pub fn parse_models(json: &str) -> Result<Vec<ModelDef>, ConfigError> {
    let file: ModelFile = serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))?;
    Ok(match file {
        ModelFile::List(models) | ModelFile::Wrapped { models } => models,
    })
}

pub fn load_models(path: impl AsRef<Path>) -> Result<Vec<ModelDef>, ConfigError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    let models = parse_models(&json)?;
    tracing::debug!(path = %path.display(), count = models.len(), "loaded model definitions");
    Ok(models)
}
