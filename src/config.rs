//! Experiment definition files.
//!
//! A definition file is TOML with one `[[experiment]]` table per experiment,
//! using the same field names as the serialized [`ExperimentSpec`]:
//!
//! ```toml
//! [[experiment]]
//! id = "checkout-button"
//! name = "Checkout button colour"
//! duration = 1209600            # seconds
//!
//! [[experiment.variants]]
//! id = "blue"
//! name = "control"
//! traffic_percent = 50.0
//!
//! [[experiment.variants]]
//! id = "green"
//! name = "treatment"
//! traffic_percent = 50.0
//!
//! [[experiment.metrics]]
//! name = "conversion"
//! type = "rate"
//! target = "higher_is_better"
//! ```
//!
//! An omitted `id` is filled with a fresh UUID at load time. Loading does not
//! validate the definitions; that happens when they are created in a
//! registry.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::experiment::model::ExperimentSpec;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperimentFile {
    #[serde(default, rename = "experiment")]
    pub experiments: Vec<ExperimentSpec>,
}

impl ExperimentFile {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut file: ExperimentFile = toml::from_str(text)?;
        for spec in &mut file.experiments {
            if spec.id.trim().is_empty() {
                spec.id = uuid::Uuid::new_v4().to_string();
            }
        }
        Ok(file)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let file = Self::from_toml_str(&text)?;
        tracing::debug!(
            target: "config",
            path = %path.display(),
            experiments = file.experiments.len(),
            "definition file loaded"
        );
        Ok(file)
    }

    pub fn find(&self, id: &str) -> Option<&ExperimentSpec> {
        self.experiments.iter().find(|s| s.id == id)
    }
}
