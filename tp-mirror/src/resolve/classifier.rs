//! Artifact classifier to local placement mapping.

use crate::utils::{MirrorError, Result};

/// An artifact entry from a content descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub id: String,
    pub version: String,
    pub classifier: String,
}

impl ArtifactKey {
    pub fn new(id: &str, version: &str, classifier: &str) -> Self {
        Self {
            id: id.to_string(),
            version: version.to_string(),
            classifier: classifier.to_string(),
        }
    }
}

/// Sub-folder and file suffix for one classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub folder: &'static str,
    pub suffix: &'static str,
}

pub const BUNDLE_CLASSIFIER: &str = "osgi.bundle";
pub const FEATURE_CLASSIFIER: &str = "org.eclipse.update.feature";
pub const BINARY_CLASSIFIER: &str = "binary";

const PLACEMENTS: &[(&str, Placement)] = &[
    (
        BUNDLE_CLASSIFIER,
        Placement {
            folder: "plugins",
            suffix: ".jar",
        },
    ),
    (
        FEATURE_CLASSIFIER,
        Placement {
            folder: "features",
            suffix: ".jar",
        },
    ),
    (
        BINARY_CLASSIFIER,
        Placement {
            folder: "binary",
            suffix: "",
        },
    ),
];

/// Static classifier table. Unknown classifiers fail closed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifierTable;

impl ClassifierTable {
    pub fn lookup(&self, classifier: &str) -> Option<Placement> {
        PLACEMENTS
            .iter()
            .find(|(name, _)| *name == classifier)
            .map(|(_, placement)| *placement)
    }

    /// Path of the artifact relative to the repository folder,
    /// e.g. `plugins/com.x_1.0.0.jar`
    pub fn relative_path(&self, artifact: &ArtifactKey) -> Result<String> {
        let placement =
            self.lookup(&artifact.classifier)
                .ok_or_else(|| MirrorError::UnknownClassifier {
                    classifier: artifact.classifier.clone(),
                    id: artifact.id.clone(),
                    version: artifact.version.clone(),
                })?;

        Ok(format!(
            "{}/{}_{}{}",
            placement.folder, artifact.id, artifact.version, placement.suffix
        ))
    }
}
