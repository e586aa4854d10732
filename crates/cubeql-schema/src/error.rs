use std::path::PathBuf;
use thiserror::Error;

/// Why a schema document was rejected. Nothing is registered on error.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Malformed schema document at byte {position}: {message}")]
    Malformed { position: usize, message: String },

    #[error("Failed to read schema file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Expected <Schema> root element, found <{0}>")]
    UnexpectedRoot(String),

    #[error("Schema '{0}' declares no cubes")]
    NoCubes(String),

    #[error("<{element}> is missing required attribute '{attribute}'")]
    MissingAttribute { element: String, attribute: String },

    #[error("Cube '{0}' has no fact table")]
    MissingFactTable(String),

    #[error("Dimension '{dimension}' in cube '{cube}' has a hierarchy with no levels")]
    EmptyHierarchy { cube: String, dimension: String },

    #[error("Dimension '{dimension}' in cube '{cube}' declares more than one hierarchy")]
    MultipleHierarchies { cube: String, dimension: String },

    #[error("Dimension '{dimension}' in cube '{cube}' joins a table but has no foreignKey")]
    MissingForeignKey { cube: String, dimension: String },

    #[error("Measure '{measure}' in cube '{cube}': unknown aggregator '{aggregator}'")]
    UnknownAggregator {
        cube: String,
        measure: String,
        aggregator: String,
    },

    #[error("Duplicate {kind} name '{name}' in {scope}")]
    Duplicate {
        kind: &'static str,
        name: String,
        scope: String,
    },

    #[error("DimensionUsage '{usage}' in cube '{cube}' references unknown shared dimension '{shared}'")]
    UnknownSharedDimension {
        cube: String,
        usage: String,
        shared: String,
    },
}

impl SchemaError {
    pub(crate) fn missing(element: &str, attribute: &str) -> Self {
        SchemaError::MissingAttribute {
            element: element.to_string(),
            attribute: attribute.to_string(),
        }
    }
}
