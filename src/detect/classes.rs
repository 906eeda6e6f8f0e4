use std::path::Path;

use crate::error::ConfigurationError;

/// Label used when no class name source exists.
pub const DEFAULT_LABEL: &str = "object";

/// Immutable class-id to name mapping, built once per pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassNameTable {
    names: Names,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Names {
    /// Line index (blank lines skipped) is the class id.
    Listed(Vec<String>),
    /// Every id resolves to the same label.
    Uniform(String),
}

impl ClassNameTable {
    /// Parses a newline-delimited list. Blank lines are ignored.
    pub fn from_lines(text: &str) -> Self {
        let names = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            names: Names::Listed(names),
        }
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: Names::Listed(names.into_iter().map(Into::into).collect()),
        }
    }

    /// One label for every class id.
    pub fn uniform(label: impl Into<String>) -> Self {
        Self {
            names: Names::Uniform(label.into()),
        }
    }

    /// Loads a class name file. A file with no names is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let table = Self::from_lines(&text);
        if table.is_empty() {
            return Err(ConfigurationError::EmptyClassNames {
                path: path.display().to_string(),
            });
        }
        Ok(table)
    }

    /// Loads `path` when it exists; otherwise every id maps to `default_label`.
    pub fn load_or_default(
        path: Option<&Path>,
        default_label: &str,
    ) -> Result<Self, ConfigurationError> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            Some(path) => {
                log::warn!(
                    "class names file {} not found, labelling every class '{}'",
                    path.display(),
                    default_label
                );
                Ok(Self::uniform(default_label))
            }
            None => Ok(Self::uniform(default_label)),
        }
    }

    /// Name for `class_id`, or `"Class {id}"` when the table has no entry.
    pub fn name(&self, class_id: u32) -> String {
        match &self.names {
            Names::Listed(names) => names
                .get(class_id as usize)
                .cloned()
                .unwrap_or_else(|| format!("Class {}", class_id)),
            Names::Uniform(label) => label.clone(),
        }
    }

    /// Number of listed names; zero for a uniform table.
    pub fn len(&self) -> usize {
        match &self.names {
            Names::Listed(names) => names.len(),
            Names::Uniform(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_uniform(&self) -> bool {
        matches!(self.names, Names::Uniform(_))
    }
}

impl Default for ClassNameTable {
    fn default() -> Self {
        Self::uniform(DEFAULT_LABEL)
    }
}
