use std::fmt;
use std::path::PathBuf;

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    #[default]
    Production,
}

impl Environment {
    /// Unknown names resolve to `Production` so privileged operations fail closed.
    pub fn parse_or_production(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            "staging" => Environment::Staging,
            _ => Environment::Production,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    pub fn is_trusted(self) -> bool {
        !matches!(self, Environment::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an operation runs. Privileged operations ask it for a capability
/// instead of reading ambient process state.
#[derive(Clone, Debug, Default)]
pub struct ExecutionContext {
    pub environment: Environment,
    pub content_root: PathBuf,
}

impl ExecutionContext {
    pub fn builder() -> ExecutionContextBuilder {
        ExecutionContextBuilder::default()
    }

    pub fn development() -> Self {
        Self::builder().environment(Environment::Development).build()
    }

    pub fn production() -> Self {
        Self::builder().environment(Environment::Production).build()
    }

    pub fn import_capability(&self) -> Result<ImportCapability> {
        if self.environment.is_trusted() {
            Ok(ImportCapability {
                environment: self.environment,
            })
        } else {
            Err(Error::UnauthorizedImport {
                environment: self.environment.to_string(),
            })
        }
    }

    /// Resolves a relative path against the content root.
    pub fn resolve_path(&self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        if path.is_absolute() {
            path
        } else {
            self.content_root.join(path)
        }
    }
}

#[derive(Default)]
pub struct ExecutionContextBuilder {
    environment: Environment,
    content_root: Option<PathBuf>,
}

impl ExecutionContextBuilder {
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn content_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.content_root = Some(root.into());
        self
    }

    pub fn build(self) -> ExecutionContext {
        ExecutionContext {
            environment: self.environment,
            content_root: self.content_root.unwrap_or_default(),
        }
    }
}

/// Proof that the holder may run a bulk import. Only
/// [`ExecutionContext::import_capability`] hands these out.
#[derive(Debug)]
pub struct ImportCapability {
    environment: Environment,
}

impl ImportCapability {
    pub fn environment(&self) -> Environment {
        self.environment
    }
}
