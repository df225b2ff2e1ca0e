//! Setting resolution.
//!
//! Every setting is resolved in the same order: an explicit value (usually a
//! CLI flag), then its `DOCVEC_*` environment variable, then the entry in the
//! settings database, then the built-in default.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use crate::{
    chunking::{ChunkingConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE},
    config_db::ConfigDb,
    embedding::EmbedderKind,
    error::{Error, Result},
    indexer::{
        DEFAULT_BATCH_COOLDOWN,
        DEFAULT_BATCH_SIZE,
        DEFAULT_FILE_DELAY,
        IndexSettings,
    },
    model_manager::{DEFAULT_MODEL_ID, MODEL_ENV_VAR},
};

/// A persisted, user-editable setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    SourceRoots,
    Embedder,
    Model,
    BatchSize,
    FileDelayMs,
    BatchCooldownMs,
    ChunkSize,
    ChunkOverlap,
}

impl SettingKey {
    pub const ALL: [SettingKey; 8] = [
        SettingKey::SourceRoots,
        SettingKey::Embedder,
        SettingKey::Model,
        SettingKey::BatchSize,
        SettingKey::FileDelayMs,
        SettingKey::BatchCooldownMs,
        SettingKey::ChunkSize,
        SettingKey::ChunkOverlap,
    ];

    /// Name in the settings database.
    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::SourceRoots => "source_roots",
            SettingKey::Embedder => "embedder",
            SettingKey::Model => "model",
            SettingKey::BatchSize => "batch_size",
            SettingKey::FileDelayMs => "file_delay_ms",
            SettingKey::BatchCooldownMs => "batch_cooldown_ms",
            SettingKey::ChunkSize => "chunk_size",
            SettingKey::ChunkOverlap => "chunk_overlap",
        }
    }

    pub fn env_var(self) -> &'static str {
        match self {
            SettingKey::SourceRoots => "DOCVEC_SOURCE",
            SettingKey::Embedder => "DOCVEC_EMBEDDER",
            SettingKey::Model => MODEL_ENV_VAR,
            SettingKey::BatchSize => "DOCVEC_BATCH_SIZE",
            SettingKey::FileDelayMs => "DOCVEC_FILE_DELAY_MS",
            SettingKey::BatchCooldownMs => "DOCVEC_BATCH_COOLDOWN_MS",
            SettingKey::ChunkSize => "DOCVEC_CHUNK_SIZE",
            SettingKey::ChunkOverlap => "DOCVEC_CHUNK_OVERLAP",
        }
    }

    /// Reject values that would fail resolution later.
    pub fn validate(self, value: &str) -> Result<()> {
        match self {
            SettingKey::SourceRoots | SettingKey::Model => {
                if value.trim().is_empty() {
                    return Err(Error::Config(format!(
                        "{} must not be empty",
                        self.as_str()
                    )));
                }
                Ok(())
            }
            SettingKey::Embedder => value.parse::<EmbedderKind>().map(|_| ()),
            SettingKey::BatchSize => {
                parse_batch_size(self.as_str(), value).map(|_| ())
            }
            SettingKey::FileDelayMs
            | SettingKey::BatchCooldownMs
            | SettingKey::ChunkSize
            | SettingKey::ChunkOverlap => {
                parse_value::<u64>(self.as_str(), value).map(|_| ())
            }
        }
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SettingKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::NotFound {
                kind: "setting",
                name: s.to_string(),
            })
    }
}

/// Explicit overrides for indexing settings, typically from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct IndexOverrides {
    pub batch_size: Option<usize>,
    pub file_delay_ms: Option<u64>,
    pub batch_cooldown_ms: Option<u64>,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub force: bool,
    pub exclude: Vec<String>,
}

type EnvLookup<'a> = dyn Fn(&str) -> Option<String> + 'a;

/// Resolves settings against the environment and the settings database.
pub struct Resolver<'a> {
    config: Option<&'a ConfigDb>,
    env: Box<EnvLookup<'a>>,
}

impl<'a> Resolver<'a> {
    /// Resolve against the process environment.
    pub fn new(config: Option<&'a ConfigDb>) -> Self {
        Self::with_env(config, |key| std::env::var(key).ok())
    }

    /// Resolve against a custom environment lookup.
    pub fn with_env(
        config: Option<&'a ConfigDb>,
        env: impl Fn(&str) -> Option<String> + 'a,
    ) -> Self {
        Self {
            config,
            env: Box::new(env),
        }
    }

    /// Environment value, then database value.
    fn lookup(&self, key: SettingKey) -> Result<Option<String>> {
        if let Some(value) = (self.env)(key.env_var())
            && !value.trim().is_empty()
        {
            return Ok(Some(value));
        }
        match self.config {
            Some(db) => db.get_setting(key.as_str()),
            None => Ok(None),
        }
    }

    pub fn source_roots(&self, explicit: &[PathBuf]) -> Result<Vec<PathBuf>> {
        if !explicit.is_empty() {
            return Ok(explicit.to_vec());
        }
        if let Some(value) = self.lookup(SettingKey::SourceRoots)? {
            let roots: Vec<PathBuf> = std::env::split_paths(&OsString::from(value))
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            if !roots.is_empty() {
                return Ok(roots);
            }
        }
        Ok(vec![default_source_root(dirs::home_dir().as_deref())])
    }

    pub fn embedder(&self, explicit: Option<EmbedderKind>) -> Result<EmbedderKind> {
        if let Some(kind) = explicit {
            return Ok(kind);
        }
        match self.lookup(SettingKey::Embedder)? {
            Some(value) => value.parse(),
            None => Ok(EmbedderKind::Colbert),
        }
    }

    pub fn model(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(model) = explicit {
            return Ok(model.to_string());
        }
        Ok(self
            .lookup(SettingKey::Model)?
            .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()))
    }

    pub fn index_settings(
        &self,
        overrides: &IndexOverrides,
    ) -> Result<IndexSettings> {
        let batch_size = match overrides.batch_size {
            Some(n) => n,
            None => match self.lookup(SettingKey::BatchSize)? {
                Some(value) => {
                    parse_batch_size(SettingKey::BatchSize.as_str(), &value)?
                }
                None => DEFAULT_BATCH_SIZE,
            },
        };
        if batch_size == 0 {
            return Err(Error::Config(
                "batch_size must be at least 1".to_string(),
            ));
        }

        let file_delay_ms = self.number(
            SettingKey::FileDelayMs,
            overrides.file_delay_ms,
            DEFAULT_FILE_DELAY.as_millis() as u64,
        )?;
        let batch_cooldown_ms = self.number(
            SettingKey::BatchCooldownMs,
            overrides.batch_cooldown_ms,
            DEFAULT_BATCH_COOLDOWN.as_millis() as u64,
        )?;
        let chunk_size = self.number(
            SettingKey::ChunkSize,
            overrides.chunk_size,
            DEFAULT_CHUNK_SIZE,
        )?;
        let chunk_overlap = self.number(
            SettingKey::ChunkOverlap,
            overrides.chunk_overlap,
            DEFAULT_CHUNK_OVERLAP,
        )?;

        let settings = IndexSettings {
            batch_size,
            file_delay: Duration::from_millis(file_delay_ms),
            batch_cooldown: Duration::from_millis(batch_cooldown_ms),
            chunking: ChunkingConfig {
                chunk_size,
                overlap: chunk_overlap,
            },
            force: overrides.force,
            exclude: overrides.exclude.clone(),
        };
        settings.chunking.validate()?;
        Ok(settings)
    }

    fn number<T: FromStr>(
        &self,
        key: SettingKey,
        explicit: Option<T>,
        default: T,
    ) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        if let Some(value) = explicit {
            return Ok(value);
        }
        match self.lookup(key)? {
            Some(value) => parse_value(key.as_str(), &value),
            None => Ok(default),
        }
    }
}

/// The OneDrive folder under `home`: the first existing of the usual
/// locations, else `~/OneDrive`.
pub fn default_source_root(home: Option<&Path>) -> PathBuf {
    let home = home.map(Path::to_path_buf).unwrap_or_default();
    let candidates = [
        home.join("OneDrive"),
        home.join("Library/CloudStorage/OneDrive-개인"),
        home.join("Library/CloudStorage/OneDrive-Personal"),
    ];
    candidates
        .iter()
        .find(|c| c.is_dir())
        .cloned()
        .unwrap_or_else(|| home.join("OneDrive"))
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        Error::Config(format!("invalid value '{value}' for {name}: {e}"))
    })
}

fn parse_batch_size(name: &str, value: &str) -> Result<usize> {
    match parse_value::<usize>(name, value)? {
        0 => Err(Error::Config(format!("{name} must be at least 1"))),
        n => Ok(n),
    }
}
