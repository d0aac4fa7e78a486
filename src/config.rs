use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::builder::{Builder, CommandToolchain, presets};
use crate::controller::ControllerConfig;
use crate::judge::Judge;
use crate::repair::OracleConfig;
use crate::sandbox::{SandboxLimits, SandboxRunner};
use crate::verify::{NormalizationPolicy, Verifier};
use crate::workspace::{WorkspaceConfig, WorkspaceManager};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub limits: LimitsConfig,
    pub build: BuildConfig,
    pub workspace: WorkspaceSection,
    pub verify: NormalizationPolicy,
    pub repair: RepairConfig,
    pub oracle: OracleSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub time_limit_ms: u64,
    pub memory_limit_mb: u64,
    pub sample_interval_ms: u64,
    pub max_output_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            time_limit_ms: 5000,
            memory_limit_mb: 256,
            sample_interval_ms: 10,
            max_output_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub program: String,
    /// Arguments with `{source}` / `{artifact}` placeholders
    pub args: Vec<String>,
    pub timeout_ms: u64,
    pub source_extension: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        let gpp = presets::gpp();
        Self {
            program: gpp.program().to_string(),
            args: gpp.args().to_vec(),
            timeout_ms: 30000,
            source_extension: "cpp".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceSection {
    /// Defaults to `<temp dir>/judgeloop`
    pub dir: Option<PathBuf>,
    pub cleanup_attempts: u32,
    pub cleanup_backoff_ms: u64,
}

impl Default for WorkspaceSection {
    fn default() -> Self {
        Self {
            dir: None,
            cleanup_attempts: 3,
            cleanup_backoff_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    pub max_iterations: u32,
    pub repair_delay_ms: u64,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            repair_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSection {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub api_key_env: String,
    pub api_url: String,
}

impl Default for OracleSection {
    fn default() -> Self {
        let defaults = OracleConfig::default();
        Self {
            model: defaults.model,
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            timeout_ms: defaults.timeout.as_millis() as u64,
            max_retries: defaults.max_retries,
            api_key_env: defaults.api_key_env,
            api_url: defaults.api_url,
        }
    }
}

impl Config {
    /// Load configuration with fallback chain, then apply environment overrides
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file_chain(config_path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn load_file_chain(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_name = env!("CARGO_PKG_NAME");

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Apply `TIME_LIMIT` (seconds), `MEMORY_LIMIT` (MB) and `MAX_ITERATIONS`
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("TIME_LIMIT") {
            let secs: f64 = value
                .trim()
                .parse()
                .context(format!("Invalid TIME_LIMIT '{}'", value))?;
            if !secs.is_finite() || secs <= 0.0 {
                eyre::bail!("TIME_LIMIT must be positive, got '{}'", value);
            }
            self.limits.time_limit_ms = (secs * 1000.0).round() as u64;
        }
        if let Some(value) = lookup("MEMORY_LIMIT") {
            let mb: u64 = value
                .trim()
                .parse()
                .context(format!("Invalid MEMORY_LIMIT '{}'", value))?;
            if mb == 0 || mb.checked_mul(1024 * 1024).is_none() {
                eyre::bail!("MEMORY_LIMIT out of range, got '{}'", value);
            }
            self.limits.memory_limit_mb = mb;
        }
        if let Some(value) = lookup("MAX_ITERATIONS") {
            self.repair.max_iterations = value
                .trim()
                .parse()
                .context(format!("Invalid MAX_ITERATIONS '{}'", value))?;
        }
        Ok(())
    }

    pub fn sandbox_limits(&self) -> SandboxLimits {
        SandboxLimits {
            time_limit: Duration::from_millis(self.limits.time_limit_ms),
            memory_limit: self.limits.memory_limit_mb.saturating_mul(1024 * 1024),
            sample_interval: Duration::from_millis(self.limits.sample_interval_ms),
            max_output_bytes: self.limits.max_output_bytes,
        }
    }

    pub fn toolchain(&self) -> CommandToolchain {
        CommandToolchain::new(&self.build.program, &self.build.program, self.build.args.clone())
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.build.timeout_ms)
    }

    pub fn workspace_config(&self) -> WorkspaceConfig {
        let config = match &self.workspace.dir {
            Some(dir) => WorkspaceConfig::new(dir),
            None => WorkspaceConfig::default(),
        };
        config
            .with_extension(&self.build.source_extension)
            .with_cleanup(
                self.workspace.cleanup_attempts,
                Duration::from_millis(self.workspace.cleanup_backoff_ms),
            )
    }

    pub fn normalization_policy(&self) -> NormalizationPolicy {
        self.verify
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig::new(self.repair.max_iterations)
            .with_repair_delay(Duration::from_millis(self.repair.repair_delay_ms))
    }

    pub fn oracle_config(&self) -> OracleConfig {
        OracleConfig {
            model: self.oracle.model.clone(),
            max_tokens: self.oracle.max_tokens,
            temperature: self.oracle.temperature,
            timeout: Duration::from_millis(self.oracle.timeout_ms),
            max_retries: self.oracle.max_retries,
            api_url: self.oracle.api_url.clone(),
            api_key_env: self.oracle.api_key_env.clone(),
            ..Default::default()
        }
    }

    /// Assemble a judge from this configuration with the platform memory probe
    pub fn judge(&self) -> Judge {
        Judge::new(
            WorkspaceManager::new(self.workspace_config()),
            Builder::new(Arc::new(self.toolchain())).with_timeout(self.compile_timeout()),
            SandboxRunner::default(),
            Verifier::new(self.normalization_policy()),
            self.sandbox_limits(),
        )
    }
}
