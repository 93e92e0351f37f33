//! Staged migration from the primary to the secondary provider

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use log::{debug, info};
use serde::Serialize;
use crate::error::ConfigError;
use crate::failover::RoutingPolicy;

pub const AB_TESTING_KEY: &str = "ENABLE_AB_TESTING";
pub const RATIO_KEY: &str = "YANDEX_GPT_RATIO";
pub const SECONDARY_KEY: &str = "ENABLE_YANDEX_GPT";
pub const FALLBACK_KEY: &str = "FALLBACK_TO_OPENAI";

/// Where a routing policy sits on the migration path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStage
{   /// Primary only
    Baseline
  , /// Stage 1: 50/50 A/B split
    AbSplit50
  , /// Stage 2: 75% to the secondary
    AbSplit75
  , /// Stage 3: all traffic to the secondary
    Full
  , /// Anything else
    Custom
}

impl MigrationStage
{   /// Stage selected by number on the command line
    pub fn from_number(n: u8) -> Option<Self>
    {   match n
        {   1 => Some(MigrationStage::AbSplit50)
          , 2 => Some(MigrationStage::AbSplit75)
          , 3 => Some(MigrationStage::Full)
          , _ => None
        }
    }

    /// Classify an active policy
    ///
    /// A disabled secondary is the baseline whatever the A/B flag
    /// says.
    pub fn of(policy: &RoutingPolicy) -> Self
    {   let ab = policy.ab_testing_enabled();
        let ratio = policy.secondary_ratio();
        if !policy.secondary_enabled()
        {   MigrationStage::Baseline
        } else if ab && ratio == 0.5
        {   MigrationStage::AbSplit50
        } else if ab && ratio == 0.75
        {   MigrationStage::AbSplit75
        } else if !ab && ratio == 1.0
        {   MigrationStage::Full
        } else
        {   MigrationStage::Custom
        }
    }

    /// Env settings that put the service into this stage
    pub fn settings(&self) -> Option<[(&'static str, &'static str); 4]>
    {   let values = match self
        {   MigrationStage::Baseline => ["false", "0.0", "false", "true"]
          , MigrationStage::AbSplit50 => ["true", "0.5", "true", "true"]
          , MigrationStage::AbSplit75 => ["true", "0.75", "true", "true"]
          , MigrationStage::Full => ["false", "1.0", "true", "true"]
          , MigrationStage::Custom => return None
        };
        Some([
          (AB_TESTING_KEY, values[0])
        , (RATIO_KEY, values[1])
        , (SECONDARY_KEY, values[2])
        , (FALLBACK_KEY, values[3])
        ])
    }
}

impl fmt::Display for MigrationStage
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   let label = match self
        {   MigrationStage::Baseline => "baseline (primary only)"
          , MigrationStage::AbSplit50 => "stage 1: A/B split 50/50"
          , MigrationStage::AbSplit75 => "stage 2: 75% secondary"
          , MigrationStage::Full => "stage 3: full migration"
          , MigrationStage::Custom => "custom configuration"
        };
        f.write_str(label)
    }
}

/// Set `key=value` in env file content, appending when absent
///
/// CRLF content stays CRLF.
pub fn set_env_value(content: &str, key: &str, value: &str) -> String
{   let eol = if content.contains("\r\n") { "\r\n" } else { "\n" };
    let prefix = format!("{}=", key);
    let mut updated = false;
    let mut lines: Vec<String> = content
      .lines()
      .map(|line| {
        if line.starts_with(&prefix)
        {   updated = true;
            format!("{}={}", key, value)
        } else
        {   line.to_string()
        }
      })
      .collect();

    if !updated
    {   lines.push(format!("{}={}", key, value));
    }
    let mut out = lines.join(eol);
    out.push_str(eol);
    out
}

/// Edits an env file to move between migration stages
#[derive(Debug, Clone)]
pub struct MigrationController
{   env_file: PathBuf
  , backup_file: PathBuf
}

impl MigrationController
{   pub fn new(env_file: impl Into<PathBuf>) -> Self
    {   let env_file = env_file.into();
        let mut backup = env_file.clone().into_os_string();
        backup.push(".backup");
        MigrationController
        {   env_file
          , backup_file: PathBuf::from(backup)
        }
    }

    pub fn env_file(&self) -> &Path
    {   &self.env_file
    }

    pub fn backup_file(&self) -> &Path
    {   &self.backup_file
    }

    /// Copy the env file aside, if it exists
    pub fn backup(&self) -> Result<bool, ConfigError>
    {   if !self.env_file.exists()
        {   return Ok(false);
        }
        fs::copy(&self.env_file, &self.backup_file)?;
        debug!("Backed up {:?} to {:?}", self.env_file, self.backup_file);
        Ok(true)
    }

    /// Write the stage's settings, backing up first
    pub fn apply(&self, stage: MigrationStage)
      -> Result<Vec<(&'static str, &'static str)>, ConfigError>
    {   let Some(settings) = stage.settings() else
        {   return Ok(vec![]);
        };
        self.backup()?;
        self.write(&settings)?;
        info!("Applied migration {}", stage);
        Ok(settings.to_vec())
    }

    /// Restore the backup when present, else write the baseline
    pub fn rollback(&self) -> Result<bool, ConfigError>
    {   if self.backup_file.exists()
        {   fs::copy(&self.backup_file, &self.env_file)?;
            info!("Restored {:?} from backup", self.env_file);
            return Ok(true);
        }
        if let Some(settings) = MigrationStage::Baseline.settings()
        {   self.write(&settings)?;
        }
        info!("Rolled back to baseline");
        Ok(false)
    }

    fn write(&self, settings: &[(&str, &str)]) -> Result<(), ConfigError>
    {   let mut content = if self.env_file.exists()
        {   fs::read_to_string(&self.env_file)?
        } else
        {   String::new()
        };
        for (key, value) in settings
        {   content = set_env_value(&content, key, value);
        }
        fs::write(&self.env_file, content)?;
        Ok(())
    }
}
