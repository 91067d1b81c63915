//! Configuration of [`LookbackRewardVecEnv`](super::LookbackRewardVecEnv).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Normalization of the distances summed into the lookback bonus.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum BonusNormalization {
    /// Raw L2 distances.
    None,

    /// Each distance is divided by the square root of the signal's dimension.
    PerDimension,

    /// The sum is divided by the number of contributing shadow slots.
    PerSlot,
}

/// Configuration of [`LookbackRewardVecEnv`](super::LookbackRewardVecEnv).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct LookbackConfig {
    /// The number of steps looked back, `K`. The shadow pool has `K + 1` slots.
    pub lookback_num: usize,

    /// Scale of the bonus added to the reward.
    pub bonus_coef: f32,

    /// Normalization of the distances.
    pub normalization: BonusNormalization,

    /// Keys of the victim's internal signals compared between the live and shadow worlds.
    pub features: Vec<String>,

    /// Collect debug traces of the live and shadow pipelines.
    pub debug: bool,
}

impl Default for LookbackConfig {
    fn default() -> Self {
        Self {
            lookback_num: 1,
            bonus_coef: 0.05,
            normalization: BonusNormalization::None,
            features: vec!["ff".to_string()],
            debug: false,
        }
    }
}

impl LookbackConfig {
    /// Sets the number of steps looked back.
    pub fn lookback_num(mut self, v: usize) -> Self {
        self.lookback_num = v;
        self
    }

    /// Sets the scale of the bonus.
    pub fn bonus_coef(mut self, v: f32) -> Self {
        self.bonus_coef = v;
        self
    }

    /// Sets the normalization of the distances.
    pub fn normalization(mut self, v: BonusNormalization) -> Self {
        self.normalization = v;
        self
    }

    /// Sets the keys of the compared signals.
    pub fn features(mut self, v: Vec<String>) -> Self {
        self.features = v;
        self
    }

    /// Sets whether debug traces are collected.
    pub fn debug(mut self, v: bool) -> Self {
        self.debug = v;
        self
    }

    /// Constructs [`LookbackConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`LookbackConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_lookback_config() -> Result<()> {
        let config = LookbackConfig::default()
            .lookback_num(4)
            .bonus_coef(0.1)
            .normalization(BonusNormalization::PerSlot)
            .debug(true);
        let dir = TempDir::new("lookback_config")?;
        let path = dir.path().join("lookback_config.yaml");
        config.save(&path)?;
        let config_ = LookbackConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }
}
