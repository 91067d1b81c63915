//! The lookback bonus of a single lane.
use super::{BonusNormalization, LookbackConfig};
use anyhow::Result;
use lookback_core::{error::LookbackError, record::Record};

fn signal<'a>(info: &'a Record, key: &str, world: &str) -> Result<&'a [f32]> {
    info.get_array1(key).map_err(|_| {
        LookbackError::config(format!(
            "Victim signal {} is unavailable in the {} world; is the victim transparent?",
            key, world
        ))
    })
}

fn l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Bonus of a lane whose current episode has length `ep_len`.
///
/// `shadows` holds the victim's info in each shadow slot ordered by offset.
/// Only slots with offset below `ep_len` contribute, so a lane that has just
/// been reset receives no bonus. The bonus is `bonus_coef` times the sum, over
/// contributing slots and configured signals, of the L2 distance between the
/// live and shadow signals, normalized as configured.
pub fn lookback_bonus<'a>(
    live: &Record,
    shadows: impl IntoIterator<Item = &'a Record>,
    ep_len: usize,
    config: &LookbackConfig,
) -> Result<f32> {
    let mut total = 0.0;
    let mut n_slots = 0;
    for shadow in shadows.into_iter().take(ep_len) {
        for key in config.features.iter() {
            let a = signal(live, key, "live")?;
            let b = signal(shadow, key, "shadow")?;
            if a.len() != b.len() {
                return Err(LookbackError::config(format!(
                    "Victim signal {} differs in dimension between worlds ({} and {})",
                    key,
                    a.len(),
                    b.len()
                )));
            }
            let dist = l2(a, b);
            total += match config.normalization {
                BonusNormalization::PerDimension => dist / (a.len().max(1) as f32).sqrt(),
                _ => dist,
            };
        }
        n_slots += 1;
    }

    if config.normalization == BonusNormalization::PerSlot && n_slots > 0 {
        total /= n_slots as f32;
    }
    Ok(config.bonus_coef * total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookback_core::record::RecordValue;

    fn ff(v: &[f32]) -> Record {
        Record::from_slice(&[("ff", RecordValue::Array1(v.to_vec()))])
    }

    fn config(normalization: BonusNormalization) -> LookbackConfig {
        LookbackConfig::default()
            .bonus_coef(0.5)
            .normalization(normalization)
    }

    #[test]
    fn test_gating_by_episode_length() -> Result<()> {
        let live = ff(&[0.0, 0.0]);
        let shadows = vec![ff(&[3.0, 4.0]), ff(&[0.0, 1.0]), ff(&[0.0, 2.0])];
        let c = config(BonusNormalization::None);

        assert_eq!(lookback_bonus(&live, &shadows, 0, &c)?, 0.0);
        assert_eq!(lookback_bonus(&live, &shadows, 1, &c)?, 0.5 * 5.0);
        assert_eq!(lookback_bonus(&live, &shadows, 2, &c)?, 0.5 * 6.0);
        assert_eq!(lookback_bonus(&live, &shadows, 10, &c)?, 0.5 * 8.0);
        Ok(())
    }

    #[test]
    fn test_normalization() -> Result<()> {
        let live = ff(&[0.0, 0.0, 0.0, 0.0]);
        let shadows = vec![ff(&[2.0, 0.0, 0.0, 0.0]), ff(&[0.0, 0.0, 4.0, 0.0])];

        let b = lookback_bonus(&live, &shadows, 2, &config(BonusNormalization::PerDimension))?;
        assert_eq!(b, 0.5 * (1.0 + 2.0));
        let b = lookback_bonus(&live, &shadows, 2, &config(BonusNormalization::PerSlot))?;
        assert_eq!(b, 0.5 * 3.0);
        Ok(())
    }

    #[test]
    fn test_missing_signal() {
        let live = Record::empty();
        let shadows = vec![ff(&[1.0])];
        let c = config(BonusNormalization::None);

        // No slot contributes, so the signal is not needed.
        assert_eq!(lookback_bonus(&live, &shadows, 0, &c).unwrap(), 0.0);

        let err = lookback_bonus(&live, &shadows, 1, &c).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LookbackError>(),
            Some(LookbackError::ConfigurationError(_))
        ));
    }
}
