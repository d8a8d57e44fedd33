//! Audio filter expressions.

use audiotk_models::VolumeAdjustment;

/// Range a single `atempo` stage accepts without degrading.
const ATEMPO_MIN: f64 = 0.5;
const ATEMPO_MAX: f64 = 2.0;

/// Split a speed factor into `atempo` stages that each stay within 0.5..=2.0.
///
/// The product of the stages equals `speed`.
pub fn atempo_stages(speed: f64) -> Vec<f64> {
    let mut remaining = speed;
    let mut stages = Vec::new();

    while remaining > ATEMPO_MAX {
        stages.push(ATEMPO_MAX);
        remaining /= ATEMPO_MAX;
    }
    while remaining < ATEMPO_MIN {
        stages.push(ATEMPO_MIN);
        remaining /= ATEMPO_MIN;
    }
    stages.push(remaining);
    stages
}

/// Tempo change that keeps pitch.
pub fn atempo_filter(speed: f64) -> String {
    atempo_stages(speed)
        .into_iter()
        .map(|stage| format!("atempo={}", format_number(stage)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Resampling speed change; pitch moves with speed.
pub fn resample_speed_filter(speed: f64, sample_rate: u32) -> String {
    let shifted = (sample_rate as f64 * speed).round() as u64;
    format!("asetrate={},aresample={}", shifted, sample_rate)
}

/// Filter implementing a volume adjustment.
pub fn volume_filter(adjustment: &VolumeAdjustment) -> String {
    match *adjustment {
        VolumeAdjustment::Percentage(pct) => {
            format!("volume={}", format_number(pct as f64 / 100.0))
        }
        VolumeAdjustment::Decibels(db) => format!("volume={}dB", format_number(db)),
        VolumeAdjustment::Normalize(target) => format!("loudnorm=I={}", format_number(target)),
    }
}

/// Shortest decimal form with at most six fractional digits.
pub fn format_number(value: f64) -> String {
    let fixed = format!("{:.6}", value);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(stages: &[f64]) -> f64 {
        stages.iter().product()
    }

    #[test]
    fn test_atempo_stages_stay_in_range() {
        for speed in [0.25, 0.3, 0.5, 0.75, 1.0, 1.5, 2.0, 2.5, 3.7, 4.0] {
            let stages = atempo_stages(speed);
            assert!(
                stages.iter().all(|s| (ATEMPO_MIN..=ATEMPO_MAX).contains(s)),
                "{:?} for {}",
                stages,
                speed
            );
            assert!((product(&stages) - speed).abs() < 1e-9);
        }
    }

    #[test]
    fn test_atempo_filter() {
        assert_eq!(atempo_filter(1.5), "atempo=1.5");
        assert_eq!(atempo_filter(4.0), "atempo=2,atempo=2");
        assert_eq!(atempo_filter(0.25), "atempo=0.5,atempo=0.5");
        assert_eq!(atempo_filter(3.0), "atempo=2,atempo=1.5");
    }

    #[test]
    fn test_resample_speed_filter() {
        assert_eq!(resample_speed_filter(1.5, 44_100), "asetrate=66150,aresample=44100");
    }

    #[test]
    fn test_volume_filter() {
        assert_eq!(volume_filter(&VolumeAdjustment::Percentage(150)), "volume=1.5");
        assert_eq!(volume_filter(&VolumeAdjustment::Percentage(0)), "volume=0");
        assert_eq!(volume_filter(&VolumeAdjustment::Decibels(-3.5)), "volume=-3.5dB");
        assert_eq!(volume_filter(&VolumeAdjustment::Normalize(-16.0)), "loudnorm=I=-16");
    }
}
