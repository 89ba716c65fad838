//! Anti-cheat score gate.
//!
//! A pure function over the submitted telemetry. Hard physical limits
//! produce errors (reject); suspicious-but-possible readings produce
//! warnings that only lower the confidence score. Tolerances live in one
//! config block so they can be tuned without touching the checks.

use serde::Serialize;

/// Tunable bounds for the gate.
#[derive(Debug, Clone)]
pub struct AntiCheatConfig {
    /// Max points per second of play.
    pub max_score_per_second: f64,
    /// Max points per level reached.
    pub max_score_per_level: f64,
    /// Allowed relative deviation of frame count from 60fps.
    pub max_frame_deviation: f64,
    /// Minimum milliseconds between two inputs (one 60fps frame).
    pub min_input_interval_ms: f64,
    /// Minimum coefficient of variation of input intervals.
    pub min_interval_cv: f64,
    /// Maximum sustained inputs per second.
    pub max_inputs_per_second: f64,
}

impl Default for AntiCheatConfig {
    fn default() -> Self {
        Self {
            max_score_per_second: 50.0,
            max_score_per_level: 1000.0,
            max_frame_deviation: 0.5,
            min_input_interval_ms: 16.0,
            min_interval_cv: 0.05,
            max_inputs_per_second: 30.0,
        }
    }
}

/// Submitted telemetry under review.
#[derive(Debug, Clone)]
pub struct Submission<'a> {
    pub score: i64,
    pub level: i64,
    pub duration_ms: i64,
    pub frame_count: Option<i64>,
    /// Input event timestamps in ms, as recorded by the client.
    pub input_log: Option<&'a [i64]>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// 0-100; starts at 100, each error costs 30, each warning 10.
    pub confidence: u8,
}

/// Run every check and produce a verdict. Valid iff no errors.
pub fn evaluate(config: &AntiCheatConfig, submission: &Submission<'_>) -> Verdict {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let seconds = (submission.duration_ms as f64 / 1000.0).max(0.001);

    let score_rate = submission.score as f64 / seconds;
    if score_rate > config.max_score_per_second {
        errors.push(format!(
            "score rate {:.1}/s exceeds {:.0}/s",
            score_rate, config.max_score_per_second
        ));
    } else if score_rate > config.max_score_per_second * 0.8 {
        warnings.push(format!("score rate {:.1}/s near limit", score_rate));
    }

    let level = submission.level.max(1) as f64;
    let score_per_level = submission.score as f64 / level;
    if score_per_level > config.max_score_per_level {
        errors.push(format!(
            "score per level {:.0} exceeds {:.0}",
            score_per_level, config.max_score_per_level
        ));
    } else if score_per_level > config.max_score_per_level * 0.8 {
        warnings.push(format!("score per level {:.0} near limit", score_per_level));
    }

    if let Some(frame_count) = submission.frame_count {
        let expected = seconds * 60.0;
        let deviation = (frame_count as f64 - expected).abs() / expected.max(1.0);
        if deviation > config.max_frame_deviation {
            errors.push(format!(
                "frame count deviates {:.0}% from 60fps",
                deviation * 100.0
            ));
        } else if deviation > config.max_frame_deviation / 2.0 {
            warnings.push(format!(
                "frame count deviates {:.0}% from 60fps",
                deviation * 100.0
            ));
        }
    }

    if let Some(input_log) = submission.input_log {
        if input_log.len() >= 10 {
            check_input_timing(config, input_log, &mut errors, &mut warnings);
        }
    }

    let confidence = 100i64 - 30 * errors.len() as i64 - 10 * warnings.len() as i64;
    Verdict {
        valid: errors.is_empty(),
        errors,
        warnings,
        confidence: confidence.clamp(0, 100) as u8,
    }
}

fn check_input_timing(
    config: &AntiCheatConfig,
    input_log: &[i64],
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
) {
    let intervals: Vec<f64> = input_log
        .windows(2)
        .map(|pair| (pair[1] - pair[0]) as f64)
        .collect();
    if intervals.is_empty() {
        return;
    }

    let min_interval = intervals.iter().cloned().fold(f64::INFINITY, f64::min);
    if min_interval < config.min_input_interval_ms {
        errors.push(format!(
            "superhuman input interval {:.1}ms",
            min_interval.max(0.0)
        ));
    }

    if intervals.len() > 20 {
        let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
        if mean > 0.0 {
            let variance = intervals
                .iter()
                .map(|v| (v - mean).powi(2))
                .sum::<f64>()
                / intervals.len() as f64;
            let cv = variance.sqrt() / mean;
            if cv < config.min_interval_cv {
                warnings.push(format!("input timing too regular (cv {:.3})", cv));
            }
        }
    }

    let span_ms = (input_log[input_log.len() - 1] - input_log[0]).max(1) as f64;
    let rate = (input_log.len() as f64 - 1.0) / (span_ms / 1000.0);
    if rate > config.max_inputs_per_second {
        warnings.push(format!("mean input rate {:.1}/s", rate));
    }
}
