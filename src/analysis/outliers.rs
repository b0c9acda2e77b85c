use crate::domain::model::Trial;
use std::collections::HashMap;

/// Fallback response deadline when the data holds no responses.
pub const DEFAULT_TIMEBOUNDARY: f64 = 0.65;

/// Drops slow responses, more than `sd` standard deviations above the
/// subject's mean RT. Trials without a response are kept.
pub fn remove_outliers(trials: Vec<Trial>, sd: f64) -> Vec<Trial> {
    let mut rts: HashMap<&str, Vec<f64>> = HashMap::new();
    for trial in &trials {
        if let Some(rt) = trial.responded_rt() {
            rts.entry(trial.idx.as_str()).or_default().push(rt);
        }
    }

    let cutoffs: HashMap<String, f64> = rts
        .into_iter()
        .filter(|(_, v)| v.len() > 1)
        .map(|(idx, v)| {
            let n = v.len() as f64;
            let mean = v.iter().sum::<f64>() / n;
            let var = v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
            (idx.to_string(), mean + sd * var.sqrt())
        })
        .collect();

    let before = trials.len();
    let kept: Vec<Trial> = trials
        .into_iter()
        .filter(|t| match (t.responded_rt(), cutoffs.get(&t.idx)) {
            (Some(rt), Some(&cutoff)) => rt <= cutoff,
            _ => true,
        })
        .collect();

    tracing::debug!(
        "Removed {} slow responses (> {} SD above subject mean)",
        before - kept.len(),
        sd
    );
    kept
}

/// Response deadline: the slowest response, rounded up to the nearest 10 ms.
pub fn estimate_timeboundary(trials: &[Trial]) -> f64 {
    trials
        .iter()
        .filter_map(Trial::responded_rt)
        .fold(None, |acc: Option<f64>, rt| Some(acc.map_or(rt, |m| m.max(rt))))
        .map(|max| (max * 100.0 - 1e-9).ceil() / 100.0)
        .unwrap_or(DEFAULT_TIMEBOUNDARY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::TrialType;
    use std::collections::BTreeMap;

    fn go(idx: &str, rt: Option<f64>) -> Trial {
        Trial {
            idx: idx.to_string(),
            ttype: TrialType::Go,
            ssd: None,
            response: rt.is_some(),
            acc: rt.is_some(),
            rt,
            conds: BTreeMap::new(),
        }
    }

    #[test]
    fn test_remove_outliers_drops_slow_tail_per_subject() {
        let mut trials: Vec<Trial> = (0..20).map(|_| go("1", Some(0.45))).collect();
        trials.push(go("1", Some(0.47)));
        trials.push(go("1", Some(2.0)));
        trials.push(go("1", None));
        trials.push(go("2", Some(2.0)));

        let kept = remove_outliers(trials, 2.5);
        assert_eq!(kept.len(), 23);
        assert!(!kept.iter().any(|t| t.idx == "1" && t.rt == Some(2.0)));
        // a single response cannot be judged against its own spread
        assert!(kept.iter().any(|t| t.idx == "2"));
        assert!(kept.iter().any(|t| t.rt.is_none()));
    }

    #[test]
    fn test_estimate_timeboundary() {
        let trials = vec![go("1", Some(0.512)), go("1", Some(0.431)), go("1", None)];
        assert!((estimate_timeboundary(&trials) - 0.52).abs() < 1e-12);

        let trials = vec![go("1", Some(0.6))];
        assert!((estimate_timeboundary(&trials) - 0.6).abs() < 1e-12);

        assert_eq!(estimate_timeboundary(&[go("1", None)]), DEFAULT_TIMEBOUNDARY);
    }
}
