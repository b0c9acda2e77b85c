use rand::Rng;
use std::collections::BTreeMap;

/// Indices of a resample with replacement: `n` draws from `0..len`.
pub fn rwr<R: Rng + ?Sized>(len: usize, n: usize, rng: &mut R) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    (0..n).map(|_| rng.random_range(0..len)).collect()
}

/// Resamples `n` rows (with replacement) within every group of `key`.
pub fn resample_data<T, K, F, R>(rows: &[T], n: usize, key: F, rng: &mut R) -> Vec<T>
where
    T: Clone,
    K: Ord,
    F: Fn(&T) -> K,
    R: Rng + ?Sized,
{
    let mut groups: BTreeMap<K, Vec<&T>> = BTreeMap::new();
    for row in rows {
        groups.entry(key(row)).or_default().push(row);
    }
    let mut out = Vec::with_capacity(groups.len() * n);
    for members in groups.values() {
        for i in rwr(members.len(), n, rng) {
            out.push(members[i].clone());
        }
    }
    out
}

/// Builds `nsubjects` synthetic subjects, each a grouped resample of `rows`.
/// `assign` stamps the subject id onto each resampled row.
pub fn bootstrap_data<T, K, F, A, R>(
    rows: &[T],
    nsubjects: usize,
    n: usize,
    key: F,
    mut assign: A,
    rng: &mut R,
) -> Vec<T>
where
    T: Clone,
    K: Ord,
    F: Fn(&T) -> K,
    A: FnMut(&mut T, usize),
    R: Rng + ?Sized,
{
    let mut out = Vec::new();
    for subject in 1..=nsubjects {
        let mut boot = resample_data(rows, n, &key, rng);
        for row in &mut boot {
            assign(row, subject);
        }
        out.extend(boot);
    }
    out
}
