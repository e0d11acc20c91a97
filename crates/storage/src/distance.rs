//! Vector distances for nearest-neighbour lookups
//!
//! Lower is closer. Vectors of different length are compared over the shorter
//! prefix and the length difference is reported by the caller's validation.

use vitrum_core::Distance;

/// Distance between two vectors
pub fn compute(distance: Distance, a: &[f32], b: &[f32]) -> f64 {
    match distance {
        Distance::Euclidean => euclidean(a, b),
        Distance::Manhattan => manhattan(a, b),
        Distance::Chisquared => chisquared(a, b),
        Distance::Cosine => cosine(a, b),
    }
}

fn euclidean(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = (*x - *y) as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

fn manhattan(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| ((*x - *y) as f64).abs()).sum()
}

fn chisquared(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let sum = (*x + *y) as f64;
            if sum.abs() < f64::EPSILON {
                0.0
            } else {
                let d = (*x - *y) as f64;
                d * d / sum
            }
        })
        .sum()
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        dot += (*x as f64) * (*y as f64);
        na += (*x as f64) * (*x as f64);
        nb += (*y as f64) * (*y as f64);
    }
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    1.0 - dot / (na.sqrt() * nb.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors_are_zero() {
        let v = [0.1f32, 0.4, 0.5];
        for d in [
            Distance::Euclidean,
            Distance::Manhattan,
            Distance::Chisquared,
            Distance::Cosine,
        ] {
            assert!(compute(d, &v, &v).abs() < 1e-9, "{}", d.name());
        }
    }

    #[test]
    fn test_euclidean() {
        assert!((compute(Distance::Euclidean, &[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_manhattan() {
        assert!((compute(Distance::Manhattan, &[0.0, 0.0], &[3.0, 4.0]) - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_chisquared_skips_empty_bins() {
        assert_eq!(compute(Distance::Chisquared, &[0.0, 1.0], &[0.0, 1.0]), 0.0);
        assert!((compute(Distance::Chisquared, &[1.0, 0.0], &[0.0, 1.0]) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!((compute(Distance::Cosine, &[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-9);
    }
}
