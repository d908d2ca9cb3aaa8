//! Dense vector helpers shared by K-means and centroid assignment.

/// Component-wise mean. Vectors whose dimension differs from the first are skipped.
pub fn mean(vectors: &[&[f32]]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };
    let dim = first.len();

    let mut sum = vec![0.0f64; dim];
    let mut count = 0usize;
    for v in vectors.iter().filter(|v| v.len() == dim) {
        for (acc, x) in sum.iter_mut().zip(v.iter()) {
            *acc += *x as f64;
        }
        count += 1;
    }

    sum.into_iter().map(|s| (s / count as f64) as f32).collect()
}

pub fn squared_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum()
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    squared_distance(a, b).sqrt()
}

/// Index of the centroid nearest to `point`; ties go to the lower index.
pub fn nearest(point: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (i, centroid) in centroids.iter().enumerate() {
        let d = squared_distance(point, centroid);
        if d < best_distance {
            best = i;
            best_distance = d;
        }
    }
    best
}
