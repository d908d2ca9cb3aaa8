use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use super::vector::{mean, nearest, squared_distance};

/// Cluster `vectors` into at most `k` groups, returning a cluster index per vector.
///
/// With no more vectors than clusters every vector is its own cluster.
pub fn kmeans(vectors: &[Vec<f32>], k: usize, max_iterations: usize) -> Vec<usize> {
    kmeans_with_rng(vectors, k, max_iterations, &mut rand::thread_rng())
}

pub fn kmeans_with_rng<R: Rng + ?Sized>(
    vectors: &[Vec<f32>],
    k: usize,
    max_iterations: usize,
    rng: &mut R,
) -> Vec<usize> {
    let n = vectors.len();
    if n <= k {
        return (0..n).collect();
    }
    let k = k.max(1);

    let mut centroids = seed_centroids(vectors, k, rng);
    let mut assignments: Vec<usize> = vectors.iter().map(|v| nearest(v, &centroids)).collect();

    for iteration in 0..max_iterations {
        centroids = recompute_centroids(vectors, &assignments, &centroids);
        let next: Vec<usize> = vectors.iter().map(|v| nearest(v, &centroids)).collect();
        if next == assignments {
            tracing::trace!(iteration, k, n, "K-means converged");
            break;
        }
        assignments = next;
    }

    assignments
}

/// K-means++: first centroid uniform, the rest weighted by squared distance
/// to the nearest centroid chosen so far.
fn seed_centroids<R: Rng + ?Sized>(vectors: &[Vec<f32>], k: usize, rng: &mut R) -> Vec<Vec<f32>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(vectors[rng.gen_range(0..vectors.len())].clone());

    while centroids.len() < k {
        let weights: Vec<f64> = vectors
            .iter()
            .map(|v| {
                centroids
                    .iter()
                    .map(|c| squared_distance(v, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();

        let index = match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(rng),
            // Every point coincides with a centroid already.
            Err(_) => rng.gen_range(0..vectors.len()),
        };
        centroids.push(vectors[index].clone());
    }
    centroids
}

/// Mean of each cluster's members; a cluster left empty keeps its centroid.
fn recompute_centroids(vectors: &[Vec<f32>], assignments: &[usize], previous: &[Vec<f32>]) -> Vec<Vec<f32>> {
    previous
        .iter()
        .enumerate()
        .map(|(cluster, old)| {
            let members: Vec<&[f32]> = vectors
                .iter()
                .zip(assignments)
                .filter(|(_, a)| **a == cluster)
                .map(|(v, _)| v.as_slice())
                .collect();
            if members.is_empty() {
                old.clone()
            } else {
                mean(&members)
            }
        })
        .collect()
}
