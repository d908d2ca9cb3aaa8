use std::collections::BTreeSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ai::cosine_similarity;
use crate::config::ClusteringConfig;

use super::kmeans::kmeans_with_rng;
use super::labels::{assign_labels, ThemeLabeler, FALLBACK_THEME};
use super::vector::mean;
use super::ThemeDocument;

/// Mean embedding of a sample of one theme's members.
#[derive(Debug, Clone, PartialEq)]
pub struct ThemeCentroid {
    pub theme: String,
    pub centroid: Vec<f32>,
}

impl ThemeCentroid {
    /// `None` when the theme has no usable sample.
    pub fn from_samples(theme: impl Into<String>, samples: &[Vec<f32>]) -> Option<Self> {
        let refs: Vec<&[f32]> = samples
            .iter()
            .filter(|s| !s.is_empty())
            .map(Vec::as_slice)
            .collect();
        if refs.is_empty() {
            return None;
        }
        Some(Self {
            theme: theme.into(),
            centroid: mean(&refs),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeAssignment {
    pub summary_id: String,
    pub theme: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationMode {
    Full,
    Incremental,
}

/// Labels to write, plus the labels that did not exist before.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationPlan {
    pub mode: ClassificationMode,
    pub assignments: Vec<ThemeAssignment>,
    pub new_themes: BTreeSet<String>,
}

/// Full clustering of the whole corpus, used when no labels exist yet.
pub fn cluster_all<R: Rng + ?Sized>(
    documents: &[ThemeDocument],
    config: &ClusteringConfig,
    labeler: &dyn ThemeLabeler,
    rng: &mut R,
) -> ClassificationPlan {
    let k = full_cluster_count(documents.len(), config.max_clusters);
    let assignments = cluster_and_label(documents, k, config, labeler, rng);
    let new_themes = assignments.iter().map(|a| a.theme.clone()).collect();
    ClassificationPlan {
        mode: ClassificationMode::Full,
        assignments,
        new_themes,
    }
}

/// Place unlabeled documents among existing themes without re-clustering.
///
/// Documents at least `similarity_threshold` similar to some centroid join the
/// best one. The rest are candidates for new themes; too few candidates are
/// force-assigned to their closest centroid instead.
pub fn assign_incremental<R: Rng + ?Sized>(
    documents: &[ThemeDocument],
    centroids: &[ThemeCentroid],
    existing_themes: &[String],
    config: &ClusteringConfig,
    labeler: &dyn ThemeLabeler,
    rng: &mut R,
) -> ClassificationPlan {
    if centroids.is_empty() {
        let theme = existing_themes
            .first()
            .cloned()
            .unwrap_or_else(|| FALLBACK_THEME.to_string());
        return ClassificationPlan {
            mode: ClassificationMode::Incremental,
            assignments: documents
                .iter()
                .map(|d| ThemeAssignment {
                    summary_id: d.summary_id.clone(),
                    theme: theme.clone(),
                })
                .collect(),
            new_themes: BTreeSet::new(),
        };
    }

    let mut assignments = Vec::with_capacity(documents.len());
    // (document, index of closest centroid)
    let mut candidates: Vec<(&ThemeDocument, usize)> = Vec::new();

    for doc in documents {
        let (best, similarity) = best_centroid(&doc.embedding, centroids);
        if similarity >= config.similarity_threshold {
            assignments.push(ThemeAssignment {
                summary_id: doc.summary_id.clone(),
                theme: centroids[best].theme.clone(),
            });
        } else {
            candidates.push((doc, best));
        }
    }

    let mut new_themes = BTreeSet::new();
    if !candidates.is_empty() && candidates.len() >= config.min_new_theme_batch {
        let docs: Vec<ThemeDocument> = candidates.iter().map(|(d, _)| (*d).clone()).collect();
        let k = candidate_cluster_count(docs.len(), config.max_clusters);
        for minted in cluster_and_label(&docs, k, config, labeler, rng) {
            if !existing_themes.contains(&minted.theme) {
                new_themes.insert(minted.theme.clone());
            }
            assignments.push(minted);
        }
    } else {
        for (doc, best) in candidates {
            assignments.push(ThemeAssignment {
                summary_id: doc.summary_id.clone(),
                theme: centroids[best].theme.clone(),
            });
        }
    }

    ClassificationPlan {
        mode: ClassificationMode::Incremental,
        assignments,
        new_themes,
    }
}

/// Closest centroid by cosine similarity; ties keep the earlier centroid.
fn best_centroid(embedding: &[f32], centroids: &[ThemeCentroid]) -> (usize, f32) {
    let mut best = (0, f32::NEG_INFINITY);
    for (i, centroid) in centroids.iter().enumerate() {
        let similarity = cosine_similarity(embedding, &centroid.centroid);
        if similarity > best.1 {
            best = (i, similarity);
        }
    }
    best
}

fn cluster_and_label<R: Rng + ?Sized>(
    documents: &[ThemeDocument],
    k: usize,
    config: &ClusteringConfig,
    labeler: &dyn ThemeLabeler,
    rng: &mut R,
) -> Vec<ThemeAssignment> {
    let vectors: Vec<Vec<f32>> = documents.iter().map(|d| d.embedding.clone()).collect();
    let clusters = kmeans_with_rng(&vectors, k, config.max_iterations, rng);
    let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
    let labels = assign_labels(labeler, &clusters, &texts);

    documents
        .iter()
        .zip(labels)
        .map(|(doc, theme)| ThemeAssignment {
            summary_id: doc.summary_id.clone(),
            theme,
        })
        .collect()
}

fn sqrt_half(n: usize) -> usize {
    ((n as f64) / 2.0).sqrt().round() as usize
}

/// k for clustering the whole corpus, never more than the document count.
pub fn full_cluster_count(n: usize, max_clusters: usize) -> usize {
    sqrt_half(n).clamp(2, max_clusters.max(2)).min(n)
}

/// k for minting themes from new-theme candidates.
pub fn candidate_cluster_count(n: usize, max_clusters: usize) -> usize {
    sqrt_half(n).clamp(1, max_clusters.max(1))
}
