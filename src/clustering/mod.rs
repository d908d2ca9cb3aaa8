//! Theme clustering over summary embeddings: K-means for a fresh corpus,
//! centroid assignment once themes exist.

mod incremental;
mod kmeans;
mod labels;
mod vector;

pub use crate::config::ClusteringConfig;
pub use incremental::{
    assign_incremental, candidate_cluster_count, cluster_all, full_cluster_count,
    ClassificationMode, ClassificationPlan, ThemeAssignment, ThemeCentroid,
};
pub use kmeans::{kmeans, kmeans_with_rng};
pub use labels::{assign_labels, KeywordLabeler, ThemeLabeler, FALLBACK_THEME};
pub use vector::{euclidean_distance, mean};

/// A completed summary as clustering input.
#[derive(Debug, Clone, PartialEq)]
pub struct ThemeDocument {
    pub summary_id: String,
    /// Article title and summary text.
    pub text: String,
    pub embedding: Vec<f32>,
    pub theme: Option<String>,
}
