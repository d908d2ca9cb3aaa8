use std::collections::BTreeMap;

/// Names a cluster from the texts of its members.
pub trait ThemeLabeler: Send + Sync {
    fn label(&self, texts: &[&str]) -> String;
}

pub const FALLBACK_THEME: &str = "General";

/// Categories in tie-break order.
const LEXICON: &[(&str, &[&str])] = &[
    (
        "Frontend",
        &[
            "frontend", "css", "html", "react", "vue", "svelte", "angular", "javascript",
            "typescript", "browser", "dom", "ui", "ux", "tailwind", "nextjs", "フロントエンド",
            "前端",
        ],
    ),
    (
        "Backend",
        &[
            "backend", "api", "database", "sql", "postgres", "server", "rust", "go", "golang",
            "java", "python", "microservice", "microservices", "rest", "graphql", "cache",
            "バックエンド", "データベース", "サーバー", "后端", "数据库", "服务器",
        ],
    ),
    (
        "AI",
        &[
            "ai", "llm", "llms", "gpt", "claude", "openai", "anthropic", "model", "models",
            "neural", "embedding", "embeddings", "ml", "agent", "agents", "prompt", "transformer",
            "人工知能", "機械学習", "言語モデル", "人工智能", "机器学习", "大模型",
        ],
    ),
    (
        "DevOps",
        &[
            "devops", "docker", "kubernetes", "k8s", "ci", "cd", "deploy", "deployment", "terraform",
            "aws", "gcp", "azure", "cloud", "infrastructure", "monitoring", "observability",
            "デプロイ", "クラウド", "インフラ", "コンテナ", "部署", "容器", "运维",
        ],
    ),
];

/// Scripts written without spaces between words: kana, CJK ideographs, Thai.
fn is_unspaced(c: char) -> bool {
    matches!(
        c,
        '\u{0E00}'..='\u{0E7F}'
            | '\u{3040}'..='\u{30FF}'
            | '\u{3400}'..='\u{4DBF}'
            | '\u{4E00}'..='\u{9FFF}'
            | '\u{FF66}'..='\u{FF9F}'
    )
}

/// Coarse keyword scoring against a small fixed lexicon.
///
/// Keywords in spaced scripts match whole words. Keywords in unspaced
/// scripts have no word boundaries to rely on and match as substrings.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordLabeler;

impl KeywordLabeler {
    fn scores(texts: &[&str]) -> Vec<(&'static str, usize)> {
        let mut words: BTreeMap<String, usize> = BTreeMap::new();
        let mut runs: Vec<&str> = Vec::new();
        for text in texts {
            for word in text
                .split(|c: char| !c.is_alphanumeric() || is_unspaced(c))
                .filter(|w| !w.is_empty())
            {
                *words.entry(word.to_lowercase()).or_default() += 1;
            }
            runs.extend(text.split(|c: char| !is_unspaced(c)).filter(|r| !r.is_empty()));
        }

        LEXICON
            .iter()
            .map(|(category, keywords)| {
                let score = keywords
                    .iter()
                    .map(|k| {
                        if k.chars().any(is_unspaced) {
                            runs.iter().map(|r| r.matches(*k).count()).sum()
                        } else {
                            words.get(*k).copied().unwrap_or(0)
                        }
                    })
                    .sum();
                (*category, score)
            })
            .collect()
    }
}

impl ThemeLabeler for KeywordLabeler {
    fn label(&self, texts: &[&str]) -> String {
        let mut best = (FALLBACK_THEME, 0);
        for (category, score) in Self::scores(texts) {
            if score > best.1 {
                best = (category, score);
            }
        }
        best.0.to_string()
    }
}

/// Label per document, one label per cluster computed from all its members.
pub fn assign_labels(labeler: &dyn ThemeLabeler, clusters: &[usize], texts: &[&str]) -> Vec<String> {
    let mut members: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
    for (cluster, text) in clusters.iter().zip(texts) {
        members.entry(*cluster).or_default().push(*text);
    }

    let labels: BTreeMap<usize, String> = members
        .into_iter()
        .map(|(cluster, texts)| (cluster, labeler.label(&texts)))
        .collect();

    clusters
        .iter()
        .map(|c| labels.get(c).cloned().unwrap_or_else(|| FALLBACK_THEME.to_string()))
        .collect()
}
