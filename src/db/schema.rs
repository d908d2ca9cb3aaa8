pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- users table (settings and credentials per owner)
CREATE TABLE IF NOT EXISTS users (
    owner_id TEXT PRIMARY KEY,
    claude_api_key TEXT,
    openai_api_key TEXT,
    raindrop_token TEXT,
    monthly_budget_usd TEXT,
    default_tone TEXT NOT NULL DEFAULT 'neutral',
    utc_offset_minutes INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

-- articles table
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    remote_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    url TEXT NOT NULL,
    excerpt TEXT,
    cover_url TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    collection_id INTEGER,
    remote_created_at TEXT,
    synced_at TEXT NOT NULL,
    deleted_at TEXT,
    UNIQUE(owner_id, remote_id)
);

CREATE INDEX IF NOT EXISTS idx_articles_owner_created ON articles(owner_id, remote_created_at DESC);

-- summaries table
CREATE TABLE IF NOT EXISTS summaries (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
    tone TEXT NOT NULL,
    summary TEXT,
    rating INTEGER,
    rating_reason TEXT,
    facts TEXT,
    model TEXT,
    embedding TEXT,
    theme TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    error_message TEXT,
    user_rating INTEGER,
    user_feedback TEXT,
    is_public INTEGER NOT NULL DEFAULT 0,
    deleted_at TEXT,
    completed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_summaries_owner_article_tone
    ON summaries(owner_id, article_id, tone) WHERE deleted_at IS NULL;
CREATE INDEX IF NOT EXISTS idx_summaries_owner_status ON summaries(owner_id, status);
CREATE INDEX IF NOT EXISTS idx_summaries_owner_theme ON summaries(owner_id, theme);
CREATE INDEX IF NOT EXISTS idx_summaries_owner_completed ON summaries(owner_id, completed_at);

-- usage_records table (append-only cost ledger)
CREATE TABLE IF NOT EXISTS usage_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    summary_id TEXT,
    provider TEXT NOT NULL,
    model TEXT NOT NULL,
    input_tokens INTEGER NOT NULL,
    output_tokens INTEGER NOT NULL,
    cost_usd TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_usage_owner_created ON usage_records(owner_id, created_at);

-- digests table
CREATE TABLE IF NOT EXISTS digests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    period_type TEXT NOT NULL,
    period_start TEXT NOT NULL,
    period_end TEXT NOT NULL,
    content TEXT NOT NULL,
    summary_count INTEGER NOT NULL,
    top_themes TEXT NOT NULL DEFAULT '[]',
    model TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(owner_id, period_type, period_start, period_end)
);

-- notifications table (persisted copy of every fan-out event)
CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    event TEXT NOT NULL,
    data TEXT NOT NULL,
    is_read INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notifications_owner ON notifications(owner_id, is_read);

-- jobs table (durable event queue)
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    owner_id TEXT,
    payload TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    attempts INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL,
    last_error TEXT,
    dedupe_key TEXT UNIQUE,
    run_after TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_status_run_after ON jobs(status, run_after);

-- job_steps table (memoized step results, one row per completed step)
CREATE TABLE IF NOT EXISTS job_steps (
    job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    step_name TEXT NOT NULL,
    result TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    PRIMARY KEY (job_id, step_name)
);
"#;
