mod chat;
mod claude;
mod embeddings;
mod json;
pub mod prompts;
mod summarizer;

pub use chat::{ChatCompletion, ChatModel, ChatRequest};
pub use claude::ClaudeClient;
pub use embeddings::{cosine_similarity, Embedder, Embedding, EmbeddingProvider, OpenAiEmbeddings};
pub use json::{parse_model_json, strip_code_fence};
pub use prompts::DigestItem;
pub use summarizer::{GeneratedDigest, GeneratedSummary, Summarizer};
