//! 文档检索端口
//!
//! 向量检索由外部能力提供；核心只依赖 DocumentRetriever trait，
//! 命中的片段以「Context from uploaded files」块注入规划与合成提示词。
//! 内置 KeywordRetriever 为词项重合度的内存实现，供测试与无向量库场景使用。

use std::sync::RwLock;

use async_trait::async_trait;

/// 相似检索 trait：query 返回按相关度排序的文本片段
#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<String>, String>;
}

/// 文档切块大小（字符数）
const CHUNK_CHARS: usize = 1000;

/// 内存检索器：按词项重合计分（无向量库时的退化实现）
#[derive(Default)]
pub struct KeywordRetriever {
    chunks: RwLock<Vec<String>>,
}

impl KeywordRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一篇文档：按 CHUNK_CHARS 切块后入库
    pub fn add_document(&self, text: &str) {
        let mut chunks = self.chunks.write().expect("retriever lock poisoned");
        let cs: Vec<char> = text.chars().collect();
        for piece in cs.chunks(CHUNK_CHARS) {
            let piece: String = piece.iter().collect();
            let piece = piece.trim().to_string();
            if !piece.is_empty() {
                chunks.push(piece);
            }
        }
    }

    pub fn clear(&self) {
        self.chunks.write().expect("retriever lock poisoned").clear();
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.read().expect("retriever lock poisoned").is_empty()
    }

    fn score(query_terms: &[String], chunk: &str) -> usize {
        let lower = chunk.to_lowercase();
        query_terms.iter().filter(|t| lower.contains(t.as_str())).count()
    }
}

#[async_trait]
impl DocumentRetriever for KeywordRetriever {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<String>, String> {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .filter(|t| t.chars().count() > 1)
            .map(String::from)
            .collect();

        let chunks = self.chunks.read().map_err(|e| e.to_string())?;
        let mut scored: Vec<(usize, &String)> = chunks
            .iter()
            .map(|c| (Self::score(&terms, c), c))
            .filter(|(s, _)| *s > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().take(k).map(|(_, c)| c.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_search_ranks_by_overlap() {
        let retriever = KeywordRetriever::new();
        retriever.add_document("The refund policy allows returns within 30 days.");
        retriever.add_document("Our office opens at nine in the morning.");

        let hits = retriever
            .similarity_search("what is the refund policy", 4)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].contains("refund"));
    }

    #[tokio::test]
    async fn test_empty_store_returns_nothing() {
        let retriever = KeywordRetriever::new();
        let hits = retriever.similarity_search("anything", 4).await.unwrap();
        assert!(hits.is_empty());
    }
}
