//! PubMed 文献检索工具
//!
//! NCBI E-utilities 两段式流程：esearch 按查询取 PMID 列表，esummary 取标题/作者/期刊等
//! 摘要信息，格式化前 top_n 条返回。配置了 NCBI api_key / email 时附加到请求参数
//! （否则受更低的限流配额）。

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::tools::Tool;

const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const DEFAULT_NUM_ARTICLES: u32 = 10;
const DEFAULT_TOP_N: u32 = 3;
/// 单次最多取回的文献数，防止 LLM 给出离谱参数
const MAX_NUM_ARTICLES: u32 = 50;

/// PubMed 工具：esearch + esummary
pub struct PubMedTool {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    email: Option<String>,
}

impl PubMedTool {
    pub fn new(
        base_url: Option<String>,
        api_key: Option<String>,
        email: Option<String>,
        timeout_secs: u64,
    ) -> Self {
        if api_key.is_none() {
            tracing::warn!("NCBI API key not configured, PubMed rate limits will be lower");
        }
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("medagent/0.1 (biomedical literature lookup)")
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            email,
        }
    }

    fn auth_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        if let Some(email) = &self.email {
            params.push(("email", email.clone()));
        }
        params
    }

    /// esearch：查询 -> PMID 列表
    async fn search_ids(&self, query: &str, num_articles: u32) -> Result<Vec<String>, String> {
        let url = format!("{}/esearch.fcgi", self.base_url);
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("term", query.to_string()),
            ("retmax", num_articles.to_string()),
            ("retmode", "json".to_string()),
            ("sort", "relevance".to_string()),
        ];
        params.extend(self.auth_params());

        let resp = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| format!("esearch request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("esearch HTTP {}", resp.status()));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| format!("esearch response not JSON: {}", e))?;

        let ids = body["esearchresult"]["idlist"]
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(ids)
    }

    /// esummary：PMID 列表 -> 摘要记录
    async fn fetch_summaries(&self, pmids: &[String]) -> Result<Value, String> {
        let url = format!("{}/esummary.fcgi", self.base_url);
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("id", pmids.join(",")),
            ("retmode", "json".to_string()),
        ];
        params.extend(self.auth_params());

        let resp = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| format!("esummary request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("esummary HTTP {}", resp.status()));
        }
        resp.json()
            .await
            .map_err(|e| format!("esummary response not JSON: {}", e))
    }
}

/// 将 esummary 的单条记录格式化为文本段落
fn format_article(idx: usize, pmid: &str, doc: &Value) -> String {
    let title = doc["title"].as_str().unwrap_or("N/A");
    let journal = doc["fulljournalname"]
        .as_str()
        .or_else(|| doc["source"].as_str())
        .unwrap_or("N/A");
    let pubdate = doc["pubdate"].as_str().unwrap_or("N/A");
    let authors: Vec<&str> = doc["authors"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|a| a["name"].as_str())
                .take(3)
                .collect()
        })
        .unwrap_or_default();
    let more = doc["authors"]
        .as_array()
        .map(|l| l.len() > 3)
        .unwrap_or(false);

    format!(
        "--- Article #{idx} ---\nTitle: {title}\nAuthors: {}{}\nJournal: {journal}\nPublication Date: {pubdate}\nPMID: {pmid}",
        authors.join(", "),
        if more { "..." } else { "" },
    )
}

#[async_trait]
impl Tool for PubMedTool {
    fn name(&self) -> &str {
        "search_pubmed"
    }

    fn description(&self) -> &str {
        "Search PubMed for medical literature and return the top relevant articles. \
         Use ONLY when the user asks for recent research, studies, publications, \
         clinical trials or emerging treatment guidelines; not for general medical \
         knowledge you can answer directly."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "PubMed search query" },
                "num_articles": { "type": "integer", "description": "Articles to fetch (default 10)" },
                "top_n": { "type": "integer", "description": "Top ranked articles to return (default 3)" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = args["query"]
            .as_str()
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| "search_pubmed requires a non-empty query argument".to_string())?;
        let num_articles = args["num_articles"]
            .as_u64()
            .map(|n| n as u32)
            .unwrap_or(DEFAULT_NUM_ARTICLES)
            .clamp(1, MAX_NUM_ARTICLES);
        let top_n = args["top_n"]
            .as_u64()
            .map(|n| n as u32)
            .unwrap_or(DEFAULT_TOP_N)
            .clamp(1, num_articles) as usize;

        tracing::info!(query, num_articles, "searching PubMed");
        let pmids = self.search_ids(query, num_articles).await?;
        if pmids.is_empty() {
            return Ok(format!("No articles found for query: {}", query));
        }

        let summaries = self.fetch_summaries(&pmids).await?;
        let mut lines = vec![
            format!(
                "Found {} articles for query: '{}'",
                pmids.len(),
                query
            ),
            format!("Top {} most relevant articles:", top_n.min(pmids.len())),
        ];
        for (idx, pmid) in pmids.iter().take(top_n).enumerate() {
            let doc = &summaries["result"][pmid.as_str()];
            lines.push(format_article(idx + 1, pmid, doc));
        }
        Ok(lines.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_article_handles_missing_fields() {
        let doc = serde_json::json!({ "title": "Asthma therapy" });
        let text = format_article(1, "12345", &doc);
        assert!(text.contains("Title: Asthma therapy"));
        assert!(text.contains("Journal: N/A"));
        assert!(text.contains("PMID: 12345"));
    }

    #[test]
    fn test_format_article_truncates_authors() {
        let doc = serde_json::json!({
            "title": "T",
            "authors": [
                {"name": "A"}, {"name": "B"}, {"name": "C"}, {"name": "D"}
            ]
        });
        let text = format_article(1, "1", &doc);
        assert!(text.contains("Authors: A, B, C..."));
        assert!(!text.contains("C, D"));
    }

    #[tokio::test]
    async fn test_execute_requires_query() {
        let tool = PubMedTool::new(None, None, None, 5);
        let err = tool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(err.contains("requires a non-empty query"));
    }
}
