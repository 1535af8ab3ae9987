use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use super::conversation::MESSAGE_TIMESTAMP_FORMAT;
use super::json_file::JsonFile;
use crate::error::StoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum Category {
    #[serde(rename = "Pre-Visit Planning")]
    PreVisitPlanning,
    #[serde(rename = "During Visit")]
    DuringVisit,
    #[serde(rename = "Post-Visit Impact")]
    PostVisitImpact,
    #[serde(rename = "General Discussion")]
    GeneralDiscussion,
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Category::PreVisitPlanning => "Pre-Visit Planning",
            Category::DuringVisit => "During Visit",
            Category::PostVisitImpact => "Post-Visit Impact",
            Category::GeneralDiscussion => "General Discussion",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Post {
    pub title: String,
    pub content: String,
    pub category: Category,
    pub author: String,
    pub date: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BoardStats {
    pub total_posts: usize,
    /// Keyed by category label; only categories with posts appear.
    pub by_category: BTreeMap<String, usize>,
}

/// Community posts kept in insertion order in a single JSON file.
#[derive(Debug)]
pub struct CommunityBoard {
    file: JsonFile,
}

impl CommunityBoard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CommunityBoard {
            file: JsonFile::new(path),
        }
    }

    /// Appends a post. Blank titles or bodies are rejected by the caller.
    pub async fn create_post(
        &self,
        author: &str,
        title: &str,
        content: &str,
        category: Category,
    ) -> Result<Post, StoreError> {
        let post = Post {
            title: title.to_string(),
            content: content.to_string(),
            category,
            author: author.to_string(),
            date: Utc::now().format(MESSAGE_TIMESTAMP_FORMAT).to_string(),
        };

        let _guard = self.file.lock().await;
        let mut posts: Vec<Post> = self.file.read().await?;
        posts.push(post.clone());
        self.file.write(&posts).await?;

        info!("{} posted {:?} in {}", author, title, category.label());
        Ok(post)
    }

    /// Newest first, optionally restricted to one category.
    pub async fn list_posts(&self, category: Option<Category>) -> Result<Vec<Post>, StoreError> {
        let posts = self.all().await?;
        Ok(posts
            .into_iter()
            .rev()
            .filter(|p| category.map_or(true, |c| p.category == c))
            .collect())
    }

    pub async fn stats(&self) -> Result<BoardStats, StoreError> {
        let posts = self.all().await?;
        let mut by_category = BTreeMap::new();
        for post in &posts {
            *by_category
                .entry(post.category.label().to_string())
                .or_insert(0) += 1;
        }
        Ok(BoardStats {
            total_posts: posts.len(),
            by_category,
        })
    }

    async fn all(&self) -> Result<Vec<Post>, StoreError> {
        let _guard = self.file.lock().await;
        self.file.read().await
    }
}
