// File: src/lookup.rs
// Purpose: External lookup service (category options, user search) and the email uniqueness rule

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::LookupConfig;
use crate::error::LookupError;
use crate::runner::AsyncRule;

/// Category as the options endpoint returns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub slug: String,
    pub name: String,
}

/// A user found by the search endpoint. Only presence matters here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Search response. `users` is required: a body without it is malformed, never "no match".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSearch {
    pub users: Vec<User>,
}

/// Injected async lookups the form depends on
#[async_trait]
pub trait LookupService: Send + Sync {
    /// `GET categories-endpoint`
    async fn categories(&self) -> Result<Vec<Category>, LookupError>;

    /// `GET search-endpoint?q=<query>`
    async fn search_users(&self, query: &str) -> Result<UserSearch, LookupError>;
}

/// [`LookupService`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpLookup {
    client: reqwest::Client,
    config: LookupConfig,
}

impl HttpLookup {
    pub fn new(config: LookupConfig) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, LookupError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status(status.as_u16()));
        }
        decode(&response.text().await?)
    }
}

/// Parse a response body; shape mismatches are `Malformed`, not transport errors
fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, LookupError> {
    serde_json::from_str(body).map_err(|e| LookupError::Malformed(e.to_string()))
}

#[async_trait]
impl LookupService for HttpLookup {
    async fn categories(&self) -> Result<Vec<Category>, LookupError> {
        let url = self.url(&self.config.categories_path);
        tracing::debug!("Fetching categories from {}", url);
        self.get_json(self.client.get(url)).await
    }

    async fn search_users(&self, query: &str) -> Result<UserSearch, LookupError> {
        let url = self.url(&self.config.search_path);
        tracing::debug!("Searching users at {} for {:?}", url, query);
        self.get_json(self.client.get(url).query(&[("q", query)])).await
    }
}

/// Selection control option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryOption {
    pub label: String,
    pub value: String,
}

impl From<Category> for CategoryOption {
    fn from(category: Category) -> Self {
        Self {
            label: category.slug,
            value: category.name,
        }
    }
}

/// Fetch category options once. A failed fetch yields no options, never an error.
pub async fn load_category_options(lookup: &dyn LookupService) -> Vec<CategoryOption> {
    match lookup.categories().await {
        Ok(categories) => {
            let options: Vec<CategoryOption> = categories.into_iter().map(Into::into).collect();
            tracing::debug!("Loaded {} category options", options.len());
            options
        }
        Err(e) => {
            tracing::warn!("Error fetching categories: {}", e);
            Vec::new()
        }
    }
}

pub const EMAIL_EXISTS: &str = "Email exists.";
pub const EMAIL_REQUIRED: &str = "Email is required.";
pub const EMAIL_INCONCLUSIVE: &str = "Could not verify email uniqueness.";

/// Passes when the search endpoint finds no user for the address
pub struct UniqueEmail {
    lookup: Arc<dyn LookupService>,
}

impl UniqueEmail {
    pub fn new(lookup: Arc<dyn LookupService>) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl AsyncRule for UniqueEmail {
    fn name(&self) -> &str {
        "uniqueEmail"
    }

    async fn check(&self, value: &str) -> Result<Option<String>, LookupError> {
        let found = self.lookup.search_users(value).await?;
        if found.users.is_empty() {
            Ok(None)
        } else {
            Ok(Some(EMAIL_EXISTS.to_string()))
        }
    }

    fn empty_message(&self) -> &str {
        EMAIL_REQUIRED
    }

    fn inconclusive_message(&self) -> &str {
        EMAIL_INCONCLUSIVE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Canned {
        categories: Result<Vec<Category>, u16>,
        users: Vec<User>,
    }

    #[async_trait]
    impl LookupService for Canned {
        async fn categories(&self) -> Result<Vec<Category>, LookupError> {
            self.categories.clone().map_err(LookupError::Status)
        }

        async fn search_users(&self, _query: &str) -> Result<UserSearch, LookupError> {
            Ok(UserSearch { users: self.users.clone() })
        }
    }

    #[tokio::test]
    async fn test_categories_map_slug_to_label() {
        let lookup = Canned {
            categories: Ok(vec![Category {
                slug: "kitchen-accessories".to_string(),
                name: "Kitchen Accessories".to_string(),
            }]),
            users: vec![],
        };

        let options = load_category_options(&lookup).await;

        assert_eq!(
            options,
            vec![CategoryOption {
                label: "kitchen-accessories".to_string(),
                value: "Kitchen Accessories".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_category_failure_leaves_no_options() {
        let lookup = Canned { categories: Err(500), users: vec![] };
        assert!(load_category_options(&lookup).await.is_empty());
    }

    #[tokio::test]
    async fn test_unique_email_rule() {
        let free = UniqueEmail::new(Arc::new(Canned { categories: Ok(vec![]), users: vec![] }));
        assert_eq!(free.check("new@example.com").await.unwrap(), None);

        let taken = UniqueEmail::new(Arc::new(Canned {
            categories: Ok(vec![]),
            users: vec![User { id: Some(1), email: Some("emily@x.cz".to_string()) }],
        }));
        assert_eq!(taken.check("emily@x.cz").await.unwrap(), Some(EMAIL_EXISTS.to_string()));
    }

    /// Answers searches by decoding a fixed body, as the HTTP client does
    struct RawBody(&'static str);

    #[async_trait]
    impl LookupService for RawBody {
        async fn categories(&self) -> Result<Vec<Category>, LookupError> {
            decode(self.0)
        }

        async fn search_users(&self, _query: &str) -> Result<UserSearch, LookupError> {
            decode(self.0)
        }
    }

    #[tokio::test]
    async fn test_search_body_without_users_is_inconclusive() {
        let rule = UniqueEmail::new(Arc::new(RawBody(r#"{"message":"rate limited"}"#)));

        let result = rule.check("new@example.com").await;

        assert!(matches!(result, Err(LookupError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_empty_users_array_passes() {
        let rule = UniqueEmail::new(Arc::new(RawBody(r#"{"users":[],"total":0}"#)));
        assert_eq!(rule.check("new@example.com").await.unwrap(), None);
    }

    #[test]
    fn test_user_search_tolerates_extra_fields() {
        let body = r#"{"users":[{"id":1,"firstName":"Emily","email":"e@x.cz"}],"total":1}"#;
        let search: UserSearch = serde_json::from_str(body).unwrap();
        assert_eq!(search.users.len(), 1);
    }
}
