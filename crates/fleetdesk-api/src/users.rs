// Directory user endpoints
//
// `users` is not customer-scoped in the path; the customer travels as a
// query parameter instead.

use tracing::debug;

use crate::client::DirectoryClient;
use crate::error::Error;
use crate::types::{DirectoryUser, ListParams, Page, UserListResponse, UserPatch};

impl DirectoryClient {
    /// List one page of users.
    ///
    /// `GET /users?customer=..&maxResults=..&pageToken=..`
    ///
    /// The users listing has no `orgUnitPath` parameter, so an org unit
    /// restriction is folded into the directory query string.
    pub async fn list_users(&self, params: &ListParams) -> Result<Page<DirectoryUser>, Error> {
        let url = self.url(&["users"]);

        let mut query = vec![
            ("customer", self.customer().to_owned()),
            ("maxResults", params.max_results.to_string()),
            ("projection", "full".to_owned()),
        ];
        if let Some(ref token) = params.page_token {
            query.push(("pageToken", token.clone()));
        }
        let terms: Vec<String> = params
            .org_unit_path
            .iter()
            .map(|ou| format!("orgUnitPath='{ou}'"))
            .chain(params.query.iter().cloned())
            .collect();
        if !terms.is_empty() {
            query.push(("query", terms.join(" ")));
        }

        let resp: UserListResponse = self.get(url, &query).await?;
        debug!(
            count = resp.users.len(),
            has_more = resp.next_page_token.is_some(),
            "listed user page"
        );
        Ok(Page {
            items: resp.users,
            next_page_token: resp.next_page_token,
            total_count: None,
        })
    }

    /// Fetch a user by primary email or ID.
    ///
    /// `GET /users/{userKey}`
    pub async fn get_user(&self, user_key: &str) -> Result<DirectoryUser, Error> {
        let url = self.url(&["users", user_key]);
        self.get(url, &[]).await
    }

    /// Free-text user search (first page only).
    pub async fn search_users(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<DirectoryUser>, Error> {
        let params = ListParams {
            max_results,
            query: Some(query.to_owned()),
            ..ListParams::default()
        };
        Ok(self.list_users(&params).await?.items)
    }

    /// Apply a partial update to a user.
    ///
    /// `PUT /users/{userKey}`
    pub async fn update_user(&self, user_key: &str, patch: &UserPatch) -> Result<DirectoryUser, Error> {
        let url = self.url(&["users", user_key]);
        debug!(user_key, ?patch, "updating user");
        self.put(url, patch).await
    }
}
