//! Bluesky XRPC client used for historical search.

use reqwest::Client;
use secrecy::{ExposeSecret, Secret, SecretString};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, info};

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::types::{SearchPage, SearchPost};

const CREATE_SESSION_PATH: &str = "xrpc/com.atproto.server.createSession";
const SEARCH_POSTS_PATH: &str = "xrpc/app.bsky.feed.searchPosts";

/// Paginated hashtag search over historical posts.
pub trait PostSearch {
    /// Fetches one page of posts tagged with `hashtag`, continuing from `cursor`.
    fn search(
        &self,
        hashtag: &str,
        cursor: Option<&str>,
    ) -> impl Future<Output = EtlResult<SearchPage>> + Send;
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    access_jwt: String,
    handle: String,
    did: String,
}

#[derive(Deserialize)]
struct SearchPostsResponse {
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default)]
    posts: Vec<PostView>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostView {
    uri: String,
    cid: String,
    author: AuthorView,
    record: PostRecordView,
    indexed_at: String,
}

#[derive(Deserialize)]
struct AuthorView {
    handle: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostRecordView {
    #[serde(default)]
    text: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    langs: Option<Vec<String>>,
}

impl From<PostView> for SearchPost {
    fn from(view: PostView) -> Self {
        SearchPost {
            uri: view.uri,
            cid: view.cid,
            author_handle: view.author.handle,
            text: view.record.text,
            created_at: view.record.created_at,
            indexed_at: view.indexed_at,
            langs: view.record.langs,
        }
    }
}

/// Authenticated client for a Bluesky PDS or AppView.
#[derive(Clone)]
pub struct BskyClient {
    http: Client,
    service_url: String,
    access_jwt: SecretString,
    page_limit: u32,
}

impl BskyClient {
    /// Opens a session with `identifier` and `password`.
    ///
    /// Fails with [`ErrorKind::AuthenticationError`] when the credentials are rejected.
    pub async fn login(
        service_url: &str,
        identifier: &str,
        password: &SecretString,
        page_limit: u32,
    ) -> EtlResult<Self> {
        let http = Client::new();
        let service_url = service_url.trim_end_matches('/').to_string();

        let response = http
            .post(format!("{service_url}/{CREATE_SESSION_PATH}"))
            .json(&CreateSessionRequest {
                identifier,
                password: password.expose_secret(),
            })
            .send()
            .await?
            .error_for_status()?;
        let session: CreateSessionResponse = response.json().await?;

        if session.access_jwt.is_empty() {
            return Err(etl_error!(
                ErrorKind::AuthenticationError,
                "Bluesky session has no access token",
                session.handle
            ));
        }

        info!(handle = %session.handle, did = %session.did, "logged in to bluesky");

        Ok(Self {
            http,
            service_url,
            access_jwt: Secret::new(session.access_jwt),
            page_limit,
        })
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }
}

impl PostSearch for BskyClient {
    async fn search(&self, hashtag: &str, cursor: Option<&str>) -> EtlResult<SearchPage> {
        let query = format!("#{hashtag}");
        let limit = self.page_limit.to_string();
        let mut params = vec![("q", query.as_str()), ("limit", limit.as_str())];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }

        debug!(hashtag, cursor, "searching posts");

        let response = self
            .http
            .get(format!("{}/{SEARCH_POSTS_PATH}", self.service_url))
            .bearer_auth(self.access_jwt.expose_secret())
            .query(&params)
            .send()
            .await?
            .error_for_status()?;
        let page: SearchPostsResponse = response.json().await?;

        Ok(SearchPage {
            posts: page.posts.into_iter().map(SearchPost::from).collect(),
            cursor: page.cursor.filter(|cursor| !cursor.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use serde_json::json;

    async fn login(server: &MockServer) -> BskyClient {
        let password = Secret::new("hunter2".to_string());
        BskyClient::login(&server.base_url(), "alice.bsky.social", &password, 25)
            .await
            .unwrap()
    }

    async fn mock_session(server: &MockServer) {
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/xrpc/com.atproto.server.createSession")
                    .json_body(json!({"identifier": "alice.bsky.social", "password": "hunter2"}));
                then.status(200).json_body(json!({
                    "accessJwt": "jwt-token",
                    "refreshJwt": "refresh-token",
                    "handle": "alice.bsky.social",
                    "did": "did:plc:alice"
                }));
            })
            .await;
    }

    #[tokio::test]
    async fn search_maps_posts_and_cursor() {
        let server = MockServer::start_async().await;
        mock_session(&server).await;
        let search = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/xrpc/app.bsky.feed.searchPosts")
                    .query_param("q", "#databs")
                    .query_param("limit", "25")
                    .header("authorization", "Bearer jwt-token");
                then.status(200).json_body(json!({
                    "cursor": "25",
                    "posts": [{
                        "uri": "at://did:plc:bob/app.bsky.feed.post/1",
                        "cid": "bafyreib",
                        "author": {"did": "did:plc:bob", "handle": "bob.bsky.social"},
                        "record": {
                            "$type": "app.bsky.feed.post",
                            "text": "hello #databs",
                            "createdAt": "2024-05-01T10:00:00.000Z",
                            "langs": ["en"]
                        },
                        "indexedAt": "2024-05-01T10:00:01.000Z"
                    }]
                }));
            })
            .await;

        let client = login(&server).await;
        let page = client.search("databs", None).await.unwrap();

        search.assert_async().await;
        assert_eq!(page.cursor.as_deref(), Some("25"));
        assert_eq!(
            page.posts,
            vec![SearchPost {
                uri: "at://did:plc:bob/app.bsky.feed.post/1".to_string(),
                cid: "bafyreib".to_string(),
                author_handle: "bob.bsky.social".to_string(),
                text: "hello #databs".to_string(),
                created_at: Some("2024-05-01T10:00:00.000Z".to_string()),
                indexed_at: "2024-05-01T10:00:01.000Z".to_string(),
                langs: Some(vec!["en".to_string()]),
            }]
        );
    }

    #[tokio::test]
    async fn search_forwards_cursor_and_ends_without_one() {
        let server = MockServer::start_async().await;
        mock_session(&server).await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/xrpc/app.bsky.feed.searchPosts")
                    .query_param("cursor", "25");
                then.status(200).json_body(json!({"posts": []}));
            })
            .await;

        let client = login(&server).await;
        let page = client.search("databs", Some("25")).await.unwrap();

        assert!(page.posts.is_empty());
        assert!(page.cursor.is_none());
    }

    #[tokio::test]
    async fn rejected_credentials_are_authentication_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/xrpc/com.atproto.server.createSession");
                then.status(401).json_body(json!({
                    "error": "AuthenticationRequired",
                    "message": "Invalid identifier or password"
                }));
            })
            .await;

        let password = Secret::new("wrong".to_string());
        let err = BskyClient::login(&server.base_url(), "alice.bsky.social", &password, 25)
            .await
            .err()
            .unwrap();

        assert_eq!(err.kind(), ErrorKind::AuthenticationError);
    }
}
