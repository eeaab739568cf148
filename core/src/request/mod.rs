//! Request builders bound to the REST client pool
//!
//! A [`RequestBuilder`] turns a logical request descriptor from the load
//! profile into a [`Requester`] bound to one REST client. Builders are shared
//! across the worker pool ([`std::sync::Arc`]); the PostDel builder keeps
//! per-builder state (name cache, counter) across `build` calls.

mod builders;
mod cache;
mod template;

pub use builders::{
    GetBuilder, ListBuilder, PatchBuilder, PodLogBuilder, PostDelBuilder, PutBuilder,
    WatchListBuilder,
};
pub use cache::NameCache;
pub use template::{random_payload, BodyTemplate};

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use url::Url;

use crate::error::{Error, RequestError, Result};
use crate::profile::{ExactRequest, RequestMethod, WeightedRequest, WeightedRequestKind};
use crate::rest::{RestClient, RestRequest};

/// Builds executable requests against a given client.
pub trait RequestBuilder: Send + Sync {
    /// Compose a request bound to `client`.
    fn build(&self, client: &RestClient) -> Requester;
}

/// Create a request builder for a weighted request variant.
///
/// Stale variants read with resourceVersion="0" (watch cache allowed), quorum
/// variants with an empty resourceVersion (consistent read).
pub fn from_weighted(
    request: &WeightedRequest,
    max_retries: usize,
) -> Result<Arc<dyn RequestBuilder>> {
    match &request.kind {
        WeightedRequestKind::StaleList(r) => Ok(Arc::new(ListBuilder::new(r, "0", max_retries))),
        WeightedRequestKind::QuorumList(r) => Ok(Arc::new(ListBuilder::new(r, "", max_retries))),
        WeightedRequestKind::WatchList(r) => Ok(Arc::new(WatchListBuilder::new(r, max_retries))),
        WeightedRequestKind::StaleGet(r) => Ok(Arc::new(GetBuilder::new(r, "0", max_retries))),
        WeightedRequestKind::QuorumGet(r) => Ok(Arc::new(GetBuilder::new(r, "", max_retries))),
        WeightedRequestKind::Put(r) => Ok(Arc::new(PutBuilder::new(r, max_retries)?)),
        WeightedRequestKind::Patch(r) => Ok(Arc::new(PatchBuilder::from_weighted(r, max_retries)?)),
        WeightedRequestKind::GetPodLog(r) => Ok(Arc::new(PodLogBuilder::new(r, max_retries))),
        WeightedRequestKind::PostDel(r) => Ok(Arc::new(PostDelBuilder::new(
            &r.gvr,
            &r.namespace,
            r.delete_ratio,
            max_retries,
        )?)),
    }
}

/// Create a request builder for an exact (replayed) request, selected by its
/// method. POST and DELETE both route through the PostDel builder; DELETE
/// forces the delete branch with ratio 1.0.
pub fn from_exact(request: &ExactRequest, max_retries: usize) -> Result<Arc<dyn RequestBuilder>> {
    match request.method {
        RequestMethod::Get => Ok(Arc::new(GetBuilder::from_exact(request, max_retries))),
        RequestMethod::List => Ok(Arc::new(ListBuilder::from_exact(request, max_retries))),
        RequestMethod::Patch => Ok(Arc::new(PatchBuilder::from_exact(request, max_retries)?)),
        RequestMethod::Post => Ok(Arc::new(PostDelBuilder::new(
            &request.gvr,
            &request.namespace,
            0.0,
            max_retries,
        )?)),
        RequestMethod::Delete => Ok(Arc::new(PostDelBuilder::new(
            &request.gvr,
            &request.namespace,
            1.0,
            max_retries,
        )?)),
        RequestMethod::Put => Err(Error::Construction(
            "unsupported method for exact requests: PUT".to_string(),
        )),
    }
}

/// Which mutation a PostDel requester is carrying out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
    /// Create a new object
    Post,
    /// Delete a cached object
    Delete,
}

enum RequesterKind {
    /// Stream the body and discard it, returning the byte count.
    Discard,
    /// Watch until the initial-events-end bookmark arrives.
    WatchList,
    /// Discard body, then update the name cache from the outcome.
    PostDel {
        cache: Arc<NameCache>,
        name: String,
        op: MutationOp,
    },
}

/// A fully-composed request ready to execute.
pub struct Requester {
    verb: &'static str,
    request: RestRequest,
    kind: RequesterKind,
}

impl Requester {
    pub(crate) fn discard(verb: &'static str, request: RestRequest) -> Self {
        Self {
            verb,
            request,
            kind: RequesterKind::Discard,
        }
    }

    pub(crate) fn watch_list(request: RestRequest) -> Self {
        Self {
            verb: "WATCHLIST",
            request,
            kind: RequesterKind::WatchList,
        }
    }

    pub(crate) fn post_del(
        verb: &'static str,
        request: RestRequest,
        cache: Arc<NameCache>,
        name: String,
        op: MutationOp,
    ) -> Self {
        Self {
            verb,
            request,
            kind: RequesterKind::PostDel { cache, name, op },
        }
    }

    /// Logical request verb, e.g. "LIST" or "POD_LOG".
    pub fn method(&self) -> &'static str {
        self.verb
    }

    /// The raw request URL.
    pub fn url(&self) -> Url {
        self.request.url()
    }

    /// URL for metric aggregation: DELETE and PATCH target per-object names,
    /// so the last path segment is replaced with the literal `:name`.
    pub fn masked_url(&self) -> Url {
        let mut url = self.request.url();
        let method = self.request.http_method();
        if *method == Method::DELETE || *method == Method::PATCH {
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop().push(":name");
            }
        }
        url
    }

    /// Bound each request attempt by `timeout`.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.request.set_timeout(timeout);
    }

    /// Execute the request. Returns the received byte count (also on
    /// failure, for whatever arrived before the error) and the outcome.
    pub async fn issue(self) -> (u64, std::result::Result<(), RequestError>) {
        match self.kind {
            RequesterKind::Discard => discard_body(&self.request).await,
            RequesterKind::WatchList => (0, watch_until_bookmark(&self.request).await),
            RequesterKind::PostDel { cache, name, op } => {
                let (bytes, result) = discard_body(&self.request).await;
                match op {
                    // Remember the object only once the server confirmed it.
                    MutationOp::Post => {
                        if result.is_ok() {
                            cache.push(name);
                        }
                    }
                    // A failed DELETE leaves the object on the server, so the
                    // popped name goes back.
                    MutationOp::Delete => {
                        if result.is_err() {
                            cache.push(name);
                        }
                    }
                }
                (bytes, result)
            }
        }
    }
}

async fn discard_body(request: &RestRequest) -> (u64, std::result::Result<(), RequestError>) {
    let mut response = match request.stream().await {
        Ok(response) => response,
        Err(err) => return (0, Err(err)),
    };

    let mut total = 0u64;
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => total += chunk.len() as u64,
            Ok(None) => return (total, Ok(())),
            Err(err) => return (total, Err(RequestError::Http(err))),
        }
    }
}

async fn watch_until_bookmark(request: &RestRequest) -> std::result::Result<(), RequestError> {
    let mut stream = request.watch().await?;
    while let Some(event) = stream.next_event().await {
        match event {
            Ok(event) if event.is_initial_events_end() => return Ok(()),
            Ok(_) => {}
            Err(err) => return Err(err),
        }
    }
    Err(RequestError::MissingBookmark)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{GroupVersionResource, RequestGet};

    fn client() -> RestClient {
        RestClient::new(Url::parse("http://127.0.0.1:6443").unwrap()).unwrap()
    }

    fn get_request(name: &str) -> WeightedRequest {
        WeightedRequest {
            shares: 1,
            kind: WeightedRequestKind::QuorumGet(RequestGet {
                gvr: GroupVersionResource {
                    group: String::new(),
                    version: "v1".to_string(),
                    resource: "pods".to_string(),
                },
                namespace: "default".to_string(),
                name: name.to_string(),
            }),
        }
    }

    #[test]
    fn test_from_weighted_quorum_get() {
        let builder = from_weighted(&get_request("p1"), 0).unwrap();
        let requester = builder.build(&client());
        assert_eq!(requester.method(), "GET");
        assert_eq!(
            requester.url().as_str(),
            "http://127.0.0.1:6443/api/v1/namespaces/default/pods/p1"
        );
        // Quorum reads carry no resourceVersion.
        assert!(requester.url().query().is_none());
    }

    #[test]
    fn test_from_weighted_stale_get_sends_zero_rv() {
        let request = WeightedRequest {
            kind: match get_request("p1").kind {
                WeightedRequestKind::QuorumGet(get) => WeightedRequestKind::StaleGet(get),
                _ => unreachable!(),
            },
            shares: 1,
        };
        let builder = from_weighted(&request, 0).unwrap();
        let requester = builder.build(&client());
        assert_eq!(requester.url().query(), Some("resourceVersion=0"));
    }

    #[test]
    fn test_from_exact_put_unsupported() {
        let request = ExactRequest {
            method: RequestMethod::Put,
            gvr: GroupVersionResource {
                group: String::new(),
                version: "v1".to_string(),
                resource: "configmaps".to_string(),
            },
            ..Default::default()
        };
        assert!(from_exact(&request, 0).is_err());
    }

    #[test]
    fn test_masked_url_only_for_delete_and_patch() {
        let builder = from_weighted(&get_request("p1"), 0).unwrap();
        let requester = builder.build(&client());
        assert_eq!(requester.url(), requester.masked_url());
    }
}
