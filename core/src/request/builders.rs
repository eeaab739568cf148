//! Builder implementations for each request variant

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::Rng;

use crate::error::{Error, Result};
use crate::profile::{
    ExactRequest, GroupVersionResource, PatchType, RequestGet, RequestGetPodLog, RequestList,
    RequestPatch, RequestPut, RequestWatchList,
};
use crate::request::template::{random_payload, BodyTemplate};
use crate::request::{MutationOp, NameCache, RequestBuilder, Requester};
use crate::rest::{GetOptions, ListOptions, PodLogOptions, RestClient};

/// Path components for a resource collection, following the API server URL
/// layout: `/api/{version}` for the core group, `/apis/{group}/{version}`
/// otherwise, with `namespaces/{ns}` inserted for namespaced requests.
fn api_path(gvr: &GroupVersionResource, namespace: &str) -> Vec<String> {
    let mut comps = Vec::with_capacity(6);
    if gvr.group.is_empty() {
        comps.push("api".to_string());
        comps.push(gvr.version.clone());
    } else {
        comps.push("apis".to_string());
        comps.push(gvr.group.clone());
        comps.push(gvr.version.clone());
    }
    if !namespace.is_empty() {
        comps.push("namespaces".to_string());
        comps.push(namespace.to_string());
    }
    comps.push(gvr.resource.clone());
    comps
}

/// Builds GET requests for a single object.
pub struct GetBuilder {
    gvr: GroupVersionResource,
    namespace: String,
    name: String,
    resource_version: String,
    max_retries: usize,
}

impl GetBuilder {
    /// Builder from a profile get request with the given resource version.
    pub fn new(src: &RequestGet, resource_version: &str, max_retries: usize) -> Self {
        Self {
            gvr: src.gvr.clone(),
            namespace: src.namespace.clone(),
            name: src.name.clone(),
            resource_version: resource_version.to_string(),
            max_retries,
        }
    }

    /// Builder from an exact request, keeping its recorded resource version.
    pub fn from_exact(src: &ExactRequest, max_retries: usize) -> Self {
        Self {
            gvr: src.gvr.clone(),
            namespace: src.namespace.clone(),
            name: src.name.clone(),
            resource_version: src.resource_version.clone(),
            max_retries,
        }
    }
}

impl RequestBuilder for GetBuilder {
    fn build(&self, client: &RestClient) -> Requester {
        let mut comps = api_path(&self.gvr, &self.namespace);
        comps.push(self.name.clone());

        let request = client
            .get()
            .abs_path(comps)
            .versioned_params(&GetOptions {
                resource_version: self.resource_version.clone(),
            })
            .max_retries(self.max_retries);
        Requester::discard("GET", request)
    }
}

/// Builds LIST requests for a collection.
pub struct ListBuilder {
    gvr: GroupVersionResource,
    namespace: String,
    limit: i64,
    label_selector: String,
    field_selector: String,
    resource_version: String,
    max_retries: usize,
}

impl ListBuilder {
    /// Builder from a profile list request with the given resource version.
    pub fn new(src: &RequestList, resource_version: &str, max_retries: usize) -> Self {
        Self {
            gvr: src.gvr.clone(),
            namespace: src.namespace.clone(),
            limit: src.limit,
            label_selector: src.selector.clone(),
            field_selector: src.field_selector.clone(),
            resource_version: resource_version.to_string(),
            max_retries,
        }
    }

    /// Builder from an exact request, keeping its recorded resource version.
    pub fn from_exact(src: &ExactRequest, max_retries: usize) -> Self {
        Self {
            gvr: src.gvr.clone(),
            namespace: src.namespace.clone(),
            limit: src.limit,
            label_selector: src.label_selector.clone(),
            field_selector: src.field_selector.clone(),
            resource_version: src.resource_version.clone(),
            max_retries,
        }
    }
}

impl RequestBuilder for ListBuilder {
    fn build(&self, client: &RestClient) -> Requester {
        let request = client
            .get()
            .abs_path(api_path(&self.gvr, &self.namespace))
            .versioned_params(&ListOptions {
                label_selector: self.label_selector.clone(),
                field_selector: self.field_selector.clone(),
                resource_version: self.resource_version.clone(),
                limit: self.limit,
                ..Default::default()
            })
            .max_retries(self.max_retries);
        Requester::discard("LIST", request)
    }
}

/// Builds streaming LIST (watch-list) requests.
pub struct WatchListBuilder {
    gvr: GroupVersionResource,
    namespace: String,
    label_selector: String,
    field_selector: String,
    max_retries: usize,
}

impl WatchListBuilder {
    /// Builder from a profile watch-list request.
    pub fn new(src: &RequestWatchList, max_retries: usize) -> Self {
        Self {
            gvr: src.gvr.clone(),
            namespace: src.namespace.clone(),
            label_selector: src.selector.clone(),
            field_selector: src.field_selector.clone(),
            max_retries,
        }
    }
}

impl RequestBuilder for WatchListBuilder {
    fn build(&self, client: &RestClient) -> Requester {
        let request = client
            .get()
            .abs_path(api_path(&self.gvr, &self.namespace))
            .versioned_params(&ListOptions {
                label_selector: self.label_selector.clone(),
                field_selector: self.field_selector.clone(),
                resource_version: String::new(),
                watch: true,
                send_initial_events: Some(true),
                resource_version_match: "NotOlderThan".to_string(),
                allow_watch_bookmarks: true,
                ..Default::default()
            })
            .max_retries(self.max_retries);
        Requester::watch_list(request)
    }
}

/// Builds pod log requests.
pub struct PodLogBuilder {
    namespace: String,
    name: String,
    container: String,
    tail_lines: Option<i64>,
    limit_bytes: Option<i64>,
    max_retries: usize,
}

impl PodLogBuilder {
    /// Builder from a profile pod-log request.
    pub fn new(src: &RequestGetPodLog, max_retries: usize) -> Self {
        Self {
            namespace: src.namespace.clone(),
            name: src.name.clone(),
            container: src.container.clone(),
            tail_lines: src.tail_lines,
            limit_bytes: src.limit_bytes,
            max_retries,
        }
    }
}

impl RequestBuilder for PodLogBuilder {
    fn build(&self, client: &RestClient) -> Requester {
        let comps = vec![
            "api".to_string(),
            "v1".to_string(),
            "namespaces".to_string(),
            self.namespace.clone(),
            "pods".to_string(),
            self.name.clone(),
            "log".to_string(),
        ];

        let request = client
            .get()
            .abs_path(comps)
            .versioned_params(&PodLogOptions {
                container: self.container.clone(),
                tail_lines: self.tail_lines,
                limit_bytes: self.limit_bytes,
            })
            .max_retries(self.max_retries);
        Requester::discard("POD_LOG", request)
    }
}

/// Builds PATCH requests against a randomly-suffixed object name.
pub struct PatchBuilder {
    gvr: GroupVersionResource,
    namespace: String,
    name: String,
    key_space_size: i64,
    patch_type: PatchType,
    body: Vec<u8>,
    max_retries: usize,
}

impl PatchBuilder {
    /// Builder from a profile patch request.
    pub fn from_weighted(src: &RequestPatch, max_retries: usize) -> Result<Self> {
        let patch_type = PatchType::parse(&src.patch_type)
            .ok_or_else(|| Error::Construction(format!("invalid patch type: {}", src.patch_type)))?;
        Ok(Self {
            gvr: src.gvr.clone(),
            namespace: src.namespace.clone(),
            name: src.name.clone(),
            key_space_size: src.key_space_size,
            patch_type,
            body: src.body.clone().into_bytes(),
            max_retries,
        })
    }

    /// Builder from an exact request; the recorded name is used verbatim.
    pub fn from_exact(src: &ExactRequest, max_retries: usize) -> Result<Self> {
        let patch_type = PatchType::parse(&src.patch_type)
            .ok_or_else(|| Error::Construction(format!("invalid patch type: {}", src.patch_type)))?;
        Ok(Self {
            gvr: src.gvr.clone(),
            namespace: src.namespace.clone(),
            name: src.name.clone(),
            key_space_size: 0,
            patch_type,
            body: src.body.clone().into_bytes(),
            max_retries,
        })
    }
}

impl RequestBuilder for PatchBuilder {
    fn build(&self, client: &RestClient) -> Requester {
        let mut comps = api_path(&self.gvr, &self.namespace);
        let name = if self.key_space_size > 0 {
            let suffix = OsRng.gen_range(0..self.key_space_size);
            format!("{}-{}", self.name, suffix)
        } else {
            self.name.clone()
        };
        comps.push(name);

        let request = client
            .patch(self.patch_type)
            .abs_path(comps)
            .body(self.body.clone())
            .max_retries(self.max_retries);
        Requester::discard("PATCH", request)
    }
}

/// Builds PUT requests writing a random blob under a randomly-suffixed name.
pub struct PutBuilder {
    gvr: GroupVersionResource,
    namespace: String,
    name: String,
    key_space_size: i64,
    value_size: usize,
    template: BodyTemplate,
    max_retries: usize,
}

impl PutBuilder {
    /// Builder from a profile put request.
    pub fn new(src: &RequestPut, max_retries: usize) -> Result<Self> {
        Ok(Self {
            gvr: src.gvr.clone(),
            namespace: src.namespace.clone(),
            name: src.name.clone(),
            key_space_size: src.key_space_size,
            value_size: src.value_size.max(0) as usize,
            template: BodyTemplate::for_resource(&src.gvr.resource)?,
            max_retries,
        })
    }
}

impl RequestBuilder for PutBuilder {
    fn build(&self, client: &RestClient) -> Requester {
        let mut comps = api_path(&self.gvr, &self.namespace);
        let suffix = if self.key_space_size > 0 {
            OsRng.gen_range(0..self.key_space_size)
        } else {
            0
        };
        let name = format!("{}{}", self.name, suffix);
        comps.push(name.clone());

        let body = self
            .template
            .render(&name, &self.namespace, &random_payload(self.value_size));
        let request = client
            .put()
            .abs_path(comps)
            .body(body)
            .max_retries(self.max_retries);
        Requester::discard("PUT", request)
    }
}

/// Builds mixed POST/DELETE churn requests against one resource kind.
///
/// The builder remembers every name it successfully created in a LIFO cache;
/// a delete draw pops the most recent one. With the delete ratio capped at
/// 0.5 by validation, creates dominate and the cache drifts upward.
pub struct PostDelBuilder {
    gvr: GroupVersionResource,
    namespace: String,
    delete_ratio: f64,
    template: BodyTemplate,
    max_retries: usize,
    cache: Arc<NameCache>,
    // Uniqueness fallback for names generated within the same nanosecond.
    resource_counter: AtomicU64,
}

impl PostDelBuilder {
    /// Builder for the given resource; fails when no body template exists
    /// for it.
    pub fn new(
        gvr: &GroupVersionResource,
        namespace: &str,
        delete_ratio: f64,
        max_retries: usize,
    ) -> Result<Self> {
        Ok(Self {
            gvr: gvr.clone(),
            namespace: namespace.to_string(),
            delete_ratio,
            template: BodyTemplate::for_resource(&gvr.resource)?,
            max_retries,
            cache: Arc::new(NameCache::new()),
            resource_counter: AtomicU64::new(0),
        })
    }

    /// The name cache backing this builder.
    pub fn cache(&self) -> &Arc<NameCache> {
        &self.cache
    }
}

impl RequestBuilder for PostDelBuilder {
    fn build(&self, client: &RestClient) -> Requester {
        let mut comps = api_path(&self.gvr, &self.namespace);

        let roll = OsRng.gen_range(0..1000u32) as f64 / 1000.0;
        if roll < self.delete_ratio {
            // Delete drawn, but only possible when something was created.
            if let Some(name) = self.cache.pop() {
                comps.push(name.clone());
                let request = client
                    .delete()
                    .abs_path(comps)
                    .max_retries(self.max_retries);
                return Requester::post_del(
                    "DELETE",
                    request,
                    Arc::clone(&self.cache),
                    name,
                    MutationOp::Delete,
                );
            }
        }

        let counter = self.resource_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let name = format!("{nanos}-{counter}");

        let body = self.template.render(&name, &self.namespace, "0");
        let request = client
            .post()
            .abs_path(comps)
            .body(body)
            .max_retries(self.max_retries);
        Requester::post_del(
            "POST",
            request,
            Arc::clone(&self.cache),
            name,
            MutationOp::Post,
        )
    }
}
