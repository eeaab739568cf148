//! Weighted request variants and their payload types

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifies the resource URI of a request target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupVersionResource {
    /// Group is the name of a collection of related functionality.
    #[serde(default)]
    pub group: String,
    /// Version of that group.
    #[serde(default)]
    pub version: String,
    /// Resource type in that versioned group.
    #[serde(default)]
    pub resource: String,
}

impl GroupVersionResource {
    /// Require version and resource; group may be empty (core API).
    pub fn validate(&self) -> Result<()> {
        if self.version.is_empty() {
            return Err(Error::Validation("version is required".to_string()));
        }
        if self.resource.is_empty() {
            return Err(Error::Validation("resource is required".to_string()));
        }
        Ok(())
    }
}

/// Patch encoding accepted by the API server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchType {
    /// RFC 6902 JSON patch
    Json,
    /// RFC 7386 merge patch
    Merge,
    /// Kubernetes strategic merge patch
    StrategicMerge,
}

impl PatchType {
    /// Parse the profile-file spelling of a patch type.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "json" => Some(PatchType::Json),
            "merge" => Some(PatchType::Merge),
            "strategic-merge" => Some(PatchType::StrategicMerge),
            _ => None,
        }
    }

    /// Content-Type header value for this patch encoding.
    pub fn content_type(&self) -> &'static str {
        match self {
            PatchType::Json => "application/json-patch+json",
            PatchType::Merge => "application/merge-patch+json",
            PatchType::StrategicMerge => "application/strategic-merge-patch+json",
        }
    }
}

/// LIST request for target objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestList {
    /// Resource URI.
    #[serde(flatten)]
    pub gvr: GroupVersionResource,
    /// Object namespace; empty means cluster scope.
    #[serde(default)]
    pub namespace: String,
    /// Page size; zero disables pagination.
    #[serde(default)]
    pub limit: i64,
    /// Label selector.
    #[serde(default)]
    pub selector: String,
    /// Field selector.
    #[serde(default)]
    pub field_selector: String,
}

impl RequestList {
    /// Validate the list request. Stale lists cannot paginate, the server
    /// watch cache does not support continuation.
    pub fn validate(&self, stale: bool) -> Result<()> {
        self.gvr.validate()?;
        if self.limit < 0 {
            return Err(Error::Validation("limit must be >= 0".to_string()));
        }
        if stale && self.limit != 0 {
            return Err(Error::Validation(
                "stale list does not support the pagination option".to_string(),
            ));
        }
        Ok(())
    }
}

/// Streaming LIST (watch-list) request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestWatchList {
    /// Resource URI.
    #[serde(flatten)]
    pub gvr: GroupVersionResource,
    /// Object namespace; empty means cluster scope.
    #[serde(default)]
    pub namespace: String,
    /// Label selector.
    #[serde(default)]
    pub selector: String,
    /// Field selector.
    #[serde(default)]
    pub field_selector: String,
}

impl RequestWatchList {
    /// Validate the watch-list request.
    pub fn validate(&self) -> Result<()> {
        self.gvr.validate()
    }
}

/// GET request for a target object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestGet {
    /// Resource URI.
    #[serde(flatten)]
    pub gvr: GroupVersionResource,
    /// Object namespace.
    #[serde(default)]
    pub namespace: String,
    /// Object name.
    #[serde(default)]
    pub name: String,
}

impl RequestGet {
    /// Validate the get request.
    pub fn validate(&self) -> Result<()> {
        self.gvr.validate()?;
        if self.name.is_empty() {
            return Err(Error::Validation("name is required".to_string()));
        }
        Ok(())
    }
}

/// PUT request writing a random blob under a randomly-suffixed name.
///
/// The resource should be configmaps or secrets, the only kinds this tool
/// can fill with generated data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPut {
    /// Resource URI.
    #[serde(flatten)]
    pub gvr: GroupVersionResource,
    /// Object namespace.
    #[serde(default)]
    pub namespace: String,
    /// Name prefix; a random suffix in `[0, keySpaceSize)` is appended.
    #[serde(default)]
    pub name: String,
    /// Size of the random-suffix key space.
    #[serde(default)]
    pub key_space_size: i64,
    /// Object payload size in bytes.
    #[serde(default)]
    pub value_size: i64,
}

impl RequestPut {
    /// Validate the put request.
    pub fn validate(&self) -> Result<()> {
        self.gvr.validate()?;
        if self.name.is_empty() {
            return Err(Error::Validation("name pattern is required".to_string()));
        }
        if self.key_space_size <= 0 {
            return Err(Error::Validation("keySpaceSize must be > 0".to_string()));
        }
        if self.value_size <= 0 {
            return Err(Error::Validation("valueSize must be > 0".to_string()));
        }
        Ok(())
    }
}

/// PATCH request against a randomly-suffixed name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPatch {
    /// Resource URI.
    #[serde(flatten)]
    pub gvr: GroupVersionResource,
    /// Object namespace.
    #[serde(default)]
    pub namespace: String,
    /// Name pattern; the final name is `{name}-{suffix}`.
    #[serde(default)]
    pub name: String,
    /// Size of the random-suffix key space.
    #[serde(default)]
    pub key_space_size: i64,
    /// Patch encoding: `json`, `merge` or `strategic-merge`.
    #[serde(default)]
    pub patch_type: String,
    /// Request body with the fields to change.
    #[serde(default)]
    pub body: String,
}

impl RequestPatch {
    /// Validate the patch request. The body must be well-formed JSON and is
    /// stored trimmed.
    pub fn validate(&mut self) -> Result<()> {
        self.gvr.validate()?;
        if self.name.is_empty() {
            return Err(Error::Validation("name is required".to_string()));
        }
        if self.body.is_empty() {
            return Err(Error::Validation("body is required".to_string()));
        }

        if PatchType::parse(&self.patch_type).is_none() {
            return Err(Error::Validation(format!(
                "unknown patch type: {} (valid types: json, merge, strategic-merge)",
                self.patch_type
            )));
        }

        let trimmed = self.body.trim();
        if serde_json::from_str::<serde_json::Value>(trimmed).is_err() {
            return Err(Error::Validation(format!(
                "invalid JSON in patch body: {:?}",
                self.body
            )));
        }
        self.body = trimmed.to_string();

        Ok(())
    }
}

/// GetLog request for a target pod.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestGetPodLog {
    /// Pod namespace.
    #[serde(default)]
    pub namespace: String,
    /// Pod name.
    #[serde(default)]
    pub name: String,
    /// Container to stream logs from; empty is only valid for
    /// single-container pods.
    #[serde(default)]
    pub container: String,
    /// Number of lines from the end of the logs to show, if set.
    #[serde(default)]
    pub tail_lines: Option<i64>,
    /// Number of bytes to read before terminating the log output, if set.
    #[serde(default)]
    pub limit_bytes: Option<i64>,
}

impl RequestGetPodLog {
    /// Validate the pod-log request.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(Error::Validation("namespace is required".to_string()));
        }
        if self.name.is_empty() {
            return Err(Error::Validation("name is required".to_string()));
        }
        Ok(())
    }
}

/// Mixed POST/DELETE churn request against one resource kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPostDel {
    /// Resource URI.
    #[serde(flatten)]
    pub gvr: GroupVersionResource,
    /// Object namespace.
    #[serde(default)]
    pub namespace: String,
    /// Probability of deleting instead of creating, in `[0, 0.5]`.
    #[serde(default)]
    pub delete_ratio: f64,
}

impl RequestPostDel {
    /// Validate the post-delete request. Creates must dominate deletes so the
    /// name cache keeps growing.
    pub fn validate(&self) -> Result<()> {
        self.gvr.validate()?;
        if !(0.0..=0.5).contains(&self.delete_ratio) {
            return Err(Error::Validation(format!(
                "delete ratio must be between 0 and 0.5: {}",
                self.delete_ratio
            )));
        }
        Ok(())
    }
}

/// One kind of request in a weighted distribution.
#[derive(Debug, Clone, PartialEq)]
pub enum WeightedRequestKind {
    /// LIST served from the watch cache (resourceVersion="0").
    StaleList(RequestList),
    /// Consistent LIST bypassing the watch cache (resourceVersion="").
    QuorumList(RequestList),
    /// Streaming LIST via the watch-list feature.
    WatchList(RequestWatchList),
    /// GET served from the watch cache.
    StaleGet(RequestGet),
    /// Consistent GET.
    QuorumGet(RequestGet),
    /// Mutating PUT.
    Put(RequestPut),
    /// Mutating PATCH.
    Patch(RequestPatch),
    /// Pod log retrieval.
    GetPodLog(RequestGetPodLog),
    /// POST/DELETE churn.
    PostDel(RequestPostDel),
}

/// A request kind with its weight in the distribution.
///
/// The wire form carries the kind as one-of-many optional fields; exactly one
/// must be set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WeightedRequestWire", into = "WeightedRequestWire")]
pub struct WeightedRequest {
    /// Weight relative to the other requests in the same profile.
    pub shares: u32,
    /// The request variant.
    pub kind: WeightedRequestKind,
}

impl WeightedRequest {
    /// Validate the variant payload.
    pub fn validate(&mut self) -> Result<()> {
        match &mut self.kind {
            WeightedRequestKind::StaleList(r) => r.validate(true),
            WeightedRequestKind::QuorumList(r) => r.validate(false),
            WeightedRequestKind::WatchList(r) => r.validate(),
            WeightedRequestKind::StaleGet(r) | WeightedRequestKind::QuorumGet(r) => r.validate(),
            WeightedRequestKind::Put(r) => r.validate(),
            WeightedRequestKind::Patch(r) => r.validate(),
            WeightedRequestKind::GetPodLog(r) => r.validate(),
            WeightedRequestKind::PostDel(r) => r.validate(),
        }
    }

    /// Short name of the variant, used in logs.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            WeightedRequestKind::StaleList(_) => "staleList",
            WeightedRequestKind::QuorumList(_) => "quorumList",
            WeightedRequestKind::WatchList(_) => "watchList",
            WeightedRequestKind::StaleGet(_) => "staleGet",
            WeightedRequestKind::QuorumGet(_) => "quorumGet",
            WeightedRequestKind::Put(_) => "put",
            WeightedRequestKind::Patch(_) => "patch",
            WeightedRequestKind::GetPodLog(_) => "getPodLog",
            WeightedRequestKind::PostDel(_) => "postDel",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WeightedRequestWire {
    #[serde(default)]
    shares: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stale_list: Option<RequestList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    quorum_list: Option<RequestList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    watch_list: Option<RequestWatchList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stale_get: Option<RequestGet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    quorum_get: Option<RequestGet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    put: Option<RequestPut>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    patch: Option<RequestPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    get_pod_log: Option<RequestGetPodLog>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    post_del: Option<RequestPostDel>,
}

impl TryFrom<WeightedRequestWire> for WeightedRequest {
    type Error = String;

    fn try_from(wire: WeightedRequestWire) -> std::result::Result<Self, String> {
        let mut kinds = Vec::with_capacity(1);
        if let Some(r) = wire.stale_list {
            kinds.push(WeightedRequestKind::StaleList(r));
        }
        if let Some(r) = wire.quorum_list {
            kinds.push(WeightedRequestKind::QuorumList(r));
        }
        if let Some(r) = wire.watch_list {
            kinds.push(WeightedRequestKind::WatchList(r));
        }
        if let Some(r) = wire.stale_get {
            kinds.push(WeightedRequestKind::StaleGet(r));
        }
        if let Some(r) = wire.quorum_get {
            kinds.push(WeightedRequestKind::QuorumGet(r));
        }
        if let Some(r) = wire.put {
            kinds.push(WeightedRequestKind::Put(r));
        }
        if let Some(r) = wire.patch {
            kinds.push(WeightedRequestKind::Patch(r));
        }
        if let Some(r) = wire.get_pod_log {
            kinds.push(WeightedRequestKind::GetPodLog(r));
        }
        if let Some(r) = wire.post_del {
            kinds.push(WeightedRequestKind::PostDel(r));
        }

        let found = kinds.len();
        let mut kinds = kinds.into_iter();
        match (kinds.next(), kinds.next()) {
            (None, _) => Err("empty request value".to_string()),
            (Some(kind), None) => Ok(WeightedRequest {
                shares: wire.shares,
                kind,
            }),
            (Some(_), Some(_)) => Err(format!(
                "exactly one request type may be set, found {found}"
            )),
        }
    }
}

impl From<WeightedRequest> for WeightedRequestWire {
    fn from(req: WeightedRequest) -> Self {
        let mut wire = WeightedRequestWire {
            shares: req.shares,
            ..Default::default()
        };
        match req.kind {
            WeightedRequestKind::StaleList(r) => wire.stale_list = Some(r),
            WeightedRequestKind::QuorumList(r) => wire.quorum_list = Some(r),
            WeightedRequestKind::WatchList(r) => wire.watch_list = Some(r),
            WeightedRequestKind::StaleGet(r) => wire.stale_get = Some(r),
            WeightedRequestKind::QuorumGet(r) => wire.quorum_get = Some(r),
            WeightedRequestKind::Put(r) => wire.put = Some(r),
            WeightedRequestKind::Patch(r) => wire.patch = Some(r),
            WeightedRequestKind::GetPodLog(r) => wire.get_pod_log = Some(r),
            WeightedRequestKind::PostDel(r) => wire.post_del = Some(r),
        }
        wire
    }
}
