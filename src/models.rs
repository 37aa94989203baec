use k8s_openapi::apimachinery::pkg::{api::resource::Quantity, apis::meta::v1::ObjectMeta};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which pods to inspect. Empty strings mean "not set".
#[derive(Clone, Debug, Default)]
pub struct SelectionFilter {
    pub name: String,
    pub namespace: String,
    pub node_name: String,
}

impl SelectionFilter {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.namespace.is_empty() && self.node_name.is_empty()
    }
}

impl fmt::Display for SelectionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |s: &str| if s.is_empty() { "*".to_string() } else { s.to_string() };
        write!(
            f,
            "name={} namespace={} node={}",
            show(&self.name),
            show(&self.namespace),
            show(&self.node_name)
        )
    }
}

/// One flagged pod, described by the container that tripped the threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct UsageRecord {
    pub namespace: String,
    pub name: String,

    pub request_cpu: u64,
    pub limit_cpu: u64,
    pub usage_cpu: u64,
    pub usage_cpu_percentage: String,

    pub request_memory: u64,
    pub limit_memory: u64,
    pub usage_memory: u64,
    pub usage_memory_percentage: String,
}

impl UsageRecord {
    /// True when either percentage could not be computed (zero request).
    pub fn is_unresolved(&self) -> bool {
        self.usage_cpu_percentage == "-" || self.usage_memory_percentage == "-"
    }
}

impl fmt::Display for UsageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// --- metrics.k8s.io/v1beta1 ---

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct ContainerUsage {
    pub cpu: Option<Quantity>,
    pub memory: Option<Quantity>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ContainerMetrics {
    pub name: String,
    #[serde(default)]
    pub usage: ContainerUsage,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct PodMetrics {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub window: Option<String>,
    #[serde(default)]
    pub containers: Vec<ContainerMetrics>,
}

// kube has no typed metrics API, so declare the resource by hand
impl k8s_openapi::Resource for PodMetrics {
    const API_VERSION: &'static str = "metrics.k8s.io/v1beta1";
    const GROUP: &'static str = "metrics.k8s.io";
    const KIND: &'static str = "PodMetrics";
    const VERSION: &'static str = "v1beta1";
    const URL_PATH_SEGMENT: &'static str = "pods";
    type Scope = k8s_openapi::NamespaceResourceScope;
}

impl k8s_openapi::Metadata for PodMetrics {
    type Ty = ObjectMeta;

    fn metadata(&self) -> &Self::Ty {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Self::Ty {
        &mut self.metadata
    }
}

/// Outcome of a metrics lookup for a single pod.
#[derive(Clone, Debug)]
pub enum MetricsLookup {
    Found(PodMetrics),
    /// The metrics server has no sample for the pod (yet).
    NotFound,
}
