use crate::error::AnalyzeError;
use crate::models::{MetricsLookup, PodMetrics};
use k8s_openapi::api::core::v1::Pod;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, api::ListParams};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

/// Cluster-connection overrides. All unset means "infer like kubectl does".
#[derive(Clone, Debug, Default)]
pub struct ConnectionOptions {
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub cluster: Option<String>,
    pub user: Option<String>,

    pub server: Option<String>,
    pub token: Option<String>,
    pub impersonate: Option<String>,
    /// Zero disables the timeout.
    pub request_timeout: Option<Duration>,
}

impl ConnectionOptions {
    /// True when no kubeconfig selection flag was given.
    fn selects_nothing(&self) -> bool {
        self.kubeconfig.is_none() && self.context.is_none() && self.cluster.is_none() && self.user.is_none()
    }
}

/// kubectl-style timeout: "0", "30", "30s", "2m" or "1h".
pub fn parse_request_timeout(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((idx, _)) => raw.split_at(idx),
        None => (raw, "s"),
    };
    let n: u64 = digits
        .parse()
        .map_err(|_| format!("invalid request timeout {raw:?}"))?;
    let secs = match unit {
        "s" => Some(n),
        "m" => n.checked_mul(60),
        "h" => n.checked_mul(3600),
        _ => return Err(format!("invalid request timeout {raw:?}, expected a unit of s, m or h")),
    };
    secs.map(Duration::from_secs)
        .ok_or_else(|| format!("request timeout {raw:?} is too large"))
}

/// Applies the flags that override single fields of a loaded config.
fn apply_overrides(config: &mut Config, opts: &ConnectionOptions) -> Result<(), AnalyzeError> {
    if let Some(server) = &opts.server {
        config.cluster_url = server.parse().map_err(AnalyzeError::config)?;
    }
    if let Some(token) = &opts.token {
        config.auth_info.token = Some(token.clone().into());
    }
    if let Some(user) = &opts.impersonate {
        config.auth_info.impersonate = Some(user.clone());
    }
    if let Some(timeout) = opts.request_timeout {
        config.read_timeout = (!timeout.is_zero()).then_some(timeout);
    }
    Ok(())
}

pub async fn connect(opts: &ConnectionOptions) -> Result<Client, AnalyzeError> {
    let mut config = if opts.selects_nothing() {
        Config::infer().await.map_err(AnalyzeError::config)?
    } else {
        let kubeconfig = match &opts.kubeconfig {
            Some(path) => Kubeconfig::read_from(path),
            None => Kubeconfig::read(),
        }
        .map_err(AnalyzeError::config)?;
        let options = KubeConfigOptions {
            context: opts.context.clone(),
            cluster: opts.cluster.clone(),
            user: opts.user.clone(),
            ..Default::default()
        };
        Config::from_custom_kubeconfig(kubeconfig, &options)
            .await
            .map_err(AnalyzeError::config)?
    };
    apply_overrides(&mut config, opts)?;
    log::debug!("connecting to {}", config.cluster_url);
    Client::try_from(config).map_err(AnalyzeError::config)
}

/// Where pods and their live metrics come from.
pub trait UsageSource: Send + Sync + 'static {
    fn get_pod(&self, namespace: &str, name: &str) -> impl Future<Output = Result<Pod, AnalyzeError>> + Send;

    /// Lists pods in `namespace` (all namespaces when `None`), optionally
    /// narrowed by a server-side field selector.
    fn list_pods(
        &self,
        namespace: Option<&str>,
        field_selector: Option<&str>,
    ) -> impl Future<Output = Result<Vec<Pod>, AnalyzeError>> + Send;

    fn pod_metrics(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<MetricsLookup, AnalyzeError>> + Send;
}

/// `UsageSource` backed by the API server and metrics.k8s.io.
#[derive(Clone)]
pub struct KubeSource {
    client: Client,
}

impl KubeSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl UsageSource for KubeSource {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, AnalyzeError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| AnalyzeError::upstream(format!("failed to get pod {namespace}/{name}"), e))
    }

    async fn list_pods(&self, namespace: Option<&str>, field_selector: Option<&str>) -> Result<Vec<Pod>, AnalyzeError> {
        let api: Api<Pod> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let mut lp = ListParams::default();
        if let Some(fields) = field_selector {
            lp = lp.fields(fields);
        }
        let list = api
            .list(&lp)
            .await
            .map_err(|e| AnalyzeError::upstream("failed to list pods", e))?;
        Ok(list.items)
    }

    async fn pod_metrics(&self, namespace: &str, name: &str) -> Result<MetricsLookup, AnalyzeError> {
        let api: Api<PodMetrics> = Api::namespaced(self.client.clone(), namespace);
        match api.get_opt(name).await {
            Ok(Some(metrics)) => Ok(MetricsLookup::Found(metrics)),
            Ok(None) => Ok(MetricsLookup::NotFound),
            Err(e) => Err(AnalyzeError::upstream(
                format!("failed to get metrics for pod {namespace}/{name}"),
                e,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_timeout() {
        assert_eq!(parse_request_timeout("0"), Ok(Duration::ZERO));
        assert_eq!(parse_request_timeout("30"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_request_timeout("45s"), Ok(Duration::from_secs(45)));
        assert_eq!(parse_request_timeout("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_request_timeout("1h"), Ok(Duration::from_secs(3600)));
        assert!(parse_request_timeout("").is_err());
        assert!(parse_request_timeout("5d").is_err());
        assert!(parse_request_timeout("soon").is_err());
    }

    #[test]
    fn test_overrides_replace_config_fields() {
        let mut config = Config::new("https://10.0.0.1:6443".parse().unwrap());
        let opts = ConnectionOptions {
            server: Some("https://api.example.com:6443".into()),
            token: Some("s3cr3t".into()),
            impersonate: Some("auditor".into()),
            request_timeout: Some(Duration::from_secs(10)),
            ..Default::default()
        };
        apply_overrides(&mut config, &opts).unwrap();

        assert_eq!(config.cluster_url.host(), Some("api.example.com"));
        assert!(config.auth_info.token.is_some());
        assert_eq!(config.auth_info.impersonate.as_deref(), Some("auditor"));
        assert_eq!(config.read_timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_zero_timeout_disables_read_timeout() {
        let mut config = Config::new("https://10.0.0.1:6443".parse().unwrap());
        let opts = ConnectionOptions {
            request_timeout: Some(Duration::ZERO),
            ..Default::default()
        };
        apply_overrides(&mut config, &opts).unwrap();
        assert_eq!(config.read_timeout, None);
        assert_eq!(config.cluster_url.host(), Some("10.0.0.1"));
    }

    #[test]
    fn test_bad_server_is_config_error() {
        let mut config = Config::new("https://10.0.0.1:6443".parse().unwrap());
        let opts = ConnectionOptions {
            server: Some("not a url".into()),
            ..Default::default()
        };
        let err = apply_overrides(&mut config, &opts).unwrap_err();
        assert!(matches!(err, AnalyzeError::Config(_)));
    }
}
