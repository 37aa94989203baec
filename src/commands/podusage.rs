use crate::error::AnalyzeError;
use crate::k8s::UsageSource;
use crate::models::{MetricsLookup, PodMetrics, SelectionFilter, UsageRecord};
use crate::utils;
use comfy_table::{Table, presets::NOTHING};
use futures::future::join_all;
use k8s_openapi::api::core::v1::Pod;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::Mutex;

const MIB: u64 = 1024 * 1024;

const HEADER: [&str; 6] = [
    "namespace",
    "name",
    "cpu(percentage)",
    "cpu(usage/request/limit)",
    "memory(percentage)",
    "memory(usage/request/limit)",
];

pub async fn run<S: UsageSource>(source: S, filter: SelectionFilter, multiple: f64) -> Result<(), AnalyzeError> {
    let pb = utils::create_spinner("Fetching pod metrics...");
    let found = find_over_threshold(Arc::new(source), &filter, multiple).await;
    pb.finish_and_clear();

    let records = found?;
    log::info!("{} pods at or above {multiple}x their requests", records.len());

    let stdout = std::io::stdout();
    render(records, &mut stdout.lock())
}

// --- STEP 1: WHICH PODS ---
pub async fn resolve_pods<S: UsageSource>(source: &S, filter: &SelectionFilter) -> Result<Vec<Pod>, AnalyzeError> {
    if filter.is_empty() {
        return Err(AnalyzeError::InvalidInput);
    }
    if !filter.name.is_empty() && !filter.namespace.is_empty() {
        let pod = source.get_pod(&filter.namespace, &filter.name).await?;
        return Ok(vec![pod]);
    }

    // a name alone does not narrow the list; only the node does
    let fields = format!("spec.nodeName={}", filter.node_name);
    let namespace = (!filter.namespace.is_empty()).then_some(filter.namespace.as_str());
    let field_selector = (!filter.node_name.is_empty()).then_some(fields.as_str());
    source.list_pods(namespace, field_selector).await
}

// --- STEP 2: FAN OUT OVER METRICS ---
pub async fn find_over_threshold<S: UsageSource>(
    source: Arc<S>,
    filter: &SelectionFilter,
    multiple: f64,
) -> Result<Vec<UsageRecord>, AnalyzeError> {
    let pods = resolve_pods(source.as_ref(), filter).await?;
    log::debug!("resolved {} pods for {filter}", pods.len());

    let flagged = Arc::new(Mutex::new(Vec::new()));
    let mut tasks = Vec::with_capacity(pods.len());

    for pod in pods {
        let source = source.clone();
        let flagged = flagged.clone();
        tasks.push(tokio::spawn(async move {
            let namespace = pod.metadata.namespace.clone().unwrap_or_default();
            let name = pod.metadata.name.clone().unwrap_or_default();

            let metrics = match source.pod_metrics(&namespace, &name).await? {
                MetricsLookup::Found(metrics) => {
                    log::trace!(
                        "metrics for {namespace}/{name}: timestamp={:?} window={:?}",
                        metrics.timestamp,
                        metrics.window
                    );
                    metrics
                }
                MetricsLookup::NotFound => {
                    log::debug!("no metrics for {namespace}/{name} yet, skipping");
                    return Ok(());
                }
            };

            if let Some(record) = evaluate_pod(&pod, &metrics, multiple) {
                log::debug!("flagged {record}");
                flagged.lock().await.push(record);
            }
            Ok::<(), AnalyzeError>(())
        }));
    }

    // every task runs to completion; the first failure in pod order wins
    for outcome in join_all(tasks).await {
        outcome??;
    }

    let records = std::mem::take(&mut *flagged.lock().await);
    Ok(records)
}

/// Returns a record for the first container whose usage reaches `multiple`
/// times its request, or that has no request at all. Later containers are
/// not looked at once one qualifies.
pub fn evaluate_pod(pod: &Pod, metrics: &PodMetrics, multiple: f64) -> Option<UsageRecord> {
    let containers = pod.spec.as_ref().map(|s| s.containers.as_slice()).unwrap_or_default();

    for (idx, container) in containers.iter().enumerate() {
        // metrics containers line up with the spec by position
        let Some(sample) = metrics.containers.get(idx) else {
            log::debug!("no metrics for container {} of {:?}", container.name, pod.metadata.name);
            continue;
        };
        if sample.name != container.name {
            log::debug!("metrics container {} compared against spec container {}", sample.name, container.name);
        }
        let usage = &sample.usage;
        let resources = container.resources.as_ref();

        let request_cpu = utils::cpu_millis(utils::requested(resources, "cpu"));
        let request_memory = utils::memory_bytes(utils::requested(resources, "memory"));
        let usage_cpu = utils::cpu_millis(usage.cpu.as_ref());
        let usage_memory = utils::memory_bytes(usage.memory.as_ref());

        let (cpu_ratio, cpu_percentage) = beauty_usage(usage_cpu as f64, request_cpu as f64);
        let (memory_ratio, memory_percentage) = beauty_usage(usage_memory as f64, request_memory as f64);

        let over = request_cpu == 0 || request_memory == 0 || cpu_ratio >= multiple || memory_ratio >= multiple;
        if over {
            return Some(UsageRecord {
                namespace: pod.metadata.namespace.clone().unwrap_or_default(),
                name: pod.metadata.name.clone().unwrap_or_default(),
                request_cpu,
                limit_cpu: utils::cpu_millis(utils::limited(resources, "cpu")),
                usage_cpu,
                usage_cpu_percentage: cpu_percentage,
                request_memory,
                limit_memory: utils::memory_bytes(utils::limited(resources, "memory")),
                usage_memory,
                usage_memory_percentage: memory_percentage,
            });
        }
    }
    None
}

/// Ratio of `usage` to `request` plus its display form; "-" when there is
/// no request to compare against.
pub fn beauty_usage(usage: f64, request: f64) -> (f64, String) {
    if request == 0.0 {
        return (0.0, "-".to_string());
    }
    let ratio = usage / request;
    (ratio, format!("{:.1}%", ratio * 100.0))
}

// --- STEP 3: PRINT ---

/// Records with an unresolved percentage go last, then by pod name.
pub fn sort_records(records: &mut [UsageRecord]) {
    records.sort_by(|a, b| {
        a.is_unresolved()
            .cmp(&b.is_unresolved())
            .then_with(|| a.name.cmp(&b.name))
    });
}

pub fn render<W: Write>(mut records: Vec<UsageRecord>, out: &mut W) -> Result<(), AnalyzeError> {
    sort_records(&mut records);

    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(HEADER);

    for r in &records {
        table.add_row(vec![
            r.namespace.clone(),
            r.name.clone(),
            r.usage_cpu_percentage.clone(),
            format!("{}m / {}m / {}m", r.usage_cpu, r.request_cpu, r.limit_cpu),
            r.usage_memory_percentage.clone(),
            format!(
                "{}Mi / {}Mi / {}Mi",
                r.usage_memory / MIB,
                r.request_memory / MIB,
                r.limit_memory / MIB
            ),
        ]);
    }

    writeln!(out, "{table}")?;
    out.flush()?;
    Ok(())
}
