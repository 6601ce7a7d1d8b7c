//! Reconstruction tests against an in-memory metrics source
//!
//! The source answers by metric name (and `resource` filter, for the shared
//! requests metric) so that the driver can be exercised without an engine.

#[cfg(test)]
mod in_memory_source_tests {
    use crate::error::{CostvalError, Result};
    use crate::prometheus::{
        async_trait, MatrixSeries, MetricsSource, QueryData, RawSample, VectorSeries,
    };
    use crate::query::QuerySpec;
    use crate::reconstruct::{
        reconstruct_persistent_volumes, NamespaceReconstructor, ResourceKind, Window,
    };
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;

    const T0: i64 = 1_700_000_000;
    const EPSILON: f64 = 1e-9;

    #[derive(Default)]
    struct InMemorySource {
        responses: HashMap<String, QueryData>,
        issued: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl InMemorySource {
        fn respond(mut self, key: &str, data: QueryData) -> Self {
            self.responses.insert(key.to_string(), data);
            self
        }

        fn key(spec: &QuerySpec) -> String {
            match spec.filter("resource") {
                Some(resource) => format!("{}/{}", spec.metric(), resource),
                None => spec.metric().to_string(),
            }
        }
    }

    #[async_trait]
    impl MetricsSource for InMemorySource {
        async fn query(&self, spec: &QuerySpec) -> Result<QueryData> {
            spec.validate()?;
            let key = Self::key(spec);
            self.issued.lock().unwrap().push(key.clone());

            if self.fail_on.as_deref() == Some(key.as_str()) {
                return Err(CostvalError::Transport("connection refused".to_string()));
            }
            Ok(self
                .responses
                .get(&key)
                .cloned()
                .unwrap_or(QueryData::Vector(Vec::new())))
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn container(pod: &str, container: &str) -> BTreeMap<String, String> {
        labels(&[("namespace", "shop"), ("pod", pod), ("container", container)])
    }

    fn running(pod: &str, name: &str, timestamps: impl IntoIterator<Item = i64>) -> MatrixSeries {
        MatrixSeries {
            metric: container(pod, name),
            values: timestamps
                .into_iter()
                .map(|ts| RawSample::new(ts as f64, "1"))
                .collect(),
        }
    }

    fn vector(entries: &[(&str, &str, &str)]) -> QueryData {
        QueryData::Vector(
            entries
                .iter()
                .map(|(pod, name, value)| VectorSeries {
                    metric: container(pod, name),
                    value: RawSample::new((T0 + 6 * 3600) as f64, *value),
                })
                .collect(),
        )
    }

    fn window() -> Window {
        Window::new(at(T0), at(T0 + 6 * 3600)).unwrap()
    }

    /// Pod `api` runs for an hour with two containers; pod `job` is seen once.
    fn shop_source() -> InMemorySource {
        let every_five_minutes = (0..=12).map(|i| T0 + i * 300);
        InMemorySource::default()
            .respond(
                "kube_pod_container_status_running",
                QueryData::Matrix(vec![
                    running("api", "app", every_five_minutes.clone()),
                    running("api", "proxy", every_five_minutes),
                    running("job", "worker", [T0 + 7_200]),
                ]),
            )
            .respond(
                "kube_pod_container_resource_requests/cpu",
                vector(&[("api", "app", "1"), ("api", "proxy", "0.5"), ("job", "worker", "2")]),
            )
            .respond(
                "container_cpu_allocation",
                vector(&[("api", "app", "1.5"), ("api", "proxy", "0.25")]),
            )
            .respond(
                "kube_pod_container_resource_requests/memory",
                vector(&[("api", "app", "1073741824")]),
            )
            .respond(
                "container_memory_working_set_bytes",
                vector(&[("api", "app", "536870912")]),
            )
    }

    #[tokio::test]
    async fn test_reconstructs_hours_and_averages() {
        let source = shop_source();
        let reconstruction = NamespaceReconstructor::new(&source, "shop", window())
            .with_now(at(T0 + 6 * 3600))
            .reconstruct()
            .await
            .unwrap();

        assert_eq!(reconstruction.pods.len(), 2);
        assert!(reconstruction.report.is_clean());

        let api = &reconstruction.pods[0];
        assert_eq!(api.name, "api");
        assert_eq!(api.minutes(), 60.0);
        assert_eq!(api.containers.len(), 2);
        // app: max(1.5, 1) for 1h, proxy: max(0.25, 0.5) for 1h
        assert!((api.core_hours() - 2.0).abs() < EPSILON);

        let job = &reconstruction.pods[1];
        assert_eq!(job.interval.start, at(T0 + 7_200 - 150));
        assert_eq!(job.interval.end, at(T0 + 7_200 + 150));
        assert!((job.core_hours() - 2.0 * 5.0 / 60.0).abs() < EPSILON);

        let aggregate = &reconstruction.aggregate;
        assert_eq!(aggregate.pod_count, 2);
        assert_eq!(aggregate.container_count, 3);
        assert!((aggregate.cpu_core_hours() - (2.0 + 10.0 / 60.0)).abs() < EPSILON);
        assert!((aggregate.ram_byte_hours() - 1_073_741_824.0).abs() < 1e-3);
        assert_eq!(aggregate.gpu_hours(), 0.0);

        // (1.5 cores * 60 min + 2 cores * 5 min) over the 122.5 minute union
        let cpu_request = aggregate.totals(ResourceKind::Cpu).request.average().unwrap();
        assert!((cpu_request - 100.0 / 122.5).abs() < EPSILON);

        let ram_usage = aggregate.ram.usage.average().unwrap();
        assert!((ram_usage - 536_870_912.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_issues_every_query() {
        let source = shop_source();
        NamespaceReconstructor::new(&source, "shop", window())
            .with_now(at(T0 + 6 * 3600))
            .reconstruct()
            .await
            .unwrap();

        let mut issued = source.issued.lock().unwrap().clone();
        issued.sort();
        assert_eq!(
            issued,
            vec![
                "container_cpu_allocation",
                "container_cpu_usage_seconds_total",
                "container_gpu_allocation",
                "container_memory_allocation_bytes",
                "container_memory_working_set_bytes",
                "kube_pod_container_resource_requests/cpu",
                "kube_pod_container_resource_requests/memory",
                "kube_pod_container_resource_requests/nvidia_com_gpu",
                "kube_pod_container_status_running",
            ]
        );
    }

    #[tokio::test]
    async fn test_partial_labels_and_bad_values_are_skipped() {
        let source = InMemorySource::default()
            .respond(
                "kube_pod_container_status_running",
                QueryData::Matrix(vec![
                    running("api", "app", [T0, T0 + 1_800]),
                    MatrixSeries {
                        metric: labels(&[("namespace", "shop"), ("pod", "api"), ("container", "")]),
                        values: vec![RawSample::new(T0 as f64, "1")],
                    },
                    MatrixSeries {
                        metric: container("ghost", "app"),
                        values: vec![RawSample::new(T0 as f64, "n/a")],
                    },
                ]),
            )
            .respond(
                "kube_pod_container_resource_requests/cpu",
                QueryData::Matrix(vec![MatrixSeries {
                    metric: container("api", "app"),
                    values: vec![
                        RawSample::new(T0 as f64, "2"),
                        RawSample::new((T0 + 60) as f64, "garbage"),
                        RawSample::new((T0 + 120) as f64, "4"),
                    ],
                }]),
            )
            .respond(
                "container_cpu_allocation",
                vector(&[("orphan", "app", "1")]),
            );

        let reconstruction = NamespaceReconstructor::new(&source, "shop", window())
            .with_now(at(T0 + 6 * 3600))
            .reconstruct()
            .await
            .unwrap();

        let report = reconstruction.report;
        // The empty container label and the pod with no valid liveness samples
        assert_eq!(report.skipped_series, 2);
        assert_eq!(report.malformed_samples, 2);
        assert_eq!(report.unmatched_series, 1);

        assert_eq!(reconstruction.pods.len(), 1);
        let api = &reconstruction.pods[0];
        assert_eq!(api.minutes(), 30.0);
        // Mean of the valid samples only
        assert_eq!(api.containers["app"].cpu.requested_average, Some(3.0));
        assert!((api.core_hours() - 1.5).abs() < EPSILON);
    }

    #[tokio::test]
    async fn test_non_finite_allocation_is_skipped_per_container() {
        let source = InMemorySource::default()
            .respond(
                "kube_pod_container_status_running",
                QueryData::Matrix(vec![
                    running("api", "app", [T0, T0 + 3_600]),
                    running("batch", "app", [T0, T0 + 3_600]),
                ]),
            )
            .respond(
                "container_cpu_allocation",
                vector(&[("api", "app", "2"), ("batch", "app", "NaN")]),
            )
            .respond(
                "container_memory_working_set_bytes",
                vector(&[("api", "app", "1024"), ("batch", "app", "+Inf")]),
            );

        let reconstruction = NamespaceReconstructor::new(&source, "shop", window())
            .with_now(at(T0 + 6 * 3600))
            .reconstruct()
            .await
            .unwrap();

        assert_eq!(reconstruction.report.malformed_samples, 2);
        assert_eq!(reconstruction.pods.len(), 2);

        let aggregate = reconstruction.aggregate;
        assert!((aggregate.cpu_core_hours() - 2.0).abs() < EPSILON);
        assert_eq!(aggregate.ram.usage.average(), Some(1024.0));
    }

    #[tokio::test]
    async fn test_pod_outside_window_is_degenerate() {
        let source = InMemorySource::default()
            .respond(
                "kube_pod_container_status_running",
                QueryData::Matrix(vec![
                    running("api", "app", [T0 + 600, T0 + 1_200]),
                    running("late", "app", [T0 + 8 * 3600]),
                ]),
            )
            .respond(
                "container_cpu_allocation",
                vector(&[("api", "app", "1"), ("late", "app", "8")]),
            );

        let reconstruction = NamespaceReconstructor::new(&source, "shop", window())
            .with_now(at(T0 + 10 * 3600))
            .reconstruct()
            .await
            .unwrap();

        assert_eq!(reconstruction.report.degenerate_units, 1);
        let aggregate = reconstruction.aggregate;
        assert_eq!(aggregate.pod_count, 2);
        assert_eq!(aggregate.degenerate_pods, 1);
        assert!((aggregate.cpu_core_hours() - 10.0 / 60.0).abs() < EPSILON);
    }

    #[tokio::test]
    async fn test_now_clamps_running_pods() {
        let source = InMemorySource::default()
            .respond(
                "kube_pod_container_status_running",
                QueryData::Matrix(vec![running("api", "app", [T0, T0 + 3_600, T0 + 7_200])]),
            )
            .respond("container_cpu_allocation", vector(&[("api", "app", "1")]));

        let reconstruction = NamespaceReconstructor::new(&source, "shop", window())
            .with_now(at(T0 + 1_800))
            .reconstruct()
            .await
            .unwrap();

        assert_eq!(reconstruction.pods[0].interval.end, at(T0 + 1_800));
        assert!((reconstruction.aggregate.cpu_core_hours() - 0.5).abs() < EPSILON);
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let source = InMemorySource {
            fail_on: Some("container_memory_allocation_bytes".to_string()),
            ..shop_source()
        };

        let result = NamespaceReconstructor::new(&source, "shop", window())
            .reconstruct()
            .await;

        assert!(matches!(result, Err(CostvalError::Transport(_))));
    }

    #[tokio::test]
    async fn test_persistent_volumes() {
        let source = InMemorySource::default().respond(
            "kube_persistentvolume_capacity_bytes",
            QueryData::Matrix(vec![
                MatrixSeries {
                    metric: labels(&[("persistentvolume", "pv-data")]),
                    values: (0..=24)
                        .map(|i| RawSample::new((T0 + i * 300) as f64, "1000"))
                        .collect(),
                },
                MatrixSeries {
                    metric: labels(&[("persistentvolume", "")]),
                    values: vec![RawSample::new(T0 as f64, "5")],
                },
            ]),
        );

        let (volumes, report) = reconstruct_persistent_volumes(
            &source,
            &window(),
            Duration::minutes(5),
            at(T0 + 6 * 3600),
        )
        .await
        .unwrap();

        assert_eq!(report.skipped_series, 1);
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].name, "pv-data");
        assert!((volumes[0].byte_hours() - 2_000.0).abs() < EPSILON);
    }
}
