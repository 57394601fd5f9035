//! Load testing for the proxy.

use std::sync::Arc;
use std::time::{Duration, Instant};
use latency_proxy::cache::MemoryStore;

mod common;
use common::{MockResponse, start_mock_backend, start_proxy, test_config};

#[tokio::test]
async fn test_load_performance() {
    let a = start_mock_backend(MockResponse::ok("Hello from a")).await;
    let b = start_mock_backend(MockResponse::ok("Hello from b")).await;
    let mut config = test_config(&[a.addr, b.addr]);
    config.cache.enabled = false;
    let (proxy, shutdown) = start_proxy(config, None).await;

    let concurrency = 20;
    let requests_per_task = 25;
    let total_requests = concurrency * requests_per_task;

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let start = Instant::now();

    let mut tasks = Vec::new();
    for _ in 0..concurrency {
        let client = client.clone();
        let url = format!("http://{}/", proxy);
        tasks.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            for _ in 0..requests_per_task {
                let req_start = Instant::now();
                if let Ok(res) = client.get(&url).send().await {
                    if res.status().is_success() {
                        latencies.push(req_start.elapsed());
                    }
                }
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for task in tasks {
        all_latencies.extend(task.await.unwrap());
    }

    let duration = start.elapsed();
    let rps = total_requests as f64 / duration.as_secs_f64();

    assert_eq!(all_latencies.len(), total_requests, "every request should succeed");
    assert_eq!(a.hits() + b.hits(), total_requests);
    assert!(a.hits() > 0 && b.hits() > 0);

    all_latencies.sort();
    let p50 = all_latencies[all_latencies.len() / 2];
    let p99 = all_latencies[(all_latencies.len() as f64 * 0.99) as usize];

    println!("\n--- Load Test Results ---");
    println!("Total Requests: {}", total_requests);
    println!("Concurrency:    {}", concurrency);
    println!("Total Duration: {:?}", duration);
    println!("Requests/sec:   {:.2}", rps);
    println!("P50 Latency:    {:?}", p50);
    println!("P99 Latency:    {:?}", p99);
    println!("Backend split:  {}/{}", a.hits(), b.hits());
    println!("-------------------------\n");

    shutdown.trigger();
}

#[tokio::test]
async fn test_hot_key_under_load_hits_backend_once() {
    let backend = start_mock_backend(MockResponse::ok("hot").delay(Duration::from_millis(100))).await;
    let (proxy, shutdown) = start_proxy(test_config(&[backend.addr]), Some(Arc::new(MemoryStore::new()))).await;
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let url = format!("http://{}/hot", proxy);

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let client = client.clone();
        let url = url.clone();
        tasks.push(tokio::spawn(async move {
            client.get(&url).send().await.map(|r| r.status().as_u16())
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 200);
    }
    assert_eq!(backend.hits(), 1);

    shutdown.trigger();
}
