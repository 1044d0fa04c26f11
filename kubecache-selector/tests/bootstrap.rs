//! Startup from a config file: load, validate, log to the configured sink
//!
//! Run with: cargo test -p kubecache-selector --test bootstrap

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use kubecache_core::load_config;
use kubecache_selector::{EndpointPort, Endpoints, MemorySource, ServerList};
use tokio_util::sync::CancellationToken;

fn memcache_endpoints(ips: &[&str]) -> Endpoints {
    Endpoints::single_subset(ips, vec![EndpointPort::numbered(11211)])
}

#[tokio::test]
async fn test_server_list_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("selector.log");
    let config_path = dir.path().join("kubecache.toml");
    let mut file = std::fs::File::create(&config_path).unwrap();
    writeln!(
        file,
        "[selector]\ntarget = \"memcache.cache:11211\"\nretry_interval_ms = 50\n\n\
         [logging]\nlevel = \"info\"\nformat = \"json\"\nfile_path = {:?}",
        log_path.to_string_lossy()
    )
    .unwrap();

    let config = load_config(config_path.to_str()).unwrap();
    assert_eq!(config.selector.retry_interval_ms, 50);

    let source = Arc::new(MemorySource::new().with_endpoints(
        "cache",
        "memcache",
        memcache_endpoints(&["10.0.0.1"]),
    ));
    let cancel = CancellationToken::new();
    let list = ServerList::from_config(&cancel, &config, source.clone())
        .await
        .unwrap();

    assert_eq!(list.target().namespace, "cache");
    assert_eq!(list.pick_server("key").unwrap().to_string(), "10.0.0.1:11211");

    source.set("cache", "memcache", memcache_endpoints(&["10.0.0.2"]));
    for _ in 0..500 {
        if list.pick_server("key").unwrap().to_string() == "10.0.0.2:11211" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(list.pick_server("key").unwrap().to_string(), "10.0.0.2:11211");
    list.shutdown().await;

    let logged: Vec<serde_json::Value> = std::fs::read_to_string(&log_path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let updates: Vec<_> = logged
        .iter()
        .filter(|event| event["fields"]["message"] == "Updated server addresses")
        .map(|event| event["fields"]["addresses"].as_str().unwrap().to_string())
        .collect();
    assert!(updates.contains(&"10.0.0.1:11211".to_string()), "{updates:?}");
    assert!(updates.contains(&"10.0.0.2:11211".to_string()), "{updates:?}");
    assert!(logged
        .iter()
        .any(|event| event["fields"]["message"] == "Endpoints discovery loop shutting down"));
}

#[tokio::test]
async fn test_invalid_config_file_is_rejected() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[selector]\ntarget = \"\"").unwrap();

    let err = load_config(file.path().to_str()).unwrap_err();
    assert!(err.to_string().contains("selector.target is required"));
}
