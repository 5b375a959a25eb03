use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn check_data_dir(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(".health-probe");
    let ok = std::fs::write(&probe, b"ok").is_ok();
    let _ = std::fs::remove_file(&probe);
    ok
}

/// Any HTTP response, including 401 without a key, counts as reachable.
pub async fn check_stripe(api_base: &str) -> bool {
    let url = format!("{}/v1/charges", api_base.trim_end_matches('/'));
    let Ok(client) = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
    else {
        return false;
    };
    client.get(url).send().await.is_ok()
}

/// Last known payment API reachability, refreshed off the request path.
#[derive(Debug)]
pub struct PaymentsProbe {
    reachable: AtomicBool,
}

impl PaymentsProbe {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.reachable.load(Ordering::Relaxed)
    }

    pub fn set(&self, reachable: bool) {
        let was = self.reachable.swap(reachable, Ordering::Relaxed);
        if was != reachable {
            tracing::warn!(reachable, "payment API reachability changed");
        }
    }

    pub fn spawn_refresh(self: &Arc<Self>, api_base: String, every: Duration) -> tokio::task::JoinHandle<()> {
        let probe = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let ok = check_stripe(&api_base).await;
                let Some(probe) = probe.upgrade() else { break };
                probe.set(ok);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writable_dir_passes_and_probe_is_removed() {
        let dir = tempfile::tempdir().expect("tmp");
        assert!(check_data_dir(dir.path()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unreachable_stripe_is_reported() {
        assert!(!check_stripe("http://127.0.0.1:1").await);
    }

    #[tokio::test]
    async fn refresh_task_updates_cached_reachability() {
        let probe = Arc::new(PaymentsProbe::new(true));
        let task = probe.spawn_refresh("http://127.0.0.1:1".into(), Duration::from_millis(20));
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while probe.is_ok() {
            assert!(tokio::time::Instant::now() < deadline, "probe never refreshed");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        task.abort();
    }
}
