pub mod mock_capture;
pub mod relay_server;

pub use mock_capture::*;
pub use mock_observer::*;
pub use mock_signaling::*;
pub use mock_transport::*;
pub use relay_server::*;

/// Polls `check` every 10 ms until it holds or `timeout_ms` elapses.
pub async fn wait_until<F>(timeout_ms: u64, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_millis(timeout_ms);

    loop {
        if check() {
            return true;
        }
        if start.elapsed() > timeout {
            return false;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}
