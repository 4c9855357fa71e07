use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter keyed by client IP. The window resets in
/// full once it elapses; state is in-memory only and clears on restart.
pub struct RateLimiter {
    max: u32,
    window: Duration,
    clients: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(max: u32) -> Self {
        Self::new(max, Duration::from_secs(60))
    }

    /// Record one request from `ip`. Returns `false` when the caller has
    /// exhausted the current window and must be refused.
    pub fn allow(&self, ip: IpAddr) -> bool {
        self.allow_at(ip, Instant::now())
    }

    fn allow_at(&self, ip: IpAddr, now: Instant) -> bool {
        let mut clients = self.clients.lock().expect("rate limit lock poisoned");

        // Expired windows are dead state; drop them so the map tracks only
        // currently-active clients instead of growing with IP churn.
        clients.retain(|_, w| now.duration_since(w.started) < self.window);

        let window = clients.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });

        if window.count >= self.max {
            return false;
        }
        window.count += 1;
        true
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.clients.lock().expect("rate limit lock poisoned").len()
    }
}
