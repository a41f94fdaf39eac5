//! The per-pair forwarding loop: fetch, filter, send, sleep.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::client::{Channel, Messenger};
use crate::error::{Error, Result};
use crate::filter::filter_new;

/// How many of the newest messages each cycle fetches.
pub const FETCH_BUFFER: usize = 10;

/// Drives one (source, target) pair. Loops never share mutable state; the
/// client connection is the only shared resource.
pub struct Forwarder {
    client: Arc<dyn Messenger>,
    source: Channel,
    target: Channel,
    refresh_rate: u64,
    fatal_on_empty_fetch: bool,
}

impl Forwarder {
    pub fn new(
        client: Arc<dyn Messenger>,
        source: Channel,
        target: Channel,
        refresh_rate: u64,
        fatal_on_empty_fetch: bool,
    ) -> Self {
        Self {
            client,
            source,
            target,
            refresh_rate,
            fatal_on_empty_fetch,
        }
    }

    /// Poll forever. The sleep is a yielding tokio timer so sibling loops
    /// on the same runtime keep making progress.
    pub async fn run(&self) -> Result<()> {
        loop {
            self.run_cycle().await?;
            tokio::time::sleep(Duration::from_secs(self.refresh_rate)).await;
        }
    }

    /// One fetch/filter/send pass. Returns how many messages were sent.
    ///
    /// A rate-limit error mid-batch abandons the rest of the batch (no
    /// retry, no backoff); any other send error propagates and ends the
    /// loop. The freshness window equals the polling interval, so a batch
    /// abandoned here is usually stale by the next cycle - at-least-once
    /// near the window boundary is accepted.
    pub async fn run_cycle(&self) -> Result<usize> {
        let batch = self.client.fetch_recent(&self.source, FETCH_BUFFER).await?;
        if batch.is_empty() {
            if self.fatal_on_empty_fetch {
                return Err(Error::EmptyFetch(self.source.title.clone()));
            }
            debug!("Empty fetch from {}, skipping cycle", self.source.title);
            return Ok(0);
        }

        let fresh = filter_new(self.refresh_rate, &batch);
        debug!(
            "{} -> {}: {} of {} messages fresh",
            self.source.title,
            self.target.title,
            fresh.len(),
            batch.len()
        );

        let mut sent = 0;
        for text in &fresh {
            match self.client.send_text(&self.target, text).await {
                Ok(()) => sent += 1,
                Err(Error::RateLimited { retry_after }) => {
                    warn!(
                        "Too many messages sent in same time (retry after {}s); \
                         abandoning {} remaining in batch",
                        retry_after,
                        fresh.len() - sent
                    );
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(sent)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::client::Message;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::Mutex;

    /// In-memory stand-in for the gateway, shared by forwarder and
    /// supervisor tests.
    pub(crate) struct MockMessenger {
        pub channels: Vec<Channel>,
        pub inbox: Mutex<Vec<Message>>,
        pub sent: Mutex<Vec<(i64, String)>>,
        /// Sends fail with a flood error once this many have succeeded.
        pub rate_limit_after: Option<usize>,
    }

    impl MockMessenger {
        pub fn new(channels: Vec<Channel>, inbox: Vec<Message>) -> Self {
            Self {
                channels,
                inbox: Mutex::new(inbox),
                sent: Mutex::new(Vec::new()),
                rate_limit_after: None,
            }
        }

        pub fn sent_texts(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
        }
    }

    #[async_trait]
    impl Messenger for MockMessenger {
        async fn list_channels(&self) -> Result<Vec<Channel>> {
            Ok(self.channels.clone())
        }

        async fn fetch_recent(&self, _channel: &Channel, limit: usize) -> Result<Vec<Message>> {
            let inbox = self.inbox.lock().unwrap();
            Ok(inbox.iter().take(limit).cloned().collect())
        }

        async fn send_text(&self, channel: &Channel, text: &str) -> Result<()> {
            let mut sent = self.sent.lock().unwrap();
            if let Some(limit) = self.rate_limit_after {
                if sent.len() >= limit {
                    return Err(Error::RateLimited { retry_after: 30 });
                }
            }
            sent.push((channel.id, text.to_string()));
            Ok(())
        }
    }

    pub(crate) fn channel(id: i64, title: &str) -> Channel {
        Channel { id, title: title.to_string() }
    }

    fn message(text: &str, age_secs: i64) -> Message {
        Message {
            text: Some(text.to_string()),
            date: (Utc::now() - ChronoDuration::seconds(age_secs)).fixed_offset(),
        }
    }

    fn forwarder(client: Arc<MockMessenger>, refresh_rate: u64, fatal: bool) -> Forwarder {
        Forwarder::new(client, channel(1, "Source"), channel(2, "Target"), refresh_rate, fatal)
    }

    #[tokio::test]
    async fn test_cycle_forwards_fresh_oldest_first() {
        // Newest-first fetch: now, now-30s, now-120s; window 60s.
        let inbox = vec![
            message("newest", 0),
            message("middle", 30),
            message("stale", 120),
        ];
        let client = Arc::new(MockMessenger::new(vec![], inbox));

        let sent = forwarder(client.clone(), 60, true).run_cycle().await.unwrap();
        assert_eq!(sent, 2);
        assert_eq!(client.sent_texts(), vec!["middle", "newest"]);
        // everything lands on the target channel
        assert!(client.sent.lock().unwrap().iter().all(|(id, _)| *id == 2));
    }

    #[tokio::test]
    async fn test_cycle_strips_tag_before_sending() {
        let inbox = vec![message("hello Published By: @last_satoshi world", 0)];
        let client = Arc::new(MockMessenger::new(vec![], inbox));

        forwarder(client.clone(), 60, true).run_cycle().await.unwrap();
        assert_eq!(client.sent_texts(), vec!["hello  world"]);
    }

    #[tokio::test]
    async fn test_empty_fetch_is_fatal_by_default() {
        let client = Arc::new(MockMessenger::new(vec![], vec![]));

        let err = forwarder(client.clone(), 60, true).run_cycle().await.unwrap_err();
        assert!(matches!(err, Error::EmptyFetch(ref t) if t == "Source"));
        assert_eq!(err.exit_code(), 3);
        assert!(client.sent_texts().is_empty());
    }

    #[tokio::test]
    async fn test_empty_fetch_noop_when_not_fatal() {
        let client = Arc::new(MockMessenger::new(vec![], vec![]));

        let sent = forwarder(client.clone(), 60, false).run_cycle().await.unwrap();
        assert_eq!(sent, 0);
    }

    #[tokio::test]
    async fn test_rate_limit_abandons_rest_of_batch() {
        // Five fresh messages, flood error on the third send.
        let inbox: Vec<Message> = (0..5).map(|i| message(&format!("m{}", i), i)).collect();
        let mut mock = MockMessenger::new(vec![], inbox);
        mock.rate_limit_after = Some(2);
        let client = Arc::new(mock);

        let sent = forwarder(client.clone(), 60, true).run_cycle().await.unwrap();
        assert_eq!(sent, 2);
        // oldest-first, so m4 and m3 went out before the flood hit
        assert_eq!(client.sent_texts(), vec!["m4", "m3"]);
    }

    #[tokio::test]
    async fn test_fetch_respects_buffer_size() {
        let inbox: Vec<Message> = (0..20).map(|i| message(&format!("m{}", i), 0)).collect();
        let client = Arc::new(MockMessenger::new(vec![], inbox));

        let sent = forwarder(client.clone(), 60, true).run_cycle().await.unwrap();
        assert_eq!(sent, FETCH_BUFFER);
    }
}
