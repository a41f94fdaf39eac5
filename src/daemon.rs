//! Daemon supervisor: resolves every configured pair, then runs one
//! forwarding loop per pair on the shared runtime.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info};

use crate::client::{Channel, GatewayClient, Messenger};
use crate::config::{Config, ForwardPair};
use crate::error::{Error, Result};
use crate::forward::Forwarder;
use crate::resolver::resolve;

/// Resolve both ends of every configured pair against the account's dialog
/// list. Fails fast on the first bad name, before any loop starts.
pub fn resolve_pairs(
    channels: &[Channel],
    pairs: &[ForwardPair],
) -> Result<Vec<(Channel, Channel)>> {
    pairs
        .iter()
        .map(|pair| {
            let source = resolve(channels, &pair.source_group)?.clone();
            let target = resolve(channels, &pair.target_group)?.clone();
            Ok((source, target))
        })
        .collect()
}

/// Connect the account, then hand off to [`supervise`].
pub async fn run(config: &Config) -> Result<()> {
    let (api_id, api_hash) = config.api_credentials()?;
    let client = GatewayClient::new(&config.gateway_url);
    client.connect(&config.phone, api_id, api_hash).await?;

    supervise(config, Arc::new(client)).await
}

/// Run all forwarding loops until interrupted or a fatal error.
///
/// A fatal error from any loop tears the whole process down (the JoinSet
/// aborts the siblings on drop). Ctrl-c is observed inside each task: the
/// task logs and ends on its own, so an interrupt never surfaces as an
/// error.
pub async fn supervise(config: &Config, client: Arc<dyn Messenger>) -> Result<()> {
    let channels = client.list_channels().await?;
    info!("Loaded {} dialogs", channels.len());

    let resolved = resolve_pairs(&channels, &config.groups)?;

    let mut tasks = JoinSet::new();
    for (index, (source, target)) in resolved.into_iter().enumerate() {
        info!(
            "Starting daemon {} ({} -> {})...",
            index, source.title, target.title
        );
        let forwarder = Forwarder::new(
            client.clone(),
            source,
            target,
            config.refresh_rate,
            config.fatal_on_empty_fetch,
        );
        tasks.spawn(async move {
            tokio::select! {
                result = forwarder.run() => result,
                _ = tokio::signal::ctrl_c() => {
                    info!("Daemon {} interrupted, stopping", index);
                    Ok(())
                }
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Forwarding loop failed: {}", e);
                return Err(e);
            }
            Err(e) => return Err(Error::Task(e.to_string())),
        }
    }

    info!("All forwarding loops ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::tests::{channel, MockMessenger};

    fn pair(source: &str, target: &str) -> ForwardPair {
        ForwardPair {
            source_group: source.to_string(),
            target_group: target.to_string(),
        }
    }

    fn test_config(groups: Vec<ForwardPair>) -> Config {
        Config {
            phone: "+15551234567".to_string(),
            refresh_rate: 60,
            groups,
            api_id: Some(1),
            api_hash: Some("hash".to_string()),
            gateway_url: "http://127.0.0.1:8081".to_string(),
            fatal_on_empty_fetch: true,
        }
    }

    #[test]
    fn test_resolve_pairs_all_present() {
        let channels = vec![channel(1, "A"), channel(2, "B"), channel(3, "C")];
        let resolved =
            resolve_pairs(&channels, &[pair("A", "B"), pair("C", "A")]).unwrap();

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].0.id, 1);
        assert_eq!(resolved[0].1.id, 2);
        assert_eq!(resolved[1].0.id, 3);
    }

    #[test]
    fn test_resolve_pairs_fails_fast_on_bad_name() {
        let channels = vec![channel(1, "A")];
        let err = resolve_pairs(&channels, &[pair("A", "Missing")]).unwrap_err();
        assert!(matches!(err, Error::ChannelNotFound(ref t) if t == "Missing"));
    }

    #[tokio::test]
    async fn test_supervise_fails_fast_before_spawning() {
        let client = Arc::new(MockMessenger::new(vec![channel(1, "A")], vec![]));
        let config = test_config(vec![pair("A", "Nope")]);

        let err = supervise(&config, client.clone()).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(client.sent_texts().is_empty());
    }

    #[tokio::test]
    async fn test_supervise_escalates_empty_fetch() {
        // Dialogs resolve, but the source has no messages at all.
        let client = Arc::new(MockMessenger::new(
            vec![channel(1, "A"), channel(2, "B")],
            vec![],
        ));
        let config = test_config(vec![pair("A", "B")]);

        let err = supervise(&config, client).await.unwrap_err();
        assert!(matches!(err, Error::EmptyFetch(_)));
        assert_eq!(err.exit_code(), 3);
    }
}
