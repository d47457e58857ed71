mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use todo_api::auth::{KeySetCache, KeySetError};

use common::{primary_key, secondary_key, KeySetServer};

fn cache(server: &KeySetServer, cooldown: Duration) -> KeySetCache {
    KeySetCache::with_settings(server.url.clone(), cooldown, Duration::from_secs(5)).expect("build cache")
}

#[tokio::test]
async fn cached_key_is_served_without_refetch() -> Result<()> {
    let server = KeySetServer::start(vec![primary_key().jwk()]).await?;
    let cache = cache(&server, Duration::from_secs(300));

    let first = cache.get_key(primary_key().kid).await?;
    let second = cache.get_key(primary_key().kid).await?;

    assert_eq!(server.fetches(), 1);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.key_id, primary_key().kid);
    Ok(())
}

#[tokio::test]
async fn unknown_key_ids_are_rate_limited() -> Result<()> {
    let server = KeySetServer::start(vec![primary_key().jwk()]).await?;
    let cache = cache(&server, Duration::from_secs(300));

    // Cold cache: the miss refreshes once and still finds nothing.
    let err = cache.get_key("forged-1").await.unwrap_err();
    assert!(matches!(err, KeySetError::KeyNotFound(ref kid) if kid == "forged-1"));
    assert_eq!(server.fetches(), 1);

    // Inside the cooldown further misses fail fast.
    for kid in ["forged-2", "forged-3", "forged-4"] {
        assert!(matches!(cache.get_key(kid).await, Err(KeySetError::KeyNotFound(_))));
    }
    assert_eq!(server.fetches(), 1);

    // Known keys are still served from the cache.
    cache.get_key(primary_key().kid).await?;
    assert_eq!(server.fetches(), 1);
    Ok(())
}

#[tokio::test]
async fn refresh_replaces_the_whole_set() -> Result<()> {
    let server = KeySetServer::start(vec![primary_key().jwk()]).await?;
    let cache = cache(&server, Duration::from_millis(200));

    cache.get_key(primary_key().kid).await?;
    assert_eq!(cache.len().await, 1);

    // Rotate: the provider now publishes only the secondary key.
    server.publish(vec![secondary_key().jwk()]);
    tokio::time::sleep(Duration::from_millis(300)).await;

    cache.get_key(secondary_key().kid).await?;
    assert_eq!(server.fetches(), 2);
    assert_eq!(cache.len().await, 1);

    // The rotated-out key is gone, and the cooldown forbids another fetch.
    assert!(matches!(
        cache.get_key(primary_key().kid).await,
        Err(KeySetError::KeyNotFound(_))
    ));
    assert_eq!(server.fetches(), 2);
    Ok(())
}

#[tokio::test]
async fn failed_refresh_does_not_start_the_cooldown() -> Result<()> {
    let server = KeySetServer::start(vec![primary_key().jwk()]).await?;
    let cache = cache(&server, Duration::from_secs(300));

    server.respond_with(503);
    assert!(matches!(
        cache.get_key(primary_key().kid).await,
        Err(KeySetError::Status(503))
    ));

    server.respond_with(200);
    server.publish_raw("{not json");
    assert!(matches!(
        cache.get_key(primary_key().kid).await,
        Err(KeySetError::Decode(_))
    ));
    assert!(cache.is_empty().await);

    server.publish(vec![primary_key().jwk()]);
    cache.get_key(primary_key().kid).await?;
    assert_eq!(server.fetches(), 3);
    Ok(())
}

#[tokio::test]
async fn unsupported_entries_are_skipped() -> Result<()> {
    let server = KeySetServer::start(vec![
        serde_json::json!({"kty": "EC", "kid": "ec-key", "crv": "P-256", "x": "AA", "y": "AA"}),
        serde_json::json!({"kty": "RSA", "kid": "broken", "n": "%%%", "e": "AQAB"}),
        primary_key().jwk(),
    ])
    .await?;
    let cache = cache(&server, Duration::from_secs(300));

    cache.get_key(primary_key().kid).await?;
    assert_eq!(cache.len().await, 1);
    assert!(cache.get_key("ec-key").await.is_err());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_share_one_fetch() -> Result<()> {
    let server = KeySetServer::start(vec![primary_key().jwk()]).await?;
    let cache = Arc::new(cache(&server, Duration::from_secs(300)));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_key(primary_key().kid).await })
        })
        .collect();

    for task in tasks {
        task.await??;
    }

    assert_eq!(server.fetches(), 1);
    Ok(())
}
