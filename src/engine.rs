//! Batch processing: apply a batch, then acknowledge or report it.
//!
//! [`BatchProcessor`] is the [`BatchHandler`] given to the subscription
//! manager. It reads one settings snapshot per batch and passes the newline
//! policy down explicitly, applies the batch through the sequencer, and hands
//! the outcome to [`reconcile`].

use std::sync::Arc;

use tokio::sync::watch;
use tracing::instrument;

use crate::ack::{DrainDecision, reconcile};
use crate::config::Settings;
use crate::notice::NotificationSink;
use crate::sequencer::apply_batch;
use crate::source::RemoteSource;
use crate::subscription::BatchHandler;
use crate::types::{Batch, Identity};
use crate::vault::Vault;

/// Applies batches to a vault and drains them from their source.
pub struct BatchProcessor<V, R> {
    vault: Arc<V>,
    source: Arc<R>,
    sink: Arc<dyn NotificationSink>,
    settings: watch::Receiver<Settings>,
}

impl<V, R> BatchProcessor<V, R>
where
    V: Vault + Send + Sync + 'static,
    R: RemoteSource,
{
    pub fn new(
        vault: Arc<V>,
        source: Arc<R>,
        sink: Arc<dyn NotificationSink>,
        settings: watch::Receiver<Settings>,
    ) -> Self {
        BatchProcessor {
            vault,
            source,
            sink,
            settings,
        }
    }

    /// Runs one full batch cycle.
    #[instrument(skip(self, batch), fields(identity = %identity, entries = batch.len()))]
    pub async fn process(&self, identity: &Identity, batch: Batch) -> DrainDecision {
        let policy = self.settings.borrow().newline;

        let outcome = apply_batch(self.vault.as_ref(), &batch, policy).await;
        reconcile(self.source.as_ref(), identity, outcome, self.sink.as_ref()).await
    }
}

impl<V, R> BatchHandler for BatchProcessor<V, R>
where
    V: Vault + Send + Sync + 'static,
    R: RemoteSource,
{
    async fn handle(&self, identity: &Identity, batch: Batch) {
        self.process(identity, batch).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notice::Notice;
    use crate::source::{SpoolSource, SpoolSourceConfig};
    use crate::spool;
    use crate::subscription::SubscriptionManager;
    use crate::test_utils::{MemoryVault, RecordingSink, ScriptedSource, arb_note_batch, note};
    use crate::types::NewlinePolicy;
    use crate::vault::LocalVault;
    use proptest::prelude::*;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    struct Harness {
        processor: BatchProcessor<MemoryVault, ScriptedSource>,
        vault: Arc<MemoryVault>,
        source: Arc<ScriptedSource>,
        sink: Arc<RecordingSink>,
        settings: watch::Sender<Settings>,
    }

    fn harness(vault: MemoryVault, source: ScriptedSource, newline: NewlinePolicy) -> Harness {
        let vault = Arc::new(vault);
        let source = Arc::new(source);
        let sink = Arc::new(RecordingSink::new());
        let (settings, rx) = watch::channel(Settings {
            newline,
            ..Settings::default()
        });
        let processor = BatchProcessor::new(
            Arc::clone(&vault),
            Arc::clone(&source),
            Arc::clone(&sink) as Arc<dyn NotificationSink>,
            rx,
        );
        Harness {
            processor,
            vault,
            source,
            sink,
            settings,
        }
    }

    fn identity() -> Identity {
        Identity::new("user-1")
    }

    #[tokio::test]
    async fn successful_batch_drains_once_with_last_entry() {
        let h = harness(MemoryVault::new(), ScriptedSource::new(), NewlinePolicy::Unix);
        let batch = vec![
            note("k0", "one", "a.md"),
            note("k1", "two", "b.md"),
            note("k2", "three", "a.md"),
        ];

        let decision = h.processor.process(&identity(), batch).await;

        assert!(decision.is_drained());
        assert_eq!(h.source.drains(), vec![(identity(), note("k2", "three", "a.md"))]);
        assert_eq!(
            h.sink.notices(),
            vec![Notice::Updated {
                identity: identity(),
                applied: 3
            }]
        );
        assert_eq!(h.vault.file("a.md").as_deref(), Some("one\nthree"));
        assert_eq!(h.vault.file("b.md").as_deref(), Some("two\n"));
    }

    #[tokio::test]
    async fn failure_at_k_writes_prefix_and_withholds_drain() {
        let vault = MemoryVault::new().with_dir("folder.md");
        let h = harness(vault, ScriptedSource::new(), NewlinePolicy::None);
        let batch = vec![
            note("k0", "one", "log.md"),
            note("k1", "two", "log.md"),
            note("k2", "three", "folder.md"),
            note("k3", "four", "log.md"),
        ];

        let decision = h.processor.process(&identity(), batch).await;

        assert!(matches!(decision, DrainDecision::Withheld { failed_at: 2 }));
        assert!(h.source.drains().is_empty());
        assert_eq!(
            h.vault.writes(),
            vec![
                ("log.md".to_string(), "one".to_string()),
                ("log.md".to_string(), "one\ntwo".to_string()),
            ]
        );
        let notices = h.sink.notices();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].is_error());
        assert!(notices[0].to_string().contains("event 2"));
    }

    #[tokio::test]
    async fn empty_batch_does_nothing() {
        let h = harness(MemoryVault::new(), ScriptedSource::new(), NewlinePolicy::Unix);

        let decision = h.processor.process(&identity(), Vec::new()).await;

        assert!(matches!(decision, DrainDecision::Skipped));
        assert!(h.vault.writes().is_empty());
        assert!(h.source.drains().is_empty());
        assert!(h.sink.notices().is_empty());
    }

    #[tokio::test]
    async fn new_file_under_no_policy_holds_exact_payload() {
        let h = harness(MemoryVault::new(), ScriptedSource::new(), NewlinePolicy::None);

        h.processor
            .process(&identity(), vec![note("k0", "exact bytes", "new.md")])
            .await;

        assert_eq!(h.vault.file("new.md").as_deref(), Some("exact bytes"));
    }

    #[tokio::test]
    async fn appends_to_existing_content_per_policy() {
        for (policy, expected) in [
            (NewlinePolicy::Unix, "A\nB"),
            (NewlinePolicy::Windows, "A\r\nB"),
            (NewlinePolicy::None, "A\nB"),
        ] {
            let h = harness(
                MemoryVault::new().with_file("log.md", "A"),
                ScriptedSource::new(),
                policy,
            );

            h.processor
                .process(&identity(), vec![note("k0", "B", "log.md")])
                .await;

            assert_eq!(h.vault.file("log.md").as_deref(), Some(expected), "{policy:?}");
        }
    }

    #[tokio::test]
    async fn directory_target_fails_without_writing() {
        let h = harness(
            MemoryVault::new().with_dir("notes"),
            ScriptedSource::new(),
            NewlinePolicy::Unix,
        );

        let decision = h
            .processor
            .process(&identity(), vec![note("k0", "x", "notes")])
            .await;

        assert!(matches!(decision, DrainDecision::Withheld { failed_at: 0 }));
        assert!(h.vault.writes().is_empty());
    }

    #[tokio::test]
    async fn policy_is_read_per_batch() {
        let h = harness(MemoryVault::new(), ScriptedSource::new(), NewlinePolicy::Unix);

        h.processor
            .process(&identity(), vec![note("k0", "A", "log.md")])
            .await;
        h.settings.send_modify(|s| s.newline = NewlinePolicy::Windows);
        h.processor
            .process(&identity(), vec![note("k1", "B", "other.md")])
            .await;

        assert_eq!(h.vault.file("log.md").as_deref(), Some("A\n"));
        assert_eq!(h.vault.file("other.md").as_deref(), Some("B\r\n"));
    }

    #[tokio::test]
    async fn drain_failure_keeps_written_files() {
        let h = harness(
            MemoryVault::new(),
            ScriptedSource::new().failing_drains(),
            NewlinePolicy::Unix,
        );

        let decision = h
            .processor
            .process(&identity(), vec![note("k0", "kept", "a.md")])
            .await;

        assert!(matches!(decision, DrainDecision::DrainFailed { .. }));
        assert_eq!(h.vault.file("a.md").as_deref(), Some("kept\n"));
        assert!(h.sink.notices()[0].is_error());
    }

    #[tokio::test]
    async fn redelivered_batch_duplicates_applied_prefix() {
        let h = harness(
            MemoryVault::new().fail_writes_to("b.md"),
            ScriptedSource::new(),
            NewlinePolicy::Unix,
        );
        let batch = vec![note("k0", "one", "a.md"), note("k1", "two", "b.md")];

        h.processor.process(&identity(), batch.clone()).await;
        h.processor.process(&identity(), batch).await;

        assert_eq!(h.vault.file("a.md").as_deref(), Some("one\none"));
        assert!(h.source.drains().is_empty());
    }

    #[tokio::test]
    async fn meeting_notes_drain_carries_follow_up() {
        let h = harness(MemoryVault::new(), ScriptedSource::new(), NewlinePolicy::Unix);
        let batch = vec![
            note("k0", "Meeting notes", "daily/2024-01-01.md"),
            note("k1", "Follow-up", "daily/2024-01-01.md"),
        ];

        h.processor.process(&identity(), batch).await;

        assert_eq!(
            h.vault.file("daily/2024-01-01.md").as_deref(),
            Some("Meeting notes\nFollow-up")
        );
        assert_eq!(
            h.source.drains(),
            vec![(identity(), note("k1", "Follow-up", "daily/2024-01-01.md"))]
        );
    }

    proptest! {
        /// A well-formed batch is always applied in full and drained exactly
        /// once, through its final entry.
        #[test]
        fn well_formed_batches_drain_through_last(batch in arb_note_batch()) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let h = harness(MemoryVault::new(), ScriptedSource::new(), NewlinePolicy::Unix);

            let decision = rt.block_on(h.processor.process(&identity(), batch.clone()));

            match batch.last() {
                Some(last) => {
                    prop_assert!(decision.is_drained());
                    prop_assert_eq!(h.source.drains(), vec![(identity(), last.clone())]);
                }
                None => {
                    prop_assert!(matches!(decision, DrainDecision::Skipped));
                    prop_assert!(h.source.drains().is_empty());
                }
            }
        }
    }

    #[tokio::test]
    async fn meeting_notes_end_to_end() {
        let vault_dir = tempdir().unwrap();
        let spool_dir = tempdir().unwrap();
        let alice = identity();

        let source = Arc::new(SpoolSource::new(SpoolSourceConfig {
            spool_dir: spool_dir.path().to_path_buf(),
            poll_interval: Duration::from_millis(10),
            resync_interval: Duration::from_secs(60),
        }));
        let vault = Arc::new(LocalVault::new(vault_dir.path()));
        let sink = Arc::new(RecordingSink::new());
        let (_settings, settings_rx) = watch::channel(Settings {
            newline: NewlinePolicy::Unix,
            identity: Some(alice.clone()),
            error: None,
        });

        let buffer = spool::buffer_dir(spool_dir.path(), &alice).unwrap();
        spool::spool_entry(
            &buffer,
            &spool::next_entry_key(),
            &json!({"data": "Meeting notes", "path": "daily/2024-01-01.md"}),
        )
        .unwrap();
        spool::spool_entry(
            &buffer,
            &spool::next_entry_key(),
            &json!({"data": "Follow-up", "path": "daily/2024-01-01.md"}),
        )
        .unwrap();

        let processor = Arc::new(BatchProcessor::new(
            Arc::clone(&vault),
            Arc::clone(&source),
            Arc::clone(&sink) as Arc<dyn NotificationSink>,
            settings_rx,
        ));
        let manager = SubscriptionManager::new(
            Arc::clone(&source),
            processor,
            Arc::clone(&sink) as Arc<dyn NotificationSink>,
        );
        manager.start(alice.clone()).unwrap();

        timeout(WAIT, async {
            while sink.notices().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let written =
            std::fs::read_to_string(vault_dir.path().join("daily/2024-01-01.md")).unwrap();
        assert_eq!(written, "Meeting notes\nFollow-up");
        assert_eq!(
            sink.notices(),
            vec![Notice::Updated {
                identity: alice.clone(),
                applied: 2
            }]
        );
        assert!(spool::list_pending(&buffer).unwrap().is_empty());

        if let Some(task) = manager.stop() {
            timeout(WAIT, task).await.unwrap().unwrap();
        }
    }
}
