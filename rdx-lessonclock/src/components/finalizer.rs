//! Writes the lesson summary when a watched section becomes visible.

use crate::common::{lock_or_recover, NodeId};
use crate::config::{FinalizerConfig, FirePolicy, LabelConfig};
use crate::dom::{Document, MutationBatch, MutationKind, MutationRecord, SharedDocument};
use crate::events::SessionEvent;
use crate::time::{format_elapsed, SessionClock};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Attribute marking the element the finalizer writes the summary into.
pub const SUMMARY_MARKER: &str = "data-lesson-timer-summary";

#[derive(Debug, Clone, Copy)]
struct WatchedNode {
    node: NodeId,
    fired: bool,
}

/// Reacts to hidden-to-visible transitions of watched nodes.
///
/// Unrelated attribute changes, text changes and visible-to-hidden
/// transitions are ignored. A watched node without a heading is skipped
/// without consuming its latch.
///
/// A reveal is judged by its own record and the later records of the same
/// batch, never by the live document, so a batch handled after the node was
/// hidden again still fires.
pub struct Finalizer {
    clock: Arc<SessionClock>,
    document: SharedDocument,
    watched: Vec<WatchedNode>,
    config: FinalizerConfig,
    summary_prefix: String,
    events: Option<broadcast::Sender<SessionEvent>>,
}

impl Finalizer {
    pub fn new(
        clock: Arc<SessionClock>,
        document: SharedDocument,
        watched: impl IntoIterator<Item = NodeId>,
        config: FinalizerConfig,
        labels: &LabelConfig,
    ) -> Self {
        Self {
            clock,
            document,
            watched: watched
                .into_iter()
                .map(|node| WatchedNode { node, fired: false })
                .collect(),
            config,
            summary_prefix: labels.summary_prefix.clone(),
            events: None,
        }
    }

    /// Publishes `SessionEvent`s on the given channel.
    pub fn with_events(mut self, events: broadcast::Sender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// True once no watched node can fire again.
    pub fn is_exhausted(&self) -> bool {
        self.config.policy == FirePolicy::Once && self.watched.iter().all(|watched| watched.fired)
    }

    /// Handles one batch of mutation records. Returns how many summaries were written.
    pub fn process_batch(&mut self, batch: &MutationBatch) -> usize {
        let shared = self.document.clone();
        let mut document = lock_or_recover(&shared);
        let mut written = 0;
        for (position, record) in batch.records.iter().enumerate() {
            let MutationKind::Attributes { name, old_value, value } = &record.kind else {
                continue;
            };
            if *name != self.config.visibility_attribute || old_value.is_none() || value.is_some() {
                continue;
            }
            let Some(index) = self.watched.iter().position(|w| w.node == record.target) else {
                continue;
            };
            if hidden_again(&batch.records[position + 1..], record.target, name) {
                continue;
            }
            if self.fire(&mut document, index) {
                written += 1;
            }
        }
        if written > 0 {
            document.flush();
        }
        written
    }

    /// Fires for every watched node that is visible but not yet latched.
    ///
    /// Used after the feed dropped batches, when transitions may have been missed.
    pub fn resync(&mut self) -> usize {
        let shared = self.document.clone();
        let mut document = lock_or_recover(&shared);
        let mut written = 0;
        for index in 0..self.watched.len() {
            let WatchedNode { node, fired } = self.watched[index];
            let visible = document.contains(node)
                && !document.has_attribute(node, &self.config.visibility_attribute);
            if visible && !fired && self.fire(&mut document, index) {
                written += 1;
            }
        }
        if written > 0 {
            document.flush();
        }
        written
    }

    /// Consumes the mutation feed until shutdown, feed closure, or exhaustion.
    ///
    /// Returning drops the receiver, which unsubscribes from the feed.
    pub async fn run(
        mut self,
        mut feed: broadcast::Receiver<MutationBatch>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("Finalizer watching {} node(s).", self.watched.len());
        loop {
            if self.is_exhausted() {
                debug!("Every watched node has fired; finalizer done.");
                break;
            }
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                batch = feed.recv() => match batch {
                    Ok(batch) => {
                        self.process_batch(&batch);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Finalizer missed {} mutation batch(es); resyncing.", skipped);
                        self.resync();
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        info!("Finalizer stopped.");
    }

    fn fire(&mut self, document: &mut Document, index: usize) -> bool {
        let WatchedNode { node, fired } = self.watched[index];
        if fired && self.config.policy == FirePolicy::Once {
            return false;
        }
        let Some(heading) = document.find_descendant(node, &self.config.heading_tag) else {
            debug!(
                "No <{}> under watched node {:?}; skipping summary.",
                self.config.heading_tag, node
            );
            return false;
        };

        let elapsed = self.clock.elapsed();
        let summary = format!("{} {}", self.summary_prefix, format_elapsed(elapsed));
        let existing = document
            .children(heading)
            .iter()
            .copied()
            .find(|child| document.has_attribute(*child, SUMMARY_MARKER));
        let target = match existing {
            Some(target) => target,
            None => match document.create_element(heading, "span") {
                Some(target) => {
                    document.set_attribute(target, SUMMARY_MARKER, "");
                    target
                }
                None => return false,
            },
        };
        document.set_text(target, &summary);
        self.watched[index].fired = true;

        info!("Lesson finished: {}", summary);
        if let Some(events) = &self.events {
            events
                .send(SessionEvent::LessonFinished {
                    elapsed,
                    summary,
                    finished_at: Utc::now(),
                })
                .ok();
        }
        true
    }
}

/// True if the last later change to `attribute` on `target` set it again.
fn hidden_again(later: &[MutationRecord], target: NodeId, attribute: &str) -> bool {
    later
        .iter()
        .rev()
        .find_map(|record| match &record.kind {
            MutationKind::Attributes { name, value, .. }
                if record.target == target && name == attribute =>
            {
                Some(value.is_some())
            }
            _ => None,
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::LessonPage;
    use std::time::Duration;

    fn finalizer(page: &LessonPage, policy: FirePolicy) -> Finalizer {
        let config = FinalizerConfig {
            policy,
            ..Default::default()
        };
        Finalizer::new(
            Arc::new(SessionClock::start()),
            page.document.clone(),
            page.watched.clone(),
            config,
            &LabelConfig::default(),
        )
    }

    /// Applies `change` to the document and returns the batch it produced.
    fn mutate(page: &LessonPage, change: impl FnOnce(&mut Document)) -> MutationBatch {
        let mut document = page.document.lock().unwrap();
        let mut feed = document.subscribe();
        change(&mut *document);
        document.flush();
        feed.try_recv().unwrap_or_default()
    }

    fn summaries(page: &LessonPage) -> Vec<String> {
        let document = page.document.lock().unwrap();
        let complete = page.watched[0];
        let heading = document.find_descendant(complete, "h1").unwrap();
        document
            .children(heading)
            .iter()
            .filter(|child| document.has_attribute(**child, SUMMARY_MARKER))
            .filter_map(|child| document.text(*child).map(str::to_string))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn reveal_inserts_one_summary_with_elapsed_time() {
        let page = LessonPage::scaffold();
        let mut finalizer = finalizer(&page, FirePolicy::Once);
        tokio::time::advance(Duration::from_secs(125)).await;

        let complete = page.watched[0];
        let batch = mutate(&page, |doc| {
            doc.remove_attribute(complete, "hidden");
        });

        assert_eq!(finalizer.process_batch(&batch), 1);
        assert_eq!(summaries(&page), ["Lesson time: 02 m 05 s"]);
        assert!(finalizer.is_exhausted());
    }

    #[test]
    fn unrelated_attribute_changes_are_ignored() {
        let page = LessonPage::scaffold();
        let mut finalizer = finalizer(&page, FirePolicy::Once);
        let complete = page.watched[0];

        let batch = mutate(&page, |doc| {
            doc.set_attribute(complete, "class", "fade-in");
        });

        assert_eq!(finalizer.process_batch(&batch), 0);
        assert!(summaries(&page).is_empty());
    }

    #[test]
    fn hiding_does_not_fire() {
        let page = LessonPage::scaffold();
        let mut finalizer = finalizer(&page, FirePolicy::EveryReveal);
        let complete = page.watched[0];
        mutate(&page, |doc| {
            doc.remove_attribute(complete, "hidden");
        });

        let batch = mutate(&page, |doc| {
            doc.set_attribute(complete, "hidden", "");
        });

        assert_eq!(finalizer.process_batch(&batch), 0);
    }

    #[test]
    fn reveal_then_hide_in_one_batch_does_not_fire() {
        let page = LessonPage::scaffold();
        let mut finalizer = finalizer(&page, FirePolicy::Once);
        let complete = page.watched[0];

        let batch = mutate(&page, |doc| {
            doc.remove_attribute(complete, "hidden");
            doc.set_attribute(complete, "hidden", "");
        });

        assert_eq!(finalizer.process_batch(&batch), 0);
    }

    #[test]
    fn reveal_handled_after_a_later_hide_still_fires() {
        let page = LessonPage::scaffold();
        let mut finalizer = finalizer(&page, FirePolicy::Once);
        let complete = page.watched[0];

        let reveal = mutate(&page, |doc| {
            doc.remove_attribute(complete, "hidden");
        });
        let hide = mutate(&page, |doc| {
            doc.set_attribute(complete, "hidden", "");
        });

        assert_eq!(finalizer.process_batch(&reveal), 1);
        assert_eq!(finalizer.process_batch(&hide), 0);
        assert_eq!(summaries(&page).len(), 1);
    }

    #[test]
    fn reveal_hide_reveal_in_one_batch_fires_once() {
        let page = LessonPage::scaffold();
        let mut finalizer = finalizer(&page, FirePolicy::EveryReveal);
        let complete = page.watched[0];

        let batch = mutate(&page, |doc| {
            doc.remove_attribute(complete, "hidden");
            doc.set_attribute(complete, "hidden", "");
            doc.remove_attribute(complete, "hidden");
        });

        assert_eq!(finalizer.process_batch(&batch), 1);
    }

    #[test]
    fn once_policy_ignores_later_reveals() {
        let page = LessonPage::scaffold();
        let mut finalizer = finalizer(&page, FirePolicy::Once);
        let complete = page.watched[0];

        for _ in 0..2 {
            let batch = mutate(&page, |doc| {
                doc.remove_attribute(complete, "hidden");
            });
            finalizer.process_batch(&batch);
            mutate(&page, |doc| {
                doc.set_attribute(complete, "hidden", "");
            });
        }

        assert_eq!(summaries(&page).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn every_reveal_policy_refreshes_the_summary() {
        let page = LessonPage::scaffold();
        let mut finalizer = finalizer(&page, FirePolicy::EveryReveal);
        let complete = page.watched[0];

        let reveal = |page: &LessonPage| {
            mutate(page, |doc| {
                doc.remove_attribute(complete, "hidden");
            })
        };

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(finalizer.process_batch(&reveal(&page)), 1);
        mutate(&page, |doc| {
            doc.set_attribute(complete, "hidden", "");
        });

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(finalizer.process_batch(&reveal(&page)), 1);

        assert_eq!(summaries(&page), ["Lesson time: 01 m 09 s"]);
        assert!(!finalizer.is_exhausted());
    }

    #[test]
    fn missing_heading_is_a_no_op() {
        let page = LessonPage::scaffold();
        let complete = page.watched[0];
        let mut finalizer = Finalizer::new(
            Arc::new(SessionClock::start()),
            page.document.clone(),
            [complete],
            FinalizerConfig {
                heading_tag: "h2".to_string(),
                ..Default::default()
            },
            &LabelConfig::default(),
        );

        let batch = mutate(&page, |doc| {
            doc.remove_attribute(complete, "hidden");
        });

        assert_eq!(finalizer.process_batch(&batch), 0);
        assert!(!finalizer.is_exhausted());
    }

    #[test]
    fn records_for_unwatched_nodes_are_ignored() {
        let page = LessonPage::scaffold();
        let mut finalizer = finalizer(&page, FirePolicy::Once);
        let batch = MutationBatch {
            records: vec![MutationRecord {
                target: page.display,
                kind: MutationKind::Attributes {
                    name: "hidden".to_string(),
                    old_value: Some(String::new()),
                    value: None,
                },
            }],
        };

        assert_eq!(finalizer.process_batch(&batch), 0);
    }

    #[test]
    fn resync_catches_a_missed_reveal() {
        let page = LessonPage::scaffold();
        let mut finalizer = finalizer(&page, FirePolicy::Once);
        assert_eq!(finalizer.resync(), 0);

        let complete = page.watched[0];
        mutate(&page, |doc| {
            doc.remove_attribute(complete, "hidden");
        });

        assert_eq!(finalizer.resync(), 1);
        assert_eq!(finalizer.resync(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_after_the_only_node_fires() {
        let page = LessonPage::scaffold();
        let (events, mut session_rx) = broadcast::channel(4);
        let finalizer = finalizer(&page, FirePolicy::Once).with_events(events);
        let feed = page.document.lock().unwrap().subscribe();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(finalizer.run(feed, shutdown_rx));

        tokio::time::sleep(Duration::from_secs(30)).await;
        {
            let mut document = page.document.lock().unwrap();
            document.remove_attribute(page.watched[0], "hidden");
            document.flush();
        }

        task.await.unwrap();
        match session_rx.recv().await.unwrap() {
            SessionEvent::LessonFinished { elapsed, summary, .. } => {
                assert_eq!(elapsed.as_secs(), 30);
                assert_eq!(summary, "Lesson time: 00 m 30 s");
            }
        }
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let page = LessonPage::scaffold();
        let finalizer = finalizer(&page, FirePolicy::EveryReveal);
        let feed = page.document.lock().unwrap().subscribe();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(finalizer.run(feed, shutdown_rx));

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
