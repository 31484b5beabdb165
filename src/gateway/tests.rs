use super::routing::{broadcast, route};
use super::*;
use async_trait::async_trait;
use chrono::Utc;
use polyglot_core::{
    config::{CorrectionConfig, MatcherConfig},
    entry::{ChannelLink, UsageRecord},
    error::PolyglotError,
    message::{Author, Delivery},
    traits::Translator,
    Lang,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

// --- Test doubles ---

/// Answers `"{target}:{text}"` unless the target is configured to fail or stall.
#[derive(Default)]
struct MockTranslator {
    calls: AtomicUsize,
    failing: Vec<Lang>,
    stalling: Vec<Lang>,
}

#[async_trait]
impl Translator for MockTranslator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn translate(&self, text: &str, _source: Lang, target: Lang) -> Result<String, PolyglotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stalling.contains(&target) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        if self.failing.contains(&target) {
            return Err(PolyglotError::Translator("quota exceeded".into()));
        }
        Ok(format!("{target}:{text}"))
    }
}

/// Records deliveries; fails for endpoints listed in `failing`.
#[derive(Default)]
struct RecordingSink {
    delivered: Mutex<Vec<Delivery>>,
    failing: Vec<String>,
}

#[async_trait]
impl Sink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, delivery: &Delivery) -> Result<(), PolyglotError> {
        if self.failing.contains(&delivery.sink) {
            return Err(PolyglotError::Channel("404".into()));
        }
        self.delivered.lock().unwrap().push(delivery.clone());
        Ok(())
    }
}

impl RecordingSink {
    fn by_endpoint(&self) -> HashMap<String, String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|d| (d.sink.clone(), d.text.clone()))
            .collect()
    }
}

/// Replays `queued` events from `start`, then closes the stream.
#[derive(Default)]
struct RecordingChannel {
    queued: Mutex<Vec<IncomingEvent>>,
    sent: Mutex<Vec<OutgoingMessage>>,
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(&self) -> Result<mpsc::Receiver<IncomingEvent>, PolyglotError> {
        let events: Vec<IncomingEvent> = self.queued.lock().unwrap().drain(..).collect();
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            let _ = tx.try_send(event);
        }
        Ok(rx)
    }

    async fn send(&self, message: OutgoingMessage) -> Result<(), PolyglotError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn stop(&self) -> Result<(), PolyglotError> {
        Ok(())
    }
}

struct Fixture {
    _tmp: tempfile::TempDir,
    store: Store,
    log: Arc<UsageLog>,
    pipeline: Pipeline,
}

async fn fixture(translator: Option<Arc<dyn Translator>>) -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let store = Store::open(
        tmp.path().join("translate.json"),
        MatcherConfig::default(),
        CorrectionConfig::default(),
    )
    .await
    .unwrap();
    let log = Arc::new(UsageLog::new(tmp.path().join("usage_log.jsonl")));
    let pipeline = Pipeline::new(
        store.clone(),
        translator,
        log.clone(),
        Duration::from_millis(200),
        0.3,
    );
    Fixture {
        _tmp: tmp,
        store,
        log,
        pipeline,
    }
}

async fn queued_records(log: &UsageLog) -> usize {
    match log.take_batch().await.unwrap() {
        Some(batch) => batch.records.len(),
        None => 0,
    }
}

fn langs(pairs: &[(Lang, &str)]) -> BTreeMap<Lang, Vec<String>> {
    pairs.iter().map(|(l, t)| (*l, vec![t.to_string()])).collect()
}

// --- Pipeline ---

#[tokio::test]
async fn test_fallback_registers_then_memory_serves() {
    let translator = Arc::new(MockTranslator::default());
    let fx = fixture(Some(translator.clone())).await;

    let first = fx.pipeline.resolve("Hello", Lang::En, Utc::now()).await;
    assert_eq!(first.outcome(), Outcome::Complete);
    assert_eq!(
        first.source,
        Source::Translator {
            entry_id: Some("1001".into())
        }
    );
    assert_eq!(first.translations.get(&Lang::Ja).map(String::as_str), Some("ja:Hello"));
    assert_eq!(first.translations.len(), 3);
    assert!(first.persist_error.is_none());
    assert_eq!(translator.calls.load(Ordering::SeqCst), 3);

    let second = fx.pipeline.resolve("hello", Lang::En, Utc::now()).await;
    assert_eq!(
        second.source,
        Source::Memory {
            entry_id: "1001".into()
        }
    );
    assert_eq!(second.translations, first.translations);
    assert_eq!(translator.calls.load(Ordering::SeqCst), 3, "memory hit must not call out");

    assert_eq!(queued_records(&fx.log).await, 2);
}

#[tokio::test]
async fn test_memory_hit_uses_stored_entry_without_translator() {
    let fx = fixture(None).await;
    fx.store
        .add_entry(
            langs(&[(Lang::Ja, "こんにちは"), (Lang::En, "Hello"), (Lang::Ko, "안녕하세요")]),
            0.5,
        )
        .await
        .unwrap();

    let res = fx.pipeline.resolve("hello", Lang::En, Utc::now()).await;
    assert!(matches!(res.source, Source::Memory { .. }));
    assert_eq!(res.outcome(), Outcome::Partial);
    assert_eq!(res.missing, vec![Lang::Zh]);
    assert_eq!(res.translations.get(&Lang::Ja).map(String::as_str), Some("こんにちは"));
}

#[tokio::test]
async fn test_partial_failure_registers_what_succeeded() {
    let translator = Arc::new(MockTranslator {
        failing: vec![Lang::Ko],
        ..Default::default()
    });
    let fx = fixture(Some(translator)).await;

    let res = fx.pipeline.resolve("Good night", Lang::En, Utc::now()).await;
    assert_eq!(res.outcome(), Outcome::Partial);
    assert_eq!(res.missing, vec![Lang::Ko]);

    let snap = fx.store.snapshot().await;
    let entry = snap.entries.get("1001").unwrap();
    assert!(entry.languages.contains_key(&Lang::Ja));
    assert!(!entry.languages.contains_key(&Lang::Ko));
}

#[tokio::test]
async fn test_stalled_target_times_out_without_blocking_others() {
    let translator = Arc::new(MockTranslator {
        stalling: vec![Lang::Zh],
        ..Default::default()
    });
    let fx = fixture(Some(translator)).await;

    let started = std::time::Instant::now();
    let res = fx.pipeline.resolve("Thanks", Lang::En, Utc::now()).await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(res.missing, vec![Lang::Zh]);
    assert_eq!(res.translations.len(), 2);
}

#[tokio::test]
async fn test_total_failure_is_empty_and_not_recorded() {
    let translator = Arc::new(MockTranslator {
        failing: vec![Lang::Ja, Lang::Ko, Lang::Zh],
        ..Default::default()
    });
    let fx = fixture(Some(translator)).await;

    let res = fx.pipeline.resolve("Hello", Lang::En, Utc::now()).await;
    assert_eq!(res.outcome(), Outcome::Empty);
    assert_eq!(res.source, Source::Unresolved);
    assert!(fx.store.is_empty().await);
    assert_eq!(queued_records(&fx.log).await, 0);
}

#[tokio::test]
async fn test_no_translator_and_no_match_is_unresolved() {
    let fx = fixture(None).await;
    let res = fx.pipeline.resolve("Hello", Lang::En, Utc::now()).await;
    assert_eq!(res.source, Source::Unresolved);
    assert_eq!(res.missing.len(), 3);
}

// --- Routing ---

fn links(pairs: &[(&str, Lang, &str)]) -> BTreeMap<String, ChannelLink> {
    pairs
        .iter()
        .map(|(id, lang, sink)| {
            (
                id.to_string(),
                ChannelLink {
                    lang: *lang,
                    sink: sink.to_string(),
                },
            )
        })
        .collect()
}

#[test]
fn test_route_skips_source_language_and_missing_translations() {
    let translations = BTreeMap::from([(Lang::Ja, "こんにちは".to_string())]);
    let links = links(&[
        ("en-1", Lang::En, "https://hook/en1"),
        ("en-2", Lang::En, "https://hook/en2"),
        ("ja-1", Lang::Ja, "https://hook/ja1"),
        ("ko-1", Lang::Ko, "https://hook/ko1"),
    ]);
    let author = Author {
        name: "yuki".into(),
        avatar_url: None,
    };

    let deliveries = route(&translations, Lang::En, &links, Some(&author));
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].sink, "https://hook/ja1");
    assert_eq!(deliveries[0].text, "こんにちは");
    assert_eq!(deliveries[0].author.as_ref().unwrap().name, "yuki");
}

#[tokio::test]
async fn test_broadcast_failure_does_not_block_other_sinks() {
    let sink = Arc::new(RecordingSink {
        failing: vec!["bad".into()],
        ..Default::default()
    });
    let deliveries = ["good-1", "bad", "good-2"]
        .iter()
        .map(|s| Delivery {
            sink: s.to_string(),
            text: "hi".into(),
            author: None,
        })
        .collect();

    let report = broadcast(sink.clone(), deliveries).await;
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, vec!["bad".to_string()]);
    assert_eq!(sink.by_endpoint().len(), 2);
}

// --- Gateway ---

async fn gateway(fx: &Fixture, sink: Arc<RecordingSink>, channel: Arc<RecordingChannel>) -> Gateway {
    let links = ChannelLinks::load(fx._tmp.path().join("channel_links.json")).unwrap();
    links.link("ch-en", Lang::En, "hook-en").await.unwrap();
    links.link("ch-ja", Lang::Ja, "hook-ja").await.unwrap();
    links.link("ch-ko", Lang::Ko, "hook-ko").await.unwrap();
    Gateway::new(
        fx.pipeline.clone(),
        fx.store.clone(),
        fx.log.clone(),
        Arc::new(links),
        channel,
        sink,
        LearningConfig::default(),
    )
}

fn message(channel_id: &str, text: &str) -> IncomingEvent {
    IncomingEvent::Message(IncomingMessage {
        id: uuid::Uuid::new_v4(),
        channel_id: channel_id.into(),
        author: Some(Author {
            name: "mina".into(),
            avatar_url: Some("https://cdn/mina.png".into()),
        }),
        text: text.into(),
        timestamp: Utc::now(),
        from_bot: false,
    })
}

#[tokio::test]
async fn test_message_is_broadcast_to_other_language_channels() {
    let fx = fixture(None).await;
    fx.store
        .add_entry(
            langs(&[(Lang::Ja, "こんにちは"), (Lang::En, "Hello"), (Lang::Ko, "안녕하세요")]),
            0.5,
        )
        .await
        .unwrap();
    let sink = Arc::new(RecordingSink::default());
    let gw = gateway(&fx, sink.clone(), Arc::default()).await;

    gw.handle_event(message("ch-en", "Hello")).await;

    let got = sink.by_endpoint();
    assert_eq!(got.len(), 2);
    assert_eq!(got["hook-ja"], "こんにちは");
    assert_eq!(got["hook-ko"], "안녕하세요");
    let delivered = sink.delivered.lock().unwrap();
    assert!(delivered.iter().all(|d| d.author.as_ref().unwrap().name == "mina"));
}

#[tokio::test]
async fn test_unlinked_and_relayed_messages_are_ignored() {
    let translator = Arc::new(MockTranslator::default());
    let fx = fixture(Some(translator.clone())).await;
    let sink = Arc::new(RecordingSink::default());
    let gw = gateway(&fx, sink.clone(), Arc::default()).await;

    gw.handle_event(message("elsewhere", "Hello")).await;
    let mut relayed = message("ch-en", "Hello");
    if let IncomingEvent::Message(ref mut m) = relayed {
        m.from_bot = true;
    }
    gw.handle_event(relayed).await;

    assert!(sink.by_endpoint().is_empty());
    assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_correction_updates_store_and_replies() {
    let fx = fixture(None).await;
    fx.store
        .add_entry(langs(&[(Lang::Ja, "こんにちわ"), (Lang::En, "Hello")]), 0.5)
        .await
        .unwrap();
    let channel = Arc::new(RecordingChannel::default());
    let gw = gateway(&fx, Arc::default(), channel.clone()).await;

    let id = uuid::Uuid::new_v4();
    gw.handle_event(IncomingEvent::Correction(CorrectionRequest {
        id,
        original: "こんにちわ".into(),
        corrected: "こんにちは".into(),
        reviewer: None,
    }))
    .await;

    let snap = fx.store.snapshot().await;
    let ja = &snap.entries["1001"].languages[&Lang::Ja];
    assert_eq!(ja, &vec!["こんにちわ".to_string(), "こんにちは".to_string()]);

    let sent = channel.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].reply_to, Some(id));
    assert!(sent[0].text.contains("1 entries"));
}

#[tokio::test]
async fn test_run_drains_events_and_exits_when_channel_closes() {
    let fx = fixture(None).await;
    fx.store
        .add_entry(langs(&[(Lang::En, "Hello"), (Lang::Ja, "こんにちは")]), 0.5)
        .await
        .unwrap();
    let sink = Arc::new(RecordingSink::default());
    let channel = Arc::new(RecordingChannel {
        queued: Mutex::new(vec![message("ch-en", "Hello")]),
        ..Default::default()
    });
    let gw = Arc::new(gateway(&fx, sink.clone(), channel).await);

    let res = tokio::time::timeout(Duration::from_secs(5), gw.run()).await;
    assert!(matches!(res, Ok(Ok(()))), "run must return once the stream ends");
    assert_eq!(sink.by_endpoint()["hook-ja"], "こんにちは");
}

// --- Learning job ---

#[tokio::test]
async fn test_learning_job_learns_then_stops_cleanly() {
    let fx = fixture(None).await;
    fx.log
        .append(&UsageRecord {
            timestamp: Utc::now(),
            word: BTreeMap::from([
                (Lang::En, "Good morning".to_string()),
                (Lang::Ja, "おはよう".to_string()),
            ]),
        })
        .await
        .unwrap();

    // The first tick fires immediately.
    let job = LearningJob::spawn(fx.store.clone(), fx.log.clone(), LearningConfig::default());
    let learned = tokio::time::timeout(Duration::from_secs(5), async {
        while fx.store.is_empty().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(learned.is_ok(), "first cycle should learn the queued record");

    let stopped = tokio::time::timeout(Duration::from_secs(5), job.stop()).await;
    assert!(stopped.is_ok(), "stop must not wait for the next interval");
    assert!(fx.log.take_batch().await.unwrap().is_none(), "batch was committed");

    let reopened = Store::open(fx.store.path(), MatcherConfig::default(), CorrectionConfig::default())
        .await
        .unwrap();
    assert!(!reopened.is_empty().await);
}
