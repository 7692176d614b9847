// NotificationHub: fan-out of relay notifications to control-plane listeners
// Single Responsibility: broadcast channel lifecycle, listener tasks, delivery accounting

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Which stream a notification belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationChannel {
    Engine,
    FileRequest,
}

impl NotificationChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationChannel::Engine => "engine",
            NotificationChannel::FileRequest => "file-request",
        }
    }
}

/// One formatted, newline-terminated notification line.
///
/// Cheap to clone; every listener receives its own handle to the same text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    channel: NotificationChannel,
    line: Arc<str>,
}

impl NotificationMessage {
    pub fn new(channel: NotificationChannel, line: String) -> Self {
        Self {
            channel,
            line: Arc::from(line),
        }
    }

    pub fn channel(&self) -> NotificationChannel {
        self.channel
    }

    /// The full line including its terminator.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// The line without its terminator.
    pub fn text(&self) -> &str {
        self.line.trim_end_matches('\n')
    }
}

/// Subscriber that wants every notification.
///
/// Each registered listener runs on its own task with its own receiver, so a
/// slow listener only delays itself. Listeners that fall more than the
/// channel capacity behind lose the oldest messages.
pub trait NotificationListener: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn on_notification(&self, message: &NotificationMessage) -> anyhow::Result<()>;
}

/// Listener that writes every notification to the log.
pub struct LogListener;

impl NotificationListener for LogListener {
    fn name(&self) -> &str {
        "log"
    }

    fn on_notification(&self, message: &NotificationMessage) -> anyhow::Result<()> {
        log::info!("[Notify] {} {}", message.channel().as_str(), message.text());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ListenerId(pub u64);

/// Delivery counters for health reporting.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct NotificationStats {
    pub published: u64,
    /// Published while nobody was subscribed
    pub unheard: u64,
    pub delivery_failures: u64,
    pub lagged: u64,
    pub listeners: usize,
    pub receivers: usize,
}

#[derive(Default)]
struct DeliveryCounters {
    delivery_failures: AtomicU64,
    lagged: AtomicU64,
}

/// Manages the notification broadcast channel and registered listeners
///
/// `publish` never blocks and never fails from the caller's point of view,
/// which is what lets the engine callback relay hand messages over from the
/// engine's own context.
pub struct NotificationHub {
    tx: broadcast::Sender<NotificationMessage>,
    listeners: Mutex<HashMap<ListenerId, JoinHandle<()>>>,
    next_listener: AtomicU64,
    published: AtomicU64,
    unheard: AtomicU64,
    counters: Arc<DeliveryCounters>,
}

impl NotificationHub {
    /// Create a hub whose broadcast buffer holds `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
            published: AtomicU64::new(0),
            unheard: AtomicU64::new(0),
            counters: Arc::new(DeliveryCounters::default()),
        }
    }

    /// Hand a message to every current subscriber without waiting.
    ///
    /// Returns the number of receivers the message was queued for.
    pub fn publish(&self, message: NotificationMessage) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        match self.tx.send(message) {
            Ok(receivers) => receivers,
            Err(_) => {
                self.unheard.fetch_add(1, Ordering::Relaxed);
                0
            }
        }
    }

    /// Subscribe a raw receiver, as used by SSE streams.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationMessage> {
        self.tx.subscribe()
    }

    /// Register a listener on its own task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register_listener(&self, listener: Arc<dyn NotificationListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        let mut rx = self.tx.subscribe();
        let counters = Arc::clone(&self.counters);

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        if let Err(err) = listener.on_notification(&message) {
                            counters.delivery_failures.fetch_add(1, Ordering::Relaxed);
                            log::warn!(
                                "[NotificationHub] listener '{}' failed to take {} notification: {:#}",
                                listener.name(),
                                message.channel().as_str(),
                                err
                            );
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        counters.lagged.fetch_add(skipped, Ordering::Relaxed);
                        log::warn!(
                            "[NotificationHub] listener '{}' lagged, {} notifications dropped",
                            listener.name(),
                            skipped
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        match self.listeners.lock() {
            Ok(mut listeners) => {
                listeners.insert(id, task);
            }
            Err(_) => {
                log::error!("[NotificationHub] listener registry poisoned, aborting listener");
                task.abort();
            }
        }
        id
    }

    /// Stop a listener's task. Returns false for unknown ids.
    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        let task = self
            .listeners
            .lock()
            .ok()
            .and_then(|mut listeners| listeners.remove(&id));
        match task {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> NotificationStats {
        let listeners = self.listeners.lock().map(|l| l.len()).unwrap_or(0);
        NotificationStats {
            published: self.published.load(Ordering::Relaxed),
            unheard: self.unheard.load(Ordering::Relaxed),
            delivery_failures: self.counters.delivery_failures.load(Ordering::Relaxed),
            lagged: self.counters.lagged.load(Ordering::Relaxed),
            listeners,
            receivers: self.tx.receiver_count(),
        }
    }
}

impl Drop for NotificationHub {
    fn drop(&mut self) {
        if let Ok(listeners) = self.listeners.get_mut() {
            for (_, task) in listeners.drain() {
                task.abort();
            }
        }
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn engine_line(text: &str) -> NotificationMessage {
        NotificationMessage::new(NotificationChannel::Engine, format!("{text}\n"))
    }

    struct Forward {
        tx: mpsc::UnboundedSender<String>,
    }

    impl NotificationListener for Forward {
        fn name(&self) -> &str {
            "forward"
        }

        fn on_notification(&self, message: &NotificationMessage) -> anyhow::Result<()> {
            self.tx.send(message.text().to_string())?;
            Ok(())
        }
    }

    struct Failing;

    impl NotificationListener for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn on_notification(&self, _: &NotificationMessage) -> anyhow::Result<()> {
            anyhow::bail!("listener disconnected")
        }
    }

    #[test]
    fn publish_without_subscribers_is_counted_not_failed() {
        let hub = NotificationHub::new(8);
        assert_eq!(hub.publish(engine_line("29 0 0 0 0.000000 ")), 0);
        let stats = hub.stats();
        assert_eq!(stats.published, 1);
        assert_eq!(stats.unheard, 1);
    }

    #[test]
    fn every_subscriber_receives_each_message() {
        let hub = NotificationHub::new(8);
        let mut rx1 = hub.subscribe();
        let mut rx2 = hub.subscribe();

        assert_eq!(hub.publish(engine_line("a")), 2);
        assert_eq!(rx1.try_recv().unwrap().text(), "a");
        assert_eq!(rx2.try_recv().unwrap().text(), "a");
    }

    #[test]
    fn slow_subscriber_does_not_block_publisher() {
        let hub = NotificationHub::new(2);
        let mut slow = hub.subscribe();
        for i in 0..10 {
            hub.publish(engine_line(&i.to_string()));
        }
        // the publisher never waited; the slow receiver only lost history
        assert!(matches!(
            slow.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(8))
        ));
        assert_eq!(slow.try_recv().unwrap().text(), "8");
    }

    #[tokio::test]
    async fn failing_listener_does_not_affect_others() {
        let hub = NotificationHub::new(8);
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register_listener(Arc::new(Failing));
        hub.register_listener(Arc::new(Forward { tx }));

        hub.publish(engine_line("first"));
        hub.publish(engine_line("second"));

        let got = tokio::time::timeout(Duration::from_secs(1), async {
            (rx.recv().await.unwrap(), rx.recv().await.unwrap())
        })
        .await
        .unwrap();
        assert_eq!(got, ("first".to_string(), "second".to_string()));

        // give the failing listener a chance to run
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hub.stats().delivery_failures, 2);
        assert_eq!(hub.stats().listeners, 2);
    }

    #[tokio::test]
    async fn unregistered_listener_stops_receiving() {
        let hub = NotificationHub::new(8);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = hub.register_listener(Arc::new(Forward { tx }));

        assert!(hub.unregister_listener(id));
        assert!(!hub.unregister_listener(id));
        tokio::task::yield_now().await;

        hub.publish(engine_line("after"));
        let got = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(matches!(got, Err(_) | Ok(None)));
    }

    #[test]
    fn message_text_strips_terminator() {
        let msg = engine_line("1 2 3 4 5.000000 x");
        assert_eq!(msg.line(), "1 2 3 4 5.000000 x\n");
        assert_eq!(msg.text(), "1 2 3 4 5.000000 x");
        assert_eq!(msg.channel().as_str(), "engine");
    }
}
